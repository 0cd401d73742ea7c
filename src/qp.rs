//! Queue pair contexts and the table <-> unit notification types.

use serde::{Deserialize, Serialize};

/// The QP state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QpState {
    Reset,
    Init,
    ReadyToReceive,
    ReadyToSend,
    SqDrain,
    SqError,
    Error,
}

/// Transport semantics class of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    ReliableConnection,
    UnreliableConnection,
    ReliableDatagram,
    UnreliableDatagram,
}

/// Attributes supplied with a create request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QpAttributes {
    pub qpn: u32,
    pub service: ServiceType,
}

/// One connection table slot.
///
/// The table is the single writer; everyone else sees point-in-time
/// copies via [`TableSnapshot`]. A slot is occupied iff its state left
/// Reset and its qpn is non-sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QpContext {
    pub qpn: u32,
    pub state: QpState,
    pub service: ServiceType,
}

impl QpContext {
    pub(crate) fn vacant() -> Self {
        QpContext {
            qpn: 0,
            state: QpState::Reset,
            service: ServiceType::ReliableConnection,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.state != QpState::Reset && self.qpn != 0
    }
}

/// Read-only point-in-time copy of all table slots.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    slots: Box<[QpContext]>,
}

impl TableSnapshot {
    pub(crate) fn new(slots: Box<[QpContext]>) -> Self {
        TableSnapshot { slots }
    }

    #[inline]
    pub fn slots(&self) -> &[QpContext] {
        &self.slots
    }

    /// Content-addressed lookup: the slot whose occupied context holds
    /// `qpn`. N is small and bounded, so a linear scan is fine here.
    pub fn lookup(&self, qpn: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|ctx| ctx.is_valid() && ctx.qpn == qpn)
    }
}

/// One-shot PSN reset pulses, scoped to a single slot's connection unit.
/// Observed at most once, never retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttrNotification {
    pub recv_psn_reset: bool,
    pub send_psn_reset: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_requires_state_and_qpn() {
        let mut ctx = QpContext::vacant();
        assert!(!ctx.is_valid());
        ctx.state = QpState::Init;
        assert!(!ctx.is_valid()); // sentinel qpn
        ctx.qpn = 0x12;
        assert!(ctx.is_valid());
        ctx.state = QpState::Reset;
        assert!(!ctx.is_valid());
    }

    #[test]
    fn snapshot_lookup_skips_vacant() {
        let mut slots = vec![QpContext::vacant(); 4];
        slots[1].qpn = 0x20;
        slots[1].state = QpState::ReadyToSend;
        slots[2].qpn = 0x30;
        slots[2].state = QpState::Reset; // vacated, qpn residue
        let snap = TableSnapshot::new(slots.into_boxed_slice());
        assert_eq!(snap.lookup(0x20), Some(1));
        assert_eq!(snap.lookup(0x30), None);
        assert_eq!(snap.lookup(0x0), None);
    }
}
