//! Fixed-capacity registry of queue pair contexts.
//!
//! The table owns all context state. Creation and modification resolve
//! in two stages: stage 1 picks the slot and computes the PSN reset
//! flags, stage 2 ([`ConnectionTable::tick`]) hands the resulting
//! one-shot pulses to the caller for delivery, one step later. That
//! split keeps the slot search (priority encode over N) and the
//! notification fan-out (one-hot decode over N) out of each other's way.

use std::collections::VecDeque;

use fnv::FnvHashMap;

use crate::packet::QPN_MASK;
use crate::qp::{AttrNotification, QpAttributes, QpContext, QpState, TableSnapshot};
use crate::ControlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOp {
    ResetRecvPsn,
    ResetSendPsn,
}

#[derive(Debug)]
pub struct ConnectionTable {
    slots: Box<[QpContext]>,
    // qpn -> slot, maintained alongside the authoritative slot array.
    index: FnvHashMap<u32, usize>,
    // Stage-1 results awaiting stage-2 delivery on the next tick.
    pending: VecDeque<(usize, AttrNotification)>,
}

impl ConnectionTable {
    pub fn new(num_connections: usize) -> Self {
        ConnectionTable {
            slots: vec![QpContext::vacant(); num_connections].into_boxed_slice(),
            index: FnvHashMap::default(),
            pending: VecDeque::new(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// True iff every slot is occupied. Upstream admission control is
    /// expected to consult this before issuing creates.
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|ctx| ctx.is_valid())
    }

    #[inline]
    pub fn lookup(&self, qpn: u32) -> Option<usize> {
        self.index.get(&qpn).copied()
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot::new(self.slots.clone())
    }

    /// Occupy the lowest free slot with the given attributes and queue
    /// both PSN reset pulses for the next tick.
    pub fn create(&mut self, attrs: QpAttributes) -> Result<usize, ControlError> {
        if attrs.qpn == 0 || attrs.qpn & !QPN_MASK != 0 {
            return Err(ControlError::InvalidQpn(attrs.qpn));
        }
        if self.index.contains_key(&attrs.qpn) {
            return Err(ControlError::QpnInUse(attrs.qpn));
        }
        let slot = self
            .slots
            .iter()
            .position(|ctx| !ctx.is_valid())
            .ok_or(ControlError::TableFull)?;
        self.slots[slot] = QpContext {
            qpn: attrs.qpn,
            state: QpState::Init,
            service: attrs.service,
        };
        self.index.insert(attrs.qpn, slot);
        self.pending.push_back((
            slot,
            AttrNotification {
                recv_psn_reset: true,
                send_psn_reset: true,
            },
        ));
        Ok(slot)
    }

    /// Resolve the occupied slot holding `qpn` and queue the matching
    /// PSN reset pulse for the next tick.
    pub fn modify(&mut self, op: ModifyOp, qpn: u32) -> Result<usize, ControlError> {
        let slot = self.lookup(qpn).ok_or(ControlError::QpNotFound(qpn))?;
        let notification = match op {
            ModifyOp::ResetRecvPsn => AttrNotification {
                recv_psn_reset: true,
                send_psn_reset: false,
            },
            ModifyOp::ResetSendPsn => AttrNotification {
                recv_psn_reset: false,
                send_psn_reset: true,
            },
        };
        self.pending.push_back((slot, notification));
        Ok(slot)
    }

    /// Vacate the slot holding `qpn`. No datapath calls this; it is the
    /// teardown entry point for the surrounding system.
    pub fn destroy(&mut self, qpn: u32) -> Result<usize, ControlError> {
        let slot = self
            .index
            .remove(&qpn)
            .ok_or(ControlError::QpNotFound(qpn))?;
        self.slots[slot] = QpContext::vacant();
        Ok(slot)
    }

    /// Overwrite a slot's state immediately. State changes never race
    /// with slot selection, which acted on the snapshot value at the
    /// start of the step. An out-of-range slot is ignored.
    pub fn apply_state_change(&mut self, slot: usize, state: QpState) {
        let Some(ctx) = self.slots.get_mut(slot) else {
            return;
        };
        ctx.state = state;
        if state == QpState::Reset {
            self.index.remove(&ctx.qpn);
        }
    }

    /// Stage 2 of the create/modify pipeline: drain the pulses queued
    /// by earlier requests. Each pulse is delivered exactly once.
    pub fn tick(&mut self) -> Vec<(usize, AttrNotification)> {
        self.pending.drain(..).collect()
    }
}
