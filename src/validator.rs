//! Stateless per-packet admission filter.
//!
//! A packet passes iff its service class is supported, its opcode is
//! defined for that class, some occupied slot owns its destination QPN,
//! and that slot's state admits the opcode's direction. Anything else
//! is dropped: no error travels upstream, recovery belongs to the
//! higher-level reliability protocol. PKey checking is deferred.

use tracing::debug;

use crate::packet::PacketHeader;
use crate::qp::{QpState, TableSnapshot};

/// Why a packet was dropped. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnsupportedTransport,
    InvalidOpcode,
    UnknownDestination,
    StateDisallows(QpState),
}

pub struct HeaderValidator;

impl HeaderValidator {
    /// Decide pass/drop for one packet against the current snapshot.
    /// On pass, returns the slot index owning the destination QPN.
    pub fn check(header: &PacketHeader, snapshot: &TableSnapshot) -> Result<usize, DropReason> {
        header
            .opcode
            .service_class()
            .filter(|c| c.is_supported())
            .ok_or(DropReason::UnsupportedTransport)?;
        if !header.opcode.is_valid() {
            return Err(DropReason::InvalidOpcode);
        }
        let slot = snapshot
            .lookup(header.dqpn)
            .ok_or(DropReason::UnknownDestination)?;
        let state = snapshot.slots()[slot].state;
        let admitted = if header.opcode.is_response() {
            matches!(
                state,
                QpState::SqDrain | QpState::ReadyToReceive | QpState::SqError
            )
        } else {
            matches!(
                state,
                QpState::ReadyToSend
                    | QpState::SqDrain
                    | QpState::ReadyToReceive
                    | QpState::SqError
            )
        };
        if !admitted {
            return Err(DropReason::StateDisallows(state));
        }
        Ok(slot)
    }

    /// Check and log the drop record the observability path wants:
    /// sequence number, opcode, destination id, reason.
    pub fn admit(header: &PacketHeader, snapshot: &TableSnapshot) -> Option<usize> {
        match Self::check(header, snapshot) {
            Ok(slot) => Some(slot),
            Err(reason) => {
                debug!(
                    psn = header.psn,
                    opcode = header.opcode.0,
                    dqpn = header.dqpn,
                    ?reason,
                    "packet dropped"
                );
                None
            }
        }
    }
}
