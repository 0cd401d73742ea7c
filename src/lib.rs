//! Ingress/control core of a RoCEv2 transport engine.
//!
//! This crate implements the connection table and routing/arbitration
//! fabric of an RDMA-over-Converged-Ethernet transport: single-pass
//! header admission over a hostile ingress stream, a bounded pool of
//! queue pair (QP) contexts with content-addressed lookup from the
//! 24-bit QPN, and the demux/arbiter fabric binding per-connection
//! processing units to one ingress stream, one egress stream, and a
//! shared DMA backend.
//!
//! Per-connection protocol logic (retransmission, ordering, verbs
//! semantics) and the memory controller are external collaborators,
//! modeled only by their channel endpoints ([`engine::QpEndpoints`],
//! [`engine::DmaEndpoints`]).
//!
//! The crate is organized as follows:
//!
//! - [`config`]: engine configuration (`TransportConfig`)
//! - [`channel`]: ready/valid queue primitive between components
//! - [`packet`]: BTH header model (service class, opcodes, QPN, PSN)
//! - [`qp`]: QP state machine, contexts, table snapshot, notifications
//! - [`message`]: control, work-request and DMA message types
//! - [`table`]: the connection table (`ConnectionTable`)
//! - [`validator`]: per-packet admission filter (`HeaderValidator`)
//! - [`arbiter`]: round-robin arbitration with fragment locking
//! - [`router`]: content-addressed demux and arbitrated merge
//! - [`engine`]: top-level composition (`TransportEngine`)

use thiserror::Error;

pub mod arbiter;
pub mod channel;
pub mod config;
pub mod engine;
pub mod message;
pub mod packet;
pub mod qp;
pub mod router;
pub mod table;
pub mod validator;

// Re-export main types
pub use arbiter::RoundRobinArbiter;
pub use channel::{ChannelFlavor, Receiver, Sender};
pub use config::TransportConfig;
pub use engine::{DmaEndpoints, EngineHandles, QpEndpoints, Status, TransportEngine};
pub use message::{ControlRequest, DmaRequest, WorkRequest};
pub use packet::{Opcode, Packet, PacketHeader, ServiceClass};
pub use qp::{AttrNotification, QpContext, QpState, TableSnapshot};
pub use table::{ConnectionTable, ModifyOp};
pub use validator::{DropReason, HeaderValidator};

/// Control-plane failures. The engine logs and swallows these; callers
/// of [`ConnectionTable`] directly get them as values.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ControlError {
    #[error("connection table is full")]
    TableFull,
    #[error("no occupied slot holds qpn {0:#x}")]
    QpNotFound(u32),
    #[error("qpn {0:#x} is already in use")]
    QpnInUse(u32),
    #[error("qpn {0:#x} is not a valid 24-bit non-zero id")]
    InvalidQpn(u32),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DatapathError {
    #[error("Internal queue send error")]
    InternalQueueSend,
    #[error("no occupied slot matches routing key {0:#x}")]
    NoMatchingSlot(u32),
}

use crate::channel::SendError;
impl<T> From<SendError<T>> for DatapathError {
    fn from(_other: SendError<T>) -> Self {
        DatapathError::InternalQueueSend
    }
}
