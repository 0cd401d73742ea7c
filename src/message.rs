//! Messages exchanged over the engine's datapath and control channels.

use crate::qp::QpAttributes;

/// Control-plane request into the connection table. Side effects only,
/// no response value travels back on this channel.
#[derive(Debug, Clone, Copy)]
pub enum ControlRequest {
    Create(QpAttributes),
    ResetRecvPsn(u32),
    ResetSendPsn(u32),
    Destroy(u32),
}

/// Work request posted by the host, routed to the owning connection unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkRequest {
    pub qpn: u32,
    pub opcode: WrOpcode,
    pub descriptor: BufDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrOpcode {
    Send,
    RdmaWrite,
    RdmaRead,
}

/// Host memory range a work request operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufDescriptor {
    pub addr: u64,
    pub len: u32,
}

/// Connection-tagged request to the shared memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmaRequest {
    Read(DmaReadReq),
    Write(DmaWriteReq),
}

impl DmaRequest {
    #[inline]
    pub fn qpn(&self) -> u32 {
        match self {
            DmaRequest::Read(r) => r.qpn,
            DmaRequest::Write(w) => w.qpn,
        }
    }

    /// Reads are single-part. A write is the last part of its item iff
    /// its `last` flag is set; the arbiter must not interleave parts of
    /// one write with traffic from other connections.
    #[inline]
    pub fn is_last_fragment(&self) -> bool {
        match self {
            DmaRequest::Read(_) => true,
            DmaRequest::Write(w) => w.last,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaReadReq {
    pub qpn: u32,
    pub addr: u64,
    pub len: u32,
}

/// One chunk of a (possibly multi-part) write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaWriteReq {
    pub qpn: u32,
    pub addr: u64,
    pub data: Vec<u8>,
    pub last: bool,
}

/// Read data coming back from the memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaReadResp {
    pub qpn: u32,
    pub addr: u64,
    pub data: Vec<u8>,
}

/// Write acknowledgment coming back from the memory backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaWriteResp {
    pub qpn: u32,
    pub addr: u64,
}
