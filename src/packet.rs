//! RoCEv2 base transport header (BTH) model.
//!
//! Only the fields the admission path consumes are modeled: the opcode
//! byte (service class in the top 3 bits, operation in the low 5), the
//! destination QPN, and the PSN. Everything else rides along as opaque
//! payload bytes.

use serde::{Deserialize, Serialize};

/// QPN is 24 bits on the wire.
pub const QPN_MASK: u32 = 0x00ff_ffff;
/// PSN is 24 bits on the wire.
pub const PSN_MASK: u32 = 0x00ff_ffff;

/// Transport service class, encoded in the top 3 bits of the BTH opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceClass {
    /// Reliable Connection.
    RC,
    /// Unreliable Connection.
    UC,
    /// Reliable Datagram.
    RD,
    /// Unreliable Datagram.
    UD,
}

impl ServiceClass {
    /// Whether this engine accepts packets of this class at all.
    /// RD is recognized on the wire but not serviced.
    #[inline]
    pub fn is_supported(self) -> bool {
        !matches!(self, ServiceClass::RD)
    }
}

mod op {
    pub const SEND_FIRST: u8 = 0x00;
    pub const SEND_ONLY: u8 = 0x04;
    pub const SEND_ONLY_WITH_IMMEDIATE: u8 = 0x05;
    pub const RDMA_WRITE_FIRST: u8 = 0x06;
    pub const RDMA_WRITE_ONLY_WITH_IMMEDIATE: u8 = 0x0b;
    pub const RDMA_READ_REQUEST: u8 = 0x0c;
    pub const RDMA_READ_RESPONSE_FIRST: u8 = 0x0d;
    pub const ATOMIC_ACKNOWLEDGE: u8 = 0x12;
    pub const FETCH_ADD: u8 = 0x14;
}

/// The raw BTH opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Opcode(pub u8);

impl Opcode {
    /// Decode the service class bits. Reserved patterns (manycast, CNP)
    /// yield `None`.
    pub fn service_class(self) -> Option<ServiceClass> {
        match self.0 >> 5 {
            0b000 => Some(ServiceClass::RC),
            0b001 => Some(ServiceClass::UC),
            0b010 => Some(ServiceClass::RD),
            0b011 => Some(ServiceClass::UD),
            _ => None,
        }
    }

    /// The low 5 operation bits.
    #[inline]
    pub fn operation(self) -> u8 {
        self.0 & 0x1f
    }

    /// Whether the operation bits name a defined operation for the
    /// packet's service class.
    pub fn is_valid(self) -> bool {
        let op = self.operation();
        match self.service_class() {
            Some(ServiceClass::RC) => op <= op::FETCH_ADD,
            // UC defines sends and writes only.
            Some(ServiceClass::UC) => op <= op::RDMA_WRITE_ONLY_WITH_IMMEDIATE,
            // UD is single-packet sends only.
            Some(ServiceClass::UD) => {
                op == op::SEND_ONLY || op == op::SEND_ONLY_WITH_IMMEDIATE
            }
            Some(ServiceClass::RD) => false,
            None => false,
        }
    }

    /// Responder-to-requester traffic: read responses and acknowledges.
    pub fn is_response(self) -> bool {
        matches!(self.service_class(), Some(ServiceClass::RC))
            && (op::RDMA_READ_RESPONSE_FIRST..=op::ATOMIC_ACKNOWLEDGE)
                .contains(&self.operation())
    }

    /// Requester-to-responder traffic: sends, writes, read/atomic requests.
    #[inline]
    pub fn is_request(self) -> bool {
        self.is_valid() && !self.is_response()
    }
}

/// Header fields consumed by admission control and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub opcode: Opcode,
    pub dqpn: u32,
    pub psn: u32,
}

impl PacketHeader {
    pub fn new(opcode: u8, dqpn: u32, psn: u32) -> Self {
        PacketHeader {
            opcode: Opcode(opcode),
            dqpn: dqpn & QPN_MASK,
            psn: psn & PSN_MASK,
        }
    }
}

/// A transport packet: parsed header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(header: PacketHeader, payload: Vec<u8>) -> Self {
        Packet { header, payload }
    }
}

/// Convenience constructors for the opcodes used throughout the crate.
impl Opcode {
    pub const RC_SEND_ONLY: Opcode = Opcode(op::SEND_ONLY);
    pub const RC_SEND_FIRST: Opcode = Opcode(op::SEND_FIRST);
    pub const RC_RDMA_WRITE_FIRST: Opcode = Opcode(op::RDMA_WRITE_FIRST);
    pub const RC_RDMA_READ_REQUEST: Opcode = Opcode(op::RDMA_READ_REQUEST);
    pub const RC_RDMA_READ_RESPONSE_FIRST: Opcode = Opcode(op::RDMA_READ_RESPONSE_FIRST);
    pub const RC_ACKNOWLEDGE: Opcode = Opcode(0x11);
    pub const UC_SEND_ONLY: Opcode = Opcode(0x20 | op::SEND_ONLY);
    pub const UD_SEND_ONLY: Opcode = Opcode(0x60 | op::SEND_ONLY);
}
