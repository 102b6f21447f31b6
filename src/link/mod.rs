use std::time::{Duration, Instant};

use bitflags::bitflags;

mod frame;
mod machine;
mod port;
mod queue;

pub use frame::*;
pub use machine::*;
pub use port::*;
pub use queue::*;

/// Ethernet protocol ids carried by link frames.
pub const ETH_P_ECLP: u16 = 0xEAC0; // link protocol (atomic)
pub const ETH_P_ECLD: u16 = 0xEAC1; // link discovery
pub const ETH_P_ECLL: u16 = 0xEAC2; // link local delivery

/// Low byte of the control word selects the opcode; bits 8-14 are a
/// test-injection field that travels untouched; the MSB is reserved.
pub const MSG_TYPE_MASK: u16 = 0x00ff;
pub const MSG_TEST_MASK: u16 = 0x7f00;

/// seqno field of an outbound HELLO.
pub const HELLO_MAGIC: u32 = 0;

/// HELLO frames tolerated in WAIT before discovery is rerun.
pub const WAIT_HELLO_MAX: u32 = 10;

pub const AIT_QUEUE_DEPTH: usize = 32;
pub const TX_HOLD_DEPTH: usize = 256;

/// Payload bound of one queued atomic message.
pub const MAX_AIT_MESSAGE_SIZE: usize = 256;

/// Upper bound of any frame on the wire, jumbo included.
pub const EC_MESSAGE_MAX: usize = 9000;

/// 48-bit link endpoint identity, split (hi:16, lo:32) the way it rides in
/// a MAC address. Derived `Ord` is the lexicographic order used to break
/// symmetry at HELLO: the greater address becomes master.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkAddr {
    pub hi: u16,
    pub lo: u32,
}

impl LinkAddr {
    pub fn new(hi: u16, lo: u32) -> Self {
        LinkAddr { hi, lo }
    }

    pub fn from_mac(mac: [u8; 6]) -> Self {
        LinkAddr {
            hi: u16::from_be_bytes([mac[0], mac[1]]),
            lo: u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]]),
        }
    }

    pub fn to_mac(self) -> [u8; 6] {
        let hi = self.hi.to_be_bytes();
        let lo = self.lo.to_be_bytes();
        [hi[0], hi[1], lo[0], lo[1], lo[2], lo[3]]
    }
}

impl std::fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:08x}", self.hi, self.lo)
    }
}

/// Link message opcodes, decoded from the low byte of the control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Hello,
    Event,
    Nop,
    Ait,
    Ack,
}

impl MsgType {
    pub fn from_raw(msg_raw: u16) -> Option<Self> {
        match msg_raw & MSG_TYPE_MASK {
            0x0000 => Some(MsgType::Hello),
            0x0001 => Some(MsgType::Event),
            0x0002 => Some(MsgType::Nop),
            0x0003 => Some(MsgType::Ait),
            0x0004 => Some(MsgType::Ack),
            _ => None,
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            MsgType::Hello => 0x0000,
            MsgType::Event => 0x0001,
            MsgType::Nop => 0x0002,
            MsgType::Ait => 0x0003,
            MsgType::Ack => 0x0004,
        }
    }
}

bitflags! {
    /// What the dispatch layer owes after an entry point returns.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Action: u16 {
        /// Transmit the prescribed control frame.
        const SEND = 0x0001;
        /// Attach the head of the send queue (peek, never pop).
        const SEND_AIT = 0x0002;
        /// The received frame carried an atomic payload; it has been stashed.
        const PROC_AIT = 0x0004;
        /// An atomic message crossed the link; notify the upper layer.
        const SIG_AIT = 0x0008;
        /// One pending data frame may piggyback on this slot.
        const SEND_DAT = 0x0010;
        /// An error is latched; notify the upper layer.
        const SIG_ERR = 0x0020;
        /// A protocol error was latched by this very call.
        const ERROR = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ErrorFlag: u16 {
        const SEQUENCE = 0x0001;
        const LINKDOWN = 0x0002;
        const TIMEOUT = 0x0004;
        const SAME_ADDRESS = 0x0008;
        const UNKNOWN_CMD = 0x0010;
        const UNKNOWN_STATE = 0x0020;
        const UNEXPECTED_LU = 0x0040;
        const FATAL = 0x8000;
    }
}

impl ErrorFlag {
    /// SAME_ADDRESS and FATAL never auto-recover.
    pub fn is_fatal(self) -> bool {
        self.intersects(ErrorFlag::SAME_ADDRESS | ErrorFlag::FATAL)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Idle,
    Hello,
    Wait,
    Send,
    Receive,
    Am,
    Bm,
    Ah,
    Bh,
    Error,
}

/// Duration between SEND <-> RECEIVE transitions, tracked for diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntervalStats {
    pub last: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl IntervalStats {
    pub(crate) fn record(&mut self, elapsed: Duration) {
        self.last = elapsed;
        if elapsed > self.max {
            self.max = elapsed;
        }
        if self.min.is_zero() || elapsed < self.min {
            self.min = elapsed;
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = IntervalStats::default();
    }
}

/// Point-in-time copy of one side of a link, current or first-error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StateSnapshot {
    pub state: LinkState,
    pub i_know: u32,
    pub i_sent: u32,
    pub send_next: u32,
    pub error_flag: ErrorFlag,
    pub p_error_flag: ErrorFlag,
    pub error_count: u32,
    pub update_time: Option<Instant>,
    pub error_time: Option<Instant>,
    pub intervals: IntervalStats,
}

/// One atomic message as queued on either side of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AitFrame {
    data: Vec<u8>,
}

impl AitFrame {
    pub fn new(data: Vec<u8>) -> Result<Self, crate::Error> {
        if data.len() > MAX_AIT_MESSAGE_SIZE {
            return Err(crate::Error::OversizeMessage(data.len()));
        }
        Ok(AitFrame { data })
    }

    pub fn message_len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// What to put on the wire, handed back by the send-side entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prescription {
    pub msg_raw: u16,
    pub seqno: u32,
    pub action: Action,
}

impl Prescription {
    pub(crate) fn nop() -> Self {
        Prescription {
            msg_raw: MsgType::Nop.raw(),
            seqno: 0,
            action: Action::empty(),
        }
    }

    pub(crate) fn send(msg: MsgType, seqno: u32, action: Action) -> Self {
        Prescription {
            msg_raw: msg.raw(),
            seqno,
            action,
        }
    }
}
