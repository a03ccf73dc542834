//! Protocol constants from the NTP control protocol (Mode 6).
//!
//! Values match the upstream ntpd control-protocol headers referenced by
//! the Python `ntpq` implementation this crate's engine is modeled on.

/// Control-protocol mode value. Always 6 for Mode 6 (monitoring/control) packets.
pub const MODE_CONTROL: u8 = 6;

/// Oldest protocol version a response is accepted from.
pub const NTP_OLDVERSION: u8 = 1;
/// Newest protocol version a response is accepted from.
pub const NTP_VERSION: u8 = 4;

/// Maximum payload length accepted on a single Mode 6 request.
pub const CTL_MAX_DATA_LEN: usize = 468;

/// Expected maximum number of fragments making up one logical response.
pub const MAXFRAGS: usize = 32;

/// Maximum bytes read per UDP datagram.
pub const RECV_BUF_SIZE: usize = 4096;

// Opcodes (`r_m_e_op` bits 4..0 on a request).
pub const CTL_OP_UNSPEC: u8 = 0;
pub const CTL_OP_READSTAT: u8 = 1;
pub const CTL_OP_READVAR: u8 = 2;
pub const CTL_OP_WRITEVAR: u8 = 3;
pub const CTL_OP_READCLOCK: u8 = 4;
pub const CTL_OP_WRITECLOCK: u8 = 5;
pub const CTL_OP_SETTRAP: u8 = 6;
pub const CTL_OP_ASYNCMSG: u8 = 7;
pub const CTL_OP_CONFIGURE: u8 = 8;
pub const CTL_OP_SAVECONFIG: u8 = 9;
pub const CTL_OP_READ_MRU: u8 = 10;
pub const CTL_OP_READ_IFSTATS: u8 = 11;
pub const CTL_OP_IFRELOAD: u8 = 12;
pub const CTL_OP_UNSETTRAP: u8 = 31;
