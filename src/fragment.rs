//! In-memory record of one received response fragment, per spec.md §3.
//!
//! Named and shaped after `Mode6Packet` in `packet.py`, but split out of the
//! wire codec since only `get_response` needs to reason about retained
//! fragments (offset/end bookkeeping, sort order).

use crate::codec::Header;

/// One received datagram's contribution to a logical Mode 6 response.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Fragment {
    pub fn new(header: Header, payload: Vec<u8>) -> Self {
        Fragment { header, payload }
    }

    pub fn offset(&self) -> usize {
        self.header.offset as usize
    }

    pub fn count(&self) -> usize {
        self.header.count as usize
    }

    /// Byte offset one past the end of this fragment's payload.
    pub fn end(&self) -> usize {
        self.offset() + self.count()
    }

    pub fn more(&self) -> bool {
        self.header.more()
    }

    /// One-line summary for the "received fragments" debug dump on timeout.
    pub fn stats(&self) -> String {
        format!("{:5} {:5}\t{:3} octets", self.offset(), self.end(), self.count())
    }
}
