//! Pack/unpack the 12-byte Mode 6 header, per spec.md §4.1.
//!
//! Grounded in `packet.py`'s `Packet`/`Mode6Packet` classes: the `"!BBHHHHH"`
//! struct format (big-endian, two `u8`s then five `u16`s) is the header this
//! module encodes and decodes.

use bytes::{BufMut, BytesMut};

use crate::constants::CTL_MAX_DATA_LEN;
use crate::error::{Error, Result};

/// Size in octets of the fixed Mode 6 header.
pub const HEADER_LEN: usize = 12;

/// Decoded fixed-width fields of a Mode 6 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub li_vn_mode: u8,
    pub r_m_e_op: u8,
    pub sequence: u16,
    pub status: u16,
    pub associd: u16,
    pub offset: u16,
    pub count: u16,
}

impl Header {
    pub fn version(&self) -> u8 {
        (self.li_vn_mode >> 3) & 7
    }

    pub fn mode(&self) -> u8 {
        self.li_vn_mode & 7
    }

    pub fn is_response(&self) -> bool {
        self.r_m_e_op & 0x80 != 0
    }

    pub fn is_error(&self) -> bool {
        self.r_m_e_op & 0x40 != 0
    }

    pub fn more(&self) -> bool {
        self.r_m_e_op & 0x20 != 0
    }

    pub fn opcode(&self) -> u8 {
        self.r_m_e_op & 0x1F
    }

    pub fn error_code(&self) -> u8 {
        ((self.status >> 8) & 0xFF) as u8
    }
}

/// Round `len` up to the next multiple of 4.
fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Build a wire-format Mode 6 request: header (12 bytes) + payload, padded
/// with zero bytes to a multiple of 4 octets.
///
/// `leap` is always 0 on requests (spec.md §4.1); response/more/error bits
/// are always clear on a request, so `r_m_e_op` is just the opcode.
pub fn encode_request(
    version: u8,
    mode: u8,
    opcode: u8,
    sequence: u16,
    status: u16,
    associd: u16,
    offset: u16,
    payload: &[u8],
) -> Result<Vec<u8>> {
    if payload.len() > CTL_MAX_DATA_LEN {
        return Err(Error::InternalTooLong(payload.len(), CTL_MAX_DATA_LEN));
    }

    let li_vn_mode = ((version & 7) << 3) | (mode & 7);
    let r_m_e_op = opcode & 0x1F;
    let count = payload.len() as u16;

    let total = padded_len(HEADER_LEN + payload.len());
    let mut out = BytesMut::with_capacity(total);
    out.put_u8(li_vn_mode);
    out.put_u8(r_m_e_op);
    out.put_u16(sequence);
    out.put_u16(status);
    out.put_u16(associd);
    out.put_u16(offset);
    out.put_u16(count);
    out.put_slice(payload);
    out.resize(total, 0);
    Ok(out.to_vec())
}

/// Parse the fixed header from the front of `data`, and return it along
/// with the payload slice (`data[12..12+count]`).
pub fn decode_header(data: &[u8]) -> Result<(Header, &[u8])> {
    if data.len() < HEADER_LEN {
        return Err(Error::BadFormat);
    }

    let li_vn_mode = data[0];
    let r_m_e_op = data[1];
    let sequence = u16::from_be_bytes([data[2], data[3]]);
    let status = u16::from_be_bytes([data[4], data[5]]);
    let associd = u16::from_be_bytes([data[6], data[7]]);
    let offset = u16::from_be_bytes([data[8], data[9]]);
    let count = u16::from_be_bytes([data[10], data[11]]);

    let count_usize = count as usize;
    if data.len() < HEADER_LEN + count_usize {
        return Err(Error::BadFormat);
    }

    let header = Header {
        li_vn_mode,
        r_m_e_op,
        sequence,
        status,
        associd,
        offset,
        count,
    };
    let payload = &data[HEADER_LEN..HEADER_LEN + count_usize];
    Ok((header, payload))
}
