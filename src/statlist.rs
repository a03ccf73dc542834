//! Status-list parser and the `Peer` type, per spec.md §4.3 (`read_stat`).
//!
//! Grounded in `packet.py::Peer` and `Mode6Session.readstat`: a response
//! body is a flat run of 4-byte `(associd: u16, status: u16)` records.

use crate::error::{Error, Result};
use crate::varlist::VarMap;

/// One NTP association's status, identified by its association id, with a
/// lazily-populated variable mapping (spec.md §3 "Peer"). Identity is the
/// association id alone — `Peer::eq` matching `packet.py::Peer`, whose
/// `associd` is the only thing tying a status record to a later
/// `readvars()` call.
#[derive(Debug, Clone)]
pub struct Peer {
    pub associd: u16,
    pub status: u16,
    pub variables: Option<VarMap>,
}

impl Peer {
    pub fn new(associd: u16, status: u16) -> Self {
        Peer {
            associd,
            status,
            variables: None,
        }
    }
}

/// Identity is the association id alone (spec.md §3 "Peer ... Identity =
/// association id"), so a peer populated by `read_peer_vars` still compares
/// equal to its pre-`readvars` counterpart.
impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.associd == other.associd
    }
}

impl Eq for Peer {}

/// Parse a `READSTAT` response body into a list of `Peer`s sorted ascending
/// by association id.
pub fn parse_stat_list(raw: &[u8]) -> Result<Vec<Peer>> {
    if raw.len() % 4 != 0 {
        return Err(Error::BadLength);
    }
    let mut peers: Vec<Peer> = raw
        .chunks_exact(4)
        .map(|chunk| {
            let associd = u16::from_be_bytes([chunk[0], chunk[1]]);
            let status = u16::from_be_bytes([chunk[2], chunk[3]]);
            Peer::new(associd, status)
        })
        .collect();
    peers.sort_by_key(|p| p.associd);
    Ok(peers)
}
