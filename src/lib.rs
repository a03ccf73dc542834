//! Client-side core of an NTP Mode 6 control-protocol library.
//!
//! This crate is the request/response engine an interactive `ntpq`-style
//! front end drives: packet framing, multi-fragment reassembly,
//! sequencing, error classification, retry policy, and the variable-list /
//! status-list parsers. It does not implement the CLI itself, keyed-MAC
//! authentication, or the NTP time-synchronization modes — see spec.md /
//! SPEC_FULL.md §1 for the exact boundary.

pub mod codec;
pub mod constants;
pub mod error;
pub mod fragment;
mod hexdump;
pub mod session;
pub mod statlist;
pub mod transport;
pub mod varlist;

pub use error::{Error, Result};
pub use session::{Session, SessionConfig};
pub use statlist::Peer;
pub use transport::AddressFamily;
pub use varlist::{Value, VarMap};
