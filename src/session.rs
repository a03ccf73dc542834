//! Session: configuration, mutable query state, and the request/response
//! engine. This is the entry point described in spec.md §3–§4; grounded,
//! sub-step for sub-step, in `packet.py::Mode6Session` (`sendrequest`,
//! `getresponse`, `doquery`, `readstat`, `readvar`).

use std::time::Duration;

use log::{debug, trace, warn};

use crate::codec;
use crate::constants::{
    CTL_MAX_DATA_LEN, CTL_OP_READSTAT, CTL_OP_READVAR, MAXFRAGS, MODE_CONTROL, NTP_OLDVERSION,
    NTP_VERSION,
};
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::hexdump::dump_hex_printable;
use crate::statlist::{parse_stat_list, Peer};
use crate::transport::{AddressFamily, UdpTransport};
use crate::varlist::{parse_variables, VarMap};

/// Configuration fields from spec.md §3/§6. Plain `Default`-able struct,
/// deliberately not a config-file layer — nothing here calls for one (see
/// SPEC_FULL.md §2).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub debug: u8,
    pub ai_family: AddressFamily,
    pub primary_timeout: Duration,
    pub secondary_timeout: Duration,
    pub pktversion: u8,
    pub always_auth: bool,
    pub keyid: Option<u32>,
    pub password: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            debug: 0,
            ai_family: AddressFamily::Unspecified,
            primary_timeout: Duration::from_secs(5),
            secondary_timeout: Duration::from_secs(3),
            pktversion: NTP_OLDVERSION + 1,
            always_auth: false,
            keyid: None,
            password: None,
        }
    }
}

/// Outcome of one `get_response` call, before `do_query`'s retry policy and
/// server-error-code classification are applied.
#[derive(Debug)]
enum Outcome {
    /// The logical response was fully reassembled; it's in `Session::response`.
    Success,
    /// The response carried the error flag; this is the raw status high byte.
    ServerError(u8),
    /// The caller asked us not to report timeouts (silent first attempt of a
    /// retry); the outer `do_query` loop should retry.
    RetryNeeded,
}

/// A session to a single NTP Mode 6 host. Not safe for concurrent use —
/// one session is driven by at most one caller at a time (spec.md §1, §5).
pub struct Session {
    pub config: SessionConfig,
    transport: Option<UdpTransport>,
    sequence: u16,
    response: Vec<u8>,
    rstatus: u16,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            config: SessionConfig::default(),
            transport: None,
            sequence: 0,
            response: Vec::new(),
            rstatus: 0,
        }
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Session {
            config,
            transport: None,
            sequence: 0,
            response: Vec::new(),
            rstatus: 0,
        }
    }

    /// Last reassembled response payload, deposited by `do_query`.
    pub fn response(&self) -> &[u8] {
        &self.response
    }

    /// Status word of the last (terminal) fragment of the last response.
    pub fn rstatus(&self) -> u16 {
        self.rstatus
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn have_host(&self) -> bool {
        self.transport.is_some()
    }

    /// Set the debug verbosity used to gate the extra diagnostics in
    /// `get_response` and the hex-dump packet logging (spec.md §6).
    pub fn debug_level(&mut self, level: u8) {
        self.config.debug = level;
    }

    /// Bind the session to a server, per spec.md §4.2.
    pub fn open_host(&mut self, host: &str) -> Result<()> {
        let transport = UdpTransport::open(host, self.config.ai_family)?;
        if self.config.debug > 2 {
            debug!("Opening host {}", transport.canonical_host());
        }
        self.transport = Some(transport);
        Ok(())
    }

    /// Release the socket. Idempotent.
    pub fn close(&mut self) {
        self.transport = None;
    }

    /// Ship an ntpq request packet to the server, per spec.md §4.3 "Request side".
    fn send_request(&mut self, opcode: u8, associd: u16, payload: &[u8], auth: bool) -> Result<()> {
        if payload.len() > CTL_MAX_DATA_LEN {
            return Err(Error::InternalTooLong(payload.len(), CTL_MAX_DATA_LEN));
        }

        self.sequence = self.sequence.wrapping_add(1);

        if auth || self.config.always_auth {
            warn!("Authenticated send is not yet implemented");
            return Err(Error::NotImplemented);
        }

        let transport = self.transport.as_ref().ok_or(Error::NoHost)?;
        let packet = codec::encode_request(
            self.config.pktversion,
            MODE_CONTROL,
            opcode,
            self.sequence,
            0,
            associd,
            0,
            payload,
        )?;
        if self.config.debug >= 4 {
            debug!("Request packet:");
            dump_hex_printable(&packet);
        }
        transport.send(&packet)
    }

    /// Gather, validate, and reassemble fragments into one logical response.
    /// Response side of spec.md §4.3; see that section for the step-by-step
    /// contract this function implements.
    fn get_response(&mut self, expected_opcode: u8, expected_associd: u16, report_timeouts: bool) -> Result<Outcome> {
        let transport = self.transport.as_ref().ok_or(Error::NoHost)?;

        let mut fragments: Vec<Fragment> = Vec::new();
        let mut seen_last_frag = false;
        let mut bail: usize = 0;

        loop {
            bail += 1;
            if bail >= 2 * MAXFRAGS {
                warn!("too many packets in response; bailing out");
                return Err(Error::TooMuch);
            }

            let timeout = if fragments.is_empty() {
                self.config.primary_timeout
            } else {
                self.config.secondary_timeout
            };

            let datagram = match transport.recv(timeout)? {
                Some(d) => d,
                None => {
                    if fragments.is_empty() {
                        if report_timeouts {
                            warn!("timed out, nothing received");
                            return Err(Error::Timeout);
                        }
                        return Ok(Outcome::RetryNeeded);
                    }
                    if report_timeouts {
                        warn!("timed out with incomplete data");
                        if self.config.debug > 0 {
                            debug!("ERR_INCOMPLETE: Received fragments:");
                            for (i, frag) in fragments.iter().enumerate() {
                                debug!("{}: {}", i + 1, frag.stats());
                            }
                            debug!(
                                "last fragment {}received",
                                if seen_last_frag { "" } else { "not " }
                            );
                        }
                        return Err(Error::Incomplete);
                    }
                    return Ok(Outcome::RetryNeeded);
                }
            };
            trace!("Received {} octets", datagram.len());

            let (header, payload) = match codec::decode_header(&datagram) {
                Ok(x) => x,
                Err(_) => {
                    warn!("packet analysis failed");
                    return Err(Error::Unspec(0));
                }
            };

            if header.version() > NTP_VERSION || header.version() < NTP_OLDVERSION {
                debug!("Packet received with version {}", header.version());
                continue;
            }
            if header.mode() != MODE_CONTROL {
                debug!("Packet received with mode {}", header.mode());
                continue;
            }
            if header.sequence != self.sequence {
                debug!("Received sequence number {}, wanted {}", header.sequence, self.sequence);
                continue;
            }
            if header.opcode() != expected_opcode {
                debug!("Received opcode {}, wanted {}", header.opcode(), expected_opcode);
                continue;
            }

            if header.is_error() {
                if header.more() {
                    warn!("Error {} received on non-final packet", header.error_code());
                }
                return Ok(Outcome::ServerError(header.error_code()));
            }

            if header.associd != expected_associd {
                warn!(
                    "Association ID {} doesn't match expected {}",
                    header.associd, expected_associd
                );
            }

            if header.count == 0 && header.more() {
                warn!("Received count of 0 in non-final fragment");
                continue;
            }

            if seen_last_frag && header.more() {
                warn!("Received second last fragment packet");
                continue;
            }

            let offset = header.offset as usize;
            let new_end = offset + header.count as usize;

            if let Some(dup) = fragments.iter().find(|f| f.offset() == offset) {
                warn!(
                    "duplicate {} octets at {} ignored, prior {} at {}",
                    header.count,
                    offset,
                    dup.count(),
                    dup.offset()
                );
                continue;
            }

            if let Some(last) = fragments.last() {
                if last.end() > offset {
                    warn!(
                        "received frag at {} overlaps with {} octet frag at {}",
                        offset,
                        last.count(),
                        last.offset()
                    );
                    continue;
                }
            }

            if let Some(not_earlier) = fragments.iter().find(|f| f.offset() >= offset) {
                if new_end > not_earlier.offset() {
                    warn!(
                        "received {} octet frag at {} overlaps with frag at {}",
                        header.count,
                        offset,
                        not_earlier.offset()
                    );
                    continue;
                }
            }

            fragments.push(Fragment::new(header, payload.to_vec()));
            fragments.sort_by_key(|f| f.offset());

            if !header.more() {
                seen_last_frag = true;
                self.rstatus = header.status;
            }

            if seen_last_frag && fragments[0].offset() == 0 {
                let has_gap = fragments.windows(2).any(|w| w[0].end() != w[1].offset());
                if !has_gap {
                    self.response = fragments.iter().flat_map(|f| f.payload.clone()).collect();
                    if self.config.debug >= 4 {
                        debug!("Response packet:");
                        dump_hex_printable(&self.response);
                    }
                    return Ok(Outcome::Success);
                }
            }
        }
    }

    /// Send a request and retrieve its response, retrying once on a silent
    /// `Timeout`/`Incomplete`, per spec.md §4.3 "Retry policy". Returns the
    /// server's raw error-code byte (0 on data success) or a failure kind.
    pub fn do_query(&mut self, opcode: u8, associd: u16, payload: &[u8], auth: bool) -> Result<u8> {
        if !self.have_host() {
            return Err(Error::NoHost);
        }

        let mut retry_available = true;
        loop {
            self.send_request(opcode, associd, payload, auth)?;

            match self.get_response(opcode, associd, !retry_available)? {
                Outcome::Success => return Ok(0),
                Outcome::ServerError(code) => return Ok(code),
                Outcome::RetryNeeded => {
                    if retry_available {
                        retry_available = false;
                        continue;
                    }
                    // get_response only returns RetryNeeded when timeouts are
                    // suppressed, and we suppress them only on the very first
                    // attempt (report_timeouts = !retry_available).
                    unreachable!("get_response reported RetryNeeded on a reporting attempt");
                }
            }
        }
    }

    /// Association-status list, per spec.md §4.3 `read_stat`.
    pub fn read_stat(&mut self, associd: u16) -> Result<Vec<Peer>> {
        let code = self.do_query(CTL_OP_READSTAT, associd, &[], false)?;
        if let Some(err) = Error::from_server_code(code, associd) {
            return Err(err);
        }
        parse_stat_list(&self.response)
    }

    /// Textual variable mapping, per spec.md §4.3 `read_var`. `varlist`
    /// empty means "no variable list" (full query); `opcode` defaults to
    /// `CTL_OP_READVAR` via [`Session::read_var`].
    pub fn read_var_opcode(&mut self, associd: u16, varlist: &[&str], opcode: u8) -> Result<VarMap> {
        let payload = varlist.join(",").into_bytes();
        let code = self.do_query(opcode, associd, &payload, false)?;
        if let Some(err) = Error::from_server_code(code, associd) {
            return Err(err);
        }
        Ok(parse_variables(&self.response))
    }

    pub fn read_var(&mut self, associd: u16, varlist: &[&str]) -> Result<VarMap> {
        self.read_var_opcode(associd, varlist, CTL_OP_READVAR)
    }

    /// Populate a `Peer`'s lazily-fetched variable mapping, per spec.md §3
    /// ("Peer: ... lazily populated variable mapping"), grounded in
    /// `packet.py::Peer.readvars`.
    pub fn read_peer_vars(&mut self, peer: &mut Peer) -> Result<()> {
        let vars = self.read_var(peer.associd, &[])?;
        peer.variables = Some(vars);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varlist::Value;
    use std::net::UdpSocket;
    use std::thread;

    /// Build a raw Mode 6 response datagram with arbitrary response/more/
    /// error bits — the codec's `encode_request` always clears them, since
    /// it only ever builds requests, so scripted test servers need their
    /// own minimal encoder.
    fn raw_response(r_m_e_op: u8, sequence: u16, status: u16, associd: u16, offset: u16, payload: &[u8]) -> Vec<u8> {
        let li_vn_mode = (NTP_VERSION & 7) << 3 | (MODE_CONTROL & 7);
        let mut out = Vec::new();
        out.push(li_vn_mode);
        out.push(r_m_e_op);
        out.extend_from_slice(&sequence.to_be_bytes());
        out.extend_from_slice(&status.to_be_bytes());
        out.extend_from_slice(&associd.to_be_bytes());
        out.extend_from_slice(&offset.to_be_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(payload);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    fn test_session(addr: &str) -> Session {
        let mut session = Session::with_config(SessionConfig {
            primary_timeout: Duration::from_millis(200),
            secondary_timeout: Duration::from_millis(200),
            ..SessionConfig::default()
        });
        session.open_host(addr).unwrap();
        session
    }

    const RESPONSE: u8 = 0x80;
    const MORE: u8 = 0x20;
    const ERROR: u8 = 0x40;

    #[test]
    fn single_fragment_readvar() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (len, from) = server.recv_from(&mut buf).unwrap();
            let (header, _) = codec::decode_header(&buf[..len]).unwrap();
            let pkt = raw_response(RESPONSE | CTL_OP_READVAR, header.sequence, 0, 0, 0, b"version=ntpd");
            server.send_to(&pkt, from).unwrap();
        });

        let mut session = test_session(&addr.to_string());
        let vars = session.read_var(0, &[]).unwrap();
        assert_eq!(session.response(), b"version=ntpd");
        assert_eq!(vars.get("version"), Some(&Value::Str("ntpd".to_string())));
    }

    #[test]
    fn three_fragment_reassembly_in_order() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (len, from) = server.recv_from(&mut buf).unwrap();
            let (header, _) = codec::decode_header(&buf[..len]).unwrap();
            let seq = header.sequence;
            let opcode = RESPONSE | CTL_OP_READVAR;
            let frags = [
                raw_response(opcode | MORE, seq, 0, 0, 0, &[b'a'; 16]),
                raw_response(opcode | MORE, seq, 0, 0, 16, &[b'b'; 16]),
                raw_response(opcode, seq, 0xABCD, 0, 32, &[b'c'; 8]),
            ];
            for f in frags {
                server.send_to(&f, from).unwrap();
            }
        });

        let mut session = test_session(&addr.to_string());
        let code = session.do_query(CTL_OP_READVAR, 0, &[], false).unwrap();
        assert_eq!(code, 0);
        assert_eq!(session.response().len(), 40);
        assert_eq!(session.rstatus(), 0xABCD);
    }

    #[test]
    fn three_fragment_reassembly_out_of_order() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (len, from) = server.recv_from(&mut buf).unwrap();
            let (header, _) = codec::decode_header(&buf[..len]).unwrap();
            let seq = header.sequence;
            let opcode = RESPONSE | CTL_OP_READVAR;
            let frag0 = raw_response(opcode | MORE, seq, 0, 0, 0, &[b'a'; 16]);
            let frag1 = raw_response(opcode | MORE, seq, 0, 0, 16, &[b'b'; 16]);
            let frag2 = raw_response(opcode, seq, 0, 0, 32, &[b'c'; 8]);
            for f in [&frag1, &frag0, &frag2] {
                server.send_to(f, from).unwrap();
            }
        });

        let mut session = test_session(&addr.to_string());
        let code = session.do_query(CTL_OP_READVAR, 0, &[], false).unwrap();
        assert_eq!(code, 0);
        assert_eq!(session.response().len(), 40);
    }

    #[test]
    fn duplicate_fragment_is_ignored() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (len, from) = server.recv_from(&mut buf).unwrap();
            let (header, _) = codec::decode_header(&buf[..len]).unwrap();
            let seq = header.sequence;
            let opcode = RESPONSE | CTL_OP_READVAR;
            let frag0 = raw_response(opcode | MORE, seq, 0, 0, 0, &[b'a'; 16]);
            let frag0_dup = frag0.clone();
            let frag1 = raw_response(opcode, seq, 0, 0, 16, &[b'b'; 4]);
            for f in [&frag0, &frag0_dup, &frag1] {
                server.send_to(f, from).unwrap();
            }
        });

        let mut session = test_session(&addr.to_string());
        let code = session.do_query(CTL_OP_READVAR, 0, &[], false).unwrap();
        assert_eq!(code, 0);
        assert_eq!(session.response().len(), 20);
    }

    #[test]
    fn timeout_then_retry_succeeds() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 1024];
            // First request: drop it silently, forcing the engine's timeout path.
            server.recv_from(&mut buf).unwrap();
            // Retry request: answer it in full.
            let (len, from) = server.recv_from(&mut buf).unwrap();
            let (header, _) = codec::decode_header(&buf[..len]).unwrap();
            let pkt = raw_response(RESPONSE | CTL_OP_READVAR, header.sequence, 0, 0, 0, b"x=1");
            server.send_to(&pkt, from).unwrap();
        });

        let mut session = test_session(&addr.to_string());
        let code = session.do_query(CTL_OP_READVAR, 0, &[], false).unwrap();
        assert_eq!(code, 0);
        assert_eq!(session.response(), b"x=1");
    }

    #[test]
    fn server_error_response() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (len, from) = server.recv_from(&mut buf).unwrap();
            let (header, _) = codec::decode_header(&buf[..len]).unwrap();
            let status = (2u16) << 8;
            let pkt = raw_response(RESPONSE | ERROR | CTL_OP_READVAR, header.sequence, status, 0, 0, &[]);
            server.send_to(&pkt, from).unwrap();
        });

        let mut session = test_session(&addr.to_string());
        let code = session.do_query(CTL_OP_READVAR, 0, &[], false).unwrap();
        assert_eq!(code, 2);

        // And through the read_var wrapper, the code maps to a symbolic kind.
        let server2 = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr2 = server2.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (len, from) = server2.recv_from(&mut buf).unwrap();
            let (header, _) = codec::decode_header(&buf[..len]).unwrap();
            let status = (2u16) << 8;
            let pkt = raw_response(RESPONSE | ERROR | CTL_OP_READVAR, header.sequence, status, 0, 0, &[]);
            server2.send_to(&pkt, from).unwrap();
        });
        let mut session2 = test_session(&addr2.to_string());
        let err = session2.read_var(0, &[]).unwrap_err();
        assert!(matches!(err, Error::BadFormat));
    }

    #[test]
    fn read_stat_odd_length_fails() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (len, from) = server.recv_from(&mut buf).unwrap();
            let (header, _) = codec::decode_header(&buf[..len]).unwrap();
            let pkt = raw_response(RESPONSE | CTL_OP_READSTAT, header.sequence, 0, 0, 0, &[0u8; 10]);
            server.send_to(&pkt, from).unwrap();
        });

        let mut session = test_session(&addr.to_string());
        let err = session.read_stat(0).unwrap_err();
        assert!(matches!(err, Error::BadLength));
    }

    #[test]
    fn authenticated_send_is_refused() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let mut session = test_session(&addr.to_string());
        let err = session.do_query(CTL_OP_READVAR, 0, &[], true).unwrap_err();
        assert!(matches!(err, Error::NotImplemented));
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let mut session = test_session(&addr.to_string());
        let first = session.sequence();
        // send_request always advances sequence, even when the auth check
        // later refuses the send (spec.md §4.3 steps 2-3).
        let _ = session.do_query(CTL_OP_READVAR, 0, &[], true);
        let second = session.sequence();
        let _ = session.do_query(CTL_OP_READVAR, 0, &[], true);
        let third = session.sequence();
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn query_without_host_fails() {
        let mut session = Session::new();
        let err = session.do_query(CTL_OP_READVAR, 0, &[], false).unwrap_err();
        assert!(matches!(err, Error::NoHost));
    }
}
