//! Hex + printable-ASCII packet dump, per spec.md §6 ("At debug level ≥ 3 it
//! dumps packets as a hex + printable-ASCII grid, 16 bytes per row").
//!
//! Grounded in `packet.py::dump_hex_printable`; emitted through `log`
//! instead of writing straight to stdout, since the sink is an injected
//! collaborator here (spec.md §1).

/// Render `data` as 16-bytes-per-row hex followed by the printable-ASCII
/// rendition of that row, one `trace!`-level log line per row.
pub fn dump_hex_printable(data: &[u8]) {
    for row in data.chunks(16) {
        let mut hex = String::with_capacity(16 * 3);
        for b in row {
            hex.push_str(&format!("{b:02x} "));
        }
        for _ in row.len()..16 {
            hex.push_str("   ");
        }
        let ascii: String = row
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        log::trace!("{hex}{ascii}");
    }
}
