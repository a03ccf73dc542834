//! Variable-list parser: decodes the textual payload of `READVAR`-like
//! responses into an ordered mapping of names to typed values.
//!
//! Grounded in `packet.py::Mode6Session.readvar`; see spec.md §4.3 and §9
//! for the typing precedence and the deliberate limitation around commas
//! inside quoted values.

use indexmap::IndexMap;

/// A parsed variable value: integer, floating-point, or string.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Ordered name -> value mapping, preserving first-occurrence order.
pub type VarMap = IndexMap<String, Value>;

/// Parse an integer the way Python's `int(val, 0)` does: decimal by default,
/// or `0x`/`0X` hex, `0o`/`0O` octal, `0b`/`0B` binary prefixes.
fn parse_int(s: &str) -> Option<i64> {
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()?
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        s.parse::<i64>().ok()?
    };
    Some(if neg { -value } else { value })
}

/// Classify one raw value token per spec.md §4.3 step 3: integer, then
/// float, then quoted string (stripped), then raw string.
fn parse_value(raw: &str) -> Value {
    if let Some(i) = parse_int(raw) {
        return Value::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Float(f);
    }
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Value::Str(raw[1..raw.len() - 1].to_string());
    }
    Value::Str(raw.to_string())
}

/// Parse a reassembled `READVAR`-style response body into an ordered map.
///
/// Strips trailing NUL padding and trailing whitespace first (the server
/// pads the wire payload to a 4-byte boundary with zero bytes), then splits
/// on `,` and each token on the first `=`. Commas inside quoted values are
/// not escaped by the protocol and are not treated specially here — this is
/// a known protocol limitation, not a bug in this parser.
pub fn parse_variables(raw: &[u8]) -> VarMap {
    let trimmed_nul = {
        let mut end = raw.len();
        while end > 0 && raw[end - 1] == 0 {
            end -= 1;
        }
        &raw[..end]
    };
    let text = String::from_utf8_lossy(trimmed_nul);
    let text = text.trim_end();

    let mut map = IndexMap::new();
    if text.is_empty() {
        return map;
    }

    for pair in text.split(',') {
        match pair.find('=') {
            Some(eq) => {
                let name = pair[..eq].trim().to_string();
                let value = pair[eq + 1..].trim();
                map.insert(name, parse_value(value));
            }
            None => {
                log::warn!("ill-formed item {pair:?} in response");
            }
        }
    }
    map
}
