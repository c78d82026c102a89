//! GS1 element strings - anchored matchers, formatting and extraction
//!
//! Every matcher is anchored at the start of its input and stops after the
//! characters it consumes, so trailing content is ignored. A word character is
//! ASCII `[A-Za-z0-9_]`.

/// Length of a GTIN-14
pub const GTIN_LEN: usize = 14;

/// Maximum length of a serial or lot payload
pub const MAX_PAYLOAD_LEN: usize = 20;

/// Prefix of an AZ code
pub const AZ_PREFIX: &str = "AZ:";

/// Exact payload length of an AZ code
pub const AZ_PAYLOAD_LEN: usize = 26;

const GTIN_AI: &str = "01";
const SERIAL_AI: &str = "21";
const LOT_AI: &str = "10";

/// Application identifier that follows the GTIN in an element string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    /// `21` - serial number (SGTIN)
    Serial,
    /// `10` - batch/lot number (LGTIN)
    Lot,
}

impl Qualifier {
    #[inline]
    pub fn ai(self) -> &'static str {
        match self {
            Qualifier::Serial => SERIAL_AI,
            Qualifier::Lot => LOT_AI,
        }
    }
}

#[inline]
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Length of the leading run of word characters, capped at `max`
#[inline]
fn word_run(s: &str, max: usize) -> usize {
    s.bytes().take(max).take_while(|&b| is_word_byte(b)).count()
}

/// Length of the leading run of ASCII digits, capped at `max`
#[inline]
fn digit_run(s: &str, max: usize) -> usize {
    s.bytes().take(max).take_while(u8::is_ascii_digit).count()
}

/// Split `<14 digits>` off the front of `s`
fn split_digits14(s: &str) -> Option<(&str, &str)> {
    if digit_run(s, GTIN_LEN) != GTIN_LEN {
        return None;
    }
    Some(s.split_at(GTIN_LEN))
}

/// Split `01<14 digits>` off the front of `s`, returning the GTIN and the rest
fn split_gtin(s: &str) -> Option<(&str, &str)> {
    split_digits14(s.strip_prefix(GTIN_AI)?)
}

/// Match `AZ:<26 word chars>` at the start of `s`, returning the matched prefix
pub fn match_az_code(s: &str) -> Option<&str> {
    let payload = s.strip_prefix(AZ_PREFIX)?;
    if word_run(payload, AZ_PAYLOAD_LEN) != AZ_PAYLOAD_LEN {
        return None;
    }
    Some(&s[..AZ_PREFIX.len() + AZ_PAYLOAD_LEN])
}

/// A matched `01<gtin><ai><payload>` element string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementMatch<'a> {
    /// The full matched prefix of the input
    pub element: &'a str,
    pub gtin: &'a str,
    pub payload: &'a str,
}

/// Match `01<14 digits><ai><1-20 word chars>` at the start of `s`
///
/// The payload is greedy: at most 20 word characters are taken and anything
/// after them is left unmatched.
pub fn match_element(s: &str, qualifier: Qualifier) -> Option<ElementMatch<'_>> {
    let (gtin, rest) = split_gtin(s)?;
    let payload_src = rest.strip_prefix(qualifier.ai())?;
    let n = word_run(payload_src, MAX_PAYLOAD_LEN);
    if n == 0 {
        return None;
    }
    let element_len = GTIN_AI.len() + GTIN_LEN + qualifier.ai().len() + n;
    Some(ElementMatch { element: &s[..element_len], gtin, payload: &payload_src[..n] })
}

/// Left-pad a GTIN with zeros to 14 digits. Longer values pass through as-is.
pub fn pad_gtin(gtin: &str) -> String {
    format!("{:0>width$}", gtin, width = GTIN_LEN)
}

/// Build an SGTIN element string: `01` + padded GTIN + `21` + serial
pub fn format_sgtin(gtin: &str, serial: &str) -> String {
    format!("{GTIN_AI}{}{SERIAL_AI}{serial}", pad_gtin(gtin))
}

/// Build an LGTIN element string: `01` + padded GTIN + `10` + lot
pub fn format_lgtin(gtin: &str, lot: &str) -> String {
    format!("{GTIN_AI}{}{LOT_AI}{lot}", pad_gtin(gtin))
}

/// GTIN of an SGTIN or LGTIN element string, if `code` starts with one
pub fn extract_gtin(code: &str) -> Option<String> {
    let (gtin, rest) = split_gtin(code)?;
    if rest.starts_with(SERIAL_AI) || rest.starts_with(LOT_AI) {
        Some(gtin.to_string())
    } else {
        None
    }
}

/// Serial of an SGTIN element string. Lot numbers are never returned.
pub fn extract_serial(code: &str) -> Option<String> {
    match_element(code, Qualifier::Serial).map(|m| m.payload.to_string())
}

/// Normalize a retail linear barcode value (EAN-8/13, UPC-A/E) to a GTIN-14
pub fn normalize_retail_gtin(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.len() > GTIN_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(pad_gtin(value))
}

/// Find a SmartLink element in a URL path
///
/// Searches every `/01/` occurrence for `/01/<14 digits>` followed by
/// `/<ai>/<1-20 word chars>` when `qualifier` is given. Returns the GTIN and
/// the payload of the first occurrence that matches.
pub fn find_path_element(path: &str, qualifier: Option<Qualifier>) -> Option<(&str, Option<&str>)> {
    const GTIN_SEGMENT: &str = "/01/";

    let mut from = 0;
    while let Some(offset) = path[from..].find(GTIN_SEGMENT) {
        let at = from + offset;
        from = at + 1;

        let Some((gtin, rest)) = split_digits14(&path[at + GTIN_SEGMENT.len()..]) else {
            continue;
        };
        let Some(qualifier) = qualifier else {
            return Some((gtin, None));
        };

        let Some(payload_src) = rest
            .strip_prefix('/')
            .and_then(|r| r.strip_prefix(qualifier.ai()))
            .and_then(|r| r.strip_prefix('/'))
        else {
            continue;
        };
        let n = word_run(payload_src, MAX_PAYLOAD_LEN);
        if n > 0 {
            return Some((gtin, Some(&payload_src[..n])));
        }
    }
    None
}
