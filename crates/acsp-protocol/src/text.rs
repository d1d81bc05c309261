//! Inference of untagged string encodings.
//!
//! The server writes strings with a one-byte length prefix but does not say
//! how the characters are encoded. Depending on the server build and the
//! field, the payload may be 32-bit code units (with or without a usable
//! length), 16-bit code units, or plain 8-bit text. Each strategy below
//! looks at the bytes starting at the length byte and either claims an exact
//! byte count or declines. They are tried in [`STRATEGIES`] order and the
//! first match wins; claiming too few or too many bytes would shift every
//! field that follows, so a strategy must not partially match.

/// Text recovered by a strategy along with the bytes it claimed, counted
/// from (and including) the length byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub consumed: usize,
}

impl DecodedText {
    fn new(text: String, consumed: usize) -> Self {
        Self { text, consumed }
    }
}

/// A single decoding heuristic. Input starts at the length byte.
pub type Strategy = fn(&[u8]) -> Option<DecodedText>;

/// Decoding heuristics in the order they are attempted.
pub const STRATEGIES: [(&str, Strategy); 4] = [
    ("padded_utf32", padded_utf32),
    ("prefixed_utf32", prefixed_utf32),
    ("prefixed_utf16", prefixed_utf16),
    ("plain_text", plain_text),
];

/// Runs the strategy chain. When nothing matches only the length byte is
/// consumed and the text is empty.
pub fn decode(bytes: &[u8]) -> DecodedText {
    if bytes.is_empty() {
        return DecodedText::new(String::new(), 0);
    }

    STRATEGIES
        .iter()
        .find_map(|(_, strategy)| strategy(bytes))
        .unwrap_or_else(|| DecodedText::new(String::new(), 1))
}

const HIGH_BYTES_MASK: u32 = 0xFFFF_FF00;

fn le_u32_at(bytes: &[u8], at: usize) -> Option<u32> {
    let end = at.checked_add(4)?;
    let unit = bytes.get(at..end)?;
    <[u8; 4]>::try_from(unit).ok().map(u32::from_le_bytes)
}

fn until_nul(text: &str) -> String {
    text.split('\0').next().unwrap_or_default().to_owned()
}

/// Splits off the length byte and returns the `width`-byte body, requiring
/// the second body byte to be zero.
fn prefixed_body(bytes: &[u8], unit_width: usize) -> Option<(&[u8], usize)> {
    let (&length, body) = bytes.split_first()?;
    if length == 0 {
        return None;
    }

    let width = usize::from(length).checked_mul(unit_width)?;
    let body = body.get(..width)?;
    if body.get(1) != Some(&0) {
        return None;
    }

    Some((body, width.checked_add(1)?))
}

/// Run of 4-byte code units where the "length byte" is really the low byte
/// of the first unit. Ends at a zero unit (consumed) or at a unit with any
/// high byte set (left for the next field).
pub fn padded_utf32(bytes: &[u8]) -> Option<DecodedText> {
    let first = le_u32_at(bytes, 0)?;
    if first == 0 || first & HIGH_BYTES_MASK != 0 {
        return None;
    }

    let mut text = String::new();
    let mut consumed = 0usize;
    while let Some(unit) = le_u32_at(bytes, consumed) {
        if unit == 0 {
            consumed = consumed.checked_add(4)?;
            break;
        }
        let Ok(byte) = u8::try_from(unit) else {
            break;
        };
        text.push(char::from(byte));
        consumed = consumed.checked_add(4)?;
    }

    if text.is_empty() {
        return None;
    }

    Some(DecodedText::new(text.trim().to_owned(), consumed))
}

/// Length byte followed by `length` 32-bit little-endian code units.
pub fn prefixed_utf32(bytes: &[u8]) -> Option<DecodedText> {
    let (body, consumed) = prefixed_body(bytes, 4)?;

    let text = body
        .chunks_exact(4)
        .map(|unit| {
            <[u8; 4]>::try_from(unit)
                .ok()
                .map(u32::from_le_bytes)
                .and_then(char::from_u32)
        })
        .collect::<Option<String>>()?;

    Some(DecodedText::new(until_nul(&text), consumed))
}

/// Length byte followed by `length` 16-bit little-endian code units.
pub fn prefixed_utf16(bytes: &[u8]) -> Option<DecodedText> {
    let (body, consumed) = prefixed_body(bytes, 2)?;

    let units: Vec<u16> = body
        .chunks_exact(2)
        .filter_map(|unit| <[u8; 2]>::try_from(unit).ok().map(u16::from_le_bytes))
        .collect();
    let text = String::from_utf16(&units).ok()?;

    Some(DecodedText::new(until_nul(&text), consumed))
}

/// Length byte followed by `length` bytes of UTF-8; malformed sequences are
/// dropped.
pub fn plain_text(bytes: &[u8]) -> Option<DecodedText> {
    let (&length, body) = bytes.split_first()?;
    if length == 0 {
        return Some(DecodedText::new(String::new(), 1));
    }

    let width = usize::from(length);
    let chunk = body.get(..width)?;
    let text: String = chunk.utf8_chunks().map(|part| part.valid()).collect();

    Some(DecodedText::new(until_nul(&text), width.checked_add(1)?))
}
