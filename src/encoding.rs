//! Encoding-aware conversion and the "encoding reverse-size" calculation
//! needed when a chunk boundary splits a multi-byte sequence: given a decoded UTF-8 prefix, how many bytes of
//! the *original* encoding produced it.
//!
//! Forward conversion (original bytes -> UTF-8) always goes through
//! [`encoding_rs`] regardless of whether the encoding qualifies for the
//! fixed-width fast path; the fast path only short-circuits the reverse
//! direction, which is the one on the hot path of position tracking.

use encoding_rs::Encoding;

use crate::error::{FrameError, FrameResult};

/// Up to this many trailing original-encoding bytes may be held back as an
/// incomplete multi-byte character straddling a read boundary
/// `raw_buffer_leftover_size`).
pub const MAX_LEFTOVER: usize = 8;

/// The held-back tail of the previous read, not yet decodable on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Leftover {
    bytes: [u8; MAX_LEFTOVER],
    len: u8,
}

impl Leftover {
    pub const fn empty() -> Self {
        Self {
            bytes: [0; MAX_LEFTOVER],
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn set(&mut self, data: &[u8]) -> FrameResult<()> {
        if data.len() > MAX_LEFTOVER {
            return Err(FrameError::encoding(
                "Byte sequence too short, cannot convert an individual frame in its entirety",
            ));
        }
        self.bytes[..data.len()].copy_from_slice(data);
        self.len = data.len() as u8;
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }
}

/// Fixed-width character sets backed by a real `encoding_rs` table, fast-pathed
/// for reverse-size computation. Matched case-insensitively by prefix.
///
/// `ucs-2`/`ucs4`/`wchar_t` are deliberately absent: the WHATWG Encoding
/// Standard that `encoding_rs` implements has no UCS-2/UCS-4 encoding, so
/// `Encoding::for_label` never resolves them. They get their own
/// [`FixedWidthCodec`] variants with a hand-rolled codec instead.
const FIXED_WIDTH_TABLE: &[(&str, usize)] = &[
    ("ascii", 1),
    ("us-ascii", 1),
    ("iso-8859", 1),
    ("iso8859", 1),
    ("latin", 1),
    ("koi", 1),
    ("unicode", 2),
    ("windows", 1),
];

/// A fixed-width decode/encode strategy: either a real `encoding_rs` table
/// that happens to be fixed-width, or one of the codecs `encoding_rs` has no
/// table for at all.
#[derive(Debug, Clone, Copy)]
pub enum FixedWidthCodec {
    ByteOriented {
        width: usize,
        encoding: &'static Encoding,
    },
    /// Big-endian UCS-2: one 16-bit code unit per character, no surrogate
    /// pairs.
    Ucs2Be,
    /// Big-endian UCS-4: one 32-bit code point per character.
    Ucs4Be,
    /// glibc's `wchar_t`: 4 bytes, native endianness.
    WcharT,
}

impl FixedWidthCodec {
    fn width(self) -> usize {
        match self {
            Self::ByteOriented { width, .. } => width,
            Self::Ucs2Be => 2,
            Self::Ucs4Be | Self::WcharT => 4,
        }
    }

    fn decode_unit(self, bytes: &[u8]) -> Option<char> {
        match self {
            Self::ByteOriented { .. } => unreachable!("byte-oriented codecs decode via encoding_rs"),
            Self::Ucs2Be => char::from_u32(u16::from_be_bytes([bytes[0], bytes[1]]) as u32),
            Self::Ucs4Be => char::from_u32(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            Self::WcharT => char::from_u32(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        }
    }
}

/// A resolved character set: either the fixed-width fast path, or a handle
/// to a real `encoding_rs` table for general conversion.
#[derive(Debug, Clone, Copy)]
pub enum CharSet {
    FixedWidth(FixedWidthCodec),
    Variable(&'static Encoding),
}

impl CharSet {
    pub fn lookup(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("ucs-2") || lower.starts_with("ucs2") {
            return Some(Self::FixedWidth(FixedWidthCodec::Ucs2Be));
        }
        if lower.starts_with("ucs-4") || lower.starts_with("ucs4") {
            return Some(Self::FixedWidth(FixedWidthCodec::Ucs4Be));
        }
        if lower.starts_with("wchar_t") {
            return Some(Self::FixedWidth(FixedWidthCodec::WcharT));
        }

        let encoding = Encoding::for_label(name.as_bytes())?;
        for (prefix, width) in FIXED_WIDTH_TABLE {
            if lower.starts_with(prefix) {
                return Some(Self::FixedWidth(FixedWidthCodec::ByteOriented {
                    width: *width,
                    encoding,
                }));
            }
        }
        Some(Self::Variable(encoding))
    }

    /// Number of original-encoding bytes that produced `decoded`, the
    /// fast path for fixed-width sets, falling back to a reverse `iconv`-like
    /// conversion for everything else.
    pub fn reverse_size(self, decoded: &str) -> usize {
        match self {
            Self::FixedWidth(codec) => decoded.chars().count() * codec.width(),
            Self::Variable(encoding) => {
                let (bytes, _, _) = encoding.new_encoder().encoding().encode(decoded);
                bytes.len()
            }
        }
    }
}

/// Result of converting one read's worth of original-encoding bytes.
pub struct Converted {
    pub text: String,
    /// Number of bytes of `raw` (not counting the leftover that was
    /// prepended) that were consumed to produce `text` plus the new leftover.
    pub raw_consumed: usize,
}

/// Decode `raw` (prefixed by whatever `leftover` is carrying over from the
/// previous read) into UTF-8, updating `leftover` in place.
///
/// Any trailing incomplete multi-byte sequence of at most [`MAX_LEFTOVER`]
/// bytes is held back rather than treated as an error; a sequence that is
/// invalid for a reason other than running off the end of the buffer is a
/// sticky [`FrameError::Encoding`].
pub fn convert(charset: CharSet, raw: &[u8], leftover: &mut Leftover) -> FrameResult<Converted> {
    match charset {
        CharSet::FixedWidth(FixedWidthCodec::Ucs2Be | FixedWidthCodec::Ucs4Be | FixedWidthCodec::WcharT) => {
            let CharSet::FixedWidth(codec) = charset else {
                unreachable!()
            };
            convert_fixed_width(codec, raw, leftover)
        }
        CharSet::FixedWidth(FixedWidthCodec::ByteOriented { encoding, .. }) | CharSet::Variable(encoding) => {
            convert_via_encoding_rs(encoding, raw, leftover)
        }
    }
}

fn convert_via_encoding_rs(
    encoding: &'static Encoding,
    raw: &[u8],
    leftover: &mut Leftover,
) -> FrameResult<Converted> {
    let mut combined = Vec::with_capacity(leftover.len() + raw.len());
    combined.extend_from_slice(leftover.as_slice());
    combined.extend_from_slice(raw);

    if combined.is_empty() {
        return Ok(Converted {
            text: String::new(),
            raw_consumed: raw.len(),
        });
    }

    let max_hold_back = MAX_LEFTOVER.min(combined.len());
    for hold_back in 0..=max_hold_back {
        let candidate = &combined[..combined.len() - hold_back];
        if candidate.is_empty() && hold_back > 0 {
            continue;
        }
        let (text, had_errors) = encoding.decode_without_bom_handling(candidate);
        if !had_errors {
            let tail = &combined[candidate.len()..];
            leftover.set(tail)?;
            return Ok(Converted {
                text: text.into_owned(),
                raw_consumed: raw.len().saturating_sub(hold_back),
            });
        }
    }

    Err(FrameError::encoding(
        "Byte sequence too short, cannot convert an individual frame in its entirety",
    ))
}

/// Decode a fixed-width codec `encoding_rs` has no table for (UCS-2, UCS-4,
/// `wchar_t`) by chunking the combined leftover+raw buffer into `width`-byte
/// units directly; any trailing partial unit is held back as leftover.
fn convert_fixed_width(
    codec: FixedWidthCodec,
    raw: &[u8],
    leftover: &mut Leftover,
) -> FrameResult<Converted> {
    let width = codec.width();
    let mut combined = Vec::with_capacity(leftover.len() + raw.len());
    combined.extend_from_slice(leftover.as_slice());
    combined.extend_from_slice(raw);

    let usable = combined.len() - combined.len() % width;
    let mut text = String::with_capacity(usable / width);
    for unit in combined[..usable].chunks_exact(width) {
        let ch = codec.decode_unit(unit).ok_or_else(|| {
            FrameError::encoding("invalid fixed-width character sequence")
        })?;
        text.push(ch);
    }

    let tail = &combined[usable..];
    leftover.set(tail)?;
    Ok(Converted {
        text,
        raw_consumed: raw.len().saturating_sub(tail.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_fixed_width_one() {
        let cs = CharSet::lookup("ascii").unwrap();
        assert!(matches!(
            cs,
            CharSet::FixedWidth(FixedWidthCodec::ByteOriented { width: 1, .. })
        ));
        assert_eq!(cs.reverse_size("hello"), 5);
    }

    #[test]
    fn ucs4_reverse_size_matches_scenario_5() {
        let cs = CharSet::lookup("ucs-4").unwrap();
        assert!(matches!(
            cs,
            CharSet::FixedWidth(FixedWidthCodec::Ucs4Be)
        ));
        assert_eq!(cs.reverse_size("árvíztűr"), 8 * 4);
    }

    #[test]
    fn ucs4_dgram_decodes_to_arvizturo() {
        let cs = CharSet::lookup("ucs-4").unwrap();
        let codepoints: [u32; 8] = [
            0x00E1, 0x0072, 0x0076, 0x00ED, 0x007A, 0x0074, 0x0171, 0x0072,
        ];
        let mut raw = Vec::with_capacity(32);
        for cp in codepoints {
            raw.extend_from_slice(&cp.to_be_bytes());
        }
        let mut leftover = Leftover::empty();
        let out = convert(cs, &raw, &mut leftover).unwrap();
        assert_eq!(out.text, "árvíztűr");
        assert_eq!(out.raw_consumed, 32);
        assert!(leftover.is_empty());
    }

    #[test]
    fn ucs2_holds_back_odd_trailing_byte() {
        let cs = CharSet::lookup("ucs-2").unwrap();
        let mut leftover = Leftover::empty();
        let raw = [0x00, 0x41, 0x00];
        let out = convert(cs, &raw, &mut leftover).unwrap();
        assert_eq!(out.text, "A");
        assert_eq!(out.raw_consumed, 2);
        assert_eq!(leftover.as_slice(), &[0x00]);
    }

    #[test]
    fn utf8_is_variable_width() {
        let cs = CharSet::lookup("utf-8").unwrap();
        assert!(matches!(cs, CharSet::Variable(_)));
        assert_eq!(cs.reverse_size("héllo"), "héllo".len());
    }

    #[test]
    fn convert_passthrough_ascii() {
        let cs = CharSet::lookup("ascii").unwrap();
        let mut leftover = Leftover::empty();
        let out = convert(cs, b"hello world", &mut leftover).unwrap();
        assert_eq!(out.text, "hello world");
        assert_eq!(out.raw_consumed, 11);
        assert!(leftover.is_empty());
    }

    #[test]
    fn convert_holds_back_incomplete_utf16_pair() {
        let cs = CharSet::lookup("utf-16le").unwrap();
        let mut leftover = Leftover::empty();
        // "A" (0x0041) followed by one lone byte of a second code unit.
        let raw = [0x41, 0x00, 0xAC];
        let out = convert(cs, &raw, &mut leftover).unwrap();
        assert_eq!(out.text, "A");
        assert_eq!(leftover.len(), 1);
        assert_eq!(leftover.as_slice(), &[0xAC]);
    }

    #[test]
    fn convert_leftover_overflow_is_encoding_error() {
        let cs = CharSet::lookup("utf-16le").unwrap();
        let mut leftover = Leftover::empty();
        // Nine raw bytes of nonsense that never resolves to valid UTF-16,
        // no matter how many trailing bytes are held back.
        let raw = [0xD8, 0x00, 0xD8, 0x00, 0xD8, 0x00, 0xD8, 0x00, 0xD8];
        let result = convert(cs, &raw, &mut leftover);
        assert!(result.is_err());
    }
}
