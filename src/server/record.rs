//! Fixed-layout binary records: plain fixed-size, size-padded, and
//! length-prefixed framing.

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, FrameResult};

use super::buffered::{Extracted, FrameExtractor};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Every record is exactly `size` bytes.
    Fixed { size: usize },
    /// Every record occupies exactly `size` bytes on the wire, but trailing
    /// `pad_byte` bytes are stripped from the emitted record.
    Padded { size: usize, pad_byte: u8 },
    /// A `length_bytes`-byte integer length prefix, then that many bytes of
    /// payload.
    LengthPrefixed { length_bytes: u8, big_endian: bool },
}

#[derive(Debug)]
pub struct RecordExtractor {
    kind: RecordKind,
}

impl RecordExtractor {
    pub fn new(kind: RecordKind) -> Self {
        Self { kind }
    }
}

impl FrameExtractor for RecordExtractor {
    fn extract(&mut self, window: &[u8], flush: bool) -> FrameResult<Extracted> {
        match self.kind {
            RecordKind::Fixed { size } => extract_fixed(window, flush, size),
            RecordKind::Padded { size, pad_byte } => {
                extract_padded(window, flush, size, pad_byte)
            }
            RecordKind::LengthPrefixed {
                length_bytes,
                big_endian,
            } => extract_length_prefixed(window, length_bytes, big_endian),
        }
    }
}

fn extract_fixed(window: &[u8], flush: bool, size: usize) -> FrameResult<Extracted> {
    if window.len() >= size {
        return Ok(Extracted::Frame {
            frame_offset: 0,
            frame_len: size,
            total_consumed: size,
        });
    }
    if flush && !window.is_empty() {
        return Err(FrameError::protocol(format!(
            "stream ended with a {}-byte partial record, expected {size} bytes",
            window.len()
        )));
    }
    Ok(Extracted::NeedMoreData)
}

fn extract_padded(
    window: &[u8],
    flush: bool,
    size: usize,
    pad_byte: u8,
) -> FrameResult<Extracted> {
    match extract_fixed(window, flush, size)? {
        Extracted::Frame { .. } => {
            let record = &window[..size];
            let trimmed = record
                .iter()
                .rposition(|&b| b != pad_byte)
                .map_or(0, |pos| pos + 1);
            Ok(Extracted::Frame {
                frame_offset: 0,
                frame_len: trimmed,
                total_consumed: size,
            })
        }
        other => Ok(other),
    }
}

fn extract_length_prefixed(
    window: &[u8],
    length_bytes: u8,
    big_endian: bool,
) -> FrameResult<Extracted> {
    let length_bytes = length_bytes as usize;
    if window.len() < length_bytes {
        return Ok(Extracted::NeedMoreData);
    }
    let mut len: u64 = 0;
    if big_endian {
        for &b in &window[..length_bytes] {
            len = (len << 8) | b as u64;
        }
    } else {
        for &b in window[..length_bytes].iter().rev() {
            len = (len << 8) | b as u64;
        }
    }
    let payload_len = len as usize;
    let total = length_bytes + payload_len;
    if window.len() < total {
        return Ok(Extracted::NeedMoreData);
    }
    Ok(Extracted::Frame {
        frame_offset: length_bytes,
        frame_len: payload_len,
        total_consumed: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_round_trips_through_json() {
        let kind = RecordKind::LengthPrefixed {
            length_bytes: 4,
            big_endian: true,
        };
        let json = serde_json::to_string(&kind).unwrap();
        let back: RecordKind = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back,
            RecordKind::LengthPrefixed {
                length_bytes: 4,
                big_endian: true,
            }
        ));
    }

    #[test]
    fn fixed_waits_for_full_record() {
        let mut ext = RecordExtractor::new(RecordKind::Fixed { size: 4 });
        assert!(matches!(
            ext.extract(b"ab", false).unwrap(),
            Extracted::NeedMoreData
        ));
        let Extracted::Frame { frame_len, .. } = ext.extract(b"abcd", false).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame_len, 4);
    }

    #[test]
    fn padded_trims_trailing_pad_bytes() {
        let mut ext = RecordExtractor::new(RecordKind::Padded {
            size: 8,
            pad_byte: 0,
        });
        let Extracted::Frame { frame_len, .. } =
            ext.extract(b"abc\0\0\0\0\0", false).unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!(frame_len, 3);
    }

    #[test]
    fn length_prefixed_reads_big_endian_u16_length() {
        let mut ext = RecordExtractor::new(RecordKind::LengthPrefixed {
            length_bytes: 2,
            big_endian: true,
        });
        let mut data = vec![0u8, 3];
        data.extend_from_slice(b"abc");
        let Extracted::Frame {
            frame_len,
            total_consumed,
            ..
        } = ext.extract(&data, false).unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!(&data[2..2 + frame_len], b"abc");
        assert_eq!(total_consumed, 5);
    }
}
