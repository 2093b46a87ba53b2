//! RFC 6587 TCP framing: octet-counting (`"<len> <payload>"`) when the
//! stream opens with an ASCII digit, non-transparent (LF-delimited)
//! otherwise. The mode is decided once, from the first byte ever seen, and
//! held for the lifetime of the connection — RFC 6587 §3.4 says the sender
//! picks one framing style per connection, not per message.

use crate::error::{FrameError, FrameResult};

use super::buffered::{Extracted, FrameExtractor};
use super::ServerOptions;

/// An octet-counting length header longer than this many digits cannot
/// correspond to any real message and is almost certainly a non-digit
/// stream that was misdetected, or corrupted framing.
const MAX_HEADER_DIGITS: usize = 10;

#[derive(Debug)]
pub struct FramedExtractor {
    octet_counting: Option<bool>,
    max_msg_size: usize,
    trim_large_messages: bool,
}

impl FramedExtractor {
    pub fn new(max_msg_size: usize, trim_large_messages: bool) -> Self {
        Self {
            octet_counting: None,
            max_msg_size,
            trim_large_messages,
        }
    }
}

impl Default for FramedExtractor {
    fn default() -> Self {
        let defaults = ServerOptions::default();
        Self::new(defaults.max_msg_size, defaults.trim_large_messages)
    }
}

impl FrameExtractor for FramedExtractor {
    fn extract(&mut self, window: &[u8], flush: bool) -> FrameResult<Extracted> {
        if window.is_empty() {
            return Ok(Extracted::NeedMoreData);
        }
        let octet_counting = *self
            .octet_counting
            .get_or_insert_with(|| window[0].is_ascii_digit());
        if octet_counting {
            self.extract_octet_counting(window)
        } else {
            self.extract_non_transparent(window, flush)
        }
    }

    /// The framed header can push a record's payload to a non-zero
    /// `frame_offset`; the generic offset-0 policy in `BufferedServer` would
    /// trim the header into the emitted record, so this extractor enforces
    /// `max_msg_size` itself, against the payload.
    fn applies_generic_oversize_limit(&self) -> bool {
        false
    }
}

impl FramedExtractor {
    fn extract_octet_counting(&self, window: &[u8]) -> FrameResult<Extracted> {
        let space_pos = match window.iter().position(|&b| b == b' ') {
            Some(pos) => pos,
            None => {
                if window.len() > MAX_HEADER_DIGITS || !window.iter().all(u8::is_ascii_digit) {
                    return Err(FrameError::protocol(
                        "malformed octet-counting length header",
                    ));
                }
                return Ok(Extracted::NeedMoreData);
            }
        };
        let digits = &window[..space_pos];
        if digits.is_empty()
            || digits.len() > MAX_HEADER_DIGITS
            || !digits.iter().all(u8::is_ascii_digit)
        {
            return Err(FrameError::protocol(
                "malformed octet-counting length header",
            ));
        }
        let len: usize = std::str::from_utf8(digits)
            .expect("validated ascii digits")
            .parse()
            .map_err(|_| FrameError::protocol("octet-counting length header overflowed usize"))?;

        if len > self.max_msg_size && !self.trim_large_messages {
            return Err(FrameError::protocol(
                "Incoming frame larger than log_msg_size()",
            ));
        }

        let header_len = space_pos + 1;
        let total = header_len + len;
        if window.len() < total {
            return Ok(Extracted::NeedMoreData);
        }
        Ok(Extracted::Frame {
            frame_offset: header_len,
            frame_len: len.min(self.max_msg_size),
            total_consumed: total,
        })
    }

    fn extract_non_transparent(&self, window: &[u8], flush: bool) -> FrameResult<Extracted> {
        match memchr::memchr(b'\n', window) {
            Some(pos) => {
                let frame_len = if pos > 0 && window[pos - 1] == b'\r' {
                    pos - 1
                } else {
                    pos
                };
                self.finish_line(frame_len, pos + 1)
            }
            None if flush && !window.is_empty() => self.finish_line(window.len(), window.len()),
            None => Ok(Extracted::NeedMoreData),
        }
    }

    fn finish_line(&self, frame_len: usize, total_consumed: usize) -> FrameResult<Extracted> {
        if frame_len > self.max_msg_size {
            if !self.trim_large_messages {
                return Err(FrameError::protocol(
                    "Incoming frame larger than log_msg_size()",
                ));
            }
            return Ok(Extracted::Frame {
                frame_offset: 0,
                frame_len: self.max_msg_size,
                total_consumed,
            });
        }
        Ok(Extracted::Frame {
            frame_offset: 0,
            frame_len,
            total_consumed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_octet_counted_message() {
        let mut ext = FramedExtractor::default();
        let window = b"5 hello6 world";
        let Extracted::Frame {
            frame_offset,
            frame_len,
            total_consumed,
        } = ext.extract(window, false).unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!(&window[frame_offset..frame_offset + frame_len], b"hello");
        assert_eq!(total_consumed, 7);
    }

    #[test]
    fn falls_back_to_non_transparent_for_non_digit_start() {
        let mut ext = FramedExtractor::default();
        let window = b"<14>hello there\n";
        let Extracted::Frame { frame_len, .. } = ext.extract(window, false).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame_len, window.len() - 1);
    }

    #[test]
    fn oversized_frame_with_trim_emits_only_the_payload_up_to_max_msg_size() {
        let mut ext = FramedExtractor::new(32, true);
        let mut window = b"48 ".to_vec();
        window.extend(std::iter::repeat(b'X').take(48));
        let Extracted::Frame {
            frame_offset,
            frame_len,
            total_consumed,
        } = ext.extract(&window, false).unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!(&window[frame_offset..frame_offset + frame_len], &[b'X'; 32][..]);
        assert_eq!(total_consumed, window.len());
    }

    #[test]
    fn oversized_frame_without_trim_is_a_protocol_error() {
        let mut ext = FramedExtractor::new(32, false);
        let mut window = b"48 ".to_vec();
        window.extend(std::iter::repeat(b'X').take(48));
        assert!(ext.extract(&window, false).is_err());
    }

    #[test]
    fn rejects_header_with_non_digit_before_space() {
        let mut ext = FramedExtractor::default();
        // First byte is a digit (selects octet-counting) but the header
        // itself is malformed.
        let window = b"1a2 x";
        assert!(ext.extract(window, false).is_err());
    }
}
