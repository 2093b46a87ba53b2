//! Line-oriented text records: `\n`-delimited by default (with an optional
//! trailing `\r` stripped), or handed off to a [`MultiLineExtractor`] when a
//! continuation policy is configured.

use crate::error::FrameResult;

use super::buffered::{Extracted, FrameExtractor};
use super::multiline::{MultiLineExtractor, MultiLineMode};

#[derive(Debug)]
pub enum TextExtractor {
    SingleLine,
    MultiLine(MultiLineExtractor),
}

impl TextExtractor {
    pub fn new(mode: Option<MultiLineMode>) -> Self {
        match mode {
            None => Self::SingleLine,
            Some(mode) => Self::MultiLine(MultiLineExtractor::new(mode)),
        }
    }
}

impl FrameExtractor for TextExtractor {
    fn extract(&mut self, window: &[u8], flush: bool) -> FrameResult<Extracted> {
        match self {
            Self::SingleLine => extract_single_line(window, flush),
            Self::MultiLine(inner) => inner.extract(window, flush),
        }
    }
}

/// Walks back from `end` over any run of trailing `\r`, `\n`, and NUL bytes.
fn trim_line_terminators(line: &[u8]) -> usize {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n' | 0) {
        end -= 1;
    }
    end
}

fn extract_single_line(window: &[u8], flush: bool) -> FrameResult<Extracted> {
    match memchr::memchr(b'\n', window) {
        Some(pos) => Ok(Extracted::Frame {
            frame_offset: 0,
            frame_len: trim_line_terminators(&window[..pos]),
            total_consumed: pos + 1,
        }),
        None if flush && !window.is_empty() => Ok(Extracted::Frame {
            frame_offset: 0,
            frame_len: trim_line_terminators(window),
            total_consumed: window.len(),
        }),
        None => Ok(Extracted::NeedMoreData),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_cr() {
        let mut ext = TextExtractor::new(None);
        let window = b"hello\r\nworld";
        let Extracted::Frame {
            frame_len,
            total_consumed,
            ..
        } = ext.extract(window, false).unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!(&window[..frame_len], b"hello");
        assert_eq!(total_consumed, 7);
    }

    #[test]
    fn flush_emits_trailing_partial_line() {
        let mut ext = TextExtractor::new(None);
        let window = b"no newline here";
        let Extracted::Frame { frame_len, .. } = ext.extract(window, true).unwrap() else {
            panic!("expected a flushed frame");
        };
        assert_eq!(frame_len, window.len());
    }

    #[test]
    fn strips_trailing_nul() {
        let mut ext = TextExtractor::new(None);
        let window = b"abc\0\n";
        let Extracted::Frame { frame_len, .. } = ext.extract(window, false).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(&window[..frame_len], b"abc");
    }

    #[test]
    fn strips_multiple_trailing_cr() {
        let mut ext = TextExtractor::new(None);
        let window = b"abc\r\r\n";
        let Extracted::Frame { frame_len, .. } = ext.extract(window, false).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(&window[..frame_len], b"abc");
    }
}
