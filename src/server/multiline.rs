//! Multi-line record continuation policies: a record's end is no longer
//! "the next newline" but depends on what the following line looks like.

use regex::Regex;

use crate::error::FrameResult;

use super::buffered::{Extracted, FrameExtractor};

/// A continuation policy. Regexes are matched against one line at a time
/// (the trailing newline stripped).
#[derive(Debug, Clone)]
pub enum MultiLineMode {
    /// A line starting with a space or tab continues the previous record.
    Indented,
    /// `prefix` marks the start of a new record. Lines seen before the
    /// first `prefix` match (stray fragments left over from a mid-record
    /// start) are garbage if they match `garbage`, and are dropped rather
    /// than folded into the next record.
    PrefixGarbage { prefix: Regex, garbage: Regex },
    /// `prefix` marks the start of a new record, `suffix` marks its last
    /// line (inclusive).
    PrefixSuffix { prefix: Regex, suffix: Regex },
    /// A blank line ends the current record.
    EmptyLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentAction {
    Consume,
    Rewind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Extracted,
    Waiting,
}

#[derive(Debug)]
pub struct MultiLineExtractor {
    mode: MultiLineMode,
    seen_prefix: bool,
}

impl MultiLineExtractor {
    pub fn new(mode: MultiLineMode) -> Self {
        Self {
            mode,
            seen_prefix: false,
        }
    }
}

fn as_str(line: &[u8]) -> &str {
    std::str::from_utf8(line).unwrap_or("")
}

fn strip_cr(line: &[u8]) -> usize {
    if line.last() == Some(&b'\r') {
        line.len() - 1
    } else {
        line.len()
    }
}

/// Common handling once `memchr` finds no further `\n` in the remaining
/// window. At EOF a fully-accumulated record must still be emitted even
/// when the window happens to end exactly on the previous line's `\n`
/// (`rest` empty) rather than on a trailing partial line (`rest`
/// non-empty, no trailing `\n` to strip).
fn flush_tail(window: &[u8], consumed: usize, rest: &[u8], flush: bool) -> Option<Extracted> {
    if !flush {
        return None;
    }
    if rest.is_empty() {
        if consumed == 0 {
            return None;
        }
        return Some(Extracted::Frame {
            frame_offset: 0,
            frame_len: consumed.saturating_sub(1),
            total_consumed: consumed,
        });
    }
    Some(Extracted::Frame {
        frame_offset: 0,
        frame_len: window.len(),
        total_consumed: window.len(),
    })
}

impl FrameExtractor for MultiLineExtractor {
    fn extract(&mut self, window: &[u8], flush: bool) -> FrameResult<Extracted> {
        match &self.mode {
            MultiLineMode::Indented => extract_indented(window, flush),
            MultiLineMode::EmptyLine => extract_empty_line(window, flush),
            MultiLineMode::PrefixSuffix { prefix, suffix } => {
                extract_prefix_suffix(window, flush, prefix, suffix)
            }
            MultiLineMode::PrefixGarbage { prefix, garbage } => {
                extract_prefix_garbage(window, flush, prefix, garbage, &mut self.seen_prefix)
            }
        }
    }
}

fn extract_indented(window: &[u8], flush: bool) -> FrameResult<Extracted> {
    let mut consumed = 0usize;
    let mut saw_first_line = false;
    loop {
        let rest = &window[consumed..];
        let Some(nl) = memchr::memchr(b'\n', rest) else {
            return Ok(flush_tail(window, consumed, rest, flush).unwrap_or(Extracted::NeedMoreData));
        };
        let line = &rest[..nl];
        if !saw_first_line {
            saw_first_line = true;
            consumed += nl + 1;
            continue;
        }
        let continuation = matches!(line.first(), Some(b' ') | Some(b'\t'));
        if continuation {
            consumed += nl + 1;
        } else {
            return Ok(Extracted::Frame {
                frame_offset: 0,
                frame_len: consumed.saturating_sub(1),
                total_consumed: consumed,
            });
        }
    }
}

fn extract_empty_line(window: &[u8], flush: bool) -> FrameResult<Extracted> {
    let mut consumed = 0usize;
    loop {
        let rest = &window[consumed..];
        let Some(nl) = memchr::memchr(b'\n', rest) else {
            return Ok(flush_tail(window, consumed, rest, flush).unwrap_or(Extracted::NeedMoreData));
        };
        let line = &rest[..nl];
        if strip_cr(line) == 0 {
            return Ok(Extracted::Frame {
                frame_offset: 0,
                frame_len: consumed.saturating_sub(1),
                total_consumed: consumed + nl + 1,
            });
        }
        consumed += nl + 1;
    }
}

fn extract_prefix_suffix(
    window: &[u8],
    flush: bool,
    prefix: &Regex,
    suffix: &Regex,
) -> FrameResult<Extracted> {
    let mut consumed = 0usize;
    let mut saw_first_line = false;
    loop {
        let rest = &window[consumed..];
        let Some(nl) = memchr::memchr(b'\n', rest) else {
            return Ok(flush_tail(window, consumed, rest, flush).unwrap_or(Extracted::NeedMoreData));
        };
        let line = &rest[..nl];
        if !saw_first_line {
            if !prefix.is_match(as_str(line)) {
                // Fragment from a stream that didn't start on a record
                // boundary; drop it and keep scanning for a real prefix.
                consumed += nl + 1;
                continue;
            }
            saw_first_line = true;
            consumed += nl + 1;
            if suffix.is_match(as_str(line)) {
                return Ok(Extracted::Frame {
                    frame_offset: 0,
                    frame_len: consumed.saturating_sub(1),
                    total_consumed: consumed,
                });
            }
            continue;
        }
        consumed += nl + 1;
        if suffix.is_match(as_str(line)) {
            return Ok(Extracted::Frame {
                frame_offset: 0,
                frame_len: consumed.saturating_sub(1),
                total_consumed: consumed,
            });
        }
    }
}

fn extract_prefix_garbage(
    window: &[u8],
    flush: bool,
    prefix: &Regex,
    garbage: &Regex,
    seen_prefix: &mut bool,
) -> FrameResult<Extracted> {
    if !*seen_prefix {
        let Some(nl) = memchr::memchr(b'\n', window) else {
            return Ok(Extracted::NeedMoreData);
        };
        let line = &window[..nl];
        if prefix.is_match(as_str(line)) {
            *seen_prefix = true;
        } else if garbage.is_match(as_str(line)) {
            return Ok(Extracted::Advance { consumed: nl + 1 });
        } else {
            // Neither prefix nor garbage: treat conservatively as garbage
            // too, since there is no record to attach it to yet.
            return Ok(Extracted::Advance { consumed: nl + 1 });
        }
    }

    let mut consumed = 0usize;
    let mut first = true;
    loop {
        let rest = &window[consumed..];
        let Some(nl) = memchr::memchr(b'\n', rest) else {
            return match flush_tail(window, consumed, rest, flush) {
                Some(frame) => {
                    *seen_prefix = false;
                    Ok(frame)
                }
                None => Ok(Extracted::NeedMoreData),
            };
        };
        let line = &rest[..nl];
        if first {
            first = false;
            consumed += nl + 1;
            continue;
        }
        if prefix.is_match(as_str(line)) {
            // Next record's prefix already seen; leave `seen_prefix` set so
            // the next `extract` call skips straight to accumulation.
            return Ok(Extracted::Frame {
                frame_offset: 0,
                frame_len: consumed.saturating_sub(1),
                total_consumed: consumed,
            });
        }
        consumed += nl + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indented_joins_continuation_lines() {
        let mut ext = MultiLineExtractor::new(MultiLineMode::Indented);
        let window = b"first\n  second\nthird\n";
        let Extracted::Frame {
            frame_len,
            total_consumed,
            ..
        } = ext.extract(window, false).unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!(&window[..frame_len], b"first\n  second");
        assert_eq!(total_consumed, frame_len + 1);
    }

    #[test]
    fn empty_line_ends_paragraph() {
        let mut ext = MultiLineExtractor::new(MultiLineMode::EmptyLine);
        let window = b"line one\nline two\n\nnext record\n";
        let Extracted::Frame { frame_len, .. } = ext.extract(window, false).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(&window[..frame_len], b"line one\nline two");
    }
}
