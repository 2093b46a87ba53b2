//! Datagram framing: one `recv` is one record, whole. There is no delimiter
//! to scan for — the boundary comes from the transport, not the bytes.

use crate::error::{FrameError, FrameResult};

use super::buffered::{Extracted, FrameExtractor};

#[derive(Debug)]
pub struct DgramFrameExtractor {
    max_msg_size: usize,
}

impl DgramFrameExtractor {
    pub fn new(max_msg_size: usize) -> Self {
        Self { max_msg_size }
    }
}

impl FrameExtractor for DgramFrameExtractor {
    fn extract(&mut self, window: &[u8], _flush: bool) -> FrameResult<Extracted> {
        if window.is_empty() {
            return Ok(Extracted::NeedMoreData);
        }
        // A datagram exceeding max_msg_size has nowhere to go: unlike a
        // stream, there's no next delimiter to resync on, so truncation
        // isn't optional here the way it is for line-oriented framing.
        if window.len() > self.max_msg_size {
            return Err(oversized_datagram_error(window.len(), self.max_msg_size));
        }
        Ok(Extracted::Frame {
            frame_offset: 0,
            frame_len: window.len(),
            total_consumed: window.len(),
        })
    }

    /// Oversized datagrams are rejected outright above; there is no
    /// "emit max_msg_size and resync" fallback for a boundary the
    /// transport already drew.
    fn applies_generic_oversize_limit(&self) -> bool {
        false
    }
}

fn oversized_datagram_error(size: usize, max: usize) -> FrameError {
    FrameError::protocol(format!(
        "datagram of {size} bytes exceeds max_msg_size of {max} bytes"
    ))
}
