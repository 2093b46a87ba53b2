//! Peek-and-classify framing: decide between octet-counted/line-delimited
//! TCP framing and plain line-oriented text by looking at the first bytes
//! the transport offers, without consuming them, then delegate for the rest
//! of the connection's life.

use std::time::Duration;

use crate::{
    aux::AuxData,
    error::{FrameError, FrameResult},
    sink::Bookmark,
    transport::Transport,
};

use super::{
    buffered::BufferedServer, framed::FramedExtractor, text::TextExtractor, PrepareAction, Server,
    ServerOptions,
};

/// The classifying prefix is capped at this many bytes: an ASCII digit not
/// followed by a digit or SP within this many bytes can't be a legal
/// octet-counting header, and isn't a text line either (no delimiter ever
/// showed up), so the stream is rejected rather than guessed at.
const MAX_CLASSIFY_BYTES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Framed,
    Text,
    TooLong,
}

/// `ASCII digit followed by a digit or SP within MAX_CLASSIFY_BYTES bytes`
/// → Framed; anything that can't extend that pattern → Text, decided as
/// soon as the disqualifying byte is seen; an all-digit run that never
/// resolves by the byte cap → `TooLong`. Returns `None` when `peeked` is an
/// unresolved digit run shorter than the cap — more bytes are needed.
fn classify(peeked: &[u8]) -> Option<Classification> {
    let first = *peeked.first()?;
    if !first.is_ascii_digit() {
        return Some(Classification::Text);
    }
    for &b in peeked {
        if b == b' ' {
            return Some(Classification::Framed);
        }
        if !b.is_ascii_digit() {
            return Some(Classification::Text);
        }
    }
    if peeked.len() >= MAX_CLASSIFY_BYTES {
        Some(Classification::TooLong)
    } else {
        None
    }
}

#[derive(Debug)]
enum AutoState {
    Undecided {
        transport: Transport,
        options: ServerOptions,
    },
    Decided(Box<dyn Server>),
    /// Classification hit `Classification::TooLong`: there is no delegate to
    /// run, but the transport is still real and must still be closable.
    Failed(Transport),
}

/// Classifies a connection on first use, then behaves exactly like whatever
/// concrete server it picked.
#[derive(Debug)]
pub struct AutoServer {
    state: AutoState,
}

impl AutoServer {
    pub fn new(transport: Transport, options: ServerOptions) -> Self {
        Self {
            state: AutoState::Undecided { transport, options },
        }
    }

    fn ensure_decided(&mut self) -> FrameResult<()> {
        let AutoState::Undecided { transport, .. } = &mut self.state else {
            return Ok(());
        };

        let classification = loop {
            if let Some(c) = classify(transport.peeked()) {
                break c;
            }
            let want = transport.peeked().len() + 1;
            match transport.read_ahead(want) {
                Ok(_) => continue,
                Err(FrameError::Again) => return Err(FrameError::Again),
                Err(FrameError::Eof) => {
                    // Stream ended mid-digit-run with no resolving byte ever
                    // arriving; there's nothing left to classify against, so
                    // hand the (short) leftover to the text path, which will
                    // immediately flush it at EOF.
                    break Classification::Text;
                }
                Err(e) => return Err(e),
            }
        };

        let AutoState::Undecided { transport, options } = std::mem::replace(
            &mut self.state,
            AutoState::Undecided {
                transport: Transport::Mock(crate::transport::MockTransport::new()),
                options: ServerOptions::default(),
            },
        ) else {
            unreachable!("checked above");
        };

        if classification == Classification::TooLong {
            self.state = AutoState::Failed(transport);
            return Err(FrameError::protocol("initial framing too long"));
        }

        let delegate: Box<dyn Server> = match classification {
            Classification::Framed => {
                let extractor =
                    FramedExtractor::new(options.max_msg_size, options.trim_large_messages);
                Box::new(BufferedServer::new(transport, options, extractor)?)
            }
            Classification::Text => {
                Box::new(BufferedServer::new(transport, options, TextExtractor::new(None))?)
            }
            Classification::TooLong => unreachable!("handled above"),
        };

        self.state = AutoState::Decided(delegate);
        Ok(())
    }
}

impl Server for AutoServer {
    fn fetch(&mut self, may_read: &mut bool) -> FrameResult<(&[u8], AuxData, Bookmark)> {
        self.ensure_decided()?;
        match &mut self.state {
            AutoState::Decided(delegate) => delegate.fetch(may_read),
            AutoState::Failed(_) => Err(FrameError::protocol("initial framing too long")),
            AutoState::Undecided { .. } => unreachable!("ensure_decided always transitions"),
        }
    }

    fn prepare(&self, timeout: Option<Duration>) -> PrepareAction {
        match &self.state {
            AutoState::Decided(delegate) => delegate.prepare(timeout),
            AutoState::Undecided { .. } => PrepareAction::PollIo(super::IoCondition::Readable),
            AutoState::Failed(_) => PrepareAction::ScheduleFetch,
        }
    }

    fn close(&mut self) {
        match &mut self.state {
            AutoState::Decided(delegate) => delegate.close(),
            AutoState::Undecided { transport, .. } => transport.close(),
            AutoState::Failed(transport) => transport.close(),
        }
    }

    fn reset_error(&mut self) {
        if let AutoState::Decided(delegate) = &mut self.state {
            delegate.reset_error();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn make_server(data: &[u8]) -> AutoServer {
        let mut mock = MockTransport::new();
        mock.push(data);
        mock.close_write_end();
        AutoServer::new(Transport::Mock(mock), ServerOptions::default())
    }

    #[test]
    fn classify_digit_then_space_is_framed() {
        assert_eq!(classify(b"32 abc"), Some(Classification::Framed));
    }

    #[test]
    fn classify_non_digit_lead_is_text() {
        assert_eq!(classify(b"abcdefghij\n"), Some(Classification::Text));
    }

    #[test]
    fn classify_all_digit_run_past_cap_is_too_long() {
        assert_eq!(classify(b"1234567890"), Some(Classification::TooLong));
    }

    #[test]
    fn classify_short_digit_run_needs_more_data() {
        assert_eq!(classify(b"123"), None);
    }

    #[test]
    fn framed_lead_delegates_to_octet_counting() {
        let mut server = make_server(b"5 hello");
        let mut may_read = true;
        let (rec, _, _) = server.fetch(&mut may_read).unwrap();
        assert_eq!(rec, b"hello");
    }

    #[test]
    fn non_digit_lead_delegates_to_text() {
        let mut server = make_server(b"<14>hello there\n");
        let mut may_read = true;
        let (rec, _, _) = server.fetch(&mut may_read).unwrap();
        assert_eq!(rec, b"<14>hello there");
    }

    #[test]
    fn unresolved_digit_run_is_a_protocol_error() {
        let mut server = make_server(b"12345678901234");
        let mut may_read = true;
        let err = server.fetch(&mut may_read).unwrap_err();
        assert!(matches!(err, FrameError::Protocol { .. }));
    }
}
