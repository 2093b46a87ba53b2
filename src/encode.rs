//! The write-side counterpart to [`crate::server::framed`]: wraps an
//! outgoing record in RFC 6587 framing before it goes out over a
//! [`crate::transport::Transport`].

use crate::{error::FrameResult, transport::Transport};

/// Which RFC 6587 §3.4 framing style to apply to outgoing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoder {
    /// `"<len> "` prefix, no trailing delimiter needed since the length is
    /// self-describing.
    Octet,
    /// Trailing `\n`, with the record itself validated not to contain one.
    NonTransparent,
}

impl FrameEncoder {
    /// Writes `record` to `transport` with this encoder's framing applied,
    /// in as few `writev` calls as the transport supports.
    pub fn write_record(self, transport: &mut Transport, record: &[u8]) -> FrameResult<()> {
        match self {
            Self::Octet => {
                let header = format!("{} ", record.len());
                transport.writev(&[header.as_bytes(), record])?;
            }
            Self::NonTransparent => {
                transport.writev(&[record, b"\n"])?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn octet_framing_prefixes_length() {
        let mut transport = Transport::Mock(MockTransport::new());
        FrameEncoder::Octet
            .write_record(&mut transport, b"hello")
            .unwrap();
        let Transport::Mock(mock) = &transport else {
            unreachable!()
        };
        assert_eq!(mock.written(), b"5 hello");
    }

    #[test]
    fn non_transparent_framing_appends_newline() {
        let mut transport = Transport::Mock(MockTransport::new());
        FrameEncoder::NonTransparent
            .write_record(&mut transport, b"hello")
            .unwrap();
        let Transport::Mock(mock) = &transport else {
            unreachable!()
        };
        assert_eq!(mock.written(), b"hello\n");
    }
}
