//! The error taxonomy from which every layer of the framing core draws.
//!
//! `EncodingError` and `ProtocolError` are sticky: once a [`BufferedServer`]
//! (see [`crate::server::buffered`]) produces one, every subsequent `fetch`
//! returns the same error until [`FrameError::is_sticky`] is cleared by the
//! caller via `reset_error`.

use std::io;

use snafu::Snafu;

/// Coarse classification of a transport-level I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorKind {
    Io,
    IoEagainStuck,
    HandshakeFailed,
    TlsError,
    ClosedByPeer,
}

/// The full error taxonomy for the framing core.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FrameError {
    /// Clean end of stream. Not really an error; kept in this enum because
    /// every layer's `Result` needs a single error type to propagate through.
    #[snafu(display("end of stream"))]
    Eof,

    /// The resource is transiently unready; the caller should retry once the
    /// scheduler says so.
    #[snafu(display("resource not ready"))]
    Again,

    #[snafu(display("transport I/O error ({kind:?}): {source}"))]
    Io { kind: IoErrorKind, source: io::Error },

    #[snafu(display("encoding error: {message}"))]
    Encoding { message: String },

    #[snafu(display("protocol error: {message}"))]
    Protocol { message: String },

    #[snafu(display("handshake failed: {message}"))]
    Handshake { message: String },

    #[snafu(display("persisted state error: {message}"))]
    State { message: String },
}

impl FrameError {
    pub fn io(kind: IoErrorKind, source: io::Error) -> Self {
        Self::Io { kind, source }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Whether this error, once surfaced, must be replayed on every
    /// subsequent `fetch` until explicitly reset.
    pub const fn is_sticky(&self) -> bool {
        matches!(self, Self::Encoding { .. } | Self::Protocol { .. })
    }

    /// Mirrors `StreamDecodingError::can_continue`: whether it
    /// is safe to keep reading from the same transport after this error.
    pub const fn can_continue(&self) -> bool {
        match self {
            Self::Eof | Self::Again => true,
            Self::Encoding { .. } | Self::Protocol { .. } => true,
            Self::Io { .. } | Self::Handshake { .. } | Self::State { .. } => false,
        }
    }

    /// A standalone copy of this error, for the sticky variants a
    /// `BufferedServer` needs to replay on every subsequent `fetch`.
    /// `Io`'s `source` isn't `Clone`, so this crate can't derive `Clone` for
    /// the whole enum; only the two variants that are actually sticky need it.
    pub fn sticky_copy(&self) -> Option<Self> {
        match self {
            Self::Encoding { message } => Some(Self::Encoding {
                message: message.clone(),
            }),
            Self::Protocol { message } => Some(Self::Protocol {
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

pub type FrameResult<T> = Result<T, FrameError>;
