//! Stream framing and record-extraction engine for a syslog collector.
//!
//! Raw bytes come in off a [`transport::Transport`] (TCP/TLS, UDP, a file
//! being tailed, an inherited fd, or a unit test's [`transport::MockTransport`]).
//! A [`server::Server`] turns that byte stream into discrete records —
//! newline-delimited lines, RFC 6587 octet-counted or non-transparent
//! frames, multi-line stack traces, fixed-layout binary records, or raw
//! UDP datagrams — and hands each one, with its [`aux::AuxData`], to a
//! [`sink::MessageSink`].
//!
//! [`server::BufferedServer`] is the shared engine behind most of these: it
//! owns the read buffer, the encoding conversion, and the commit/rollback
//! bookkeeping a caller needs to only acknowledge a record once it has been
//! durably handed off, while a small [`server::FrameExtractor`] supplies the
//! actual boundary-finding logic for one framing style.

pub mod aux;
pub mod encode;
pub mod encoding;
pub mod error;
pub mod persist;
pub mod server;
pub mod sink;
pub mod transport;

pub use encode::FrameEncoder;
pub use error::{FrameError, FrameResult};
pub use server::{Server, ServerOptions};
pub use sink::{Bookmark, MessageSink};
pub use transport::Transport;
