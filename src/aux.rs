use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// A monotonic hint for when a read happened, independent of wall-clock time.
///
/// Transports stamp every read with one of these; servers forward the value
/// captured at whichever read produced the record currently being emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimestampHint(pub i64);

/// The source/destination pair a PROXY protocol handshake recovered, as
/// opposed to the transport-level peer/local address (which, behind a proxy,
/// names the load balancer rather than the original client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxiedAddrs {
    pub source: SocketAddr,
    pub destination: SocketAddr,
}

/// Per-read metadata carried alongside bytes and attached to every record
/// extracted from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxData {
    pub peer_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub timestamp: Option<TimestampHint>,
    pub proxied: Option<ProxiedAddrs>,
}

impl AuxData {
    pub const fn new() -> Self {
        Self {
            peer_addr: None,
            local_addr: None,
            timestamp: None,
            proxied: None,
        }
    }

    /// Merge in whichever fields `proxy` has set, without clobbering fields
    /// this instance already carries from the transport layer.
    pub fn with_proxied(mut self, proxied: ProxiedAddrs) -> Self {
        self.peer_addr = Some(proxied.source);
        self.local_addr = Some(proxied.destination);
        self.proxied = Some(proxied);
        self
    }
}
