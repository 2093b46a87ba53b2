//! PROXY protocol v1 (text) and v2 (binary) pre-handshake wrapper. Wraps
//! another `Server` so a load balancer's "where did this connection really
//! come from" preamble is stripped off and folded into every record's
//! [`AuxData::proxied`] before the inner server ever sees a framing byte.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    aux::{AuxData, ProxiedAddrs},
    error::{FrameError, FrameResult},
    sink::Bookmark,
    transport::Transport,
};

use super::{PrepareAction, Server, ServerOptions};

const V1_MAX_HEADER: usize = 107;
const V2_SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyProtocolVersion {
    V1,
    V2,
}

/// Address families PROXY v2 may declare (`family_proto` byte). Anything
/// else is rejected outright; this crate does not parse per-family TLVs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FamilyProto {
    Tcp4,
    Tcp6,
    Unix,
    Unspec,
}

impl FamilyProto {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x11 => Some(Self::Tcp4),
            0x21 => Some(Self::Tcp6),
            0x31 => Some(Self::Unix),
            0x00 => Some(Self::Unspec),
            _ => None,
        }
    }
}

/// A `Server` that consumes exactly one PROXY preamble from the transport
/// before handing control to `inner`, attaching the recovered source and
/// destination addresses to every record `inner` subsequently produces.
#[derive(Debug)]
pub struct ProxyServer {
    inner: Box<dyn Server>,
    proxied: Option<ProxiedAddrs>,
}

impl ProxyServer {
    /// Wraps an already-constructed server whose transport has already had
    /// its PROXY preamble consumed by [`strip_proxy_preamble`]; every record
    /// `inner` subsequently produces is stamped with the recovered
    /// source/destination pair.
    pub fn wrap(inner: Box<dyn Server>, proxied: Option<ProxiedAddrs>) -> Self {
        Self { inner, proxied }
    }

    fn parse_v1(line: &str) -> FrameResult<Option<ProxiedAddrs>> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split(' ');
        if parts.next() != Some("PROXY") {
            return Err(FrameError::handshake("PROXY v1 header missing 'PROXY' tag"));
        }
        let proto = parts.next().ok_or_else(|| FrameError::handshake("PROXY v1 header missing protocol"))?;
        if proto == "UNKNOWN" {
            return Ok(None);
        }
        if proto != "TCP4" && proto != "TCP6" {
            return Err(FrameError::handshake(format!("unsupported PROXY v1 protocol '{proto}'")));
        }
        let src_ip = parts.next().ok_or_else(|| FrameError::handshake("missing source address"))?;
        let dst_ip = parts.next().ok_or_else(|| FrameError::handshake("missing destination address"))?;
        let src_port = parts.next().ok_or_else(|| FrameError::handshake("missing source port"))?;
        let dst_port = parts.next().ok_or_else(|| FrameError::handshake("missing destination port"))?;

        let source = SocketAddr::from_str(&format!("{src_ip}:{src_port}"))
            .map_err(|_| FrameError::handshake("malformed PROXY v1 source address"))?;
        let destination = SocketAddr::from_str(&format!("{dst_ip}:{dst_port}"))
            .map_err(|_| FrameError::handshake("malformed PROXY v1 destination address"))?;
        Ok(Some(ProxiedAddrs { source, destination }))
    }

    /// `header` is the full 16-byte-plus-address-payload v2 block (signature
    /// already validated by the caller).
    fn parse_v2(header: &[u8]) -> FrameResult<Option<ProxiedAddrs>> {
        if header.len() < 16 {
            return Err(FrameError::handshake("PROXY v2 header shorter than 16 bytes"));
        }
        let version_cmd = header[12];
        let version = version_cmd >> 4;
        let cmd = version_cmd & 0x0F;
        if version != 2 {
            return Err(FrameError::handshake(format!("unsupported PROXY v2 version {version}")));
        }
        let family_proto = FamilyProto::from_byte(header[13])
            .ok_or_else(|| FrameError::handshake("unsupported PROXY v2 family/proto byte"))?;
        let len = u16::from_be_bytes([header[14], header[15]]) as usize;
        if header.len() < 16 + len {
            return Err(FrameError::handshake("PROXY v2 header shorter than declared address length"));
        }

        // cmd 0x0 (LOCAL) carries no real addresses: the health-check probe
        // a load balancer sends itself.
        if cmd == 0x00 {
            return Ok(None);
        }

        let payload = &header[16..16 + len];
        match family_proto {
            FamilyProto::Tcp4 => {
                if payload.len() < 12 {
                    return Err(FrameError::handshake("PROXY v2 TCP4 payload too short"));
                }
                let source = SocketAddr::from((
                    [payload[0], payload[1], payload[2], payload[3]],
                    u16::from_be_bytes([payload[8], payload[9]]),
                ));
                let destination = SocketAddr::from((
                    [payload[4], payload[5], payload[6], payload[7]],
                    u16::from_be_bytes([payload[10], payload[11]]),
                ));
                Ok(Some(ProxiedAddrs { source, destination }))
            }
            FamilyProto::Tcp6 => {
                if payload.len() < 36 {
                    return Err(FrameError::handshake("PROXY v2 TCP6 payload too short"));
                }
                let mut src_octets = [0u8; 16];
                let mut dst_octets = [0u8; 16];
                src_octets.copy_from_slice(&payload[0..16]);
                dst_octets.copy_from_slice(&payload[16..32]);
                let source = SocketAddr::from((
                    src_octets,
                    u16::from_be_bytes([payload[32], payload[33]]),
                ));
                let destination = SocketAddr::from((
                    dst_octets,
                    u16::from_be_bytes([payload[34], payload[35]]),
                ));
                Ok(Some(ProxiedAddrs { source, destination }))
            }
            FamilyProto::Unix | FamilyProto::Unspec => {
                // No meaningful `SocketAddr` representation; let the
                // transport-level peer address stand.
                Ok(None)
            }
        }
    }

    fn detect_version(peek: &[u8]) -> Option<ProxyProtocolVersion> {
        if peek.starts_with(b"PROXY ") {
            Some(ProxyProtocolVersion::V1)
        } else if peek.len() >= V2_SIGNATURE.len() && peek[..V2_SIGNATURE.len()] == V2_SIGNATURE {
            Some(ProxyProtocolVersion::V2)
        } else {
            None
        }
    }
}

impl Server for ProxyServer {
    fn fetch(&mut self, may_read: &mut bool) -> FrameResult<(&[u8], AuxData, Bookmark)> {
        let (bytes, aux, bookmark) = self.inner.fetch(may_read)?;
        let aux = match self.proxied {
            Some(proxied) => aux.with_proxied(proxied),
            None => aux,
        };
        Ok((bytes, aux, bookmark))
    }

    fn prepare(&self, timeout: Option<Duration>) -> PrepareAction {
        self.inner.prepare(timeout)
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn reset_error(&mut self) {
        self.inner.reset_error();
    }
}

/// Strip exactly one PROXY preamble (v1 or v2) from `transport`, returning
/// the recovered addresses (`None` for `PROXY UNKNOWN` / LOCAL / families
/// this crate doesn't resolve to a `SocketAddr`).
///
/// Meant to run once, synchronously, right after accept, before a server is
/// built over `transport` — not from inside the cooperative-scheduling read
/// path. The caller is expected to only invoke this once the transport has
/// been reported readable; a transport not yet readable surfaces as
/// `FrameError::Again` here rather than being silently retried.
pub fn strip_proxy_preamble(transport: &mut Transport) -> FrameResult<Option<ProxiedAddrs>> {
    let mut probe = [0u8; 16];
    transport.read_ahead(probe.len())?;
    let probe_len = transport.peeked().len();
    probe[..probe_len].copy_from_slice(&transport.peeked()[..probe_len]);

    match ProxyServer::detect_version(&probe[..probe_len]) {
        None => Ok(None),
        Some(ProxyProtocolVersion::V1) => {
            let mut line = Vec::with_capacity(V1_MAX_HEADER);
            loop {
                if line.len() > V1_MAX_HEADER {
                    return Err(FrameError::handshake("PROXY v1 header exceeds 107 bytes"));
                }
                let mut buf = [0u8; 1];
                let (n, _) = transport.read(&mut buf)?;
                if n == 0 {
                    return Err(FrameError::handshake("connection closed mid PROXY v1 header"));
                }
                line.push(buf[0]);
                if line.ends_with(b"\r\n") {
                    break;
                }
            }
            let text = std::str::from_utf8(&line)
                .map_err(|_| FrameError::handshake("PROXY v1 header is not valid ASCII"))?;
            ProxyServer::parse_v1(text)
        }
        Some(ProxyProtocolVersion::V2) => {
            let mut header = [0u8; 16];
            transport.read(&mut header)?;
            let len = u16::from_be_bytes([header[14], header[15]]) as usize;
            let mut full = header.to_vec();
            let mut payload = vec![0u8; len];
            let mut filled = 0;
            while filled < len {
                let (n, _) = transport.read(&mut payload[filled..])?;
                if n == 0 {
                    return Err(FrameError::handshake("connection closed mid PROXY v2 header"));
                }
                filled += n;
            }
            full.extend_from_slice(&payload);
            ProxyServer::parse_v2(&full)
        }
    }
}
