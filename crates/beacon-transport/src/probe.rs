//! Connectivity probes.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

use crate::{TransportError, TransportResult};

/// Answers whether the network is reachable right now.
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Probe that never blocks delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl ConnectivityProbe for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Probe that opens a TCP connection to a well-known address.
///
/// The address says whether the device has a network at all. It must not be
/// a collector: an unreachable collector is an I/O failure for the transport
/// to retry or fall back from. The address is resolved once, up front, so
/// checks never wait on DNS.
#[derive(Debug, Clone)]
pub struct TcpConnectivityProbe {
    addrs: Vec<SocketAddr>,
    timeout: Duration,
}

impl TcpConnectivityProbe {
    /// Connect timeout for callers that have no preference.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            addrs: vec![addr],
            timeout,
        }
    }

    /// Resolve a `host:port` address.
    pub fn resolve(address: &str, timeout: Duration) -> TransportResult<Self> {
        let addrs: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|e| TransportError::Io(format!("cannot resolve {address}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Io(format!("{address} resolved to nothing")));
        }
        Ok(Self { addrs, timeout })
    }
}

impl ConnectivityProbe for TcpConnectivityProbe {
    fn is_online(&self) -> bool {
        for addr in &self.addrs {
            if TcpStream::connect_timeout(addr, self.timeout).is_ok() {
                return true;
            }
        }
        debug!(addrs = ?self.addrs, "Connectivity check failed");
        false
    }
}
