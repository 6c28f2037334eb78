//! Reachability probe for network destinations.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// SMB, then NetBIOS session service.
const PROBE_PORTS: [u16; 2] = [445, 139];

/// True if a TCP connection to any file-sharing port on `host` succeeds.
pub fn is_reachable(host: &str, timeout: Duration) -> bool {
    let host = host.trim();
    if host.is_empty() {
        return false;
    }
    PROBE_PORTS
        .iter()
        .any(|&port| port_open(host, port, timeout))
}

fn port_open(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            tracing::warn!(host, error = %e, "could not resolve host");
            return false;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => {
                tracing::info!(%addr, "port open");
                return true;
            }
            Err(e) => tracing::debug!(%addr, error = %e, "connect failed"),
        }
    }
    false
}
