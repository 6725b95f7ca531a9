use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Default directory for IPC sockets created from a bare name.
const IPC_DIR: &str = "/tmp/matchflow";

/// Transport layer for ZeroMQ connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket at the given filesystem path.
    Ipc(String),

    /// TCP transport for distributed deployment.
    Tcp { host: String, port: u16 },
}

impl Transport {
    /// IPC transport named `name`, placed under `/tmp/matchflow/`.
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(format!("{IPC_DIR}/{name}.sock"))
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse an endpoint string like `ipc:///tmp/bus.sock` or `tcp://host:port`.
    pub fn parse(endpoint: &str) -> Result<Self, BusError> {
        if let Some(path) = endpoint.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(BusError::InvalidEndpoint(endpoint.to_string()));
            }
            return Ok(Self::Ipc(path.to_string()));
        }

        let addr = endpoint
            .strip_prefix("tcp://")
            .ok_or_else(|| BusError::InvalidEndpoint(endpoint.to_string()))?;
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| BusError::InvalidEndpoint(endpoint.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| BusError::InvalidEndpoint(endpoint.to_string()))?;
        if host.is_empty() {
            return Err(BusError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self::tcp(host, port))
    }

    /// Generate the ZeroMQ endpoint address string.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(path) => format!("ipc://{path}"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// For IPC transports, ensure the parent directory exists.
    ///
    /// ZeroMQ requires the directory to exist before binding an IPC socket.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        if let Self::Ipc(path) = self {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

impl std::str::FromStr for Transport {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_endpoint() {
        let t = Transport::ipc("bus-frontend");
        assert_eq!(t.endpoint(), "ipc:///tmp/matchflow/bus-frontend.sock");
    }

    #[test]
    fn parse_tcp_and_ipc() {
        assert_eq!(
            Transport::parse("tcp://10.0.0.1:5555").unwrap(),
            Transport::tcp("10.0.0.1", 5555)
        );
        let ipc = Transport::parse("ipc:///var/run/bus.sock").unwrap();
        assert_eq!(ipc.endpoint(), "ipc:///var/run/bus.sock");
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "udp://x:1", "tcp://nohost", "tcp://host:notaport", "tcp://:5555", "ipc://"] {
            assert!(Transport::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn display_matches_endpoint() {
        let t = Transport::tcp("localhost", 9090);
        assert_eq!(t.to_string(), t.endpoint());
    }
}
