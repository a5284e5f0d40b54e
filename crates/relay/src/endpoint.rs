use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// A ZeroMQ socket address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Endpoint {
    /// Unix domain socket named under `/tmp/threadgate/`.
    Ipc(String),

    /// TCP socket, for brokers on another host.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_string())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse `ipc:///tmp/threadgate/<name>.sock` or `tcp://host:port`.
    pub fn parse(address: &str) -> Result<Self, RelayError> {
        if let Some(path) = address.strip_prefix("ipc://") {
            let name = Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| RelayError::Config(format!("invalid ipc endpoint '{address}'")))?;
            return Ok(Self::ipc(name));
        }
        if let Some(addr) = address.strip_prefix("tcp://") {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| RelayError::Config(format!("missing port in '{address}'")))?;
            let port = port
                .parse()
                .map_err(|_| RelayError::Config(format!("invalid port in '{address}'")))?;
            return Ok(Self::tcp(host, port));
        }
        Err(RelayError::Config(format!(
            "unsupported endpoint '{address}', expected ipc:// or tcp://"
        )))
    }

    /// The ZeroMQ endpoint address string.
    pub fn address(&self) -> String {
        match self {
            Self::Ipc(name) => format!("ipc:///tmp/threadgate/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// For IPC endpoints, make sure the socket directory exists before binding.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        if let Self::Ipc(_) = self {
            let address = self.address();
            let path = address.strip_prefix("ipc://").unwrap_or(&address);
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Remove an IPC socket file left behind by a previous run.
    pub fn remove_stale_socket(&self) -> std::io::Result<()> {
        if let Self::Ipc(_) = self {
            let address = self.address();
            let path = address.strip_prefix("ipc://").unwrap_or(&address);
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path, "removed stale IPC socket"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address())
    }
}
