use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::error::RelayError;

/// Relay topology, parsed from `relay.toml`.
///
/// ```toml
/// [broker]
/// frontend = "tcp://127.0.0.1:5555"
/// backend = "tcp://127.0.0.1:5556"
///
/// [hub]
/// capacity = 1024
/// namespace = "relay."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub hub: HubSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Where publishers connect (broker binds SUB).
    #[serde(default = "default_frontend")]
    pub frontend: String,
    /// Where subscribers connect (broker binds PUB).
    #[serde(default = "default_backend")]
    pub backend: String,
}

fn default_frontend() -> String {
    "ipc:///tmp/threadgate/relay-frontend.sock".into()
}

fn default_backend() -> String {
    "ipc:///tmp/threadgate/relay-backend.sock".into()
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            frontend: default_frontend(),
            backend: default_backend(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubSection {
    /// Queue size of each local subscription.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Topic prefix pulled from the broker.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_capacity() -> usize {
    1024
}

fn default_namespace() -> String {
    crate::topics::NAMESPACE.into()
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            namespace: default_namespace(),
        }
    }
}

impl RelayConfig {
    /// Parse from a TOML string, applying `RELAY_FRONTEND` / `RELAY_BACKEND`.
    pub fn from_toml(toml_str: &str) -> Result<Self, RelayError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load from `path` when it exists, otherwise fall back to local IPC defaults.
    pub fn load_or_local(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        if path.exists() {
            tracing::info!(path = %path.display(), "loading relay config");
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "relay config not found, using local defaults");
            let mut config = Self::local();
            config.apply_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
    }

    /// Single-host deployment over IPC sockets.
    pub fn local() -> Self {
        Self {
            broker: BrokerSection::default(),
            hub: HubSection::default(),
        }
    }

    /// Broker on `host`, frontend on `port`, backend on `port + 1`.
    pub fn tcp(host: &str, port: u16) -> Self {
        Self {
            broker: BrokerSection {
                frontend: format!("tcp://{host}:{port}"),
                backend: format!("tcp://{host}:{}", port + 1),
            },
            hub: HubSection::default(),
        }
    }

    pub fn frontend(&self) -> Result<Endpoint, RelayError> {
        Endpoint::parse(&self.broker.frontend)
    }

    pub fn backend(&self) -> Result<Endpoint, RelayError> {
        Endpoint::parse(&self.broker.backend)
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RELAY_FRONTEND").filter(|v| !v.is_empty()) {
            self.broker.frontend = v;
        }
        if let Some(v) = lookup("RELAY_BACKEND").filter(|v| !v.is_empty()) {
            self.broker.backend = v;
        }
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        self.frontend()?;
        self.backend()?;
        if self.broker.frontend == self.broker.backend {
            return Err(RelayError::Config(
                "broker frontend and backend must differ".into(),
            ));
        }
        if self.hub.capacity == 0 {
            return Err(RelayError::Config("hub capacity must be positive".into()));
        }
        if self.hub.namespace.is_empty() {
            return Err(RelayError::Config("hub namespace must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::local()
    }
}
