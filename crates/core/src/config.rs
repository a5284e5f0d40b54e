use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Reads a profiled key: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
///
/// The lookup is injected so tests can feed a fixed map instead of the
/// process environment.
struct Profiled<'a, F: Fn(&str) -> Option<String>> {
    profile: &'a str,
    lookup: F,
}

impl<'a, F: Fn(&str) -> Option<String>> Profiled<'a, F> {
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = (self.lookup)(&prefixed).filter(|s| !s.is_empty()) {
                return Some(v);
            }
        }
        (self.lookup)(key).filter(|s| !s.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn u16(&self, key: &str, default: u16) -> u16 {
        self.opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    fn u32(&self, key: &str, default: u32) -> u32 {
        self.opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.opt(key).as_deref() {
            Some("true") | Some("1") | Some("yes") => true,
            Some("false") | Some("0") | Some("no") => false,
            _ => default,
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub bridge: BridgeConfig,
    pub relay: RelayClientConfig,
    pub registry: RegistryConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `THREADGATE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env::var("THREADGATE_PROFILE").unwrap_or_default();
        Self::from_lookup(&profile, |key| env::var(key).ok())
    }

    /// Build config for a profile using an arbitrary key lookup.
    pub fn from_lookup(profile: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let p = profile.to_uppercase();
        let src = Profiled {
            profile: p.as_str(),
            lookup,
        };
        Self {
            profile: p.clone(),
            server: ServerConfig::from_source(&src),
            bridge: BridgeConfig::from_source(&src),
            relay: RelayClientConfig::from_source(&src),
            registry: RegistryConfig::from_source(&src),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:   {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  bridge:   staleness={}s armed={}s gap={}s malformed_limit={} handoff={}",
            self.bridge.staleness_threshold_secs,
            self.bridge.armed_timeout_secs,
            self.bridge.inter_fragment_timeout_secs,
            self.bridge.malformed_fragment_limit,
            self.bridge.handoff_capacity,
        );
        tracing::info!(
            "  relay:    mode={} config={}",
            self.relay.mode,
            self.relay.config_path.display()
        );
        tracing::info!(
            "  registry: projects_file={} auto_discover={}",
            self.registry
                .projects_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".into()),
            self.registry.auto_discover
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_source<F: Fn(&str) -> Option<String>>(src: &Profiled<'_, F>) -> Self {
        Self {
            host: src.or("HOST", "0.0.0.0"),
            port: src.u16("PORT", 3000),
            cors_origin: src.or("CORS_ORIGIN", "*"),
        }
    }
}

// ── Bridge (selection, timers, limits) ────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Age of an agent's last-seen timestamp at which it counts as stale.
    pub staleness_threshold_secs: u64,
    /// How long to wait for the first fragment after arming.
    pub armed_timeout_secs: u64,
    /// Maximum silence between accepted fragments once streaming.
    pub inter_fragment_timeout_secs: u64,
    /// Malformed fragments tolerated before the exchange is aborted.
    pub malformed_fragment_limit: u32,
    /// Capacity of the aggregator → writer handoff channel.
    pub handoff_capacity: usize,
    /// Maximum number of out-of-order sequenced fragments held back.
    pub reorder_window: usize,
    /// How long a known project may wait for its first status.
    pub status_wait_secs: u64,
    /// Upper bound on transport acceptance of a prompt.
    pub publish_timeout_secs: u64,
    /// Interval of SSE keep-alive comments.
    pub keep_alive_secs: u64,
}

impl BridgeConfig {
    fn from_source<F: Fn(&str) -> Option<String>>(src: &Profiled<'_, F>) -> Self {
        Self {
            staleness_threshold_secs: src.u64("STALENESS_THRESHOLD_SECS", 300),
            armed_timeout_secs: src.u64("ARMED_TIMEOUT_SECS", 300),
            inter_fragment_timeout_secs: src.u64("INTER_FRAGMENT_TIMEOUT_SECS", 120),
            malformed_fragment_limit: src.u32("MALFORMED_FRAGMENT_LIMIT", 5),
            handoff_capacity: src.u32("HANDOFF_CAPACITY", 32).max(1) as usize,
            reorder_window: src.u32("REORDER_WINDOW", 16) as usize,
            status_wait_secs: src.u64("STATUS_WAIT_SECS", 30),
            publish_timeout_secs: src.u64("PUBLISH_TIMEOUT_SECS", 5),
            keep_alive_secs: src.u64("KEEP_ALIVE_SECS", 15),
        }
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn armed_timeout(&self) -> Duration {
        Duration::from_secs(self.armed_timeout_secs)
    }

    pub fn inter_fragment_timeout(&self) -> Duration {
        Duration::from_secs(self.inter_fragment_timeout_secs)
    }

    pub fn status_wait(&self) -> Duration {
        Duration::from_secs(self.status_wait_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from_source(&Profiled {
            profile: "",
            lookup: |_: &str| None,
        })
    }
}

// ── Relay client ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayClientConfig {
    /// "zmq" (broker-backed) or "memory" (in-process only).
    pub mode: String,
    /// Path to the relay topology file.
    pub config_path: PathBuf,
}

impl RelayClientConfig {
    fn from_source<F: Fn(&str) -> Option<String>>(src: &Profiled<'_, F>) -> Self {
        Self {
            mode: src.or("RELAY_MODE", "zmq").to_lowercase(),
            config_path: PathBuf::from(src.or("RELAY_CONFIG", "config/relay.toml")),
        }
    }

    pub fn is_memory(&self) -> bool {
        self.mode == "memory"
    }
}

// ── Project registry ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Optional seed file listing known projects.
    pub projects_file: Option<PathBuf>,
    /// Register projects first seen through a status heartbeat.
    pub auto_discover: bool,
}

impl RegistryConfig {
    fn from_source<F: Fn(&str) -> Option<String>>(src: &Profiled<'_, F>) -> Self {
        Self {
            projects_file: src.opt("PROJECTS_FILE").map(PathBuf::from),
            auto_discover: src.bool("REGISTRY_AUTO_DISCOVER", true),
        }
    }
}
