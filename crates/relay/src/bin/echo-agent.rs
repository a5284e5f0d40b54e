//! echo-agent: development agent that answers prompts by echoing them.
//!
//! Announces itself as the primary agent of a project through status
//! heartbeats and streams every prompt back as numbered word fragments.
//!
//! ```bash
//! echo-agent --project demo --identity echo-1
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use threadgate_relay::{echo, Heartbeat, MessageTransport, RelayConfig, ZmqTransport};
use tokio::sync::Notify;

/// Echoing development agent for the relay.
#[derive(Parser, Debug)]
#[command(name = "echo-agent", version, about)]
struct Cli {
    /// Project d-tag to serve.
    #[arg(long, env = "ECHO_PROJECT")]
    project: String,

    /// Agent identity; prompts arrive on relay.prompt.<identity>.
    #[arg(long, env = "ECHO_IDENTITY", default_value = "echo-agent")]
    identity: String,

    /// Display name announced in heartbeats.
    #[arg(long, env = "ECHO_NAME", default_value = "Echo")]
    name: String,

    /// Relay topology file.
    #[arg(long, env = "RELAY_CONFIG", default_value = "config/relay.toml")]
    config: PathBuf,

    /// Seconds between status heartbeats.
    #[arg(long, env = "ECHO_HEARTBEAT_SECS", default_value_t = 30)]
    heartbeat_secs: u64,

    /// Milliseconds between reply fragments.
    #[arg(long, env = "ECHO_DELAY_MS", default_value_t = 50)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting echo-agent");

    let relay_config = RelayConfig::load_or_local(&cli.config)?;
    let transport: Arc<dyn MessageTransport> = Arc::new(ZmqTransport::connect(&relay_config).await?);

    let shutdown = Arc::new(Notify::new());
    let heartbeat = Heartbeat::new(&cli.project, format!("{}-backend", cli.identity))
        .agent(&cli.identity, &cli.name, true)
        .interval(Duration::from_secs(cli.heartbeat_secs.max(1)));
    let heartbeat_handle = tokio::spawn(heartbeat.run(transport.clone(), shutdown.clone()));

    let delay = Duration::from_millis(cli.delay_ms);
    tokio::select! {
        result = echo::serve(transport.clone(), cli.identity.clone(), delay) => {
            result?;
            tracing::warn!("prompt subscription ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    shutdown.notify_one();
    let _ = heartbeat_handle.await;
    tracing::info!("echo-agent exited cleanly");
    Ok(())
}
