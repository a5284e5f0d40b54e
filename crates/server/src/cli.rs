//! Command-line arguments. Flags override the environment-derived config.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use threadgate_core::Config;

#[derive(Parser, Debug)]
#[command(name = "threadgate", version, about = "OpenAI-compatible gateway to relay agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Address to bind.
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Seed file listing known projects.
    #[arg(long, global = true)]
    pub projects_file: Option<PathBuf>,

    /// Relay transport: `zmq` or `memory`.
    #[arg(long, global = true)]
    pub relay_mode: Option<String>,

    /// Run an in-process echo agent as primary of this project.
    #[arg(long, env = "DEMO_PROJECT", global = true)]
    pub demo_project: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the HTTP server (default).
    Serve,
    /// Print the effective configuration as JSON and exit.
    Config,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Fold flag values into `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = &self.projects_file {
            config.registry.projects_file = Some(path.clone());
        }
        if let Some(mode) = &self.relay_mode {
            config.relay.mode = mode.to_lowercase();
        }
        // The demo agent lives in this process, so it needs the in-process relay.
        if self.demo_project.is_some() {
            config.relay.mode = "memory".into();
        }
    }
}
