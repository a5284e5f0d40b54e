use clap::Parser;
use tracing::info;

use threadgate_server::cli::{Cli, Command};
use threadgate_server::router::build_router;
use threadgate_server::startup;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    threadgate_core::config::load_dotenv();
    let cli = Cli::parse();
    let mut config = threadgate_core::Config::from_env();
    cli.apply(&mut config);

    if cli.command() == Command::Config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    config.log_summary();

    let transport = startup::build_transport(&config).await?;
    let services = startup::build_services(&config, transport, cli.demo_project.as_deref()).await?;
    let app = build_router(services.state.clone(), &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("threadgate listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.stop().await;
    info!("threadgate exited cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
