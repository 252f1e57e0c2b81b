use anyhow::Result;
use clap::Parser;
use tracing::info;
use warden_config::ConfigLoader;
use warden_logging::{init_logging, LogFormat, LoggingOptions};
use warden_server::{build_state, create_router, shutdown::shutdown_signal};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "warden.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new(&args.config).validate()?;

    let format: LogFormat = config.logging.format.parse()?;
    init_logging(&LoggingOptions::new(config.logging.level.clone(), format))?;

    info!(
        config = %args.config,
        strategy = ?config.auth.strategy,
        store = ?config.store.backend,
        "Starting warden"
    );

    let services = build_state(&config).await?;
    let app = create_router(services.state.clone());

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr()).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.shutdown();
    info!("Shutdown complete");
    Ok(())
}
