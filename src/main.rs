use balance_reconciler::{bootstrap, config::Config};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,balance_reconciler=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting balance reconciliation worker");

    let config = Config::from_env()?;
    let worker = bootstrap::initialize_worker(&config).await?;

    // `--once`: a single pass, e.g. from cron
    if std::env::args().any(|arg| arg == "--once") {
        worker.run_once().await?;
        return Ok(());
    }

    worker.start().await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutdown signal received");
    worker.stop().await;

    Ok(())
}
