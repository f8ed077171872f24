use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::PgPool;
use tokio::sync::mpsc;

use dhb_matrix::config::Config;
use dhb_matrix::engine::{monthly_fee, withdraw, RewardParams};
use dhb_matrix::poller::ChainPoller;
use dhb_matrix::{api, db};

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting DHB matrix engine");

    let config = Config::load()?;
    tracing::info!(
        receive_address = %config.explorer.receive_address,
        api_port = config.api.port,
        "Configuration loaded"
    );

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database connected");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let config = Arc::new(config);
    let poller = Arc::new(ChainPoller::new(&config.explorer, pool.clone())?);

    // Create shutdown channels
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let (shutdown_tx2, shutdown_rx2) = mpsc::channel::<()>(1);
    let (shutdown_tx3, shutdown_rx3) = mpsc::channel::<()>(1);

    // Setup signal handlers
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
        let _ = shutdown_tx2.send(()).await;
        let _ = shutdown_tx3.send(()).await;
    });

    // Start the API server
    let api_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api.port));
    let api_state = api::AppState {
        pool: pool.clone(),
        config: config.clone(),
        poller: poller.clone(),
    };
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_state, api_addr).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    tracing::info!("Engines initialized, starting processing");

    // Run the three engine loops concurrently
    tokio::select! {
        result = sweep_loop(pool.clone(), poller, config.engine.sweep_interval_ms, shutdown_rx) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Sweep loop error");
            }
        }
        result = withdraw_loop(pool.clone(), config.engine.withdraw_interval_ms, shutdown_rx2) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Withdrawal loop error");
            }
        }
        result = monthly_loop(pool.clone(), config.engine.monthly_check_interval_ms, shutdown_rx3) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Monthly fee loop error");
            }
        }
    }

    tracing::info!("DHB matrix engine stopped");
    Ok(())
}

/// Periodically sweep the explorer for paired deposits.
async fn sweep_loop(
    pool: PgPool,
    poller: Arc<ChainPoller>,
    interval_ms: u64,
    mut shutdown: mpsc::Receiver<()>,
) -> eyre::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Knobs are editable at runtime, so reload every tick.
                match RewardParams::load(&pool).await {
                    Ok(params) => poller.sweep_logged(&params).await,
                    Err(e) => tracing::warn!(error = %e, "Failed to load reward params"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutdown signal received, stopping sweep loop");
                return Ok(());
            }
        }
    }
}

/// Periodically process pending withdrawal tickets.
async fn withdraw_loop(
    pool: PgPool,
    interval_ms: u64,
    mut shutdown: mpsc::Receiver<()>,
) -> eyre::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match RewardParams::load(&pool).await {
                    Ok(params) => {
                        if let Err(e) = withdraw::run_once(&pool, &params, Utc::now()).await {
                            tracing::error!(error = %e, "Withdrawal run failed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to load reward params"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutdown signal received, stopping withdrawal loop");
                return Ok(());
            }
        }
    }
}

/// Wake up periodically; the distributor itself makes sure each calendar
/// month is settled exactly once.
async fn monthly_loop(
    pool: PgPool,
    interval_ms: u64,
    mut shutdown: mpsc::Receiver<()>,
) -> eyre::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = monthly_fee::run_once(&pool, Utc::now()).await {
                    tracing::error!(error = %e, "Monthly fee run failed");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutdown signal received, stopping monthly fee loop");
                return Ok(());
            }
        }
    }
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dhb_matrix=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
