use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bankcards::api::{router, AppState};
use bankcards::clock::{Clock, SystemClock};
use bankcards::config::Config;
use bankcards::db;
use bankcards::jobs::expiry_sweeper::ExpirySweeper;
use bankcards::store::{CardStore, PgCardStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bankcards=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting bankcards server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Build application state
    let store: Arc<dyn CardStore> = Arc::new(PgCardStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(store.clone(), clock.clone(), &config);

    // Make sure the administrator account exists
    state
        .auth
        .ensure_admin(&config.admin_username, config.admin_password.expose_secret())
        .await?;

    // Schedule the daily expiry sweep
    let sweeper = Arc::new(ExpirySweeper::new(state.ledger.clone(), store, clock));
    let mut scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create scheduler: {e:?}"))?;
    let scheduled_sweeper = sweeper.clone();
    let sweep_job = Job::new_async(config.expiry_sweep_schedule.as_str(), move |_id, _sched| {
        let sweeper = scheduled_sweeper.clone();
        Box::pin(async move {
            if let Err(e) = sweeper.sweep_now().await {
                tracing::error!(error = %e, "expiry sweep failed");
            }
        })
    })
    .map_err(|e| anyhow::anyhow!("invalid expiry sweep schedule: {e:?}"))?;
    scheduler
        .add(sweep_job)
        .await
        .map_err(|e| anyhow::anyhow!("failed to schedule expiry sweep: {e:?}"))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start scheduler: {e:?}"))?;
    tracing::info!(schedule = %config.expiry_sweep_schedule, "expiry sweep scheduled");

    // Sweep once at startup so a long-stopped instance catches up
    if let Err(e) = sweeper.sweep_now().await {
        tracing::error!(error = %e, "startup expiry sweep failed");
    }

    // Build router
    let app = router(state);

    let addr = SocketAddr::new(config.host.parse()?, config.port);
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, cleaning up...");
}
