//! Gatehouse - token-authenticated, rate-limited JSON API

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatehouse::{
    accounts::TracingMailer,
    clock::SystemClock,
    config::Args,
    db::MongoStore,
    limiter::{spawn_sweep_task, SWEEP_INTERVAL},
    pipeline::{spawn_token_purge_task, Gatehouse, TOKEN_PURGE_INTERVAL},
    server::{self, AppState},
    store::MemoryStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("gatehouse={},info", args.log_level).into());
    let (pretty, json) = if args.json_logs() {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Gatehouse");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Environment: {}", args.environment);
    info!(
        "Rate limiter: {} ({} rps, burst {})",
        if args.limiter_enabled { "enabled" } else { "disabled" },
        args.limiter_rps,
        args.limiter_burst
    );
    info!("Trusted CORS origins: {:?}", args.trusted_origins());
    info!(
        "Version: {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown")
    );
    info!("======================================");

    let clock = Arc::new(SystemClock);
    let mailer = Arc::new(TracingMailer);

    let gatehouse = match &args.mongodb_uri {
        Some(uri) => {
            let store = MongoStore::connect(uri, &args.mongodb_db).await?;
            info!("MongoDB: {}", store.db_name());
            Gatehouse::new(
                Arc::new(store),
                args.limiter_config(),
                mailer,
                clock,
                args.token_ttls(),
            )
        }
        None => {
            warn!("MONGODB_URI not set, state is kept in memory and lost on restart");
            Gatehouse::new(
                Arc::new(MemoryStore::new()),
                args.limiter_config(),
                mailer,
                clock,
                args.token_ttls(),
            )
        }
    };
    let gatehouse = Arc::new(gatehouse);

    spawn_sweep_task(Arc::clone(gatehouse.limiter()), SWEEP_INTERVAL);
    spawn_token_purge_task(Arc::clone(&gatehouse), TOKEN_PURGE_INTERVAL);

    let state = Arc::new(AppState::new(args, gatehouse));
    server::run(state).await?;

    info!("Gatehouse stopped");
    Ok(())
}
