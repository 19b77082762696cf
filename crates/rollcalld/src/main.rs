use anyhow::{Context, Result};
use rollcall_core::OnnxExtractor;
use rollcall_store::SqliteBlobStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod attendance;
mod config;
mod dbus_interface;
mod enrollment;
mod pool;
#[cfg(test)]
mod testing;

use attendance::Attendance;
use config::{BusKind, Config};
use dbus_interface::{RollcallService, BUS_NAME, OBJECT_PATH};
use pool::ExtractorPool;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        model_dir = %config.model_dir.display(),
        db = %config.db_path.display(),
        workers = config.workers,
        tolerance = config.tolerance.value(),
        policy = ?config.match_policy,
        "configuration loaded"
    );

    let store = SqliteBlobStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open blob store {}", config.db_path.display()))?;

    let model_dir = config.model_dir.clone();
    let pool = ExtractorPool::spawn(config.workers, |worker| {
        tracing::debug!(worker, "loading models");
        OnnxExtractor::load(&model_dir)
    })
    .context("failed to start extractor pool")?;

    let attendance = Arc::new(Attendance::new(Arc::new(store), pool, &config));

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, RollcallService::new(attendance))?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
