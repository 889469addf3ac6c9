//! Database access for the calibration store
//!
//! SQLite file located by `EngineConfig::database_path`. Tables are created
//! on first open; the operation is idempotent.

pub mod calibration_store;

pub use calibration_store::SqliteCalibrationStore;

use roofcal_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Busy timeout applied to every connection
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Open (creating if needed) the calibration database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let newly_created = !db_path.exists();

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new calibration database: {}", db_path.display());
    } else {
        info!("Opened calibration database: {}", db_path.display());
    }

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create calibration tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS region_models (
            region_key TEXT PRIMARY KEY,
            correction_factor REAL NOT NULL,
            sample_count INTEGER NOT NULL,
            effective_sample_count INTEGER NOT NULL,
            weighted_confidence REAL NOT NULL,
            trend_direction TEXT NOT NULL,
            recommended_action TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS correction_data_points (
            id TEXT PRIMARY KEY,
            region_key TEXT NOT NULL REFERENCES region_models(region_key) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            reference_area_sq_ft REAL NOT NULL,
            ground_truth_area_sq_ft REAL NOT NULL,
            correction_factor REAL NOT NULL,
            source TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            confidence REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_correction_points_region ON correction_data_points(region_key, seq)",
    )
    .execute(pool)
    .await?;

    debug!("Calibration tables initialized (region_models, correction_data_points)");

    Ok(())
}
