//! SQLite-backed calibration store
//!
//! A model row lives in `region_models`; its points live in
//! `correction_data_points` ordered by `seq` (insertion order). `put`
//! rewrites both inside one transaction.

use crate::calibration::model::{
    CorrectionDataPoint, CorrectionSource, RecommendedAction, RegionCorrectionModel,
    TrendDirection,
};
use crate::calibration::store::CalibrationStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use roofcal_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

/// Durable `CalibrationStore`
#[derive(Debug, Clone)]
pub struct SqliteCalibrationStore {
    pool: SqlitePool,
}

impl SqliteCalibrationStore {
    /// Wrap a pool whose tables were created by `db::init_tables`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_points(&self, region_key: &str) -> Result<Vec<CorrectionDataPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT id, region_key, reference_area_sq_ft, ground_truth_area_sq_ft,
                   correction_factor, source, timestamp, confidence
            FROM correction_data_points
            WHERE region_key = ?
            ORDER BY seq
            "#,
        )
        .bind(region_key)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(point_from_row).collect()
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp '{}': {}", s, e)))
}

fn point_from_row(row: &SqliteRow) -> Result<CorrectionDataPoint> {
    let id: String = row.try_get("id")?;
    let source: String = row.try_get("source")?;
    let timestamp: String = row.try_get("timestamp")?;

    Ok(CorrectionDataPoint {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid data point id '{}': {}", id, e)))?,
        region_key: row.try_get("region_key")?,
        reference_area_sq_ft: row.try_get("reference_area_sq_ft")?,
        ground_truth_area_sq_ft: row.try_get("ground_truth_area_sq_ft")?,
        correction_factor: row.try_get("correction_factor")?,
        source: CorrectionSource::parse(&source)
            .ok_or_else(|| Error::Internal(format!("Unknown correction source '{}'", source)))?,
        timestamp: parse_timestamp(&timestamp)?,
        confidence: row.try_get("confidence")?,
    })
}

fn model_from_row(row: &SqliteRow, data_points: Vec<CorrectionDataPoint>) -> Result<RegionCorrectionModel> {
    let trend: String = row.try_get("trend_direction")?;
    let action: String = row.try_get("recommended_action")?;
    let sample_count: i64 = row.try_get("sample_count")?;
    let effective: i64 = row.try_get("effective_sample_count")?;

    let model = RegionCorrectionModel {
        region_key: row.try_get("region_key")?,
        correction_factor: row.try_get("correction_factor")?,
        sample_count: sample_count.max(0) as usize,
        effective_sample_count: effective.max(0) as usize,
        weighted_confidence: row.try_get("weighted_confidence")?,
        trend_direction: TrendDirection::parse(&trend)
            .ok_or_else(|| Error::Internal(format!("Unknown trend direction '{}'", trend)))?,
        recommended_action: RecommendedAction::parse(&action)
            .ok_or_else(|| Error::Internal(format!("Unknown recommended action '{}'", action)))?,
        data_points,
    };

    if model.sample_count != model.data_points.len() {
        return Err(Error::Internal(format!(
            "Region {} stores {} samples but {} data points",
            model.region_key,
            model.sample_count,
            model.data_points.len()
        )));
    }

    Ok(model)
}

/// Write one model and its points inside an open transaction
async fn write_model(tx: &mut Transaction<'_, Sqlite>, model: &RegionCorrectionModel) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO region_models (
            region_key, correction_factor, sample_count, effective_sample_count,
            weighted_confidence, trend_direction, recommended_action, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(region_key) DO UPDATE SET
            correction_factor = excluded.correction_factor,
            sample_count = excluded.sample_count,
            effective_sample_count = excluded.effective_sample_count,
            weighted_confidence = excluded.weighted_confidence,
            trend_direction = excluded.trend_direction,
            recommended_action = excluded.recommended_action,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&model.region_key)
    .bind(model.correction_factor)
    .bind(model.sample_count as i64)
    .bind(model.effective_sample_count as i64)
    .bind(model.weighted_confidence)
    .bind(model.trend_direction.as_str())
    .bind(model.recommended_action.as_str())
    .bind(format_timestamp(&roofcal_common::time::now()))
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM correction_data_points WHERE region_key = ?")
        .bind(&model.region_key)
        .execute(&mut **tx)
        .await?;

    for (seq, point) in model.data_points.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO correction_data_points (
                id, region_key, seq, reference_area_sq_ft, ground_truth_area_sq_ft,
                correction_factor, source, timestamp, confidence
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(point.id.to_string())
        .bind(&model.region_key)
        .bind(seq as i64)
        .bind(point.reference_area_sq_ft)
        .bind(point.ground_truth_area_sq_ft)
        .bind(point.correction_factor)
        .bind(point.source.as_str())
        .bind(format_timestamp(&point.timestamp))
        .bind(point.confidence)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl CalibrationStore for SqliteCalibrationStore {
    async fn get(&self, region_key: &str) -> Result<Option<RegionCorrectionModel>> {
        let row = sqlx::query("SELECT * FROM region_models WHERE region_key = ?")
            .bind(region_key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let points = self.load_points(region_key).await?;
                Ok(Some(model_from_row(&row, points)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, model: &RegionCorrectionModel) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_model(&mut tx, model).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, region_key: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM correction_data_points WHERE region_key = ?")
            .bind(region_key)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM region_models WHERE region_key = ?")
            .bind(region_key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<RegionCorrectionModel>> {
        let rows = sqlx::query("SELECT * FROM region_models ORDER BY region_key")
            .fetch_all(&self.pool)
            .await?;

        let mut models = Vec::with_capacity(rows.len());
        for row in &rows {
            let region_key: String = row.try_get("region_key")?;
            let points = self.load_points(&region_key).await?;
            models.push(model_from_row(row, points)?);
        }
        Ok(models)
    }

    async fn replace_all(&self, models: &[RegionCorrectionModel]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM correction_data_points")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM region_models")
            .execute(&mut *tx)
            .await?;
        for model in models {
            write_model(&mut tx, model).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
