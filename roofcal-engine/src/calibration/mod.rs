//! Self-Learning Calibrator
//!
//! Learns per-region correction factors from verified ground truth and
//! applies them to later measurements.
//!
//! # Concurrency
//! `learn` is a read-modify-write of one region's model. Learns on the same
//! region key serialize on a per-key lock; learns on different keys proceed
//! independently. `import` takes the store exclusively.
//!
//! # Backup Format
//! `export` writes canonical pretty-printed JSON (models sorted by region
//! key, points in insertion order). `import` of an exported document followed
//! by `export` reproduces it byte for byte.

pub mod model;
pub mod store;

pub use model::{
    CorrectionDataPoint, CorrectionSource, RecommendedAction, RegionCorrectionModel,
    TrendDirection,
};
pub use store::{CalibrationStore, InMemoryCalibrationStore};

use crate::error::{CalibrationError, CalibrationResult};
use crate::types::MeasurementResult;
use roofcal_common::config::CalibrationSettings;
use roofcal_common::time;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Version tag written into every backup
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Outcome of applying a regional correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationApplication {
    pub measurement: MeasurementResult,
    pub applied: bool,
    /// Applied model includes GAF-report ground truth
    pub gaf_calibrated: bool,
    pub details: String,
}

/// Aggregate view over all stored regions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStats {
    pub region_count: usize,
    pub total_samples: usize,
    /// Unweighted mean of region factors; `None` without regions
    pub mean_correction_factor: Option<f64>,
    pub high_confidence_regions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationBackup {
    version: u32,
    models: Vec<RegionCorrectionModel>,
}

/// Self-Learning Calibrator
pub struct Calibrator {
    store: Arc<dyn CalibrationStore>,
    settings: CalibrationSettings,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    import_gate: RwLock<()>,
}

impl Calibrator {
    pub fn new(store: Arc<dyn CalibrationStore>, settings: CalibrationSettings) -> Self {
        Self {
            store,
            settings,
            key_locks: Mutex::new(HashMap::new()),
            import_gate: RwLock::new(()),
        }
    }

    /// Calibrator over a non-durable in-memory store
    pub fn in_memory(settings: CalibrationSettings) -> Self {
        Self::new(Arc::new(InMemoryCalibrationStore::new()), settings)
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    async fn key_lock(&self, region_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.entry(region_key.to_string()).or_default().clone()
    }

    /// Record a ground-truth observation and rebuild the region's model
    ///
    /// # Errors
    /// `InvalidInput` if `reference_area_sq_ft` is not a positive number,
    /// the ground truth is negative or not finite, or the key is blank.
    pub async fn learn(
        &self,
        region_key: &str,
        ground_truth_area_sq_ft: f64,
        reference_area_sq_ft: f64,
        source: CorrectionSource,
        confidence: f64,
    ) -> CalibrationResult<RegionCorrectionModel> {
        let point = CorrectionDataPoint::new(
            region_key.trim(),
            reference_area_sq_ft,
            ground_truth_area_sq_ft,
            source,
            confidence,
            time::now(),
        );
        self.record(point).await
    }

    /// Append an already-built data point (used for backfilling history)
    pub async fn record(&self, point: CorrectionDataPoint) -> CalibrationResult<RegionCorrectionModel> {
        validate_point(&point)?;

        let _gate = self.import_gate.read().await;
        let lock = self.key_lock(&point.region_key).await;
        let _guard = lock.lock().await;

        let region_key = point.region_key.clone();
        let mut points = match self.store.get(&region_key).await? {
            Some(existing) => existing.data_points,
            None => Vec::new(),
        };
        points.push(point);

        let model = RegionCorrectionModel::recompute(&region_key, points, &self.settings, time::now());
        self.store.put(&model).await?;

        info!(
            region = %region_key,
            correction_factor = model.correction_factor,
            samples = model.sample_count,
            effective_samples = model.effective_sample_count,
            weighted_confidence = model.weighted_confidence,
            action = model.recommended_action.as_str(),
            "Calibration model updated"
        );

        Ok(model)
    }

    /// Apply the region's correction to a measurement
    ///
    /// No-op (`applied == false`) when the region has no model or fewer than
    /// `min_samples` effective samples.
    pub async fn apply(
        &self,
        measurement: &MeasurementResult,
        region_key: &str,
    ) -> CalibrationResult<CalibrationApplication> {
        let area = measurement.adjusted_area_sq_ft;
        if !area.is_finite() || area < 0.0 {
            return Err(CalibrationError::InvalidInput(format!(
                "adjusted area must be a non-negative number, got {}",
                area
            )));
        }

        let region_key = region_key.trim();
        let model = match self.store.get(region_key).await? {
            Some(model) => model,
            None => {
                return Ok(not_applied(
                    measurement,
                    format!("No calibration data for region {}", region_key),
                ));
            }
        };

        if !model.is_applicable(&self.settings) {
            return Ok(not_applied(
                measurement,
                format!(
                    "Region {} has {} usable samples (needs {})",
                    region_key, model.effective_sample_count, self.settings.min_samples
                ),
            ));
        }

        let boost = (model.weighted_confidence - measurement.confidence).clamp(0.0, 15.0);
        let confidence = (measurement.confidence + boost).min(model::MAX_MODEL_CONFIDENCE);
        let details = format!(
            "Calibrated for region {}: factor {:.3} from {} samples ({})",
            region_key,
            model.correction_factor,
            model.effective_sample_count,
            model.recommended_action.as_str()
        );

        let corrected = measurement
            .with_adjusted_area(area * model.correction_factor)
            .with_confidence(confidence)
            .with_warning(details.clone());

        debug!(
            region = %region_key,
            original_area = area,
            corrected_area = corrected.adjusted_area_sq_ft,
            confidence_boost = boost,
            "Calibration applied"
        );

        Ok(CalibrationApplication {
            measurement: corrected,
            applied: true,
            gaf_calibrated: model
                .data_points
                .iter()
                .any(|p| p.source == CorrectionSource::GafReport),
            details,
        })
    }

    pub async fn model(&self, region_key: &str) -> CalibrationResult<Option<RegionCorrectionModel>> {
        Ok(self.store.get(region_key.trim()).await?)
    }

    /// All models sorted by region key
    pub async fn models(&self) -> CalibrationResult<Vec<RegionCorrectionModel>> {
        Ok(self.store.list().await?)
    }

    pub async fn remove(&self, region_key: &str) -> CalibrationResult<bool> {
        let region_key = region_key.trim();
        let lock = self.key_lock(region_key).await;
        let _guard = lock.lock().await;
        let removed = self.store.remove(region_key).await?;
        if removed {
            info!(region = %region_key, "Calibration model removed");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> CalibrationResult<CalibrationStats> {
        let models = self.store.list().await?;
        let region_count = models.len();
        let mean_correction_factor = if region_count == 0 {
            None
        } else {
            Some(models.iter().map(|m| m.correction_factor).sum::<f64>() / region_count as f64)
        };

        Ok(CalibrationStats {
            region_count,
            total_samples: models.iter().map(|m| m.sample_count).sum(),
            mean_correction_factor,
            high_confidence_regions: models
                .iter()
                .filter(|m| m.recommended_action == RecommendedAction::HighConfidence)
                .count(),
        })
    }

    /// Canonical JSON backup of every model
    pub async fn export(&self) -> CalibrationResult<String> {
        let backup = CalibrationBackup {
            version: BACKUP_FORMAT_VERSION,
            models: self.store.list().await?,
        };
        serde_json::to_string_pretty(&backup)
            .map_err(|e| CalibrationError::Store(roofcal_common::Error::Serialization(e)))
    }

    /// Replace every stored model with the contents of a backup
    ///
    /// Returns the number of regions restored. Models are stored as written;
    /// they are not recomputed against the current clock.
    pub async fn import(&self, json: &str) -> CalibrationResult<usize> {
        let backup: CalibrationBackup = serde_json::from_str(json)
            .map_err(|e| CalibrationError::Import(format!("malformed backup: {}", e)))?;

        if backup.version != BACKUP_FORMAT_VERSION {
            return Err(CalibrationError::Import(format!(
                "unsupported backup version {} (expected {})",
                backup.version, BACKUP_FORMAT_VERSION
            )));
        }

        let mut seen = HashSet::new();
        for model in &backup.models {
            if !seen.insert(model.region_key.as_str()) {
                return Err(CalibrationError::Import(format!(
                    "duplicate region {}",
                    model.region_key
                )));
            }
            if model.sample_count != model.data_points.len() {
                return Err(CalibrationError::Import(format!(
                    "region {} declares {} samples but has {} data points",
                    model.region_key,
                    model.sample_count,
                    model.data_points.len()
                )));
            }
            if let Some(stray) = model
                .data_points
                .iter()
                .find(|p| p.region_key != model.region_key)
            {
                return Err(CalibrationError::Import(format!(
                    "data point {} belongs to region {}, not {}",
                    stray.id, stray.region_key, model.region_key
                )));
            }
        }

        let _gate = self.import_gate.write().await;
        self.store.replace_all(&backup.models).await?;

        info!(regions = backup.models.len(), "Calibration backup imported");
        Ok(backup.models.len())
    }
}

fn not_applied(measurement: &MeasurementResult, details: String) -> CalibrationApplication {
    debug!("{}", details);
    CalibrationApplication {
        measurement: measurement.clone(),
        applied: false,
        gaf_calibrated: false,
        details,
    }
}

fn validate_point(point: &CorrectionDataPoint) -> CalibrationResult<()> {
    if point.region_key.is_empty() {
        return Err(CalibrationError::InvalidInput(
            "region key must not be empty".to_string(),
        ));
    }
    if !(point.reference_area_sq_ft.is_finite() && point.reference_area_sq_ft > 0.0) {
        return Err(CalibrationError::InvalidInput(format!(
            "reference area must be positive, got {}",
            point.reference_area_sq_ft
        )));
    }
    if !(point.ground_truth_area_sq_ft.is_finite() && point.ground_truth_area_sq_ft >= 0.0) {
        return Err(CalibrationError::InvalidInput(format!(
            "ground truth area must be a non-negative number, got {}",
            point.ground_truth_area_sq_ft
        )));
    }
    if !point.confidence.is_finite() {
        return Err(CalibrationError::InvalidInput(
            "confidence must be a number".to_string(),
        ));
    }
    Ok(())
}
