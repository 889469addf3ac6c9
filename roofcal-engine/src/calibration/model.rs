//! Regional correction model
//!
//! A `RegionCorrectionModel` is fully recomputed from its data points on
//! every insert:
//! 1. Drop stale points (older than `max_age_days`)
//! 2. Drop outliers: |factor − mean| > `outlier_sigma` × std dev, where mean
//!    and std dev are taken over the other fresh points (leave-one-out) and
//!    the std dev is floored at `MIN_OUTLIER_SPREAD`
//! 3. Weight each survivor: 0.9^ageYears × confidence/100 × source weight
//! 4. Factor = weighted mean; confidence = min(95, weighted mean + 5·(n−1))
//! 5. Trend from chronological halves, recommendation from n and confidence

use chrono::{DateTime, Utc};
use roofcal_common::config::CalibrationSettings;
use roofcal_common::time;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Annual decay of a data point's weight
pub const ANNUAL_DECAY: f64 = 0.9;
/// Upper bound of a model's weighted confidence
pub const MAX_MODEL_CONFIDENCE: f64 = 95.0;
/// Confidence added per additional effective sample
pub const CONFIDENCE_PER_SAMPLE: f64 = 5.0;
/// Weighted confidence required for a high-confidence recommendation
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 85.0;
/// Half-to-half change in distance from 1.0 treated as noise
pub const TREND_DEADBAND: f64 = 0.02;
/// Smallest spread an outlier test uses, so agreeing regions tolerate small noise
pub const MIN_OUTLIER_SPREAD: f64 = 0.05;

/// Kind of ground truth behind a data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrectionSource {
    GafReport,
    Lidar,
    ManualVerification,
}

impl CorrectionSource {
    pub fn weight(&self) -> f64 {
        match self {
            CorrectionSource::Lidar => 1.2,
            CorrectionSource::GafReport => 1.0,
            CorrectionSource::ManualVerification => 0.8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionSource::GafReport => "gaf-report",
            CorrectionSource::Lidar => "lidar",
            CorrectionSource::ManualVerification => "manual-verification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gaf-report" | "gaf" => Some(CorrectionSource::GafReport),
            "lidar" => Some(CorrectionSource::Lidar),
            "manual-verification" | "manual" => Some(CorrectionSource::ManualVerification),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrendDirection {
    Stable,
    Improving,
    Degrading,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Stable => "stable",
            TrendDirection::Improving => "improving",
            TrendDirection::Degrading => "degrading",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stable" => Some(TrendDirection::Stable),
            "improving" => Some(TrendDirection::Improving),
            "degrading" => Some(TrendDirection::Degrading),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendedAction {
    NeedsMoreData,
    ApplyCorrection,
    HighConfidence,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::NeedsMoreData => "needs-more-data",
            RecommendedAction::ApplyCorrection => "apply-correction",
            RecommendedAction::HighConfidence => "high-confidence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "needs-more-data" => Some(RecommendedAction::NeedsMoreData),
            "apply-correction" => Some(RecommendedAction::ApplyCorrection),
            "high-confidence" => Some(RecommendedAction::HighConfidence),
            _ => None,
        }
    }
}

/// One verified ground-truth observation (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionDataPoint {
    pub id: Uuid,
    pub region_key: String,
    pub reference_area_sq_ft: f64,
    pub ground_truth_area_sq_ft: f64,
    /// ground truth / reference
    pub correction_factor: f64,
    pub source: CorrectionSource,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
}

impl CorrectionDataPoint {
    /// Caller guarantees `reference_area_sq_ft > 0`
    pub fn new(
        region_key: impl Into<String>,
        reference_area_sq_ft: f64,
        ground_truth_area_sq_ft: f64,
        source: CorrectionSource,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            region_key: region_key.into(),
            reference_area_sq_ft,
            ground_truth_area_sq_ft,
            correction_factor: ground_truth_area_sq_ft / reference_area_sq_ft,
            source,
            timestamp,
            confidence: confidence.clamp(0.0, 100.0),
        }
    }

    fn weight(&self, now: DateTime<Utc>) -> f64 {
        let age_years = time::age_years(self.timestamp, now);
        ANNUAL_DECAY.powf(age_years) * (self.confidence / 100.0) * self.source.weight()
    }
}

/// Per-region correction model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionCorrectionModel {
    pub region_key: String,
    pub correction_factor: f64,
    /// Always `data_points.len()`
    pub sample_count: usize,
    /// Points surviving stale and outlier filtering
    pub effective_sample_count: usize,
    pub weighted_confidence: f64,
    pub trend_direction: TrendDirection,
    pub recommended_action: RecommendedAction,
    pub data_points: Vec<CorrectionDataPoint>,
}

impl RegionCorrectionModel {
    /// Rebuild the model from its full point history
    pub fn recompute(
        region_key: &str,
        data_points: Vec<CorrectionDataPoint>,
        settings: &CalibrationSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let effective = effective_points(&data_points, settings, now);
        let n = effective.len();

        let (correction_factor, weighted_confidence) = if n == 0 {
            (1.0, 0.0)
        } else {
            let weights: Vec<f64> = effective.iter().map(|p| p.weight(now)).collect();
            let total: f64 = weights.iter().sum();
            // Zero-confidence points still carry their factor
            let weights = if total > 0.0 {
                weights
            } else {
                vec![1.0; n]
            };
            let total: f64 = weights.iter().sum();

            let factor = effective
                .iter()
                .zip(&weights)
                .map(|(p, w)| p.correction_factor * w)
                .sum::<f64>()
                / total;
            let mean_confidence = effective
                .iter()
                .zip(&weights)
                .map(|(p, w)| p.confidence * w)
                .sum::<f64>()
                / total;

            (
                factor,
                (mean_confidence + CONFIDENCE_PER_SAMPLE * (n as f64 - 1.0))
                    .min(MAX_MODEL_CONFIDENCE),
            )
        };

        let recommended_action = if n < settings.min_samples {
            RecommendedAction::NeedsMoreData
        } else if weighted_confidence >= HIGH_CONFIDENCE_THRESHOLD
            && n >= settings.high_confidence_samples
        {
            RecommendedAction::HighConfidence
        } else {
            RecommendedAction::ApplyCorrection
        };

        Self {
            region_key: region_key.to_string(),
            correction_factor,
            sample_count: data_points.len(),
            effective_sample_count: n,
            weighted_confidence,
            trend_direction: trend(&effective),
            recommended_action,
            data_points,
        }
    }

    /// True when the model has enough effective samples to correct measurements
    pub fn is_applicable(&self, settings: &CalibrationSettings) -> bool {
        self.effective_sample_count >= settings.min_samples
    }
}

/// Points that are neither stale nor statistical outliers
fn effective_points<'a>(
    points: &'a [CorrectionDataPoint],
    settings: &CalibrationSettings,
    now: DateTime<Utc>,
) -> Vec<&'a CorrectionDataPoint> {
    let fresh: Vec<&CorrectionDataPoint> = points
        .iter()
        .filter(|p| p.correction_factor.is_finite())
        .filter(|p| time::age_days(p.timestamp, now) <= settings.max_age_days)
        .collect();

    // Two points give no majority to judge against
    if fresh.len() < 3 {
        return fresh;
    }

    let factors: Vec<f64> = fresh.iter().map(|p| p.correction_factor).collect();
    let mut others = Vec::with_capacity(factors.len() - 1);
    let mut kept = Vec::with_capacity(fresh.len());

    for (i, point) in fresh.into_iter().enumerate() {
        others.clear();
        others.extend(
            factors
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, f)| *f),
        );
        let (mean, std_dev) = mean_std(&others);
        let limit = settings.outlier_sigma * std_dev.max(MIN_OUTLIER_SPREAD);

        if (point.correction_factor - mean).abs() <= limit {
            kept.push(point);
        } else {
            warn!(
                region = %point.region_key,
                factor = point.correction_factor,
                mean,
                std_dev,
                "Rejecting outlier calibration point"
            );
        }
    }
    kept
}

/// Compare mean distance from 1.0 of the older and newer halves
fn trend(effective: &[&CorrectionDataPoint]) -> TrendDirection {
    if effective.len() < 2 {
        return TrendDirection::Stable;
    }

    let mut ordered: Vec<&CorrectionDataPoint> = effective.to_vec();
    ordered.sort_by_key(|p| p.timestamp);

    let half = ordered.len() / 2;
    let mean_of = |slice: &[&CorrectionDataPoint]| {
        slice.iter().map(|p| p.correction_factor).sum::<f64>() / slice.len() as f64
    };
    let older = (mean_of(&ordered[..half]) - 1.0).abs();
    let newer = (mean_of(&ordered[half..]) - 1.0).abs();
    let delta = newer - older;

    if delta.abs() < TREND_DEADBAND {
        TrendDirection::Stable
    } else if delta < 0.0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Degrading
    }
}

/// Mean and population standard deviation
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
