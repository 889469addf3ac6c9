//! Report Assembler
//!
//! Thin orchestration over the core components:
//! resolve → calibrate → imagery consensus → cross-validate → score.
//!
//! `measure` never fails because of a source problem. Calibration store
//! errors are logged and reported as "not applied".

use crate::calibration::{CalibrationApplication, Calibrator};
use crate::confidence::{
    ConfidenceFactor, ConfidenceFactors, ConfidenceLevel, ConfidenceResult, ConfidenceScorer,
};
use crate::consensus::{ConsensusOptions, MultiSourceConsensus, MultiSourceImagerySet};
use crate::resolver::{ResolveOptions, TieredResolver};
use crate::sources::SourceRegistry;
use crate::types::{LatLng, MeasurementResult, MeasurementSource, TieredMeasurementResult};
use crate::validation::{self, SecondaryMeasurement, ValidationResult};
use roofcal_common::config::EngineConfig;
use roofcal_common::time;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct MeasureOptions {
    pub deadline: Option<Instant>,
    /// Region to calibrate against (e.g. postal-code prefix)
    pub region_key: Option<String>,
    /// Fetch free imagery for consensus and cross-validation
    pub include_imagery: bool,
}

/// Externally visible result of one measurement request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub location: LatLng,
    /// Final measurement (calibrated when a correction was applied)
    pub measurement: MeasurementResult,
    pub resolution: TieredMeasurementResult,
    pub calibration: Option<CalibrationApplication>,
    pub validation: ValidationResult,
    pub imagery: Option<MultiSourceImagerySet>,
    /// Explanation of the final measurement's trustworthiness
    pub confidence: ConfidenceResult,
}

/// Measurement engine
pub struct MeasurementEngine {
    resolver: TieredResolver,
    calibrator: Arc<Calibrator>,
    consensus: MultiSourceConsensus,
    scorer: ConfidenceScorer,
}

impl MeasurementEngine {
    pub fn new(sources: SourceRegistry, calibrator: Arc<Calibrator>, config: &EngineConfig) -> Self {
        let consensus = MultiSourceConsensus::new(sources.imagery.clone(), config.consensus.clone());
        Self {
            resolver: TieredResolver::new(sources, config.resolver.clone()),
            calibrator,
            consensus,
            scorer: ConfidenceScorer::new(),
        }
    }

    pub fn resolver(&self) -> &TieredResolver {
        &self.resolver
    }

    pub fn calibrator(&self) -> &Arc<Calibrator> {
        &self.calibrator
    }

    pub fn consensus(&self) -> &MultiSourceConsensus {
        &self.consensus
    }

    /// Produce a full report for a location
    pub async fn measure(&self, location: LatLng, opts: &MeasureOptions) -> MeasurementReport {
        let resolution = self
            .resolver
            .resolve(location, &ResolveOptions { deadline: opts.deadline })
            .await;

        let calibration = match &opts.region_key {
            Some(region_key) if !resolution.is_degraded() => {
                match self.calibrator.apply(&resolution.measurement, region_key).await {
                    Ok(application) => Some(application),
                    Err(e) => {
                        warn!(region = %region_key, error = %e, "Calibration unavailable");
                        Some(CalibrationApplication {
                            measurement: resolution.measurement.clone(),
                            applied: false,
                            gaf_calibrated: false,
                            details: format!("Calibration unavailable: {}", e),
                        })
                    }
                }
            }
            _ => None,
        };

        let measurement = match &calibration {
            Some(application) => application.measurement.clone(),
            None => resolution.measurement.clone(),
        };

        let imagery = if opts.include_imagery && self.consensus.provider_count() > 0 {
            let consensus_opts = ConsensusOptions {
                deadline: opts.deadline,
                capture_date: None,
            };
            Some(self.consensus.fetch_all(location, &consensus_opts).await)
        } else {
            None
        };

        let secondaries: Vec<SecondaryMeasurement> = imagery
            .as_ref()
            .map(|set| {
                set.footprint_areas()
                    .into_iter()
                    .map(|(provider, area)| SecondaryMeasurement::new(provider, area))
                    .collect()
            })
            .unwrap_or_default();
        let validation = validation::validate(&measurement, &secondaries);

        let confidence = if resolution.is_degraded() {
            degraded_confidence()
        } else {
            self.scorer.score(&self.factors_for(
                &measurement,
                calibration.as_ref(),
                imagery.as_ref(),
            ))
        };

        info!(
            %location,
            tier = resolution.tier_used,
            adjusted_area_sq_ft = measurement.adjusted_area_sq_ft,
            calibrated = calibration.as_ref().is_some_and(|c| c.applied),
            validation = ?validation.overall_validation,
            confidence = confidence.score,
            "Measurement report assembled"
        );

        MeasurementReport {
            location,
            measurement,
            resolution,
            calibration,
            validation,
            imagery,
            confidence,
        }
    }

    fn factors_for(
        &self,
        measurement: &MeasurementResult,
        calibration: Option<&CalibrationApplication>,
        imagery: Option<&MultiSourceImagerySet>,
    ) -> ConfidenceFactors {
        let today = time::now().date_naive();
        let (source_count, agreement_percent) = match imagery {
            Some(set) => (set.footprint_areas().len(), set.agreement_percent()),
            None => (1, None),
        };

        ConfidenceFactors {
            gaf_calibrated: calibration.is_some_and(|c| c.applied && c.gaf_calibrated),
            has_lidar: measurement.source == MeasurementSource::Lidar,
            imagery_quality: match measurement.source {
                MeasurementSource::Lidar => None,
                _ => Some(measurement.imagery_quality),
            },
            imagery_age_years: measurement
                .imagery_date
                .map(|d| (today - d).num_days().max(0) as f64 / time::DAYS_PER_YEAR),
            segment_count: Some(measurement.segment_count),
            pitch_degrees: Some(measurement.pitch_degrees),
            source_count,
            agreement_percent,
        }
    }
}

fn degraded_confidence() -> ConfidenceResult {
    ConfidenceResult {
        score: 0.0,
        level: ConfidenceLevel::Low,
        factors: vec![ConfidenceFactor {
            name: "manual-tracing".to_string(),
            impact: 0.0,
            description: "No automated measurement; manual tracing required".to_string(),
        }],
    }
}
