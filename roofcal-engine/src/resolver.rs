//! Tiered Resolver
//!
//! Decides which single source to trust for a location by trying adapters in
//! a fixed priority order and stopping at the first success.
//!
//! # Tiers
//! 1. LiDAR
//! 2. Solar, high-quality imagery
//! 3. Solar, medium-quality imagery
//! 4. Solar, low-quality imagery
//! 5. OSM footprint + estimated pitch
//! 6. Footprint estimate (Microsoft footprint, else traced outline)
//! 7. Manual placeholder (always succeeds, confidence 0)
//!
//! Tiers 2-4 are sub-classifications of one Solar call's imagery quality.
//!
//! # Invariants
//! - Sequential and short-circuiting: no later adapter runs once a tier wins
//! - Every tier below the winning one appears exactly once in
//!   `higher_tier_failures`, in tier order
//! - Never blends: the returned measurement comes from exactly one adapter
//! - Never fails: source problems become `TierFailure` entries; tier 7 is
//!   the degraded result

use crate::confidence::{ConfidenceFactors, ConfidenceScorer};
use crate::error::SourceError;
use crate::geometry::{self, SQ_M_TO_SQ_FT};
use crate::sources::{BuildingFootprint, FetchContext, SourceRegistry};
use crate::types::{
    FailureKind, ImageryQuality, LatLng, MeasurementResult, MeasurementSource, MeasurementTier,
    TierFailure, TieredMeasurementResult,
};
use roofcal_common::config::ResolverSettings;
use roofcal_common::time;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Fallback name for the manual tracing workflow
pub const MANUAL_TRACING: &str = "manual-tracing";

/// Per-call resolver options
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Caller deadline threaded into every adapter call
    pub deadline: Option<Instant>,
}

impl ResolveOptions {
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }
}

/// Reason a tier attempt did not produce a measurement
#[derive(Debug, Clone)]
struct Skip {
    kind: FailureKind,
    reason: String,
}

impl Skip {
    fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    fn not_configured(source: &str) -> Self {
        Self::new(
            FailureKind::NotConfigured,
            format!("{} adapter not configured (missing credential)", source),
        )
    }

    fn no_data(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::NoDataAtLocation, reason)
    }
}

impl From<SourceError> for Skip {
    fn from(err: SourceError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Run one adapter call, honoring an already-passed deadline
async fn call<T, F>(ctx: &FetchContext, fut: F) -> Result<T, Skip>
where
    F: Future<Output = Result<T, SourceError>>,
{
    if ctx.is_expired() {
        return Err(Skip::new(
            FailureKind::DeadlineExceeded,
            "deadline exceeded before call",
        ));
    }
    fut.await.map_err(Skip::from)
}

/// Tiered Resolver
pub struct TieredResolver {
    sources: SourceRegistry,
    settings: ResolverSettings,
    scorer: ConfidenceScorer,
}

impl TieredResolver {
    pub fn new(sources: SourceRegistry, settings: ResolverSettings) -> Self {
        Self {
            sources,
            settings,
            scorer: ConfidenceScorer::new(),
        }
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Resolve the best available measurement for a location
    pub async fn resolve(&self, location: LatLng, opts: &ResolveOptions) -> TieredMeasurementResult {
        let ctx = FetchContext::with_deadline(opts.deadline);
        let mut failures: Vec<TierFailure> = Vec::new();

        debug!(%location, "Resolving measurement");

        // Tier 1: LiDAR
        match self.try_lidar(location, &ctx).await {
            Ok(measurement) => {
                return self.finish(MeasurementTier::Lidar, measurement, failures);
            }
            Err(skip) => record(&mut failures, MeasurementTier::Lidar, skip),
        }

        // Tiers 2-4: one Solar call, classified by imagery quality
        match self.try_solar(location, &ctx).await {
            Ok((tier, measurement)) => {
                for higher in [MeasurementTier::SolarHigh, MeasurementTier::SolarMedium] {
                    if higher < tier {
                        record(
                            &mut failures,
                            higher,
                            Skip::new(
                                FailureKind::QualityTooLow,
                                format!(
                                    "solar imagery quality too low ({})",
                                    measurement.imagery_quality.as_str()
                                ),
                            ),
                        );
                    }
                }
                return self.finish(tier, measurement, failures);
            }
            Err(skip) => {
                for tier in [
                    MeasurementTier::SolarHigh,
                    MeasurementTier::SolarMedium,
                    MeasurementTier::SolarLow,
                ] {
                    record(&mut failures, tier, skip.clone());
                }
            }
        }

        // Tier 5: OSM footprint + estimated pitch
        match self.try_osm(location, &ctx).await {
            Ok(measurement) => {
                return self.finish(MeasurementTier::OsmEstimatedPitch, measurement, failures);
            }
            Err(skip) => record(&mut failures, MeasurementTier::OsmEstimatedPitch, skip),
        }

        // Tier 6: footprint estimate
        match self.try_footprint_estimate(location, &ctx).await {
            Ok(measurement) => {
                return self.finish(MeasurementTier::FootprintEstimate, measurement, failures);
            }
            Err(skip) => record(&mut failures, MeasurementTier::FootprintEstimate, skip),
        }

        // Tier 7: manual placeholder
        warn!(%location, "No automated measurement source succeeded; manual tracing required");
        self.finish(
            MeasurementTier::ManualPlaceholder,
            MeasurementResult::manual_placeholder(),
            failures,
        )
    }

    fn finish(
        &self,
        tier: MeasurementTier,
        measurement: MeasurementResult,
        failures: Vec<TierFailure>,
    ) -> TieredMeasurementResult {
        info!(
            tier = tier.number(),
            tier_name = tier.name(),
            source = measurement.source.as_str(),
            adjusted_area_sq_ft = measurement.adjusted_area_sq_ft,
            confidence = measurement.confidence,
            skipped = failures.len(),
            "Measurement resolved"
        );

        TieredMeasurementResult {
            measurement,
            tier_used: tier.number(),
            tier_name: tier.name().to_string(),
            higher_tier_failures: failures,
            fallbacks_available: self.fallbacks_after(tier),
        }
    }

    /// Configured lower-priority alternatives, ending with manual tracing
    fn fallbacks_after(&self, used: MeasurementTier) -> Vec<String> {
        let mut fallbacks = Vec::new();
        if used == MeasurementTier::ManualPlaceholder {
            return fallbacks;
        }
        if used < MeasurementTier::SolarHigh && self.sources.solar.is_some() {
            fallbacks.push("solar".to_string());
        }
        if used < MeasurementTier::OsmEstimatedPitch && self.sources.osm.is_some() {
            fallbacks.push(MeasurementTier::OsmEstimatedPitch.name().to_string());
        }
        if used < MeasurementTier::FootprintEstimate && self.sources.has_footprint_estimate() {
            fallbacks.push(MeasurementTier::FootprintEstimate.name().to_string());
        }
        fallbacks.push(MANUAL_TRACING.to_string());
        fallbacks
    }

    /// Providers report 0 segments when plane segmentation is unavailable
    fn segments_or_default(&self, reported: u32) -> u32 {
        if reported == 0 {
            self.settings.default_segment_count
        } else {
            reported
        }
    }

    async fn try_lidar(&self, location: LatLng, ctx: &FetchContext) -> Result<MeasurementResult, Skip> {
        let source = self
            .sources
            .lidar
            .as_ref()
            .ok_or_else(|| Skip::not_configured("LiDAR"))?;

        let lidar = call(ctx, source.fetch_lidar(location, ctx)).await?;
        if !(lidar.footprint_area_sq_m > 0.0) {
            return Err(Skip::no_data("LiDAR returned an empty footprint"));
        }

        let segments = self.segments_or_default(lidar.segment_count);
        let measurement = MeasurementResult::from_footprint(
            lidar.footprint_area_sq_m * SQ_M_TO_SQ_FT,
            lidar.pitch_degrees,
            segments,
            MeasurementSource::Lidar,
        );
        let confidence = self.scorer.score(&ConfidenceFactors {
            has_lidar: true,
            segment_count: Some(segments),
            pitch_degrees: Some(lidar.pitch_degrees),
            ..Default::default()
        });

        Ok(measurement.with_confidence(confidence.score))
    }

    async fn try_solar(
        &self,
        location: LatLng,
        ctx: &FetchContext,
    ) -> Result<(MeasurementTier, MeasurementResult), Skip> {
        let source = self
            .sources
            .solar
            .as_ref()
            .ok_or_else(|| Skip::not_configured("Solar"))?;

        let solar = call(ctx, source.fetch_solar(location, ctx)).await?;
        if !(solar.roof_area_sq_m > 0.0) {
            return Err(Skip::no_data("Solar returned no roof area"));
        }

        let tier = MeasurementTier::for_solar_quality(solar.imagery_quality);
        let segments = self.segments_or_default(solar.segment_count);
        let mut measurement = MeasurementResult::from_roof_area(
            solar.roof_area_sq_m * SQ_M_TO_SQ_FT,
            solar.pitch_degrees,
            segments,
            MeasurementSource::Solar,
        )
        .with_imagery(solar.imagery_quality, solar.imagery_date);
        if let Some(footprint) = solar.footprint_area_sq_m.filter(|a| *a > 0.0) {
            measurement.footprint_area_sq_ft = footprint * SQ_M_TO_SQ_FT;
        }

        let today = time::now().date_naive();
        let confidence = self.scorer.score(&ConfidenceFactors {
            imagery_quality: Some(solar.imagery_quality),
            imagery_age_years: solar
                .imagery_date
                .map(|d| (today - d).num_days().max(0) as f64 / time::DAYS_PER_YEAR),
            segment_count: Some(segments),
            pitch_degrees: Some(solar.pitch_degrees),
            ..Default::default()
        });

        Ok((tier, measurement.with_confidence(confidence.score)))
    }

    async fn try_osm(&self, location: LatLng, ctx: &FetchContext) -> Result<MeasurementResult, Skip> {
        let source = self
            .sources
            .osm
            .as_ref()
            .ok_or_else(|| Skip::not_configured("OSM"))?;

        let footprint = call(ctx, source.fetch_footprint(location, ctx)).await?;
        self.measure_outline(
            location,
            ctx,
            &footprint,
            MeasurementSource::Osm,
            None,
        )
        .await
    }

    async fn try_footprint_estimate(
        &self,
        location: LatLng,
        ctx: &FetchContext,
    ) -> Result<MeasurementResult, Skip> {
        if !self.sources.has_footprint_estimate() {
            return Err(Skip::not_configured("Footprint estimate"));
        }

        let mut reasons = Vec::new();
        let mut last_kind = FailureKind::NotConfigured;

        if let Some(source) = &self.sources.microsoft {
            let attempt = match call(ctx, source.fetch_footprint(location, ctx)).await {
                Ok(footprint) => {
                    self.measure_outline(
                        location,
                        ctx,
                        &footprint,
                        MeasurementSource::FootprintEstimate,
                        None,
                    )
                    .await
                }
                Err(skip) => Err(skip),
            };
            match attempt {
                Ok(measurement) => return Ok(measurement),
                Err(skip) => {
                    debug!(reason = %skip.reason, "Microsoft footprint unavailable");
                    last_kind = skip.kind;
                    reasons.push(format!("{}: {}", source.name(), skip.reason));
                }
            }
        }

        if let Some(tracer) = &self.sources.outline_tracer {
            let attempt = match call(ctx, tracer.trace_outline(location, ctx)).await {
                Ok(outline) => {
                    let footprint = BuildingFootprint {
                        polygon: outline.polygon,
                        source_id: None,
                    };
                    self.measure_outline(
                        location,
                        ctx,
                        &footprint,
                        MeasurementSource::FootprintEstimate,
                        Some(outline.confidence),
                    )
                    .await
                }
                Err(skip) => Err(skip),
            };
            match attempt {
                Ok(measurement) => return Ok(measurement),
                Err(skip) => {
                    debug!(reason = %skip.reason, "Outline tracing unavailable");
                    last_kind = skip.kind;
                    reasons.push(format!("{}: {}", tracer.name(), skip.reason));
                }
            }
        }

        Err(Skip::new(last_kind, reasons.join("; ")))
    }

    /// Measure a footprint outline with an estimated pitch
    async fn measure_outline(
        &self,
        location: LatLng,
        ctx: &FetchContext,
        footprint: &BuildingFootprint,
        source: MeasurementSource,
        confidence_cap: Option<f64>,
    ) -> Result<MeasurementResult, Skip> {
        if footprint.polygon.len() < 3 {
            return Err(Skip::no_data(format!(
                "footprint has {} vertices",
                footprint.polygon.len()
            )));
        }

        let analysis = geometry::analyze_geometry(&footprint.polygon);
        if !(analysis.area_sq_m > 0.0) {
            return Err(Skip::no_data("footprint has no area"));
        }

        let (pitch_degrees, pitch_note) = self.estimate_pitch(location, ctx).await;
        let mut measurement = MeasurementResult::from_footprint(
            analysis.area_sq_m * SQ_M_TO_SQ_FT,
            pitch_degrees,
            analysis.estimated_segments,
            source,
        )
        .with_warning(pitch_note);
        measurement.complexity = analysis.complexity;

        let scored = self
            .scorer
            .score(&ConfidenceFactors {
                imagery_quality: Some(ImageryQuality::Unknown),
                segment_count: Some(analysis.estimated_segments),
                pitch_degrees: Some(pitch_degrees),
                ..Default::default()
            })
            .score;
        let confidence = match confidence_cap {
            Some(cap) => scored.min(cap),
            None => scored,
        };

        Ok(measurement.with_confidence(confidence))
    }

    /// Elevation-derived pitch when available, else the configured default
    async fn estimate_pitch(&self, location: LatLng, ctx: &FetchContext) -> (f64, String) {
        if let Some(source) = &self.sources.elevation {
            match call(ctx, source.fetch_elevation(location, ctx)).await {
                Ok(sample) => {
                    if let Some(pitch) = sample
                        .roof_pitch_degrees
                        .filter(|p| p.is_finite() && (0.0..=75.0).contains(p))
                    {
                        return (
                            pitch,
                            format!("Pitch {:.1}° derived from {} elevation", pitch, source.name()),
                        );
                    }
                    debug!("Elevation sample has no usable roof pitch");
                }
                Err(skip) => {
                    warn!(reason = %skip.reason, "Elevation lookup failed; using default pitch");
                }
            }
        }

        let rise = self.settings.default_pitch_rise;
        (
            geometry::pitch_degrees_from_rise(rise),
            format!("Pitch estimated at default {}/12", rise),
        )
    }
}

fn record(failures: &mut Vec<TierFailure>, tier: MeasurementTier, skip: Skip) {
    debug!(
        tier = tier.number(),
        tier_name = tier.name(),
        kind = ?skip.kind,
        reason = %skip.reason,
        "Tier skipped"
    );
    failures.push(TierFailure::new(tier, skip.kind, skip.reason));
}
