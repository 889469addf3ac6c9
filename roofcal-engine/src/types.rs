//! Core Types and Data Contracts for the Measurement Engine
//!
//! Defines the values exchanged between the components:
//! - **Sources → Resolver:** typed adapter results (see `sources`)
//! - **Resolver → Validator/Calibrator/Scorer:** `MeasurementResult`,
//!   `TieredMeasurementResult`
//! - **Consensus:** `ImagerySource`, `Footprint`
//!
//! `MeasurementResult` is treated as an immutable value: corrections produce a
//! new value through the `with_*` methods and never modify the input.

use crate::geometry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Common Types
// ============================================================================

/// Geographic point in decimal degrees (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Roof complexity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl Complexity {
    /// Bucket a segment or vertex count: ≤4 / ≤8 / ≤12 / >12
    pub fn from_count(count: usize) -> Self {
        match count {
            0..=4 => Complexity::Simple,
            5..=8 => Complexity::Moderate,
            9..=12 => Complexity::Complex,
            _ => Complexity::VeryComplex,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
            Complexity::VeryComplex => "very-complex",
        }
    }
}

/// Adapter that produced a measurement (provenance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasurementSource {
    Lidar,
    Solar,
    Osm,
    FootprintEstimate,
    Manual,
}

impl MeasurementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementSource::Lidar => "lidar",
            MeasurementSource::Solar => "solar",
            MeasurementSource::Osm => "osm",
            MeasurementSource::FootprintEstimate => "footprint-estimate",
            MeasurementSource::Manual => "manual",
        }
    }
}

/// Imagery quality as reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageryQuality {
    High,
    Medium,
    Low,
    Unknown,
}

impl ImageryQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageryQuality::High => "high",
            ImageryQuality::Medium => "medium",
            ImageryQuality::Low => "low",
            ImageryQuality::Unknown => "unknown",
        }
    }
}

// ============================================================================
// Measurement
// ============================================================================

/// A single roof measurement from exactly one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    /// Horizontal footprint area (sq ft)
    pub footprint_area_sq_ft: f64,
    /// Pitch-adjusted (sloped) roof area (sq ft)
    pub adjusted_area_sq_ft: f64,
    /// Roofing squares (adjusted area / 100)
    pub squares: f64,
    pub pitch_degrees: f64,
    pub pitch_multiplier: f64,
    pub segment_count: u32,
    pub complexity: Complexity,
    pub source: MeasurementSource,
    /// Confidence score (0-100)
    pub confidence: f64,
    pub imagery_quality: ImageryQuality,
    pub imagery_date: Option<NaiveDate>,
    pub warning: Option<String>,
}

impl MeasurementResult {
    /// Build a measurement from a horizontal footprint and a pitch
    ///
    /// Confidence starts at 0 and imagery quality at `Unknown`; chain
    /// `with_confidence` / `with_imagery` to set them.
    pub fn from_footprint(
        footprint_area_sq_ft: f64,
        pitch_degrees: f64,
        segment_count: u32,
        source: MeasurementSource,
    ) -> Self {
        let pitch_multiplier = geometry::multiplier_from_degrees(pitch_degrees);
        let adjusted_area_sq_ft = footprint_area_sq_ft * pitch_multiplier;
        Self {
            footprint_area_sq_ft,
            adjusted_area_sq_ft,
            squares: adjusted_area_sq_ft / 100.0,
            pitch_degrees,
            pitch_multiplier,
            segment_count,
            complexity: Complexity::from_count(segment_count as usize),
            source,
            confidence: 0.0,
            imagery_quality: ImageryQuality::Unknown,
            imagery_date: None,
            warning: None,
        }
    }

    /// Build a measurement from an already sloped roof area and a pitch
    pub fn from_roof_area(
        roof_area_sq_ft: f64,
        pitch_degrees: f64,
        segment_count: u32,
        source: MeasurementSource,
    ) -> Self {
        let multiplier = geometry::multiplier_from_degrees(pitch_degrees);
        let footprint = if multiplier > 0.0 {
            roof_area_sq_ft / multiplier
        } else {
            roof_area_sq_ft
        };
        Self::from_footprint(footprint, pitch_degrees, segment_count, source)
            .with_adjusted_area(roof_area_sq_ft)
    }

    /// Terminal placeholder returned when no automated source succeeded
    pub fn manual_placeholder() -> Self {
        Self {
            footprint_area_sq_ft: 0.0,
            adjusted_area_sq_ft: 0.0,
            squares: 0.0,
            pitch_degrees: 0.0,
            pitch_multiplier: 1.0,
            segment_count: 0,
            complexity: Complexity::Simple,
            source: MeasurementSource::Manual,
            confidence: 0.0,
            imagery_quality: ImageryQuality::Unknown,
            imagery_date: None,
            warning: Some(
                "No automated measurement available; manual tracing required".to_string(),
            ),
        }
    }

    /// Copy with a new adjusted area (squares recomputed)
    pub fn with_adjusted_area(&self, adjusted_area_sq_ft: f64) -> Self {
        Self {
            adjusted_area_sq_ft,
            squares: adjusted_area_sq_ft / 100.0,
            ..self.clone()
        }
    }

    /// Copy with a new confidence, clamped to 0-100
    pub fn with_confidence(&self, confidence: f64) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 100.0),
            ..self.clone()
        }
    }

    pub fn with_imagery(&self, quality: ImageryQuality, date: Option<NaiveDate>) -> Self {
        Self {
            imagery_quality: quality,
            imagery_date: date,
            ..self.clone()
        }
    }

    /// Copy with `message` appended to the warning text
    pub fn with_warning(&self, message: impl Into<String>) -> Self {
        let message = message.into();
        let warning = match &self.warning {
            Some(existing) => format!("{}; {}", existing, message),
            None => message,
        };
        Self {
            warning: Some(warning),
            ..self.clone()
        }
    }
}

// ============================================================================
// Tiers
// ============================================================================

/// Fixed priority order of measurement sources (1 = most accurate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasurementTier {
    Lidar = 1,
    SolarHigh = 2,
    SolarMedium = 3,
    SolarLow = 4,
    OsmEstimatedPitch = 5,
    FootprintEstimate = 6,
    ManualPlaceholder = 7,
}

impl MeasurementTier {
    /// All tiers in priority order
    pub const ALL: [MeasurementTier; 7] = [
        MeasurementTier::Lidar,
        MeasurementTier::SolarHigh,
        MeasurementTier::SolarMedium,
        MeasurementTier::SolarLow,
        MeasurementTier::OsmEstimatedPitch,
        MeasurementTier::FootprintEstimate,
        MeasurementTier::ManualPlaceholder,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            MeasurementTier::Lidar => "lidar",
            MeasurementTier::SolarHigh => "solar-high",
            MeasurementTier::SolarMedium => "solar-medium",
            MeasurementTier::SolarLow => "solar-low",
            MeasurementTier::OsmEstimatedPitch => "osm-estimated-pitch",
            MeasurementTier::FootprintEstimate => "footprint-estimate",
            MeasurementTier::ManualPlaceholder => "manual-tracing",
        }
    }

    /// Solar sub-tier for a reported imagery quality
    ///
    /// `Unknown` quality is treated as the lowest solar tier.
    pub fn for_solar_quality(quality: ImageryQuality) -> Self {
        match quality {
            ImageryQuality::High => MeasurementTier::SolarHigh,
            ImageryQuality::Medium => MeasurementTier::SolarMedium,
            ImageryQuality::Low | ImageryQuality::Unknown => MeasurementTier::SolarLow,
        }
    }
}

/// Why a higher-priority tier was not used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// No adapter configured (missing credential)
    NotConfigured,
    /// Adapter failed (network, API, parse error)
    AdapterUnavailable,
    /// Adapter succeeded but found nothing at the location
    NoDataAtLocation,
    /// Adapter returned data below this tier's quality bar
    QualityTooLow,
    /// Caller deadline passed before or during the call
    DeadlineExceeded,
}

/// Append-only log entry for a skipped or failed higher-priority tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierFailure {
    pub tier: u8,
    pub tier_name: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl TierFailure {
    pub fn new(tier: MeasurementTier, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            tier: tier.number(),
            tier_name: tier.name().to_string(),
            kind,
            reason: reason.into(),
        }
    }
}

/// Resolver output: one measurement plus the explanation of skipped tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredMeasurementResult {
    pub measurement: MeasurementResult,
    pub tier_used: u8,
    pub tier_name: String,
    pub higher_tier_failures: Vec<TierFailure>,
    pub fallbacks_available: Vec<String>,
}

impl TieredMeasurementResult {
    /// True when only the manual placeholder could be produced
    pub fn is_degraded(&self) -> bool {
        self.tier_used == MeasurementTier::ManualPlaceholder.number()
    }
}

// ============================================================================
// Imagery
// ============================================================================

/// Building footprint outline with its planar area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub polygon: Vec<LatLng>,
    pub area_sq_m: f64,
}

impl Footprint {
    /// Footprint from an outline, area computed by the geometry kernel
    pub fn from_polygon(polygon: Vec<LatLng>) -> Self {
        let area_sq_m = geometry::polygon_area(&polygon);
        Self { polygon, area_sq_m }
    }

    pub fn area_sq_ft(&self) -> f64 {
        self.area_sq_m * geometry::SQ_M_TO_SQ_FT
    }
}

/// One imagery capture from a single provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagerySource {
    pub provider: String,
    pub capture_date: Option<NaiveDate>,
    pub resolution_meters_per_pixel: f64,
    pub quality: ImageryQuality,
    pub cloud_cover_percent: Option<f64>,
    pub footprint: Option<Footprint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_thresholds() {
        assert_eq!(Complexity::from_count(4), Complexity::Simple);
        assert_eq!(Complexity::from_count(5), Complexity::Moderate);
        assert_eq!(Complexity::from_count(8), Complexity::Moderate);
        assert_eq!(Complexity::from_count(12), Complexity::Complex);
        assert_eq!(Complexity::from_count(13), Complexity::VeryComplex);
    }

    #[test]
    fn test_from_footprint_derives_areas() {
        // 6/12 pitch: multiplier = sqrt(0.25 + 1) ≈ 1.1180
        let degrees = geometry::pitch_degrees_from_rise(6.0);
        let m = MeasurementResult::from_footprint(2000.0, degrees, 4, MeasurementSource::Osm);
        assert!((m.pitch_multiplier - 1.25_f64.sqrt()).abs() < 1e-9);
        assert!((m.adjusted_area_sq_ft - 2000.0 * 1.25_f64.sqrt()).abs() < 1e-6);
        assert!((m.squares - m.adjusted_area_sq_ft / 100.0).abs() < 1e-9);
        assert_eq!(m.complexity, Complexity::Simple);
    }

    #[test]
    fn test_from_roof_area_keeps_roof_area() {
        let m = MeasurementResult::from_roof_area(2500.0, 30.0, 6, MeasurementSource::Solar);
        assert!((m.adjusted_area_sq_ft - 2500.0).abs() < 1e-9);
        assert!(m.footprint_area_sq_ft < 2500.0);
        assert_eq!(m.complexity, Complexity::Moderate);
    }

    #[test]
    fn test_corrections_do_not_mutate_original() {
        let original = MeasurementResult::from_footprint(1000.0, 0.0, 2, MeasurementSource::Lidar);
        let corrected = original.with_adjusted_area(1100.0).with_warning("calibrated");
        assert_eq!(original.adjusted_area_sq_ft, 1000.0);
        assert!(original.warning.is_none());
        assert_eq!(corrected.squares, 11.0);
    }

    #[test]
    fn test_warning_appends() {
        let m = MeasurementResult::manual_placeholder().with_warning("second");
        let warning = m.warning.unwrap();
        assert!(warning.starts_with("No automated measurement"));
        assert!(warning.ends_with("; second"));
    }

    #[test]
    fn test_confidence_clamped() {
        let m = MeasurementResult::manual_placeholder().with_confidence(140.0);
        assert_eq!(m.confidence, 100.0);
    }

    #[test]
    fn test_solar_quality_sub_tiers() {
        assert_eq!(
            MeasurementTier::for_solar_quality(ImageryQuality::High),
            MeasurementTier::SolarHigh
        );
        assert_eq!(
            MeasurementTier::for_solar_quality(ImageryQuality::Unknown),
            MeasurementTier::SolarLow
        );
        assert_eq!(MeasurementTier::ManualPlaceholder.number(), 7);
    }
}
