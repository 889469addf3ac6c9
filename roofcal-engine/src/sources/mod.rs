//! Source Adapter Contracts
//!
//! Typed contracts for the external measurement and imagery providers. The
//! concrete network clients live outside this crate; the engine only sees
//! these traits.
//!
//! # Contract
//! Every adapter call receives the location and a `FetchContext` carrying
//! the caller deadline (and, for historical imagery, a target capture date).
//! Adapters enforce their own timeouts and report a passed deadline as
//! `SourceError::DeadlineExceeded`. Any error is treated by the engine as
//! "source unavailable" with the error text recorded as the reason.
//!
//! # Providers
//! | Trait              | Providers                 | Used by              |
//! |--------------------|---------------------------|----------------------|
//! | `LidarSource`      | LiDAR point clouds        | Resolver tier 1      |
//! | `SolarSource`      | Solar roof insights       | Resolver tiers 2-4   |
//! | `FootprintSource`  | OSM, Microsoft footprints | Resolver tiers 5-6   |
//! | `ElevationSource`  | USGS elevation            | Resolver tiers 5-6   |
//! | `OutlineTracer`    | Future CV backend         | Resolver tier 6      |
//! | `ImageryProvider`  | Bing, Sentinel-2, ...     | Multi-source consensus |

use crate::error::SourceError;
use crate::types::{ImageryQuality, ImagerySource, LatLng};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::time::Instant;

// ============================================================================
// Call Context
// ============================================================================

/// Per-call context threaded through every adapter call
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchContext {
    /// Caller deadline; adapters must give up at this instant
    pub deadline: Option<Instant>,
    /// Requested capture date for historical imagery
    pub capture_date: Option<NaiveDate>,
}

impl FetchContext {
    pub fn with_deadline(deadline: Option<Instant>) -> Self {
        Self {
            deadline,
            capture_date: None,
        }
    }

    pub fn for_date(self, capture_date: NaiveDate) -> Self {
        Self {
            capture_date: Some(capture_date),
            ..self
        }
    }

    /// True once the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ============================================================================
// Typed Results
// ============================================================================

/// LiDAR-derived roof measurement
#[derive(Debug, Clone, PartialEq)]
pub struct LidarMeasurement {
    pub footprint_area_sq_m: f64,
    pub pitch_degrees: f64,
    pub segment_count: u32,
    /// Points per square meter, when reported
    pub point_density: Option<f64>,
}

/// Solar roof analysis for a building
#[derive(Debug, Clone, PartialEq)]
pub struct SolarInsights {
    /// Sloped roof area
    pub roof_area_sq_m: f64,
    pub footprint_area_sq_m: Option<f64>,
    pub pitch_degrees: f64,
    pub segment_count: u32,
    pub imagery_quality: ImageryQuality,
    pub imagery_date: Option<NaiveDate>,
}

/// Building outline from a footprint database
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingFootprint {
    pub polygon: Vec<LatLng>,
    /// Provider identifier of the building (OSM way id, etc.)
    pub source_id: Option<String>,
}

/// Elevation sample at a location
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationSample {
    pub ground_elevation_m: f64,
    /// Roof pitch derived from the elevation model, when resolvable
    pub roof_pitch_degrees: Option<f64>,
}

/// Output contract of the outline-tracing backend
#[derive(Debug, Clone, PartialEq)]
pub struct TracedOutline {
    pub polygon: Vec<LatLng>,
    /// Confidence (0-100) reported by the tracer
    pub confidence: f64,
}

// ============================================================================
// Adapter Traits
// ============================================================================

#[async_trait]
pub trait LidarSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_lidar(
        &self,
        location: LatLng,
        ctx: &FetchContext,
    ) -> Result<LidarMeasurement, SourceError>;
}

#[async_trait]
pub trait SolarSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_solar(
        &self,
        location: LatLng,
        ctx: &FetchContext,
    ) -> Result<SolarInsights, SourceError>;
}

#[async_trait]
pub trait FootprintSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_footprint(
        &self,
        location: LatLng,
        ctx: &FetchContext,
    ) -> Result<BuildingFootprint, SourceError>;
}

#[async_trait]
pub trait ElevationSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_elevation(
        &self,
        location: LatLng,
        ctx: &FetchContext,
    ) -> Result<ElevationSample, SourceError>;
}

/// Outline tracing over imagery (stand-in for a computer-vision backend)
#[async_trait]
pub trait OutlineTracer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn trace_outline(
        &self,
        location: LatLng,
        ctx: &FetchContext,
    ) -> Result<TracedOutline, SourceError>;
}

/// Free imagery provider for multi-source consensus
#[async_trait]
pub trait ImageryProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Latest capture, or the capture closest to `ctx.capture_date`
    async fn fetch_imagery(
        &self,
        location: LatLng,
        ctx: &FetchContext,
    ) -> Result<ImagerySource, SourceError>;
}

// ============================================================================
// Registry
// ============================================================================

/// Configured adapters
///
/// An absent adapter means its credential is not configured; the resolver
/// records that as the tier's failure reason.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    pub lidar: Option<Arc<dyn LidarSource>>,
    pub solar: Option<Arc<dyn SolarSource>>,
    pub osm: Option<Arc<dyn FootprintSource>>,
    pub microsoft: Option<Arc<dyn FootprintSource>>,
    pub elevation: Option<Arc<dyn ElevationSource>>,
    pub outline_tracer: Option<Arc<dyn OutlineTracer>>,
    pub imagery: Vec<Arc<dyn ImageryProvider>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lidar(mut self, source: Arc<dyn LidarSource>) -> Self {
        self.lidar = Some(source);
        self
    }

    pub fn with_solar(mut self, source: Arc<dyn SolarSource>) -> Self {
        self.solar = Some(source);
        self
    }

    pub fn with_osm(mut self, source: Arc<dyn FootprintSource>) -> Self {
        self.osm = Some(source);
        self
    }

    pub fn with_microsoft(mut self, source: Arc<dyn FootprintSource>) -> Self {
        self.microsoft = Some(source);
        self
    }

    pub fn with_elevation(mut self, source: Arc<dyn ElevationSource>) -> Self {
        self.elevation = Some(source);
        self
    }

    pub fn with_outline_tracer(mut self, tracer: Arc<dyn OutlineTracer>) -> Self {
        self.outline_tracer = Some(tracer);
        self
    }

    pub fn with_imagery(mut self, provider: Arc<dyn ImageryProvider>) -> Self {
        self.imagery.push(provider);
        self
    }

    /// True if tier 6 has any adapter to try
    pub fn has_footprint_estimate(&self) -> bool {
        self.microsoft.is_some() || self.outline_tracer.is_some()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("lidar", &self.lidar.as_ref().map(|s| s.name()))
            .field("solar", &self.solar.as_ref().map(|s| s.name()))
            .field("osm", &self.osm.as_ref().map(|s| s.name()))
            .field("microsoft", &self.microsoft.as_ref().map(|s| s.name()))
            .field("elevation", &self.elevation.as_ref().map(|s| s.name()))
            .field(
                "outline_tracer",
                &self.outline_tracer.as_ref().map(|s| s.name()),
            )
            .field(
                "imagery",
                &self.imagery.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
