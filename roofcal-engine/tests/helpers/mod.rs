//! Test helpers shared by the integration tests
//!
//! In-process fake adapters implementing the source traits, plus geometry
//! fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use roofcal_engine::error::SourceError;
use roofcal_engine::geometry::{METERS_PER_DEGREE_LAT, METERS_PER_DEGREE_LON};
use roofcal_engine::sources::{
    BuildingFootprint, ElevationSample, ElevationSource, FetchContext, FootprintSource,
    ImageryProvider, LidarMeasurement, LidarSource, OutlineTracer, SolarInsights, SolarSource,
    TracedOutline,
};
use roofcal_engine::types::{Footprint, ImageryQuality, ImagerySource, LatLng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Generic Fake Adapter
// ============================================================================

/// Fake adapter returning a canned result, optionally after a delay
///
/// The delay honors the caller deadline: if the deadline passes first the
/// fake returns `SourceError::DeadlineExceeded`, as a real adapter would.
pub struct Fake<T> {
    name: &'static str,
    result: Result<T, SourceError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl<T: Clone + Send + Sync> Fake<T> {
    pub fn ok(name: &'static str, value: T) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Ok(value),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn err(name: &'static str, error: SourceError) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Err(error),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(name: &'static str, value: T, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Ok(value),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, ctx: &FetchContext) -> Result<T, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            let sleep = tokio::time::sleep(self.delay);
            match ctx.deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, sleep).await.is_err() {
                        return Err(SourceError::DeadlineExceeded);
                    }
                }
                None => sleep.await,
            }
        }
        self.result.clone()
    }
}

#[async_trait]
impl LidarSource for Fake<LidarMeasurement> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_lidar(
        &self,
        _location: LatLng,
        ctx: &FetchContext,
    ) -> Result<LidarMeasurement, SourceError> {
        self.respond(ctx).await
    }
}

#[async_trait]
impl SolarSource for Fake<SolarInsights> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_solar(
        &self,
        _location: LatLng,
        ctx: &FetchContext,
    ) -> Result<SolarInsights, SourceError> {
        self.respond(ctx).await
    }
}

#[async_trait]
impl FootprintSource for Fake<BuildingFootprint> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_footprint(
        &self,
        _location: LatLng,
        ctx: &FetchContext,
    ) -> Result<BuildingFootprint, SourceError> {
        self.respond(ctx).await
    }
}

#[async_trait]
impl ElevationSource for Fake<ElevationSample> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_elevation(
        &self,
        _location: LatLng,
        ctx: &FetchContext,
    ) -> Result<ElevationSample, SourceError> {
        self.respond(ctx).await
    }
}

#[async_trait]
impl OutlineTracer for Fake<TracedOutline> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn trace_outline(
        &self,
        _location: LatLng,
        ctx: &FetchContext,
    ) -> Result<TracedOutline, SourceError> {
        self.respond(ctx).await
    }
}

#[async_trait]
impl ImageryProvider for Fake<ImagerySource> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_imagery(
        &self,
        _location: LatLng,
        ctx: &FetchContext,
    ) -> Result<ImagerySource, SourceError> {
        self.respond(ctx).await
    }
}

// ============================================================================
// Date-aware Imagery
// ============================================================================

/// Imagery provider whose footprint area depends on the requested month
pub struct SeasonalImagery {
    pub name: &'static str,
    /// Footprint area (sq m) by month of `ctx.capture_date`
    pub areas_by_month: HashMap<u32, f64>,
}

#[async_trait]
impl ImageryProvider for SeasonalImagery {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_imagery(
        &self,
        _location: LatLng,
        ctx: &FetchContext,
    ) -> Result<ImagerySource, SourceError> {
        let date = ctx
            .capture_date
            .ok_or_else(|| SourceError::NoData("no capture date requested".into()))?;
        let area = self
            .areas_by_month
            .get(&date.month())
            .copied()
            .ok_or_else(|| SourceError::NoData(format!("no capture for {}", date)))?;
        Ok(imagery(self.name, 0.3, ImageryQuality::High, Some(date), Some(area)))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn location() -> LatLng {
    LatLng::new(39.9526, -75.1652)
}

/// Axis-aligned rectangle centered on `center`, sides in meters
pub fn rectangle(center: LatLng, width_m: f64, height_m: f64) -> Vec<LatLng> {
    let half_lat = height_m / 2.0 / METERS_PER_DEGREE_LAT;
    let half_lng =
        width_m / 2.0 / (METERS_PER_DEGREE_LON * (center.lat * std::f64::consts::PI / 180.0).cos());
    vec![
        LatLng::new(center.lat - half_lat, center.lng - half_lng),
        LatLng::new(center.lat - half_lat, center.lng + half_lng),
        LatLng::new(center.lat + half_lat, center.lng + half_lng),
        LatLng::new(center.lat + half_lat, center.lng - half_lng),
    ]
}

pub fn footprint(width_m: f64, height_m: f64) -> BuildingFootprint {
    BuildingFootprint {
        polygon: rectangle(location(), width_m, height_m),
        source_id: Some("way/123".to_string()),
    }
}

pub fn lidar() -> LidarMeasurement {
    LidarMeasurement {
        footprint_area_sq_m: 180.0,
        pitch_degrees: 22.6,
        segment_count: 4,
        point_density: Some(8.0),
    }
}

pub fn solar(quality: ImageryQuality) -> SolarInsights {
    SolarInsights {
        roof_area_sq_m: 210.0,
        footprint_area_sq_m: Some(190.0),
        pitch_degrees: 26.6,
        segment_count: 6,
        imagery_quality: quality,
        imagery_date: NaiveDate::from_ymd_opt(2024, 5, 1),
    }
}

pub fn imagery(
    provider: &str,
    resolution: f64,
    quality: ImageryQuality,
    capture_date: Option<NaiveDate>,
    footprint_area_sq_m: Option<f64>,
) -> ImagerySource {
    ImagerySource {
        provider: provider.to_string(),
        capture_date,
        resolution_meters_per_pixel: resolution,
        quality,
        cloud_cover_percent: None,
        footprint: footprint_area_sq_m.map(|area_sq_m| Footprint {
            polygon: Vec::new(),
            area_sq_m,
        }),
    }
}
