//! Integration tests for tiered source resolution

mod helpers;

use helpers::{footprint, lidar, location, rectangle, solar, Fake};
use roofcal_common::config::ResolverSettings;
use roofcal_engine::error::SourceError;
use roofcal_engine::geometry::{self, SQ_M_TO_SQ_FT};
use roofcal_engine::resolver::{ResolveOptions, TieredResolver, MANUAL_TRACING};
use roofcal_engine::sources::{ElevationSample, SourceRegistry, TracedOutline};
use roofcal_engine::types::{FailureKind, ImageryQuality, MeasurementSource};
use std::time::Duration;
use tokio::time::Instant;

fn resolver(registry: SourceRegistry) -> TieredResolver {
    TieredResolver::new(registry, ResolverSettings::default())
}

fn failed_tiers(result: &roofcal_engine::types::TieredMeasurementResult) -> Vec<u8> {
    result.higher_tier_failures.iter().map(|f| f.tier).collect()
}

#[tokio::test]
async fn test_osm_only_resolves_at_tier_five() {
    let osm = Fake::ok("osm", footprint(15.0, 12.0));
    let result = resolver(SourceRegistry::new().with_osm(osm.clone()))
        .resolve(location(), &ResolveOptions::default())
        .await;

    assert_eq!(result.tier_used, 5);
    assert_eq!(result.tier_name, "osm-estimated-pitch");
    assert_eq!(failed_tiers(&result), vec![1, 2, 3, 4]);
    assert!(result
        .higher_tier_failures
        .iter()
        .all(|f| f.kind == FailureKind::NotConfigured));
    assert!(result.fallbacks_available.contains(&MANUAL_TRACING.to_string()));
    assert_eq!(result.fallbacks_available.last().map(String::as_str), Some(MANUAL_TRACING));

    let m = &result.measurement;
    assert_eq!(m.source, MeasurementSource::Osm);
    // 15 m × 12 m ≈ 180 sq m, default 6/12 pitch
    let expected_footprint = 180.0 * SQ_M_TO_SQ_FT;
    assert!((m.footprint_area_sq_ft - expected_footprint).abs() / expected_footprint < 0.01);
    assert!((m.pitch_multiplier - geometry::pitch_multiplier(6.0)).abs() < 1e-9);
    assert!((m.squares - m.adjusted_area_sq_ft / 100.0).abs() < 1e-9);
    assert!(m.confidence > 0.0);
    assert!(m.warning.as_deref().unwrap_or("").contains("6/12"));
    assert_eq!(osm.calls(), 1);
}

#[tokio::test]
async fn test_never_blends_lower_tiers() {
    let lidar_source = Fake::ok("lidar", lidar());
    let solar_source = Fake::ok("solar", solar(ImageryQuality::High));
    let osm = Fake::ok("osm", footprint(30.0, 30.0));

    let result = resolver(
        SourceRegistry::new()
            .with_lidar(lidar_source.clone())
            .with_solar(solar_source.clone())
            .with_osm(osm.clone()),
    )
    .resolve(location(), &ResolveOptions::default())
    .await;

    assert_eq!(result.tier_used, 1);
    assert_eq!(result.measurement.source, MeasurementSource::Lidar);
    assert!((result.measurement.footprint_area_sq_ft - 180.0 * SQ_M_TO_SQ_FT).abs() < 1e-6);
    assert!(result.higher_tier_failures.is_empty());
    assert_eq!(solar_source.calls(), 0);
    assert_eq!(osm.calls(), 0);
    assert_eq!(
        result.fallbacks_available,
        vec!["solar", "osm-estimated-pitch", MANUAL_TRACING]
    );
}

#[tokio::test]
async fn test_solar_failure_listed_once_per_sub_tier() {
    let solar_source = Fake::err("solar", SourceError::Network("connection reset".into()));
    let osm = Fake::ok("osm", footprint(10.0, 10.0));

    let result = resolver(
        SourceRegistry::new()
            .with_solar(solar_source.clone())
            .with_osm(osm),
    )
    .resolve(location(), &ResolveOptions::default())
    .await;

    assert_eq!(result.tier_used, 5);
    assert_eq!(failed_tiers(&result), vec![1, 2, 3, 4]);
    for failure in &result.higher_tier_failures[1..] {
        assert_eq!(failure.kind, FailureKind::AdapterUnavailable);
        assert!(failure.reason.contains("connection reset"));
    }
    assert_eq!(solar_source.calls(), 1);
}

#[tokio::test]
async fn test_low_quality_solar_is_tier_four() {
    let result = resolver(SourceRegistry::new().with_solar(Fake::ok("solar", solar(ImageryQuality::Low))))
        .resolve(location(), &ResolveOptions::default())
        .await;

    assert_eq!(result.tier_used, 4);
    assert_eq!(failed_tiers(&result), vec![1, 2, 3]);
    assert_eq!(result.higher_tier_failures[1].kind, FailureKind::QualityTooLow);
    assert_eq!(result.higher_tier_failures[2].kind, FailureKind::QualityTooLow);
    assert_eq!(result.measurement.imagery_quality, ImageryQuality::Low);
    // sloped roof area comes straight from the provider
    assert!((result.measurement.adjusted_area_sq_ft - 210.0 * SQ_M_TO_SQ_FT).abs() < 1e-6);
}

#[tokio::test]
async fn test_osm_no_data_falls_to_outline_tracer() {
    let osm = Fake::err("osm", SourceError::NoData("no building".into()));
    let tracer = Fake::ok(
        "outline-tracer",
        TracedOutline {
            polygon: rectangle(location(), 12.0, 9.0),
            confidence: 40.0,
        },
    );

    let result = resolver(SourceRegistry::new().with_osm(osm).with_outline_tracer(tracer))
        .resolve(location(), &ResolveOptions::default())
        .await;

    assert_eq!(result.tier_used, 6);
    assert_eq!(result.measurement.source, MeasurementSource::FootprintEstimate);
    assert_eq!(result.higher_tier_failures[4].kind, FailureKind::NoDataAtLocation);
    assert!(result.measurement.confidence <= 40.0);
    assert_eq!(result.fallbacks_available, vec![MANUAL_TRACING]);
}

#[tokio::test]
async fn test_elevation_pitch_used_for_osm() {
    let elevation = Fake::ok(
        "usgs",
        ElevationSample {
            ground_elevation_m: 12.0,
            roof_pitch_degrees: Some(30.0),
        },
    );

    let result = resolver(
        SourceRegistry::new()
            .with_osm(Fake::ok("osm", footprint(10.0, 10.0)))
            .with_elevation(elevation.clone()),
    )
    .resolve(location(), &ResolveOptions::default())
    .await;

    assert_eq!(result.tier_used, 5);
    assert_eq!(result.measurement.pitch_degrees, 30.0);
    assert_eq!(elevation.calls(), 1);
}

#[tokio::test]
async fn test_all_sources_failing_yields_placeholder() {
    let result = resolver(
        SourceRegistry::new()
            .with_lidar(Fake::err("lidar", SourceError::Api("500".into())))
            .with_solar(Fake::err("solar", SourceError::MissingCredential("key".into())))
            .with_osm(Fake::err("osm", SourceError::NoData("none".into())))
            .with_microsoft(Fake::err("microsoft", SourceError::Parse("bad json".into()))),
    )
    .resolve(location(), &ResolveOptions::default())
    .await;

    assert_eq!(result.tier_used, 7);
    assert!(result.is_degraded());
    assert_eq!(failed_tiers(&result), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(result.measurement.confidence, 0.0);
    assert_eq!(result.measurement.source, MeasurementSource::Manual);
    assert!(result.fallbacks_available.is_empty());
}

#[tokio::test]
async fn test_deadline_turns_slow_source_into_skip() {
    let slow_lidar = Fake::slow("lidar", lidar(), Duration::from_millis(500));
    let solar_source = Fake::ok("solar", solar(ImageryQuality::High));

    let deadline = Instant::now() + Duration::from_millis(20);
    let result = resolver(
        SourceRegistry::new()
            .with_lidar(slow_lidar.clone())
            .with_solar(solar_source.clone()),
    )
    .resolve(location(), &ResolveOptions::with_deadline(deadline))
    .await;

    assert_eq!(result.tier_used, 7);
    assert_eq!(result.higher_tier_failures[0].kind, FailureKind::DeadlineExceeded);
    assert_eq!(result.higher_tier_failures[1].kind, FailureKind::DeadlineExceeded);
    assert!(result.higher_tier_failures[1].reason.contains("deadline exceeded"));
    assert_eq!(slow_lidar.calls(), 1);
    assert_eq!(solar_source.calls(), 0);
}
