//! Integration tests for imagery consensus, cross-validation and report
//! assembly

mod helpers;

use chrono::NaiveDate;
use helpers::{footprint, imagery, location, Fake, SeasonalImagery};
use roofcal_common::config::{CalibrationSettings, ConsensusSettings, EngineConfig};
use roofcal_engine::calibration::{Calibrator, CorrectionSource};
use roofcal_engine::consensus::statistics::{self, AgreementLevel};
use roofcal_engine::consensus::{
    AnomalyKind, ConsensusOptions, MultiSourceConsensus, Season, Severity,
};
use roofcal_engine::error::SourceError;
use roofcal_engine::report::{MeasureOptions, MeasurementEngine};
use roofcal_engine::sources::{ImageryProvider, SourceRegistry};
use roofcal_engine::types::{ImageryQuality, MeasurementResult, MeasurementSource};
use roofcal_engine::validation::{self, CheckStatus, OverallValidation, SecondaryMeasurement};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn capture_date() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 6, 1)
}

fn consensus(providers: Vec<Arc<dyn ImageryProvider>>) -> MultiSourceConsensus {
    MultiSourceConsensus::new(providers, ConsensusSettings::default())
}

#[tokio::test]
async fn test_failing_providers_are_isolated() {
    let bing = Fake::ok(
        "bing",
        imagery("bing", 0.3, ImageryQuality::High, capture_date(), Some(200.0)),
    );
    let broken = Fake::err("nearmap", SourceError::Network("connection refused".into()));
    let slow = Fake::slow(
        "sentinel-2",
        imagery("sentinel-2", 10.0, ImageryQuality::Medium, capture_date(), Some(210.0)),
        Duration::from_secs(5),
    );
    let esri = Fake::ok(
        "esri",
        imagery("esri", 0.5, ImageryQuality::High, capture_date(), Some(204.0)),
    );

    let providers: Vec<Arc<dyn ImageryProvider>> = vec![bing, broken.clone(), slow.clone(), esri];
    let started = Instant::now();
    let set = consensus(providers)
        .fetch_all(
            location(),
            &ConsensusOptions {
                deadline: Some(Instant::now() + Duration::from_millis(100)),
                capture_date: None,
            },
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(set.sources.len(), 2);
    assert_eq!(set.sources[0].provider, "bing");
    assert_eq!(set.sources[1].provider, "esri");
    assert!(set
        .quality_flags
        .iter()
        .any(|f| f.starts_with("nearmap:") && f.contains("connection refused")));
    assert!(set
        .quality_flags
        .iter()
        .any(|f| f == "sentinel-2: deadline exceeded"));
    assert_eq!(broken.calls(), 1);
    assert_eq!(slow.calls(), 1);
    assert_eq!(set.recommended_primary.as_deref(), Some("bing"));
}

#[tokio::test]
async fn test_close_footprints_agree_strongly() {
    let providers: Vec<Arc<dyn ImageryProvider>> = vec![
        Fake::ok("bing", imagery("bing", 0.3, ImageryQuality::High, capture_date(), Some(200.0))),
        Fake::ok("esri", imagery("esri", 0.5, ImageryQuality::High, capture_date(), Some(204.0))),
    ];
    let set = consensus(providers)
        .fetch_all(location(), &ConsensusOptions::default())
        .await;

    // mean 202, population std 2
    assert!((set.footprint_variance_percent - 2.0 / 202.0 * 100.0).abs() < 1e-9);
    assert_eq!(set.agreements.len(), 1);
    assert_eq!(set.agreements[0].agreement, AgreementLevel::Strong);
    assert!(set.outliers.is_empty());
    assert!(set.agreement_percent().unwrap() > 99.0);
    assert!(set.quality_flags.is_empty());
}

#[test]
fn test_agreement_boundary_is_inclusive() {
    let pairs = statistics::pairwise_agreement(&[
        ("a".to_string(), 1000.0),
        ("b".to_string(), 1050.0),
        ("c".to_string(), 1150.0),
    ]);

    assert_eq!(pairs.len(), 3);
    assert_eq!(pairs[0].variance_percent, 5.0);
    assert_eq!(pairs[0].agreement, AgreementLevel::Strong);
    assert_eq!(pairs[1].agreement, AgreementLevel::Moderate);
    assert_eq!(pairs[2].agreement, AgreementLevel::Moderate);
}

#[tokio::test]
async fn test_outlier_provider_flagged() {
    let providers: Vec<Arc<dyn ImageryProvider>> = vec![
        Fake::ok("a", imagery("a", 0.3, ImageryQuality::High, capture_date(), Some(200.0))),
        Fake::ok("b", imagery("b", 0.3, ImageryQuality::High, capture_date(), Some(201.0))),
        Fake::ok("c", imagery("c", 0.3, ImageryQuality::High, capture_date(), Some(202.0))),
        Fake::ok("d", imagery("d", 0.3, ImageryQuality::High, capture_date(), Some(400.0))),
    ];
    let set = consensus(providers)
        .fetch_all(location(), &ConsensusOptions::default())
        .await;

    assert_eq!(set.outliers, vec!["d".to_string()]);
    assert!(set.quality_flags.iter().any(|f| f.starts_with("d: footprint is a statistical outlier")));
    assert!(set.quality_flags.iter().any(|f| f.starts_with("Footprint variance")));
}

#[tokio::test]
async fn test_no_providers_flags_empty_set() {
    let set = consensus(Vec::new())
        .fetch_all(location(), &ConsensusOptions::default())
        .await;

    assert!(set.sources.is_empty());
    assert_eq!(set.footprint_variance_percent, 0.0);
    assert!(set.recommended_primary.is_none());
    assert!(set.agreement_percent().is_none());
    assert!(set
        .quality_flags
        .contains(&"No imagery sources available".to_string()));
}

#[tokio::test]
async fn test_seasonal_snow_cover_detected() {
    let provider: Arc<dyn ImageryProvider> = Arc::new(SeasonalImagery {
        name: "sentinel-2",
        areas_by_month: HashMap::from([(1, 230.0), (4, 200.0), (7, 200.0), (10, 200.0)]),
    });

    let analysis = consensus(vec![provider])
        .fetch_seasonal(location(), 2024, &ConsensusOptions::default())
        .await;

    assert_eq!(analysis.samples.len(), 4);
    assert_eq!(analysis.samples[0].season, Season::Winter);
    assert_eq!(
        analysis.samples[0].capture_date,
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    );
    assert_eq!(analysis.anomalies.len(), 1);
    assert_eq!(analysis.anomalies[0].kind, AnomalyKind::SnowCover);
    // 15% larger in winter
    assert_eq!(analysis.anomalies[0].severity, Severity::Medium);
    assert!((analysis.consensus_score - 85.0).abs() < 1e-9);
    assert_ne!(analysis.recommended_season, Some(Season::Winter));
    assert!(analysis.quality_flags.is_empty());
}

#[tokio::test]
async fn test_seasonal_missing_capture_flagged() {
    let provider: Arc<dyn ImageryProvider> = Arc::new(SeasonalImagery {
        name: "sentinel-2",
        areas_by_month: HashMap::from([(4, 200.0), (7, 201.0), (10, 199.0)]),
    });

    let analysis = consensus(vec![provider])
        .fetch_seasonal(location(), 2023, &ConsensusOptions::default())
        .await;

    assert_eq!(analysis.samples.len(), 3);
    assert!(analysis.anomalies.is_empty());
    assert_eq!(analysis.consensus_score, 100.0);
    assert!(analysis.quality_flags.iter().any(|f| f.starts_with("winter")));
}

#[test]
fn test_validation_flags_twenty_percent_discrepancy() {
    let primary = MeasurementResult::from_footprint(2000.0, 22.6, 4, MeasurementSource::Solar);

    let result = validation::validate(
        &primary,
        &[
            SecondaryMeasurement::new("osm", 2400.0),
            SecondaryMeasurement::new("bing", 2080.0),
        ],
    );

    assert_eq!(result.overall_validation, OverallValidation::DiscrepancyDetected);
    assert_eq!(result.checks[0].status, CheckStatus::SignificantVariance);
    assert!((result.checks[0].variance_from_primary - 20.0).abs() < 1e-9);
    assert_eq!(result.checks[1].status, CheckStatus::Agrees);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].starts_with("osm"));
    // the primary is annotated, never replaced
    assert_eq!(result.primary_measurement, primary);
}

#[tokio::test]
async fn test_report_with_calibration_and_imagery() {
    let calibrator = Arc::new(Calibrator::in_memory(CalibrationSettings::default()));
    for reference in [1600.0, 2000.0, 2400.0] {
        calibrator
            .learn("191", reference * 1.125, reference, CorrectionSource::GafReport, 90.0)
            .await
            .unwrap();
    }

    let registry = SourceRegistry::new()
        .with_osm(Fake::ok("osm", footprint(15.0, 12.0)))
        .with_imagery(Fake::ok(
            "bing",
            imagery("bing", 0.3, ImageryQuality::High, capture_date(), Some(181.0)),
        ))
        .with_imagery(Fake::ok(
            "esri",
            imagery("esri", 0.5, ImageryQuality::High, capture_date(), Some(179.0)),
        ));
    let engine = MeasurementEngine::new(registry, calibrator, &EngineConfig::default());

    let report = engine
        .measure(
            location(),
            &MeasureOptions {
                region_key: Some("191".to_string()),
                include_imagery: true,
                ..Default::default()
            },
        )
        .await;

    assert_eq!(report.resolution.tier_used, 5);
    let calibration = report.calibration.as_ref().unwrap();
    assert!(calibration.applied);
    assert!(calibration.gaf_calibrated);
    let uncalibrated = report.resolution.measurement.adjusted_area_sq_ft;
    assert!((report.measurement.adjusted_area_sq_ft - uncalibrated * 1.125).abs() < 1e-6);

    let imagery_set = report.imagery.as_ref().unwrap();
    assert_eq!(imagery_set.sources.len(), 2);
    assert_eq!(report.validation.checks.len(), 2);
    assert_eq!(report.validation.overall_validation, OverallValidation::Validated);
    assert!(report.confidence.score > 0.0);
}

#[tokio::test]
async fn test_report_discrepancy_keeps_primary() {
    let registry = SourceRegistry::new()
        .with_osm(Fake::ok("osm", footprint(15.0, 12.0)))
        .with_imagery(Fake::ok(
            "bing",
            imagery("bing", 0.3, ImageryQuality::High, capture_date(), Some(216.0)),
        ));
    let engine = MeasurementEngine::new(
        registry,
        Arc::new(Calibrator::in_memory(CalibrationSettings::default())),
        &EngineConfig::default(),
    );

    let report = engine
        .measure(
            location(),
            &MeasureOptions {
                include_imagery: true,
                ..Default::default()
            },
        )
        .await;

    assert!(report.calibration.is_none());
    assert_eq!(report.measurement, report.resolution.measurement);
    assert_eq!(
        report.validation.overall_validation,
        OverallValidation::DiscrepancyDetected
    );
    assert_eq!(report.validation.warnings.len(), 1);
}
