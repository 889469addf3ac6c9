//! Multi-Source Consensus
//!
//! Fetches every configured imagery provider concurrently and compares the
//! footprints they return.
//!
//! # Failure Isolation
//! Each provider fetch has its own error boundary. A failed or late provider
//! becomes a quality flag; it never aborts the set or delays the others'
//! results beyond its own call.
//!
//! # Output
//! - Coefficient of variation of footprint areas
//! - Recommended primary source (weighted ranking, see `scoring`)
//! - IQR outliers and pairwise agreement levels (see `statistics`)
//! - Seasonal anomalies over four fixed dates (see `seasonal`)

pub mod scoring;
pub mod seasonal;
pub mod statistics;

pub use seasonal::{AnomalyKind, Season, SeasonalAnalysis, SeasonalAnomaly, SeasonalSample, Severity};
pub use statistics::{AgreementLevel, PairwiseAgreement};

use crate::sources::{FetchContext, ImageryProvider};
use crate::types::{ImagerySource, LatLng};
use chrono::NaiveDate;
use futures::future::join_all;
use roofcal_common::config::ConsensusSettings;
use roofcal_common::time;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-call consensus options
#[derive(Debug, Clone, Default)]
pub struct ConsensusOptions {
    pub deadline: Option<Instant>,
    /// Ask providers for the capture closest to this date
    pub capture_date: Option<NaiveDate>,
}

/// Comparison of all imagery captured for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSourceImagerySet {
    pub location: LatLng,
    /// Successful captures in provider registration order
    pub sources: Vec<ImagerySource>,
    /// Coefficient of variation of footprint areas (percent)
    pub footprint_variance_percent: f64,
    /// Provider of the highest-ranked capture
    pub recommended_primary: Option<String>,
    pub outliers: Vec<String>,
    pub agreements: Vec<PairwiseAgreement>,
    pub quality_flags: Vec<String>,
}

impl MultiSourceImagerySet {
    /// `(provider, footprint sq ft)` for every capture with a usable footprint
    pub fn footprint_areas(&self) -> Vec<(String, f64)> {
        footprint_areas(&self.sources)
    }

    /// Agreement between providers as a percentage (100 − variance)
    ///
    /// `None` when fewer than two footprints could be compared.
    pub fn agreement_percent(&self) -> Option<f64> {
        if self.footprint_areas().len() < 2 {
            return None;
        }
        Some((100.0 - self.footprint_variance_percent).clamp(0.0, 100.0))
    }
}

fn footprint_areas(sources: &[ImagerySource]) -> Vec<(String, f64)> {
    sources
        .iter()
        .filter_map(|s| {
            s.footprint
                .as_ref()
                .map(|f| f.area_sq_ft())
                .filter(|a| a.is_finite() && *a > 0.0)
                .map(|a| (s.provider.clone(), a))
        })
        .collect()
}

/// Multi-Source Consensus
pub struct MultiSourceConsensus {
    providers: Vec<Arc<dyn ImageryProvider>>,
    settings: ConsensusSettings,
}

impl MultiSourceConsensus {
    pub fn new(providers: Vec<Arc<dyn ImageryProvider>>, settings: ConsensusSettings) -> Self {
        Self {
            providers,
            settings,
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Fetch every provider concurrently and compare the results
    pub async fn fetch_all(&self, location: LatLng, opts: &ConsensusOptions) -> MultiSourceImagerySet {
        let mut ctx = FetchContext::with_deadline(opts.deadline);
        if let Some(date) = opts.capture_date {
            ctx = ctx.for_date(date);
        }

        let fetches = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let name = provider.name();
                if ctx.is_expired() {
                    warn!(provider = name, "Imagery fetch skipped: deadline exceeded");
                    return Err(format!("{}: deadline exceeded", name));
                }
                match provider.fetch_imagery(location, &ctx).await {
                    Ok(source) => {
                        debug!(
                            provider = name,
                            resolution = source.resolution_meters_per_pixel,
                            has_footprint = source.footprint.is_some(),
                            "Imagery fetched"
                        );
                        Ok(source)
                    }
                    Err(e) => {
                        warn!(provider = name, error = %e, "Imagery fetch failed (isolated)");
                        Err(format!("{}: {}", name, e))
                    }
                }
            }
        });

        let mut sources = Vec::new();
        let mut quality_flags = Vec::new();
        for outcome in join_all(fetches).await {
            match outcome {
                Ok(source) => sources.push(source),
                Err(flag) => quality_flags.push(flag),
            }
        }

        self.compare(location, sources, quality_flags)
    }

    /// Build the comparison for an already collected set of captures
    pub fn compare(
        &self,
        location: LatLng,
        sources: Vec<ImagerySource>,
        mut quality_flags: Vec<String>,
    ) -> MultiSourceImagerySet {
        let today = time::now().date_naive();
        let areas = footprint_areas(&sources);
        let values: Vec<f64> = areas.iter().map(|(_, a)| *a).collect();

        let footprint_variance_percent = statistics::coefficient_of_variation(&values);
        let outliers = statistics::identify_outliers(&areas);
        let agreements = statistics::pairwise_agreement(&areas);
        let recommended_primary =
            scoring::select_best(&sources, today).map(|i| sources[i].provider.clone());

        if sources.is_empty() {
            quality_flags.push("No imagery sources available".to_string());
        }
        match areas.len() {
            0 => quality_flags.push("No footprints returned".to_string()),
            1 => quality_flags.push("Single footprint; no cross-source comparison".to_string()),
            _ => {}
        }
        for outlier in &outliers {
            quality_flags.push(format!("{}: footprint is a statistical outlier", outlier));
        }
        if footprint_variance_percent > self.settings.variance_flag_percent {
            quality_flags.push(format!(
                "Footprint variance {:.1}% exceeds {:.1}%",
                footprint_variance_percent, self.settings.variance_flag_percent
            ));
        }
        for source in &sources {
            if let Some(cover) = source.cloud_cover_percent {
                if cover > self.settings.cloud_cover_flag_percent {
                    quality_flags.push(format!(
                        "{}: cloud cover {:.0}% exceeds {:.0}%",
                        source.provider, cover, self.settings.cloud_cover_flag_percent
                    ));
                }
            }
        }

        info!(
            %location,
            sources = sources.len(),
            footprints = areas.len(),
            variance_percent = footprint_variance_percent,
            recommended = recommended_primary.as_deref().unwrap_or("none"),
            flags = quality_flags.len(),
            "Imagery consensus computed"
        );

        MultiSourceImagerySet {
            location,
            sources,
            footprint_variance_percent,
            recommended_primary,
            outliers,
            agreements,
            quality_flags,
        }
    }

    /// Sample the four seasonal dates of `year` and look for anomalies
    pub async fn fetch_seasonal(
        &self,
        location: LatLng,
        year: i32,
        opts: &ConsensusOptions,
    ) -> SeasonalAnalysis {
        let today = time::now().date_naive();
        let mut quality_flags = Vec::new();

        let targets: Vec<(Season, NaiveDate)> = Season::ALL
            .iter()
            .filter_map(|season| season.sample_date(year).map(|d| (*season, d)))
            .collect();

        let sets = join_all(targets.iter().map(|(_, date)| {
            let opts = ConsensusOptions {
                deadline: opts.deadline,
                capture_date: Some(*date),
            };
            async move { self.fetch_all(location, &opts).await }
        }))
        .await;

        let mut samples = Vec::new();
        for ((season, target), set) in targets.into_iter().zip(sets) {
            let with_footprint: Vec<ImagerySource> = set
                .sources
                .into_iter()
                .filter(|s| s.footprint.as_ref().is_some_and(|f| f.area_sq_m > 0.0))
                .collect();

            match scoring::select_best(&with_footprint, today) {
                Some(index) => {
                    let best = &with_footprint[index];
                    let area = best
                        .footprint
                        .as_ref()
                        .map(|f| f.area_sq_ft())
                        .unwrap_or_default();
                    samples.push(SeasonalSample {
                        season,
                        capture_date: best.capture_date.unwrap_or(target),
                        footprint_area_sq_ft: area,
                        provider: best.provider.clone(),
                    });
                }
                None => {
                    quality_flags.push(format!("{}: no footprint available", season.as_str()));
                }
            }
        }

        let analysis = seasonal::analyze(samples, quality_flags);
        info!(
            %location,
            year,
            samples = analysis.samples.len(),
            anomalies = analysis.anomalies.len(),
            consensus_score = analysis.consensus_score,
            "Seasonal analysis complete"
        );
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Footprint, ImageryQuality};

    fn capture(provider: &str, area_sq_m: f64, cloud: Option<f64>) -> ImagerySource {
        ImagerySource {
            provider: provider.to_string(),
            capture_date: None,
            resolution_meters_per_pixel: 0.5,
            quality: ImageryQuality::High,
            cloud_cover_percent: cloud,
            footprint: Some(Footprint {
                polygon: Vec::new(),
                area_sq_m,
            }),
        }
    }

    fn consensus() -> MultiSourceConsensus {
        MultiSourceConsensus::new(Vec::new(), ConsensusSettings::default())
    }

    #[test]
    fn test_compare_flags_variance_and_cloud() {
        let set = consensus().compare(
            LatLng::new(40.0, -75.0),
            vec![capture("bing", 100.0, None), capture("sentinel-2", 160.0, Some(80.0))],
            Vec::new(),
        );

        // mean 130, population std 30 → 23.1%
        assert!((set.footprint_variance_percent - 30.0 / 130.0 * 100.0).abs() < 1e-9);
        assert!(set.quality_flags.iter().any(|f| f.starts_with("Footprint variance")));
        assert!(set.quality_flags.iter().any(|f| f.starts_with("sentinel-2: cloud cover")));
        assert_eq!(set.recommended_primary.as_deref(), Some("bing"));
        assert_eq!(set.agreements.len(), 1);
        assert_eq!(set.agreements[0].agreement, AgreementLevel::Conflict);
    }

    #[test]
    fn test_compare_without_sources() {
        let set = consensus().compare(LatLng::new(40.0, -75.0), Vec::new(), vec!["bing: boom".into()]);
        assert!(set.recommended_primary.is_none());
        assert_eq!(set.footprint_variance_percent, 0.0);
        assert!(set.quality_flags.contains(&"No footprints returned".to_string()));
        assert!(set.agreement_percent().is_none());
    }
}
