//! Seasonal footprint analysis
//!
//! Samples the best footprint at four fixed dates of a year and flags
//! anomalies that explain (or fail to explain) area differences:
//! - snow cover: winter area > summer area × 1.05
//! - leaf cover: spring area < fall area × 0.97
//! - structural change: spread > 15% with neither seasonal anomaly
//!
//! Severity from magnitude: <10% low, <20% medium, else high. The consensus
//! score starts at 100 and loses 5 / 15 / 25 per anomaly by severity.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const SNOW_RATIO: f64 = 1.05;
pub const LEAF_RATIO: f64 = 0.97;
pub const STRUCTURAL_SPREAD_PERCENT: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Fall];

    /// Fixed sampling date within `year`
    pub fn sample_date(self, year: i32) -> Option<NaiveDate> {
        let month = match self {
            Season::Winter => 1,
            Season::Spring => 4,
            Season::Summer => 7,
            Season::Fall => 10,
        };
        NaiveDate::from_ymd_opt(year, month, 15)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Fall => "fall",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyKind {
    SnowCover,
    LeafCover,
    StructuralChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_magnitude(percent: f64) -> Self {
        if percent < 10.0 {
            Severity::Low
        } else if percent < 20.0 {
            Severity::Medium
        } else {
            Severity::High
        }
    }

    pub fn penalty(&self) -> f64 {
        match self {
            Severity::Low => 5.0,
            Severity::Medium => 15.0,
            Severity::High => 25.0,
        }
    }
}

/// Best footprint found for one season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalSample {
    pub season: Season,
    /// Capture date of the chosen imagery (target date when unreported)
    pub capture_date: NaiveDate,
    pub footprint_area_sq_ft: f64,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalAnomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    /// Size of the deviation in percent
    pub magnitude_percent: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalAnalysis {
    pub samples: Vec<SeasonalSample>,
    pub anomalies: Vec<SeasonalAnomaly>,
    /// 100 minus anomaly penalties, floored at 0
    pub consensus_score: f64,
    /// Season whose area is closest to the median of all samples
    pub recommended_season: Option<Season>,
    /// Per-season fetch problems
    pub quality_flags: Vec<String>,
}

fn area_of(samples: &[SeasonalSample], season: Season) -> Option<f64> {
    samples
        .iter()
        .find(|s| s.season == season)
        .map(|s| s.footprint_area_sq_ft)
}

fn anomaly(kind: AnomalyKind, magnitude_percent: f64, description: String) -> SeasonalAnomaly {
    SeasonalAnomaly {
        kind,
        severity: Severity::from_magnitude(magnitude_percent),
        magnitude_percent,
        description,
    }
}

/// Detect seasonal anomalies over the collected samples
pub fn analyze(samples: Vec<SeasonalSample>, quality_flags: Vec<String>) -> SeasonalAnalysis {
    let mut anomalies = Vec::new();

    if let (Some(winter), Some(summer)) = (
        area_of(&samples, Season::Winter),
        area_of(&samples, Season::Summer),
    ) {
        if summer > 0.0 && winter > summer * SNOW_RATIO {
            let magnitude = (winter / summer - 1.0) * 100.0;
            anomalies.push(anomaly(
                AnomalyKind::SnowCover,
                magnitude,
                format!(
                    "Winter footprint {:.1}% larger than summer; likely snow cover",
                    magnitude
                ),
            ));
        }
    }

    if let (Some(spring), Some(fall)) = (
        area_of(&samples, Season::Spring),
        area_of(&samples, Season::Fall),
    ) {
        if fall > 0.0 && spring < fall * LEAF_RATIO {
            let magnitude = (1.0 - spring / fall) * 100.0;
            anomalies.push(anomaly(
                AnomalyKind::LeafCover,
                magnitude,
                format!(
                    "Spring footprint {:.1}% smaller than fall; likely leaf cover",
                    magnitude
                ),
            ));
        }
    }

    if anomalies.is_empty() && samples.len() >= 2 {
        let min = samples
            .iter()
            .map(|s| s.footprint_area_sq_ft)
            .fold(f64::INFINITY, f64::min);
        let max = samples
            .iter()
            .map(|s| s.footprint_area_sq_ft)
            .fold(f64::NEG_INFINITY, f64::max);
        if min > 0.0 {
            let spread = (max - min) / min * 100.0;
            if spread > STRUCTURAL_SPREAD_PERCENT {
                anomalies.push(anomaly(
                    AnomalyKind::StructuralChange,
                    spread,
                    format!(
                        "Footprint varies {:.1}% across the year without a seasonal cause; possible structural change",
                        spread
                    ),
                ));
            }
        }
    }

    let penalty: f64 = anomalies.iter().map(|a| a.severity.penalty()).sum();
    let consensus_score = (100.0 - penalty).max(0.0);

    SeasonalAnalysis {
        recommended_season: representative_season(&samples),
        samples,
        anomalies,
        consensus_score,
        quality_flags,
    }
}

/// Season whose area is nearest the median; ties keep season order
fn representative_season(samples: &[SeasonalSample]) -> Option<Season> {
    if samples.is_empty() {
        return None;
    }
    let mut areas: Vec<f64> = samples.iter().map(|s| s.footprint_area_sq_ft).collect();
    areas.sort_by(|a, b| a.total_cmp(b));
    let mid = areas.len() / 2;
    let median = if areas.len() % 2 == 0 {
        (areas[mid - 1] + areas[mid]) / 2.0
    } else {
        areas[mid]
    };

    let mut best: Option<(Season, f64)> = None;
    for sample in samples {
        let distance = (sample.footprint_area_sq_ft - median).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((sample.season, distance)),
        }
    }
    best.map(|(season, _)| season)
}
