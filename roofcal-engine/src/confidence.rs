//! Confidence Scorer
//!
//! Pure function turning situational factors into a 0-100 score plus a
//! factor-by-factor explanation. Identical input always yields identical
//! output.
//!
//! # Scoring Algorithm
//! Start at 70, apply each factor's delta, clamp to [0, 100] after every step:
//! - GAF calibration: +25
//! - LiDAR: +20
//! - Imagery quality: high +10 / medium +0 / low −15 / unknown −10
//! - Imagery age: ≤1y +5 / ≤2y +0 / ≤3y −5 / >3y −10
//! - Segments: ≤4 +5 / ≤8 +0 / ≤12 −5 / >12 −10
//! - Pitch: ≤5° +5 / ≤33.7° +0 / ≤45° −5 / >45° −15
//! - Multi-source agreement (only when more than one source):
//!   ≥95% +15 / ≥90% +10 / ≥80% +5 / else −5
//!
//! # Levels
//! ≥90 gaf-level, ≥75 high, ≥60 moderate, else low.

use crate::types::ImageryQuality;
use serde::{Deserialize, Serialize};

/// Score before any factor is applied
pub const BASE_SCORE: f64 = 70.0;

/// Situational inputs; absent fields contribute nothing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    /// Region has a GAF-report calibration
    pub gaf_calibrated: bool,
    /// Measurement came from LiDAR
    pub has_lidar: bool,
    pub imagery_quality: Option<ImageryQuality>,
    pub imagery_age_years: Option<f64>,
    pub segment_count: Option<u32>,
    pub pitch_degrees: Option<f64>,
    /// Number of independent sources compared
    pub source_count: usize,
    /// Agreement between sources (0-100)
    pub agreement_percent: Option<f64>,
}

/// Confidence level bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceLevel {
    GafLevel,
    High,
    Moderate,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            ConfidenceLevel::GafLevel
        } else if score >= 75.0 {
            ConfidenceLevel::High
        } else if score >= 60.0 {
            ConfidenceLevel::Moderate
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::GafLevel => "gaf-level",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Moderate => "moderate",
            ConfidenceLevel::Low => "low",
        }
    }
}

/// One applied factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactor {
    pub name: String,
    /// Signed delta applied to the running score
    pub impact: f64,
    pub description: String,
}

/// Scorer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub score: f64,
    pub level: ConfidenceLevel,
    pub factors: Vec<ConfidenceFactor>,
}

/// Confidence Scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score the given factors
    pub fn score(&self, factors: &ConfidenceFactors) -> ConfidenceResult {
        let mut score = BASE_SCORE;
        let mut applied = Vec::new();

        let mut apply = |name: &str, impact: f64, description: String| {
            score = (score + impact).clamp(0.0, 100.0);
            applied.push(ConfidenceFactor {
                name: name.to_string(),
                impact,
                description,
            });
        };

        if factors.gaf_calibrated {
            apply(
                "gaf-calibration",
                25.0,
                "Region calibrated against GAF reports".to_string(),
            );
        }

        if factors.has_lidar {
            apply("lidar", 20.0, "Measured from LiDAR point cloud".to_string());
        }

        if let Some(quality) = factors.imagery_quality {
            let impact = match quality {
                ImageryQuality::High => 10.0,
                ImageryQuality::Medium => 0.0,
                ImageryQuality::Low => -15.0,
                ImageryQuality::Unknown => -10.0,
            };
            apply(
                "imagery-quality",
                impact,
                format!("{} imagery quality", quality.as_str()),
            );
        }

        if let Some(age) = factors.imagery_age_years {
            let impact = if age <= 1.0 {
                5.0
            } else if age <= 2.0 {
                0.0
            } else if age <= 3.0 {
                -5.0
            } else {
                -10.0
            };
            apply("imagery-age", impact, format!("Imagery is {:.1} years old", age));
        }

        if let Some(segments) = factors.segment_count {
            let impact = match segments {
                0..=4 => 5.0,
                5..=8 => 0.0,
                9..=12 => -5.0,
                _ => -10.0,
            };
            apply("roof-complexity", impact, format!("{} roof segments", segments));
        }

        if let Some(pitch) = factors.pitch_degrees {
            let impact = if pitch <= 5.0 {
                5.0
            } else if pitch <= 33.7 {
                0.0
            } else if pitch <= 45.0 {
                -5.0
            } else {
                -15.0
            };
            apply("pitch", impact, format!("Pitch of {:.1}°", pitch));
        }

        if factors.source_count > 1 {
            if let Some(agreement) = factors.agreement_percent {
                let impact = if agreement >= 95.0 {
                    15.0
                } else if agreement >= 90.0 {
                    10.0
                } else if agreement >= 80.0 {
                    5.0
                } else {
                    -5.0
                };
                apply(
                    "multi-source-agreement",
                    impact,
                    format!(
                        "{} sources agree within {:.1}%",
                        factors.source_count, agreement
                    ),
                );
            }
        }

        ConfidenceResult {
            score,
            level: ConfidenceLevel::from_score(score),
            factors: applied,
        }
    }
}

/// Score factors with the default scorer
pub fn score(factors: &ConfidenceFactors) -> ConfidenceResult {
    ConfidenceScorer::new().score(factors)
}
