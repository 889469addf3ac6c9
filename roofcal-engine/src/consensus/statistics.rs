//! Cross-source statistics on footprint areas
//!
//! Coefficient of variation, IQR outlier detection and pairwise agreement.
//! All functions are pure and take `(provider, area)` pairs in discovery
//! order.

use serde::{Deserialize, Serialize};

/// IQR fence multiplier
pub const IQR_FENCE: f64 = 1.5;

/// Agreement level between two footprint areas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgreementLevel {
    /// ≤5%
    Strong,
    /// ≤15%
    Moderate,
    /// ≤25%
    Weak,
    Conflict,
}

impl AgreementLevel {
    pub fn from_variance(variance_percent: f64) -> Self {
        if variance_percent <= 5.0 {
            AgreementLevel::Strong
        } else if variance_percent <= 15.0 {
            AgreementLevel::Moderate
        } else if variance_percent <= 25.0 {
            AgreementLevel::Weak
        } else {
            AgreementLevel::Conflict
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementLevel::Strong => "strong",
            AgreementLevel::Moderate => "moderate",
            AgreementLevel::Weak => "weak",
            AgreementLevel::Conflict => "conflict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseAgreement {
    pub first: String,
    pub second: String,
    /// |a − b| relative to the smaller area, in percent
    pub variance_percent: f64,
    pub agreement: AgreementLevel,
}

/// Coefficient of variation (population std dev / mean × 100)
///
/// 0 for fewer than two values or a non-positive mean.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let (mean, std_dev) = crate::calibration::model::mean_std(values);
    if mean <= 0.0 {
        return 0.0;
    }
    std_dev / mean * 100.0
}

/// Variance between two areas relative to the smaller one, in percent
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let base = a.min(b);
    if base <= 0.0 {
        return if a == b { 0.0 } else { f64::INFINITY };
    }
    (a - b).abs() * 100.0 / base
}

/// Every provider pair, in discovery order
pub fn pairwise_agreement(areas: &[(String, f64)]) -> Vec<PairwiseAgreement> {
    let mut pairs = Vec::new();
    for (i, (first, a)) in areas.iter().enumerate() {
        for (second, b) in &areas[i + 1..] {
            let variance_percent = relative_difference(*a, *b);
            pairs.push(PairwiseAgreement {
                first: first.clone(),
                second: second.clone(),
                variance_percent,
                agreement: AgreementLevel::from_variance(variance_percent),
            });
        }
    }
    pairs
}

/// Quartile by linear interpolation between closest ranks
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Interquartile fences `[Q1 − 1.5·IQR, Q3 + 1.5·IQR]`
pub fn iqr_bounds(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    Some((q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr))
}

/// Providers whose area falls outside the IQR fences
///
/// Needs at least four values; smaller sets report no outliers.
pub fn identify_outliers(areas: &[(String, f64)]) -> Vec<String> {
    if areas.len() < 4 {
        return Vec::new();
    }
    let values: Vec<f64> = areas.iter().map(|(_, a)| *a).collect();
    let Some((low, high)) = iqr_bounds(&values) else {
        return Vec::new();
    };
    areas
        .iter()
        .filter(|(_, a)| *a < low || *a > high)
        .map(|(name, _)| name.clone())
        .collect()
}
