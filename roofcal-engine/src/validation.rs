//! Cross-Validator
//!
//! Compares the resolved primary measurement against secondary measurements
//! and flags discrepancies. The primary is annotated, never replaced or
//! averaged with the secondaries.
//!
//! Variance is `(secondary − primary) / primary × 100` on footprint area.
//! Status by absolute variance: ≤5% agrees, ≤15% minor variance, otherwise
//! significant variance (which also adds a warning).

use crate::types::MeasurementResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Agreement threshold (percent)
pub const AGREES_PERCENT: f64 = 5.0;
/// Minor variance threshold (percent)
pub const MINOR_VARIANCE_PERCENT: f64 = 15.0;

/// Area reported by a secondary source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryMeasurement {
    pub source: String,
    pub area_sq_ft: f64,
}

impl SecondaryMeasurement {
    pub fn new(source: impl Into<String>, area_sq_ft: f64) -> Self {
        Self {
            source: source.into(),
            area_sq_ft,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Agrees,
    MinorVariance,
    SignificantVariance,
}

impl CheckStatus {
    /// Classify a signed variance percentage
    pub fn from_variance(variance_percent: f64) -> Self {
        let magnitude = variance_percent.abs();
        if magnitude <= AGREES_PERCENT {
            CheckStatus::Agrees
        } else if magnitude <= MINOR_VARIANCE_PERCENT {
            CheckStatus::MinorVariance
        } else {
            CheckStatus::SignificantVariance
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Agrees => "agrees",
            CheckStatus::MinorVariance => "minor-variance",
            CheckStatus::SignificantVariance => "significant-variance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallValidation {
    Validated,
    Unvalidated,
    DiscrepancyDetected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub source: String,
    pub measurement: SecondaryMeasurement,
    /// Signed percentage relative to the primary
    pub variance_from_primary: f64,
    pub status: CheckStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub primary_measurement: MeasurementResult,
    pub checks: Vec<ValidationCheck>,
    pub warnings: Vec<String>,
    pub overall_validation: OverallValidation,
}

/// Cross-validate `primary` against `secondaries`
///
/// A primary without a positive footprint area (the manual placeholder) has
/// nothing to compare against and is returned unvalidated.
pub fn validate(
    primary: &MeasurementResult,
    secondaries: &[SecondaryMeasurement],
) -> ValidationResult {
    let primary_area = primary.footprint_area_sq_ft;
    let mut checks = Vec::with_capacity(secondaries.len());
    let mut warnings = Vec::new();

    if !(primary_area > 0.0) {
        if !secondaries.is_empty() {
            warnings.push("Primary measurement has no area; secondary sources not compared".to_string());
        }
        return ValidationResult {
            primary_measurement: primary.clone(),
            checks,
            warnings,
            overall_validation: OverallValidation::Unvalidated,
        };
    }

    for secondary in secondaries {
        let variance = (secondary.area_sq_ft - primary_area) / primary_area * 100.0;
        let status = CheckStatus::from_variance(variance);

        debug!(
            source = %secondary.source,
            area_sq_ft = secondary.area_sq_ft,
            variance_percent = variance,
            status = status.as_str(),
            "Cross-validation check"
        );

        if status == CheckStatus::SignificantVariance {
            let message = format!(
                "{} differs from primary by {:+.1}% ({:.0} vs {:.0} sq ft)",
                secondary.source, variance, secondary.area_sq_ft, primary_area
            );
            warn!("{}", message);
            warnings.push(message);
        }

        checks.push(ValidationCheck {
            source: secondary.source.clone(),
            measurement: secondary.clone(),
            variance_from_primary: variance,
            status,
        });
    }

    let overall_validation = if checks.is_empty() {
        OverallValidation::Unvalidated
    } else if !warnings.is_empty() {
        OverallValidation::DiscrepancyDetected
    } else {
        OverallValidation::Validated
    };

    ValidationResult {
        primary_measurement: primary.clone(),
        checks,
        warnings,
        overall_validation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MeasurementSource;

    fn primary(area: f64) -> MeasurementResult {
        MeasurementResult::from_footprint(area, 0.0, 4, MeasurementSource::Solar)
    }

    #[test]
    fn test_no_secondaries_is_unvalidated() {
        let result = validate(&primary(2000.0), &[]);
        assert_eq!(result.overall_validation, OverallValidation::Unvalidated);
        assert!(result.checks.is_empty());
    }

    #[test]
    fn test_twenty_percent_is_discrepancy() {
        let result = validate(&primary(2000.0), &[SecondaryMeasurement::new("osm", 2400.0)]);

        assert_eq!(result.checks.len(), 1);
        assert!((result.checks[0].variance_from_primary - 20.0).abs() < 1e-9);
        assert_eq!(result.checks[0].status, CheckStatus::SignificantVariance);
        assert_eq!(result.overall_validation, OverallValidation::DiscrepancyDetected);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_primary_never_replaced() {
        let p = primary(2000.0);
        let result = validate(&p, &[SecondaryMeasurement::new("bing", 1000.0)]);
        assert_eq!(result.primary_measurement, p);
    }

    #[test]
    fn test_status_boundaries() {
        assert_eq!(CheckStatus::from_variance(5.0), CheckStatus::Agrees);
        assert_eq!(CheckStatus::from_variance(-5.0), CheckStatus::Agrees);
        assert_eq!(CheckStatus::from_variance(15.0), CheckStatus::MinorVariance);
        assert_eq!(CheckStatus::from_variance(-15.1), CheckStatus::SignificantVariance);
    }

    #[test]
    fn test_minor_variance_still_validated() {
        let result = validate(
            &primary(2000.0),
            &[
                SecondaryMeasurement::new("osm", 2050.0),
                SecondaryMeasurement::new("bing", 1800.0),
            ],
        );
        assert_eq!(result.checks[1].status, CheckStatus::MinorVariance);
        assert_eq!(result.overall_validation, OverallValidation::Validated);
    }

    #[test]
    fn test_placeholder_primary_unvalidated() {
        let result = validate(
            &MeasurementResult::manual_placeholder(),
            &[SecondaryMeasurement::new("osm", 2000.0)],
        );
        assert_eq!(result.overall_validation, OverallValidation::Unvalidated);
        assert_eq!(result.warnings.len(), 1);
    }
}
