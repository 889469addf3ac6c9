//! roofcal-engine library
//!
//! Measurement resolution and calibration for roof area and pitch.
//!
//! # Components (leaves first)
//! - `geometry`: polygon area, perimeter, simplification, shape metrics
//! - `sources`: typed adapter contracts for external providers
//! - `confidence`: deterministic multi-factor confidence score
//! - `resolver`: tiered, first-success source selection
//! - `validation`: cross-checks the primary against secondary sources
//! - `calibration`: per-region correction factors learned from ground truth
//! - `consensus`: concurrent free-imagery comparison and seasonal analysis
//! - `report`: assembles the above into a `MeasurementReport`

pub mod calibration;
pub mod confidence;
pub mod consensus;
pub mod db;
pub mod error;
pub mod geometry;
pub mod report;
pub mod resolver;
pub mod sources;
pub mod types;
pub mod validation;

pub use crate::calibration::{Calibrator, CorrectionSource, RegionCorrectionModel};
pub use crate::confidence::{ConfidenceFactors, ConfidenceResult, ConfidenceScorer};
pub use crate::error::{CalibrationError, CalibrationResult, SourceError};
pub use crate::report::{MeasureOptions, MeasurementEngine, MeasurementReport};
pub use crate::resolver::{ResolveOptions, TieredResolver};
pub use crate::sources::SourceRegistry;
pub use crate::types::{LatLng, MeasurementResult, TieredMeasurementResult};
