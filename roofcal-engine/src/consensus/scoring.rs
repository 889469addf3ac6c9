//! Imagery source ranking
//!
//! score = resolution + recency + quality + cloud cover
//!
//! | Component  | Rule                                                   |
//! |------------|--------------------------------------------------------|
//! | Resolution | max(0, 40 − 4·(m/px − 0.149))                          |
//! | Recency    | age <30d → 30, <90d → 25, <365d → 20, <730d → 10, else 5 |
//! | Quality    | high 20, medium 15, low 10, unknown 5                  |
//! | Cloud      | max(0, 10 − cover/10); unreported cover scores 10      |

use crate::types::{ImageryQuality, ImagerySource};
use chrono::NaiveDate;

/// Resolution scoring 40 points; sharper imagery scores slightly more (m/px)
pub const REFERENCE_RESOLUTION: f64 = 0.149;

pub fn resolution_score(meters_per_pixel: f64) -> f64 {
    if !meters_per_pixel.is_finite() {
        return 0.0;
    }
    (40.0 - 4.0 * (meters_per_pixel - REFERENCE_RESOLUTION)).max(0.0)
}

/// Undated imagery scores as the oldest bucket
pub fn recency_score(capture_date: Option<NaiveDate>, today: NaiveDate) -> f64 {
    let Some(date) = capture_date else {
        return 5.0;
    };
    match (today - date).num_days().max(0) {
        0..=29 => 30.0,
        30..=89 => 25.0,
        90..=364 => 20.0,
        365..=729 => 10.0,
        _ => 5.0,
    }
}

pub fn quality_score(quality: ImageryQuality) -> f64 {
    match quality {
        ImageryQuality::High => 20.0,
        ImageryQuality::Medium => 15.0,
        ImageryQuality::Low => 10.0,
        ImageryQuality::Unknown => 5.0,
    }
}

pub fn cloud_cover_score(cloud_cover_percent: Option<f64>) -> f64 {
    match cloud_cover_percent {
        Some(cover) => (10.0 - cover / 10.0).max(0.0),
        None => 10.0,
    }
}

/// Combined ranking score of one capture
pub fn source_score(source: &ImagerySource, today: NaiveDate) -> f64 {
    resolution_score(source.resolution_meters_per_pixel)
        + recency_score(source.capture_date, today)
        + quality_score(source.quality)
        + cloud_cover_score(source.cloud_cover_percent)
}

/// Index of the highest-scoring source; ties keep the earliest
pub fn select_best(sources: &[ImagerySource], today: NaiveDate) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, source) in sources.iter().enumerate() {
        let score = source_score(source, today);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}
