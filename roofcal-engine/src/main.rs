//! roofcal - calibration store operator tool
//!
//! **Usage:**
//! ```bash
//! roofcal [--config <file>] learn --region 191 --ground-truth 2450 --reference 2210 --source gaf-report
//! roofcal show 191
//! roofcal list
//! roofcal export [backup.json]
//! roofcal import backup.json
//! roofcal remove 191
//! roofcal score --lidar --segments 6 --pitch 26.6
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use roofcal_common::config::EngineConfig;
use roofcal_engine::calibration::{Calibrator, CorrectionSource};
use roofcal_engine::confidence::{self, ConfidenceFactors};
use roofcal_engine::db::{self, SqliteCalibrationStore};
use roofcal_engine::types::ImageryQuality;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Roof measurement calibration tool
#[derive(Parser, Debug)]
#[command(name = "roofcal", version)]
#[command(about = "Manage regional roof measurement calibration")]
struct Cli {
    /// Bootstrap configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a verified ground-truth measurement for a region
    Learn {
        #[arg(long)]
        region: String,

        /// Verified roof area (sq ft)
        #[arg(long)]
        ground_truth: f64,

        /// Area the engine measured for the same roof (sq ft)
        #[arg(long)]
        reference: f64,

        /// gaf-report, lidar or manual-verification
        #[arg(long, default_value = "gaf-report")]
        source: String,

        /// Confidence in the ground truth (0-100)
        #[arg(long, default_value = "90")]
        confidence: f64,
    },

    /// Print one region's model as JSON
    Show { region: String },

    /// List all regions
    List,

    /// Write a JSON backup to a file (stdout if omitted)
    Export { file: Option<PathBuf> },

    /// Replace all models from a JSON backup
    Import { file: PathBuf },

    /// Delete a region's model
    Remove { region: String },

    /// Score confidence factors and print the explanation as JSON
    Score {
        #[arg(long)]
        gaf: bool,

        #[arg(long)]
        lidar: bool,

        /// high, medium, low or unknown
        #[arg(long)]
        imagery_quality: Option<String>,

        #[arg(long)]
        imagery_age_years: Option<f64>,

        #[arg(long)]
        segments: Option<u32>,

        #[arg(long)]
        pitch: Option<f64>,

        #[arg(long, default_value = "1")]
        sources: usize,

        #[arg(long)]
        agreement: Option<f64>,
    },
}

fn parse_quality(s: &str) -> Result<ImageryQuality> {
    Ok(match s {
        "high" => ImageryQuality::High,
        "medium" => ImageryQuality::Medium,
        "low" => ImageryQuality::Low,
        "unknown" => ImageryQuality::Unknown,
        other => bail!("unknown imagery quality '{}'", other),
    })
}

async fn open_calibrator(config: &EngineConfig) -> Result<Calibrator> {
    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    Ok(Calibrator::new(
        Arc::new(SqliteCalibrationStore::new(pool)),
        config.calibration.clone(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_path) = EngineConfig::load_resolved(cli.config.as_deref())?;
    roofcal_common::logging::init_tracing(&config.logging)?;
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => warn!("No configuration file found, using built-in defaults"),
    }

    match cli.command {
        Command::Learn {
            region,
            ground_truth,
            reference,
            source,
            confidence,
        } => {
            let source = CorrectionSource::parse(&source)
                .with_context(|| format!("unknown correction source '{}'", source))?;
            let calibrator = open_calibrator(&config).await?;
            let model = calibrator
                .learn(&region, ground_truth, reference, source, confidence)
                .await?;
            println!(
                "{}: factor {:.4}, {} samples ({} effective), confidence {:.1}, {}",
                model.region_key,
                model.correction_factor,
                model.sample_count,
                model.effective_sample_count,
                model.weighted_confidence,
                model.recommended_action.as_str()
            );
        }
        Command::Show { region } => {
            let calibrator = open_calibrator(&config).await?;
            match calibrator.model(&region).await? {
                Some(model) => println!("{}", serde_json::to_string_pretty(&model)?),
                None => bail!("no calibration model for region {}", region),
            }
        }
        Command::List => {
            let calibrator = open_calibrator(&config).await?;
            for model in calibrator.models().await? {
                println!(
                    "{:<12} {:>8.4} {:>4} {:>6.1} {:<10} {}",
                    model.region_key,
                    model.correction_factor,
                    model.sample_count,
                    model.weighted_confidence,
                    model.trend_direction.as_str(),
                    model.recommended_action.as_str()
                );
            }
            let stats = calibrator.stats().await?;
            println!(
                "{} regions, {} samples, {} high confidence",
                stats.region_count, stats.total_samples, stats.high_confidence_regions
            );
        }
        Command::Export { file } => {
            let calibrator = open_calibrator(&config).await?;
            let json = calibrator.export().await?;
            match file {
                Some(path) => {
                    std::fs::write(&path, &json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Exported calibration backup to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Command::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let calibrator = open_calibrator(&config).await?;
            let count = calibrator.import(&json).await?;
            println!("Imported {} regions", count);
        }
        Command::Remove { region } => {
            let calibrator = open_calibrator(&config).await?;
            if !calibrator.remove(&region).await? {
                bail!("no calibration model for region {}", region);
            }
            println!("Removed {}", region);
        }
        Command::Score {
            gaf,
            lidar,
            imagery_quality,
            imagery_age_years,
            segments,
            pitch,
            sources,
            agreement,
        } => {
            let factors = ConfidenceFactors {
                gaf_calibrated: gaf,
                has_lidar: lidar,
                imagery_quality: imagery_quality.as_deref().map(parse_quality).transpose()?,
                imagery_age_years,
                segment_count: segments,
                pitch_degrees: pitch,
                source_count: sources,
                agreement_percent: agreement,
            };
            println!("{}", serde_json::to_string_pretty(&confidence::score(&factors))?);
        }
    }

    Ok(())
}
