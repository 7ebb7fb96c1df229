#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Command-line entry points for the facility map pipeline.
//!
//! `prepare` derives the pipeline inputs (households, village centers,
//! baseline facilities, locations); `process` runs the per-location
//! clustering and placement pipeline and merges the results;
//! `clear-cache` drops the computation cache explicitly — cache entries
//! are never invalidated automatically.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use facility_map_cache::Cache;
use facility_map_cli_utils::IndicatifProgress;
use facility_map_config::Config;
use facility_map_models::cancel::CancelToken;

#[derive(Parser)]
#[command(name = "facility-map", about = "Health facility placement pipeline")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare pipeline inputs from raw buildings, shapes and village
    /// centers
    Prepare,
    /// Cluster households and place facilities for the prepared
    /// locations
    Process {
        /// Anchored regex patterns selecting the locations to process
        /// (all when omitted)
        #[arg(long)]
        locations: Vec<String>,
    },
    /// Remove every cached computation result
    ClearCache,
}

fn open_cache(cfg: &Config) -> Cache {
    cfg.args
        .cache_dir
        .as_ref()
        .map_or_else(Cache::memory, |dir| Cache::disk(dir.clone()))
}

fn main() -> ExitCode {
    let multi = facility_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let cfg = match Config::from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("Unable to read the config file {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancelToken::new();
    let cache = open_cache(&cfg);

    let result = match cli.command {
        Commands::Prepare => run_prepare(&cfg, &cancel, &cache),
        Commands::Process { locations } => {
            let mut cfg = cfg;
            cfg.location_filter = locations;
            run_process(&cfg, &cancel, &cache, &multi)
        }
        Commands::ClearCache => match cache.clear() {
            Ok(()) => {
                log::info!("Cache cleared.");
                Ok(())
            }
            Err(e) => Err(format!("Failed to clear the cache: {e}")),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            log::error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run_prepare(cfg: &Config, cancel: &CancelToken, cache: &Cache) -> Result<(), String> {
    match facility_map_prep::prepare_inputs(cfg, cancel, cache) {
        Ok(outcome) => {
            log::info!(
                "Inputs ready: {} households file, {} locations.",
                outcome.households_file.display(),
                outcome.locations.len()
            );
            Ok(())
        }
        Err(facility_map_prep::PrepError::Cancelled(_)) => {
            log::warn!("Preparation stopped by the user.");
            Ok(())
        }
        Err(e) => Err(format!("Input preparation failed: {e}")),
    }
}

fn run_process(
    cfg: &Config,
    cancel: &CancelToken,
    cache: &Cache,
    multi: &facility_map_cli_utils::MultiProgress,
) -> Result<(), String> {
    let progress = IndicatifProgress::stage_bar(multi, "Processing locations");
    let pipeline = facility_map_pipeline::Pipeline::new(cfg, cancel, cache, progress.clone());

    let summary = pipeline
        .process_locations()
        .map_err(|e| format!("Processing failed: {e}"))?;

    progress.finish_and_clear();

    if summary.stopped {
        log::warn!("Processing stopped by the user.");
        return Ok(());
    }

    match &summary.result {
        Some(files) => {
            log::info!("Merged results:");
            log::info!("  shapes:     {}", files.shapes_file.display());
            log::info!("  clusters:   {}", files.clusters_file.display());
            log::info!("  centers:    {}", files.centers_file.display());
            log::info!("  counts:     {}", files.counts_file.display());
            log::info!("  facilities: {}", files.facilities_file.display());
        }
        None => log::warn!("No results found."),
    }

    if summary.failed.is_empty() {
        log::info!("All locations processed.");
    } else {
        log::warn!("Failed locations ({}):", summary.failed.len());
        for location in &summary.failed {
            log::warn!("  {location}");
        }
    }

    Ok(())
}
