#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Input preparation for the processing pipeline.
//!
//! Derives the households table from raw building centroids (chunked,
//! memory-bounded, cancellable), prepares the user-supplied village
//! centers and optional baseline facilities by joining them to the
//! administrative boundaries, and persists the flat list of locations
//! that drives per-location processing.

mod stats;
mod text;

use std::fs;
use std::path::{Path, PathBuf};

use facility_map_cache::{file_digest, Cache};
use facility_map_config::Config;
use facility_map_models::cancel::{CancelToken, Cancelled};
use facility_map_models::status::{StageStatus, StatusRecord};
use facility_map_models::tables::{self, TableError};
use facility_map_models::{Facility, Household, Location, VillageCenter};
use facility_map_spatial::geojson_io::{self, ShapeFeature};
use facility_map_spatial::{join_points, pluscode, BoundaryIndex, SpatialError};

pub use stats::{household_stats, HouseholdStats};
pub use text::text_to_id;

/// Input preparation failure.
#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    /// File IO failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV layer failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Tabular IO failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Geometry layer failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// A required column is missing from an input file.
    #[error("missing required column {column} in {file}")]
    MissingColumn { column: String, file: PathBuf },

    /// The join produced more rows than the input had, which a `within`
    /// join can never legitimately do.
    #[error("derived {output} households from {input} building points")]
    JoinInvariant { output: usize, input: usize },

    /// The run was stopped by the user.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Prepared input files plus the derived location list.
pub struct PrepOutcome {
    pub households_file: PathBuf,
    pub village_centers_file: PathBuf,
    pub baseline_file: Option<PathBuf>,
    pub locations: Vec<Location>,
}

fn file_ready(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.len() > 0)
}

// ── Household derivation ────────────────────────────────

/// Derives the households table from raw building centroids.
///
/// Re-derivation is skipped when the output file already exists and is
/// non-empty. The building file is processed in `chunk_size` row chunks
/// to bound peak memory; a cancellation check runs before each chunk.
/// The full derivation is content-addressed by the input file digests
/// and column configuration.
///
/// # Errors
///
/// Returns an error on IO failure, missing coordinate columns, a join
/// invariant violation, or cancellation.
pub fn prepare_households(
    cfg: &Config,
    index: &BoundaryIndex,
    cancel: &CancelToken,
    cache: &Cache,
) -> Result<PathBuf, PrepError> {
    let hh_file = cfg.inputs.households.file.clone();
    if file_ready(&hh_file) {
        log::info!("Skipping households prep, file already exists.");
        return Ok(hh_file);
    }

    StatusRecord::store(&hh_file, "prepare_households", StageStatus::InProgress)?;

    let result = derive_households(cfg, index, cancel, cache);
    let households = match result {
        Ok(households) => households,
        Err(e) => {
            let status = if matches!(e, PrepError::Cancelled(_)) {
                StageStatus::NotStarted
            } else {
                StageStatus::Failed
            };
            let _ = StatusRecord::store(&hh_file, "prepare_households", status);
            return Err(e);
        }
    };

    tables::write_households(&hh_file, &households, &cfg.column_spec())?;
    StatusRecord::store(&hh_file, "prepare_households", StageStatus::Done)?;
    log::info!(
        "Prepared {} households into {}",
        households.len(),
        hh_file.display()
    );
    Ok(hh_file)
}

fn derive_households(
    cfg: &Config,
    index: &BoundaryIndex,
    cancel: &CancelToken,
    cache: &Cache,
) -> Result<Vec<Household>, PrepError> {
    let buildings_file = &cfg.inputs.buildings.file;
    let key = (
        file_digest(buildings_file)?,
        file_digest(&cfg.inputs.shapes.file)?,
        &cfg.inputs.shapes.adm_cols,
        &cfg.inputs.buildings.xy_cols,
        cfg.args.chunk_size,
    );

    cache.get_or_compute("derive-households", &key, || {
        process_buildings(
            buildings_file,
            &cfg.inputs.buildings.xy_cols,
            cfg.args.chunk_size,
            index,
            cancel,
        )
    })
}

/// Joins raw building points against the boundary index in fixed-size
/// chunks, concatenating the per-chunk results.
///
/// # Errors
///
/// Returns an error on IO failure, missing coordinate columns, a join
/// invariant violation, or cancellation.
pub fn process_buildings(
    buildings_file: &Path,
    xy_cols: &[String; 2],
    chunk_size: usize,
    index: &BoundaryIndex,
    cancel: &CancelToken,
) -> Result<Vec<Household>, PrepError> {
    let mut rdr = csv::Reader::from_path(buildings_file)?;
    let headers = rdr.headers()?.clone();
    let lon_idx = column_index(&headers, &xy_cols[0], buildings_file)?;
    let lat_idx = column_index(&headers, &xy_cols[1], buildings_file)?;

    let mut households = Vec::new();
    let mut chunk: Vec<(f64, f64)> = Vec::with_capacity(chunk_size.min(1 << 20));
    let mut input_count = 0_usize;

    cancel.check()?;
    for record in rdr.records() {
        let record = record?;
        input_count += 1;
        let lon = record.get(lon_idx).and_then(|v| v.parse::<f64>().ok());
        let lat = record.get(lat_idx).and_then(|v| v.parse::<f64>().ok());
        // Rows with missing or unparseable coordinates are dropped, not
        // errors; a missing column is.
        if let (Some(lon), Some(lat)) = (lon, lat) {
            chunk.push((lon, lat));
        }
        if chunk.len() >= chunk_size {
            cancel.check()?;
            join_chunk(&mut households, std::mem::take(&mut chunk), index);
        }
    }
    if !chunk.is_empty() {
        cancel.check()?;
        join_chunk(&mut households, chunk, index);
    }
    cancel.check()?;

    if households.len() > input_count {
        return Err(PrepError::JoinInvariant {
            output: households.len(),
            input: input_count,
        });
    }

    tables::sort_households(&mut households);
    Ok(households)
}

fn join_chunk(households: &mut Vec<Household>, chunk: Vec<(f64, f64)>, index: &BoundaryIndex) {
    let joined = join_points(chunk, |&(lon, lat)| (lon, lat), index);
    households.extend(joined.into_iter().map(|((lon, lat), adm)| Household {
        adm,
        lon,
        lat,
    }));
}

fn column_index(
    headers: &csv::StringRecord,
    column: &str,
    file: &Path,
) -> Result<usize, PrepError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| PrepError::MissingColumn {
            column: column.to_string(),
            file: file.to_path_buf(),
        })
}

// ── Village centers ─────────────────────────────────────

/// Prepares the user-supplied village centers: sanitizes names, joins
/// each point to its administrative boundary to attach the admin path,
/// sorts, and writes the canonical CSV plus a GeoJSON sibling for the
/// visualization layer.
///
/// # Errors
///
/// Returns an error on IO failure or missing columns.
pub fn prepare_village_centers(
    cfg: &Config,
    index: &BoundaryIndex,
) -> Result<PathBuf, PrepError> {
    let vc = &cfg.args.village_centers;
    log::info!(
        "Preparing village centers from: {}",
        vc.file.file_name().unwrap_or_default().to_string_lossy()
    );

    let mut rdr = csv::Reader::from_path(&vc.file)?;
    let headers = rdr.headers()?.clone();
    let name_idx = column_index(&headers, &vc.village_col, &vc.file)?;
    let lon_idx = column_index(&headers, &vc.xy_cols[0], &vc.file)?;
    let lat_idx = column_index(&headers, &vc.xy_cols[1], &vc.file)?;

    let mut points = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let name = text_to_id(record.get(name_idx).unwrap_or(""));
        let lon = record.get(lon_idx).and_then(|v| v.parse::<f64>().ok());
        let lat = record.get(lat_idx).and_then(|v| v.parse::<f64>().ok());
        if let (Some(lon), Some(lat)) = (lon, lat) {
            if !name.is_empty() {
                points.push((name, lon, lat));
            }
        }
    }

    let mut centers: Vec<VillageCenter> =
        join_points(points, |&(_, lon, lat)| (lon, lat), index)
            .into_iter()
            .map(|((name, lon, lat), mut adm)| {
                adm.push(name);
                VillageCenter { adm, lon, lat }
            })
            .collect();
    centers.sort_by(|a, b| a.adm.cmp(&b.adm));

    let out = cfg.inputs.village_centers.file.clone();
    tables::write_village_centers(&out, &centers, &cfg.column_spec())?;
    write_points_geojson(
        &out.with_extension("geojson"),
        centers
            .iter()
            .map(|c| (c.adm.as_slice(), c.lon, c.lat, None)),
        cfg,
    )?;
    Ok(out)
}

// ── Baseline facilities ─────────────────────────────────

/// Prepares the user-supplied baseline facilities: assigns sequential
/// ids when the id column is missing, joins each point to its admin
/// boundary, attaches plus codes, and writes the canonical CSV plus a
/// GeoJSON sibling.
///
/// # Errors
///
/// Returns an error on IO failure or missing columns.
pub fn prepare_baseline_facilities(
    cfg: &Config,
    index: &BoundaryIndex,
) -> Result<Option<PathBuf>, PrepError> {
    let Some(baseline) = &cfg.args.baseline_facilities else {
        log::info!("Skipping baseline facilities, no file provided.");
        return Ok(None);
    };
    let Some(out) = cfg.inputs.baseline_facilities_file.clone() else {
        log::info!("Skipping baseline facilities, no prepared path configured.");
        return Ok(None);
    };

    log::info!(
        "Preparing baseline facilities from: {}",
        baseline
            .file
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
    );

    let mut rdr = csv::Reader::from_path(&baseline.file)?;
    let headers = rdr.headers()?.clone();
    let lon_idx = column_index(&headers, &baseline.xy_cols[0], &baseline.file)?;
    let lat_idx = column_index(&headers, &baseline.xy_cols[1], &baseline.file)?;
    let id_idx = headers
        .iter()
        .position(|h| h == tables::FACILITY_ID_COL);

    let mut points = Vec::new();
    for (row_no, record) in rdr.records().enumerate() {
        let record = record?;
        let lon = record.get(lon_idx).and_then(|v| v.parse::<f64>().ok());
        let lat = record.get(lat_idx).and_then(|v| v.parse::<f64>().ok());
        let id = id_idx
            .and_then(|i| record.get(i))
            .filter(|v| !v.is_empty())
            .map_or_else(|| (row_no + 1).to_string(), str::to_string);
        if let (Some(lon), Some(lat)) = (lon, lat) {
            points.push((id, lon, lat));
        }
    }

    let facilities: Vec<Facility> = join_points(points, |&(_, lon, lat)| (lon, lat), index)
        .into_iter()
        .map(|((id, lon, lat), adm)| Facility {
            adm,
            village: String::new(),
            lon,
            lat,
            plus: pluscode::encode(lat, lon),
            facility_id: id,
        })
        .collect();

    tables::write_facilities(&out, &facilities, &cfg.column_spec())?;
    write_points_geojson(
        &out.with_extension("geojson"),
        facilities
            .iter()
            .map(|f| (f.adm.as_slice(), f.lon, f.lat, Some(f.facility_id.as_str()))),
        cfg,
    )?;
    Ok(Some(out))
}

fn write_points_geojson<'a>(
    path: &Path,
    points: impl Iterator<Item = (&'a [String], f64, f64, Option<&'a str>)>,
    cfg: &Config,
) -> Result<(), PrepError> {
    let cols = cfg.column_spec();
    let adm_village = cols.adm_village_cols();

    let features: Vec<ShapeFeature> = points
        .map(|(adm, lon, lat, id)| {
            let mut properties = serde_json::Map::new();
            for (col, value) in adm_village.iter().zip(adm) {
                properties.insert(col.clone(), value.clone().into());
            }
            if let Some(id) = id {
                properties.insert(tables::FACILITY_ID_COL.to_string(), id.into());
            }
            ShapeFeature {
                properties,
                geometry: geo::Geometry::Point(geo::Point::new(lon, lat)),
            }
        })
        .collect();

    geojson_io::write_features(path, &features)?;
    Ok(())
}

// ── Locations ───────────────────────────────────────────

/// Derives the distinct location list from prepared village centers and
/// persists it as the flat locations file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_locations_file(cfg: &Config, centers: &[VillageCenter]) -> Result<Vec<Location>, PrepError> {
    let mut locations: Vec<Location> = centers.iter().map(VillageCenter::location).collect();
    locations.sort();
    locations.dedup();

    let path = &cfg.inputs.all_locations_file;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text: Vec<String> = locations.iter().map(ToString::to_string).collect();
    fs::write(path, text.join("\n"))?;
    Ok(locations)
}

// ── Entry point ─────────────────────────────────────────

/// Prepares all inputs for the processing pipeline.
///
/// On cancellation, partially prepared inputs are removed and the
/// cancellation propagates so callers report the run as stopped, not
/// failed.
///
/// # Errors
///
/// Returns an error on any preparation failure or cancellation.
pub fn prepare_inputs(
    cfg: &Config,
    cancel: &CancelToken,
    cache: &Cache,
) -> Result<PrepOutcome, PrepError> {
    let index = BoundaryIndex::load(&cfg.inputs.shapes.file, &cfg.inputs.shapes.adm_cols)?;

    let outcome = prepare_inputs_with_index(cfg, &index, cancel, cache);
    if let Err(PrepError::Cancelled(_)) = &outcome {
        cleanup_inputs(cfg);
    }
    outcome
}

fn prepare_inputs_with_index(
    cfg: &Config,
    index: &BoundaryIndex,
    cancel: &CancelToken,
    cache: &Cache,
) -> Result<PrepOutcome, PrepError> {
    let households_file = prepare_households(cfg, index, cancel, cache)?;

    let cols = cfg.column_spec();
    let households = tables::read_households(&households_file, &cols)?;
    let stats = household_stats(&households, index.len());
    stats.log_and_check(cfg.args.threshold_village_perc);
    stats.save(&households_file.with_extension("stats.csv"))?;

    cancel.check()?;
    let village_centers_file = prepare_village_centers(cfg, index)?;

    cancel.check()?;
    let baseline_file = prepare_baseline_facilities(cfg, index)?;

    let centers = tables::read_village_centers(&village_centers_file, &cols)?;
    let locations = write_locations_file(cfg, &centers)?;
    log::info!("Prepared {} locations.", locations.len());

    Ok(PrepOutcome {
        households_file,
        village_centers_file,
        baseline_file,
        locations,
    })
}

/// Removes prepared input files after a cancelled preparation run.
pub fn cleanup_inputs(cfg: &Config) {
    let mut files = vec![
        cfg.inputs.households.file.clone(),
        cfg.inputs.households.file.with_extension("stats.csv"),
        cfg.inputs.village_centers.file.clone(),
        cfg.inputs.village_centers.file.with_extension("geojson"),
        cfg.inputs.all_locations_file.clone(),
    ];
    if let Some(baseline) = &cfg.inputs.baseline_facilities_file {
        files.push(baseline.clone());
        files.push(baseline.with_extension("geojson"));
    }
    for file in files {
        let _ = fs::remove_file(&file);
        StatusRecord::clear(&file);
    }
}
