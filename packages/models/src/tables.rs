//! CSV serialization for the pipeline's tabular artifacts.
//!
//! All tables are UTF-8, comma-separated, with a header row. Column
//! layouts are fixed per table kind; admin columns come from the
//! [`ColumnSpec`](crate::ColumnSpec) so every artifact carries the same
//! names end-to-end. Distance columns are written only when present and
//! detected from the header on read.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use crate::{
    CenterRow, ClusterCount, ClusterRow, ColumnSpec, Facility, FacilityDistance, Household,
    VillageCenter,
};

/// Column name for cluster ids in clusters/centers/counts tables.
pub const CLUSTER_COL: &str = "cluster";

/// Column name for per-cluster household counts.
pub const COUNTS_COL: &str = "counts";

/// Column name for the small-cluster flag.
pub const SMALL_COL: &str = "small";

/// Column name for facility plus codes.
pub const PLUS_COL: &str = "plus";

/// Column name for facility ids.
pub const FACILITY_ID_COL: &str = "facility_id";

/// Distance column prefix for households vs. optimal facilities.
pub const HH_PREFIX: &str = "hh";

/// Distance column prefix for cluster centroids vs. optimal facilities.
pub const VILLAGE_PREFIX: &str = "village";

/// Prefix marking baseline (user-supplied) facility distances.
pub const BASELINE_PREFIX: &str = "baseline";

/// Tabular IO failure.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// File read/write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV layer failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is missing from the header.
    #[error("missing required column: {0}")]
    MissingColumn(String),

    /// A cell could not be parsed as the expected type.
    #[error("invalid value {value:?} in column {column}")]
    InvalidValue { column: String, value: String },
}

fn distance_header(prefix: &str) -> [String; 3] {
    [
        format!("{prefix}_assigned_id"),
        format!("{prefix}_euclidean"),
        format!("{prefix}_minkowski"),
    ]
}

fn push_distance(record: &mut Vec<String>, d: Option<&FacilityDistance>) {
    match d {
        Some(d) => {
            record.push(d.assigned_id.clone());
            record.push(d.euclidean.to_string());
            record.push(d.minkowski.to_string());
        }
        None => record.extend([String::new(), String::new(), String::new()]),
    }
}

/// Header lookup helper mapping column names to indices.
struct Header {
    columns: Vec<String>,
}

impl Header {
    fn new(record: &csv::StringRecord) -> Self {
        Self {
            columns: record.iter().map(str::to_string).collect(),
        }
    }

    fn index(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    fn maybe_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

fn field<'a>(record: &'a csv::StringRecord, idx: usize) -> &'a str {
    record.get(idx).unwrap_or("")
}

fn parse_f64(record: &csv::StringRecord, idx: usize, column: &str) -> Result<f64, TableError> {
    let value = field(record, idx);
    value.parse().map_err(|_| TableError::InvalidValue {
        column: column.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(record: &csv::StringRecord, idx: usize, column: &str) -> Result<usize, TableError> {
    let value = field(record, idx);
    value.parse().map_err(|_| TableError::InvalidValue {
        column: column.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(record: &csv::StringRecord, idx: usize, column: &str) -> Result<u64, TableError> {
    let value = field(record, idx);
    value.parse().map_err(|_| TableError::InvalidValue {
        column: column.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(record: &csv::StringRecord, idx: usize, column: &str) -> Result<bool, TableError> {
    let value = field(record, idx);
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(TableError::InvalidValue {
            column: column.to_string(),
            value: value.to_string(),
        }),
    }
}

fn read_distance(
    record: &csv::StringRecord,
    indices: Option<&[usize; 3]>,
) -> Result<Option<FacilityDistance>, TableError> {
    let Some([id_idx, euc_idx, min_idx]) = indices else {
        return Ok(None);
    };
    let assigned_id = field(record, *id_idx);
    if assigned_id.is_empty() {
        return Ok(None);
    }
    Ok(Some(FacilityDistance {
        assigned_id: assigned_id.to_string(),
        euclidean: parse_f64(record, *euc_idx, "euclidean")?,
        minkowski: parse_f64(record, *min_idx, "minkowski")?,
    }))
}

fn distance_indices(header: &Header, prefix: &str) -> Option<[usize; 3]> {
    let [id_col, euc_col, min_col] = distance_header(prefix);
    Some([
        header.maybe_index(&id_col)?,
        header.maybe_index(&euc_col)?,
        header.maybe_index(&min_col)?,
    ])
}

fn writer(path: &Path) -> Result<csv::Writer<fs::File>, TableError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(csv::Writer::from_path(path)?)
}

// ── Households ──────────────────────────────────────────

/// Writes the households table: admin columns + lon/lat.
///
/// # Errors
///
/// Returns an error on IO or CSV failure.
pub fn write_households(
    path: &Path,
    rows: &[Household],
    cols: &ColumnSpec,
) -> Result<(), TableError> {
    let mut wtr = writer(path)?;
    let mut header = cols.adm_cols.clone();
    header.push(cols.lon_col.clone());
    header.push(cols.lat_col.clone());
    wtr.write_record(&header)?;

    for row in rows {
        let mut record = row.adm.clone();
        record.push(row.lon.to_string());
        record.push(row.lat.to_string());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads the households table.
///
/// # Errors
///
/// Returns an error if the file is unreadable or columns are missing.
pub fn read_households(path: &Path, cols: &ColumnSpec) -> Result<Vec<Household>, TableError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let header = Header::new(rdr.headers()?);
    let adm_idx = adm_indices(&header, &cols.adm_cols)?;
    let lon_idx = header.index(&cols.lon_col)?;
    let lat_idx = header.index(&cols.lat_col)?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(Household {
            adm: adm_values(&record, &adm_idx),
            lon: parse_f64(&record, lon_idx, &cols.lon_col)?,
            lat: parse_f64(&record, lat_idx, &cols.lat_col)?,
        });
    }
    Ok(rows)
}

fn adm_indices(header: &Header, adm_cols: &[String]) -> Result<Vec<usize>, TableError> {
    adm_cols.iter().map(|c| header.index(c)).collect()
}

fn adm_values(record: &csv::StringRecord, indices: &[usize]) -> Vec<String> {
    indices
        .iter()
        .map(|&i| field(record, i).to_string())
        .collect()
}

// ── Village centers ─────────────────────────────────────

/// Writes the village centers table: admin columns (village last) + lon/lat.
///
/// # Errors
///
/// Returns an error on IO or CSV failure.
pub fn write_village_centers(
    path: &Path,
    rows: &[VillageCenter],
    cols: &ColumnSpec,
) -> Result<(), TableError> {
    let mut wtr = writer(path)?;
    let mut header = cols.adm_village_cols();
    header.push(cols.lon_col.clone());
    header.push(cols.lat_col.clone());
    wtr.write_record(&header)?;

    for row in rows {
        let mut record = row.adm.clone();
        record.push(row.lon.to_string());
        record.push(row.lat.to_string());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads the village centers table.
///
/// # Errors
///
/// Returns an error if the file is unreadable or columns are missing.
pub fn read_village_centers(
    path: &Path,
    cols: &ColumnSpec,
) -> Result<Vec<VillageCenter>, TableError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let header = Header::new(rdr.headers()?);
    let adm_idx = adm_indices(&header, &cols.adm_village_cols())?;
    let lon_idx = header.index(&cols.lon_col)?;
    let lat_idx = header.index(&cols.lat_col)?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(VillageCenter {
            adm: adm_values(&record, &adm_idx),
            lon: parse_f64(&record, lon_idx, &cols.lon_col)?,
            lat: parse_f64(&record, lat_idx, &cols.lat_col)?,
        });
    }
    Ok(rows)
}

// ── Clustered households ────────────────────────────────

/// Writes the clustered households table: admin columns, village,
/// cluster, lon/lat, plus distance blocks when present.
///
/// # Errors
///
/// Returns an error on IO or CSV failure.
pub fn write_clusters(path: &Path, rows: &[ClusterRow], cols: &ColumnSpec) -> Result<(), TableError> {
    let has_optimal = rows.iter().any(|r| r.optimal.is_some());
    let has_baseline = rows.iter().any(|r| r.baseline.is_some());

    let mut wtr = writer(path)?;
    let mut header = cols.adm_cols.clone();
    header.push(cols.village_col.clone());
    header.push(CLUSTER_COL.to_string());
    header.push(cols.lon_col.clone());
    header.push(cols.lat_col.clone());
    if has_optimal {
        header.extend(distance_header(HH_PREFIX));
    }
    if has_baseline {
        header.extend(distance_header(&format!("{BASELINE_PREFIX}_{HH_PREFIX}")));
    }
    wtr.write_record(&header)?;

    for row in rows {
        let mut record = row.adm.clone();
        record.push(row.village.clone());
        record.push(row.cluster.to_string());
        record.push(row.lon.to_string());
        record.push(row.lat.to_string());
        if has_optimal {
            push_distance(&mut record, row.optimal.as_ref());
        }
        if has_baseline {
            push_distance(&mut record, row.baseline.as_ref());
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads the clustered households table, picking up distance blocks when
/// the header carries them.
///
/// # Errors
///
/// Returns an error if the file is unreadable or columns are missing.
pub fn read_clusters(path: &Path, cols: &ColumnSpec) -> Result<Vec<ClusterRow>, TableError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let header = Header::new(rdr.headers()?);
    let adm_idx = adm_indices(&header, &cols.adm_cols)?;
    let village_idx = header.index(&cols.village_col)?;
    let cluster_idx = header.index(CLUSTER_COL)?;
    let lon_idx = header.index(&cols.lon_col)?;
    let lat_idx = header.index(&cols.lat_col)?;
    let optimal_idx = distance_indices(&header, HH_PREFIX);
    let baseline_idx = distance_indices(&header, &format!("{BASELINE_PREFIX}_{HH_PREFIX}"));

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(ClusterRow {
            adm: adm_values(&record, &adm_idx),
            village: field(&record, village_idx).to_string(),
            cluster: parse_usize(&record, cluster_idx, CLUSTER_COL)?,
            lon: parse_f64(&record, lon_idx, &cols.lon_col)?,
            lat: parse_f64(&record, lat_idx, &cols.lat_col)?,
            optimal: read_distance(&record, optimal_idx.as_ref())?,
            baseline: read_distance(&record, baseline_idx.as_ref())?,
        });
    }
    Ok(rows)
}

// ── Cluster centers ─────────────────────────────────────

/// Writes the cluster centers table: cluster, admin columns (village
/// last), original lon/lat, centroid lon/lat, plus distance blocks.
///
/// # Errors
///
/// Returns an error on IO or CSV failure.
pub fn write_centers(path: &Path, rows: &[CenterRow], cols: &ColumnSpec) -> Result<(), TableError> {
    let has_optimal = rows.iter().any(|r| r.optimal.is_some());
    let has_baseline = rows.iter().any(|r| r.baseline.is_some());

    let mut wtr = writer(path)?;
    let mut header = vec![CLUSTER_COL.to_string()];
    header.extend(cols.adm_village_cols());
    header.push(cols.lon_col.clone());
    header.push(cols.lat_col.clone());
    header.push(format!("{CLUSTER_COL}_{}", cols.lon_col));
    header.push(format!("{CLUSTER_COL}_{}", cols.lat_col));
    if has_optimal {
        header.extend(distance_header(VILLAGE_PREFIX));
    }
    if has_baseline {
        header.extend(distance_header(&format!(
            "{BASELINE_PREFIX}_{VILLAGE_PREFIX}"
        )));
    }
    wtr.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.cluster.to_string()];
        record.extend(row.adm.iter().cloned());
        record.push(row.lon.to_string());
        record.push(row.lat.to_string());
        record.push(row.centroid_lon.to_string());
        record.push(row.centroid_lat.to_string());
        if has_optimal {
            push_distance(&mut record, row.optimal.as_ref());
        }
        if has_baseline {
            push_distance(&mut record, row.baseline.as_ref());
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads the cluster centers table.
///
/// # Errors
///
/// Returns an error if the file is unreadable or columns are missing.
pub fn read_centers(path: &Path, cols: &ColumnSpec) -> Result<Vec<CenterRow>, TableError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let header = Header::new(rdr.headers()?);
    let cluster_idx = header.index(CLUSTER_COL)?;
    let adm_idx = adm_indices(&header, &cols.adm_village_cols())?;
    let lon_idx = header.index(&cols.lon_col)?;
    let lat_idx = header.index(&cols.lat_col)?;
    let centroid_lon_idx = header.index(&format!("{CLUSTER_COL}_{}", cols.lon_col))?;
    let centroid_lat_idx = header.index(&format!("{CLUSTER_COL}_{}", cols.lat_col))?;
    let optimal_idx = distance_indices(&header, VILLAGE_PREFIX);
    let baseline_idx = distance_indices(&header, &format!("{BASELINE_PREFIX}_{VILLAGE_PREFIX}"));

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(CenterRow {
            cluster: parse_usize(&record, cluster_idx, CLUSTER_COL)?,
            adm: adm_values(&record, &adm_idx),
            lon: parse_f64(&record, lon_idx, &cols.lon_col)?,
            lat: parse_f64(&record, lat_idx, &cols.lat_col)?,
            centroid_lon: parse_f64(&record, centroid_lon_idx, "cluster_lon")?,
            centroid_lat: parse_f64(&record, centroid_lat_idx, "cluster_lat")?,
            optimal: read_distance(&record, optimal_idx.as_ref())?,
            baseline: read_distance(&record, baseline_idx.as_ref())?,
        });
    }
    Ok(rows)
}

// ── Cluster counts ──────────────────────────────────────

/// Writes the cluster counts table.
///
/// # Errors
///
/// Returns an error on IO or CSV failure.
pub fn write_counts(
    path: &Path,
    rows: &[ClusterCount],
    cols: &ColumnSpec,
) -> Result<(), TableError> {
    let mut wtr = writer(path)?;
    let mut header = cols.adm_cols.clone();
    header.push(cols.village_col.clone());
    header.push(CLUSTER_COL.to_string());
    header.push(COUNTS_COL.to_string());
    header.push(SMALL_COL.to_string());
    wtr.write_record(&header)?;

    for row in rows {
        let mut record = row.adm.clone();
        record.push(row.village.clone());
        record.push(row.cluster.to_string());
        record.push(row.counts.to_string());
        record.push(row.small.to_string());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads the cluster counts table.
///
/// # Errors
///
/// Returns an error if the file is unreadable or columns are missing.
pub fn read_counts(path: &Path, cols: &ColumnSpec) -> Result<Vec<ClusterCount>, TableError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let header = Header::new(rdr.headers()?);
    let adm_idx = adm_indices(&header, &cols.adm_cols)?;
    let village_idx = header.index(&cols.village_col)?;
    let cluster_idx = header.index(CLUSTER_COL)?;
    let counts_idx = header.index(COUNTS_COL)?;
    let small_idx = header.index(SMALL_COL)?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(ClusterCount {
            adm: adm_values(&record, &adm_idx),
            village: field(&record, village_idx).to_string(),
            cluster: parse_usize(&record, cluster_idx, CLUSTER_COL)?,
            counts: parse_u64(&record, counts_idx, COUNTS_COL)?,
            small: parse_bool(&record, small_idx, SMALL_COL)?,
        });
    }
    Ok(rows)
}

// ── Facilities ──────────────────────────────────────────

/// Writes the recommended facilities table.
///
/// # Errors
///
/// Returns an error on IO or CSV failure.
pub fn write_facilities(
    path: &Path,
    rows: &[Facility],
    cols: &ColumnSpec,
) -> Result<(), TableError> {
    let mut wtr = writer(path)?;
    let mut header = cols.adm_cols.clone();
    header.push(cols.village_col.clone());
    header.push(cols.lon_col.clone());
    header.push(cols.lat_col.clone());
    header.push(PLUS_COL.to_string());
    header.push(FACILITY_ID_COL.to_string());
    wtr.write_record(&header)?;

    for row in rows {
        let mut record = row.adm.clone();
        record.push(row.village.clone());
        record.push(row.lon.to_string());
        record.push(row.lat.to_string());
        record.push(row.plus.clone());
        record.push(row.facility_id.clone());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads the recommended facilities table.
///
/// # Errors
///
/// Returns an error if the file is unreadable or columns are missing.
pub fn read_facilities(path: &Path, cols: &ColumnSpec) -> Result<Vec<Facility>, TableError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let header = Header::new(rdr.headers()?);
    let adm_idx = adm_indices(&header, &cols.adm_cols)?;
    let village_idx = header.index(&cols.village_col)?;
    let lon_idx = header.index(&cols.lon_col)?;
    let lat_idx = header.index(&cols.lat_col)?;
    let plus_idx = header.index(PLUS_COL)?;
    let id_idx = header.index(FACILITY_ID_COL)?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(Facility {
            adm: adm_values(&record, &adm_idx),
            village: field(&record, village_idx).to_string(),
            lon: parse_f64(&record, lon_idx, &cols.lon_col)?,
            lat: parse_f64(&record, lat_idx, &cols.lat_col)?,
            plus: field(&record, plus_idx).to_string(),
            facility_id: field(&record, id_idx).to_string(),
        });
    }
    Ok(rows)
}

// ── Deterministic ordering ──────────────────────────────

fn cmp_distance(a: Option<&FacilityDistance>, b: Option<&FacilityDistance>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a
            .assigned_id
            .cmp(&b.assigned_id)
            .then(a.euclidean.total_cmp(&b.euclidean))
            .then(a.minkowski.total_cmp(&b.minkowski)),
    }
}

/// Sorts households by admin path then coordinates, the order required
/// for reproducible derivation output.
pub fn sort_households(rows: &mut [Household]) {
    rows.sort_by(|a, b| {
        a.adm
            .cmp(&b.adm)
            .then(a.lon.total_cmp(&b.lon))
            .then(a.lat.total_cmp(&b.lat))
    });
}

/// Sorts cluster rows by cluster id, then admin path, village and
/// coordinates (the finalized per-location sort order).
pub fn sort_clusters(rows: &mut [ClusterRow]) {
    rows.sort_by(|a, b| {
        a.cluster
            .cmp(&b.cluster)
            .then_with(|| a.adm.cmp(&b.adm))
            .then_with(|| a.village.cmp(&b.village))
            .then(a.lon.total_cmp(&b.lon))
            .then(a.lat.total_cmp(&b.lat))
    });
}

/// Sorts cluster rows by the full written column order, used when
/// merging per-location tables into the global artifact.
pub fn sort_clusters_merged(rows: &mut [ClusterRow]) {
    rows.sort_by(|a, b| {
        a.adm
            .cmp(&b.adm)
            .then_with(|| a.village.cmp(&b.village))
            .then_with(|| a.cluster.cmp(&b.cluster))
            .then(a.lon.total_cmp(&b.lon))
            .then(a.lat.total_cmp(&b.lat))
            .then_with(|| cmp_distance(a.optimal.as_ref(), b.optimal.as_ref()))
            .then_with(|| cmp_distance(a.baseline.as_ref(), b.baseline.as_ref()))
    });
}

/// Sorts center rows by the full written column order.
pub fn sort_centers_merged(rows: &mut [CenterRow]) {
    rows.sort_by(|a, b| {
        a.cluster
            .cmp(&b.cluster)
            .then_with(|| a.adm.cmp(&b.adm))
            .then(a.lon.total_cmp(&b.lon))
            .then(a.lat.total_cmp(&b.lat))
            .then(a.centroid_lon.total_cmp(&b.centroid_lon))
            .then(a.centroid_lat.total_cmp(&b.centroid_lat))
            .then_with(|| cmp_distance(a.optimal.as_ref(), b.optimal.as_ref()))
            .then_with(|| cmp_distance(a.baseline.as_ref(), b.baseline.as_ref()))
    });
}

/// Sorts count rows by the full written column order.
pub fn sort_counts_merged(rows: &mut [ClusterCount]) {
    rows.sort_by(|a, b| {
        a.adm
            .cmp(&b.adm)
            .then_with(|| a.village.cmp(&b.village))
            .then_with(|| a.cluster.cmp(&b.cluster))
            .then_with(|| a.counts.cmp(&b.counts))
            .then_with(|| a.small.cmp(&b.small))
    });
}

/// Sorts facility rows by the full written column order.
pub fn sort_facilities_merged(rows: &mut [Facility]) {
    rows.sort_by(|a, b| {
        a.adm
            .cmp(&b.adm)
            .then_with(|| a.village.cmp(&b.village))
            .then(a.lon.total_cmp(&b.lon))
            .then(a.lat.total_cmp(&b.lat))
            .then_with(|| a.plus.cmp(&b.plus))
            .then_with(|| a.facility_id.cmp(&b.facility_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ColumnSpec {
        ColumnSpec {
            adm_cols: vec!["adm1".into(), "adm2".into(), "adm3".into()],
            village_col: "village".into(),
            lon_col: "lon".into(),
            lat_col: "lat".into(),
        }
    }

    #[test]
    fn households_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("households.csv");
        let rows = vec![
            Household {
                adm: vec!["a".into(), "b".into(), "c".into()],
                lon: -3.5,
                lat: 12.25,
            },
            Household {
                adm: vec!["a".into(), "b".into(), "d".into()],
                lon: -3.25,
                lat: 12.5,
            },
        ];
        write_households(&path, &rows, &spec()).unwrap();
        let back = read_households(&path, &spec()).unwrap();
        assert_eq!(rows, back);
    }

    #[test]
    fn clusters_roundtrip_with_distances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.csv");
        let rows = vec![ClusterRow {
            adm: vec!["a".into(), "b".into(), "c".into()],
            village: "v1".into(),
            cluster: 0,
            lon: 1.0,
            lat: 2.0,
            optimal: Some(FacilityDistance {
                assigned_id: "a:b:c_0".into(),
                euclidean: 10.5,
                minkowski: 12.0,
            }),
            baseline: None,
        }];
        write_clusters(&path, &rows, &spec()).unwrap();
        let back = read_clusters(&path, &spec()).unwrap();
        assert_eq!(rows, back);
    }

    #[test]
    fn clusters_without_distances_omit_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.csv");
        let rows = vec![ClusterRow {
            adm: vec!["a".into(), "b".into(), "c".into()],
            village: "v1".into(),
            cluster: 1,
            lon: 1.0,
            lat: 2.0,
            optimal: None,
            baseline: None,
        }];
        write_clusters(&path, &rows, &spec()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("hh_assigned_id"));
        let back = read_clusters(&path, &spec()).unwrap();
        assert_eq!(rows, back);
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "adm1,adm2,lon,lat\na,b,1.0,2.0\n").unwrap();
        let err = read_households(&path, &spec()).unwrap_err();
        assert!(matches!(err, TableError::MissingColumn(c) if c == "adm3"));
    }

    #[test]
    fn counts_roundtrip_and_bool_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.csv");
        let rows = vec![ClusterCount {
            adm: vec!["a".into(), "b".into(), "c".into()],
            village: "v".into(),
            cluster: 2,
            counts: 7,
            small: true,
        }];
        write_counts(&path, &rows, &spec()).unwrap();
        let back = read_counts(&path, &spec()).unwrap();
        assert_eq!(rows, back);
    }

    #[test]
    fn household_sort_is_total() {
        let mut rows = vec![
            Household {
                adm: vec!["b".into()],
                lon: 0.0,
                lat: 0.0,
            },
            Household {
                adm: vec!["a".into()],
                lon: 1.0,
                lat: 0.0,
            },
            Household {
                adm: vec!["a".into()],
                lon: 0.5,
                lat: 0.0,
            },
        ];
        sort_households(&mut rows);
        assert_eq!(rows[0].adm, vec!["a".to_string()]);
        assert!((rows[0].lon - 0.5).abs() < f64::EPSILON);
        assert_eq!(rows[2].adm, vec!["b".to_string()]);
    }
}
