//! Household-per-cluster threshold validation.
//!
//! Runs after the merge over the global clustered-households table.
//! The stats table is always logged and persisted; threshold violations
//! only raise log severity, they never fail the run.

use std::collections::BTreeMap;
use std::path::Path;

use facility_map_models::tables::TableError;
use facility_map_models::ClusterRow;

/// Per-cluster household statistics against the configured thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdReport {
    /// Total clusters in the merged result.
    pub total_clusters: usize,
    /// Clusters under the household threshold.
    pub small_clusters: Vec<(Vec<String>, String, u64)>,
    /// Percentage of small clusters.
    pub small_perc: f64,
    pub threshold_households: u64,
    pub threshold_village_perc: f64,
    pub mean: f64,
    pub min: u64,
    pub median: u64,
    pub max: u64,
}

impl ThresholdReport {
    /// True when the small-cluster percentage stays under the limit.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.small_perc < self.threshold_village_perc
    }

    /// Logs the stats table; the pass/fail outcome only changes log
    /// severity.
    pub fn log(&self) {
        log::info!("Village/Households Stats:");
        log::info!("  village households mean:   {:.0}", self.mean);
        log::info!("  village households min:    {}", self.min);
        log::info!("  village households median: {}", self.median);
        log::info!("  village households max:    {}", self.max);
        log::info!(
            "  small villages (<{} hh): {:.2}%",
            self.threshold_households,
            self.small_perc
        );
        log::info!("  total number of villages: {}", self.total_clusters);

        if !self.small_clusters.is_empty() {
            log::info!("Number of households per small village:");
            for (adm, village, counts) in &self.small_clusters {
                let mut path = adm.join(":");
                path.push(':');
                path.push_str(village);
                log::info!("    {path} : {counts}");
            }
        }

        if !self.ok() {
            log::warn!(
                "The percent of villages with low number of households: {:.2}% \
                 (threshold {:.2}%)",
                self.small_perc,
                self.threshold_village_perc
            );
        }
    }

    /// Persists the stats table as `cluster_stats.csv` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<(), TableError> {
        std::fs::create_dir_all(dir)?;
        let mut wtr = csv::Writer::from_path(dir.join("cluster_stats.csv"))?;
        wtr.write_record(["metric", "households"])?;
        wtr.write_record(["mean", &format!("{:.0}", self.mean)])?;
        wtr.write_record(["min", &self.min.to_string()])?;
        wtr.write_record(["median", &self.median.to_string()])?;
        wtr.write_record(["max", &self.max.to_string()])?;
        wtr.write_record([
            format!("small villages (<{} hh)", self.threshold_households),
            format!("{:.2}%", self.small_perc),
        ])?;
        wtr.write_record([
            "total number of villages".to_string(),
            self.total_clusters.to_string(),
        ])?;
        wtr.flush()?;
        Ok(())
    }
}

/// Computes per-cluster household counts from the merged clusters table
/// and flags clusters under the household threshold.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn check_thresholds(
    clusters: &[ClusterRow],
    threshold_households: u64,
    threshold_village_perc: f64,
) -> ThresholdReport {
    let mut grouped: BTreeMap<(Vec<String>, String, usize), u64> = BTreeMap::new();
    for row in clusters {
        *grouped
            .entry((row.adm.clone(), row.village.clone(), row.cluster))
            .or_insert(0) += 1;
    }

    let mut counts: Vec<u64> = grouped.values().copied().collect();
    counts.sort_unstable();

    let small_clusters: Vec<(Vec<String>, String, u64)> = grouped
        .iter()
        .filter(|(_, &c)| c < threshold_households)
        .map(|((adm, village, _), &c)| (adm.clone(), village.clone(), c))
        .collect();

    let (mean, min, median, max) = if counts.is_empty() {
        (0.0, 0, 0, 0)
    } else {
        let sum: u64 = counts.iter().sum();
        (
            sum as f64 / counts.len() as f64,
            counts[0],
            counts[counts.len() / 2],
            counts[counts.len() - 1],
        )
    };

    let small_perc = if counts.is_empty() {
        0.0
    } else {
        100.0 * small_clusters.len() as f64 / counts.len() as f64
    };

    ThresholdReport {
        total_clusters: counts.len(),
        small_clusters,
        small_perc,
        threshold_households,
        threshold_village_perc,
        mean,
        min,
        median,
        max,
    }
}
