//! Households-per-shape statistics.
//!
//! Computed right after household derivation so a run with thin
//! coverage is flagged before any clustering starts. The stats table is
//! always logged and persisted; a threshold violation only raises the
//! log severity.

use std::collections::BTreeMap;
use std::path::Path;

use facility_map_models::Household;

use crate::PrepError;

/// Summary of household counts per administrative shape.
#[derive(Debug, Clone, PartialEq)]
pub struct HouseholdStats {
    /// Shapes that contain at least one household.
    pub shapes_with_households: usize,
    /// Total shapes in the boundary set.
    pub total_shapes: usize,
    pub mean: f64,
    pub min: u64,
    pub median: u64,
    pub max: u64,
}

impl HouseholdStats {
    /// Percentage of shapes containing households.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coverage_perc(&self) -> f64 {
        if self.total_shapes == 0 {
            return 0.0;
        }
        100.0 * self.shapes_with_households as f64 / self.total_shapes as f64
    }

    /// Logs the stats table and warns when shape coverage falls below
    /// `100 - threshold_village_perc`.
    pub fn log_and_check(&self, threshold_village_perc: f64) -> bool {
        log::info!("Shape/Household Stats:");
        log::info!("  households per shape mean:   {:.0}", self.mean);
        log::info!("  households per shape min:    {}", self.min);
        log::info!("  households per shape median: {}", self.median);
        log::info!("  households per shape max:    {}", self.max);
        log::info!(
            "Shapes with households: {:.0}% ({}/{})",
            self.coverage_perc(),
            self.shapes_with_households,
            self.total_shapes
        );

        let ok = self.coverage_perc() >= 100.0 - threshold_village_perc;
        if !ok {
            log::warn!("The number of shapes with households is too low.");
        }
        ok
    }

    /// Persists the stats as a two-column metric/households CSV.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), PrepError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["metric", "households"])?;
        wtr.write_record(["mean", &format!("{:.0}", self.mean)])?;
        wtr.write_record(["min", &self.min.to_string()])?;
        wtr.write_record(["median", &self.median.to_string()])?;
        wtr.write_record(["max", &self.max.to_string()])?;
        wtr.write_record(["shapes_with_households", &self.shapes_with_households.to_string()])?;
        wtr.write_record(["total_shapes", &self.total_shapes.to_string()])?;
        wtr.flush()?;
        Ok(())
    }
}

/// Computes households-per-shape statistics.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn household_stats(households: &[Household], total_shapes: usize) -> HouseholdStats {
    let mut per_shape: BTreeMap<&[String], u64> = BTreeMap::new();
    for hh in households {
        *per_shape.entry(hh.adm.as_slice()).or_insert(0) += 1;
    }

    let mut counts: Vec<u64> = per_shape.values().copied().collect();
    counts.sort_unstable();

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

    HouseholdStats {
        shapes_with_households: counts.len(),
        total_shapes,
        mean,
        min,
        median,
        max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn household(adm3: &str) -> Household {
        Household {
            adm: vec!["p".into(), "d".into(), adm3.into()],
            lon: 0.0,
            lat: 0.0,
        }
    }

    #[test]
    fn counts_per_shape() {
        let households = vec![
            household("a"),
            household("a"),
            household("a"),
            household("b"),
        ];
        let stats = household_stats(&households, 4);
        assert_eq!(stats.shapes_with_households, 2);
        assert_eq!(stats.max, 3);
        assert_eq!(stats.min, 1);
        assert!((stats.mean - 2.0).abs() < 1e-12);
        assert!((stats.coverage_perc() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn coverage_check_uses_threshold() {
        let households = vec![household("a")];
        let stats = household_stats(&households, 2);
        // 50% coverage passes a 60% tolerance but fails a 10% one.
        assert!(stats.log_and_check(60.0));
        assert!(!stats.log_and_check(10.0));
    }

    #[test]
    fn empty_households_are_well_defined() {
        let stats = household_stats(&[], 5);
        assert_eq!(stats.shapes_with_households, 0);
        assert!(stats.coverage_perc().abs() < f64::EPSILON);
    }
}
