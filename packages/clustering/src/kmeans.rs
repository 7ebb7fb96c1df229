//! Deterministic k-means with explicit initial centroids.
//!
//! Single initialization, no restarts: given a fixed input order the fit
//! is fully deterministic. Ties during assignment break toward the
//! lowest centroid index, so results are sensitive to input order by
//! construction.

use serde::{Deserialize, Serialize};

/// K-means failure.
#[derive(Debug, thiserror::Error)]
pub enum KMeansError {
    /// No points to cluster.
    #[error("no points to cluster")]
    EmptyPoints,

    /// No initial centroids.
    #[error("no initial centroids")]
    EmptyCentroids,

    /// More centroids than points.
    #[error("{centroids} centroids for {points} points")]
    TooManyCentroids { centroids: usize, points: usize },
}

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansOutcome {
    /// Cluster index per input point.
    pub labels: Vec<usize>,
    /// Final centroid per cluster.
    pub centroids: Vec<[f64; 2]>,
    /// Iterations actually run.
    pub iterations: usize,
    /// True iff the fit stabilized before exhausting the budget.
    pub converged: bool,
}

/// Convergence rule: stabilizing in strictly fewer iterations than the
/// budget counts as converged; hitting the budget does not.
#[must_use]
pub const fn is_converged(iterations: usize, max_iter: usize) -> bool {
    iterations < max_iter
}

fn squared_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

fn assign(points: &[[f64; 2]], centroids: &[[f64; 2]], labels: &mut [usize]) -> bool {
    let mut changed = false;
    for (label, point) in labels.iter_mut().zip(points) {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (idx, centroid) in centroids.iter().enumerate() {
            let dist = squared_distance(*point, *centroid);
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        if best != *label {
            *label = best;
            changed = true;
        }
    }
    changed
}

fn update(points: &[[f64; 2]], labels: &[usize], centroids: &mut [[f64; 2]]) {
    let mut sums = vec![[0.0_f64; 2]; centroids.len()];
    let mut counts = vec![0_usize; centroids.len()];

    for (point, &label) in points.iter().zip(labels) {
        sums[label][0] += point[0];
        sums[label][1] += point[1];
        counts[label] += 1;
    }

    for (idx, centroid) in centroids.iter_mut().enumerate() {
        if counts[idx] > 0 {
            #[allow(clippy::cast_precision_loss)]
            let n = counts[idx] as f64;
            *centroid = [sums[idx][0] / n, sums[idx][1] / n];
        }
        // An emptied cluster keeps its previous centroid.
    }
}

/// Fits k-means starting from the given centroids.
///
/// Runs assignment/update rounds until the assignment stabilizes or
/// `max_iter` rounds have run, whichever comes first.
///
/// # Errors
///
/// Returns an error for empty inputs or more centroids than points.
pub fn fit(
    points: &[[f64; 2]],
    init_centroids: &[[f64; 2]],
    max_iter: usize,
) -> Result<KMeansOutcome, KMeansError> {
    if points.is_empty() {
        return Err(KMeansError::EmptyPoints);
    }
    if init_centroids.is_empty() {
        return Err(KMeansError::EmptyCentroids);
    }
    if init_centroids.len() > points.len() {
        return Err(KMeansError::TooManyCentroids {
            centroids: init_centroids.len(),
            points: points.len(),
        });
    }

    let mut centroids = init_centroids.to_vec();
    let mut labels = vec![usize::MAX; points.len()];
    let mut iterations = max_iter.max(1);

    for iteration in 1..=max_iter.max(1) {
        let changed = assign(points, &centroids, &mut labels);
        if !changed && iteration > 1 {
            iterations = iteration;
            break;
        }
        update(points, &labels, &mut centroids);
    }

    Ok(KMeansOutcome {
        labels,
        centroids,
        converged: is_converged(iterations, max_iter),
        iterations,
    })
}

/// Deterministic initial centroids for a point set without caller-given
/// seeds: evenly spaced picks over the lexicographically sorted points.
///
/// # Panics
///
/// Panics if `k` is zero or exceeds the number of points; callers clamp
/// beforehand.
#[must_use]
pub fn spread_init(points: &[[f64; 2]], k: usize) -> Vec<[f64; 2]> {
    assert!(k >= 1 && k <= points.len(), "invalid centroid count {k}");

    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));

    if k == 1 {
        return vec![sorted[sorted.len() / 2]];
    }
    (0..k)
        .map(|i| sorted[i * (sorted.len() - 1) / (k - 1)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convergence_rule_is_strict_less_than() {
        assert!(is_converged(299, 300));
        assert!(!is_converged(300, 300));
    }

    #[test]
    fn two_obvious_clusters() {
        let points = [
            [0.0, 0.0],
            [0.1, 0.1],
            [0.0, 0.1],
            [5.0, 5.0],
            [5.1, 5.0],
            [5.0, 5.1],
        ];
        let outcome = fit(&points, &[[0.0, 0.0], [5.0, 5.0]], 300).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.labels, vec![0, 0, 0, 1, 1, 1]);
        assert!((outcome.centroids[0][0] - 0.033_333).abs() < 1e-3);
        assert!((outcome.centroids[1][0] - 5.033_333).abs() < 1e-3);
    }

    #[test]
    fn budget_exhaustion_is_not_convergence() {
        let points = [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        // One round is never enough to observe a stable assignment.
        let outcome = fit(&points, &[[0.0, 0.0], [3.0, 0.0]], 1).unwrap();
        assert_eq!(outcome.iterations, 1);
        assert!(!outcome.converged);
        assert_eq!(outcome.labels.len(), 4);
    }

    #[test]
    fn empty_inputs_are_errors() {
        assert!(matches!(
            fit(&[], &[[0.0, 0.0]], 10),
            Err(KMeansError::EmptyPoints)
        ));
        assert!(matches!(
            fit(&[[0.0, 0.0]], &[], 10),
            Err(KMeansError::EmptyCentroids)
        ));
        assert!(matches!(
            fit(&[[0.0, 0.0]], &[[0.0, 0.0], [1.0, 1.0]], 10),
            Err(KMeansError::TooManyCentroids { .. })
        ));
    }

    #[test]
    fn spread_init_is_deterministic_and_distinct() {
        let points = [[3.0, 0.0], [1.0, 0.0], [2.0, 0.0], [0.0, 0.0]];
        let init = spread_init(&points, 2);
        assert_eq!(init, vec![[0.0, 0.0], [3.0, 0.0]]);
        assert_eq!(spread_init(&points, 2), init);
    }
}
