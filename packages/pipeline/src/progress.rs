//! Stage progress accounting.
//!
//! Completion counters are updated from worker threads; the log line is
//! emitted only when the whole-percentage value changes, so large runs
//! produce at most ~100 progress lines per stage.

use std::sync::atomic::{AtomicUsize, Ordering};

use facility_map_models::progress::ProgressCallback;

/// Thread-safe per-stage completion counter.
pub struct StageProgress {
    name: &'static str,
    total: usize,
    done: AtomicUsize,
    last_perc: AtomicUsize,
}

impl StageProgress {
    #[must_use]
    pub const fn new(name: &'static str, total: usize) -> Self {
        Self {
            name,
            total,
            done: AtomicUsize::new(0),
            last_perc: AtomicUsize::new(0),
        }
    }

    /// Records one completed item, advancing the callback and logging
    /// at each whole-percentage-point change.
    pub fn tick(&self, progress: &dyn ProgressCallback) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        progress.inc(1);

        let perc = 100 * done / self.total.max(1);
        let last = self.last_perc.swap(perc, Ordering::SeqCst);
        if last != perc {
            log::info!("{}: {}/{}: {}%", self.name, done, self.total, perc);
        }
    }

    /// Completed item count so far.
    #[must_use]
    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_map_models::progress::NullProgress;

    #[test]
    fn counts_to_total() {
        let stage = StageProgress::new("Test", 4);
        for _ in 0..4 {
            stage.tick(&NullProgress);
        }
        assert_eq!(stage.done(), 4);
    }
}
