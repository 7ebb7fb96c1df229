//! Cooperative cancellation token.
//!
//! A shared atomic flag checked at fixed points in the pipeline: before
//! each location submission, around each processing chunk, and before
//! costly downstream stages. A positive check unwinds as [`Cancelled`],
//! which callers report as "stopped", never as a failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Marker returned when a cancellation check fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stopped by the user")]
pub struct Cancelled;

/// Shared cancellation signal.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    stopped: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the current run stop at its next check point.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Clears the stop request so the token can be reused.
    pub fn clear(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Passive check, does not unwind.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` when a stop has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if [`stop()`](Self::stop) was called.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_stopped() {
            log::warn!("Stopping...");
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_until_stopped() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.stop();
        assert_eq!(token.check(), Err(Cancelled));
        assert!(token.is_stopped());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        other.stop();
        assert!(token.is_stopped());
        token.clear();
        assert!(!other.is_stopped());
    }
}
