//! Cooperative cancellation.

use super::Phase;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag. Clones observe the same flag.
///
/// ```rust
/// use cotejo::pipeline::{CancellationToken, Phase};
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// assert!(token.check(Phase::Ner).is_ok());
/// handle.cancel();
/// assert!(token.check(Phase::Ner).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once [`cancel`](Self::cancel) was called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` if cancellation was requested.
    pub fn check(&self, phase: Phase) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled { phase })
        } else {
            Ok(())
        }
    }

    /// Check every `interval` items (item 0 included).
    pub fn check_every(&self, phase: Phase, item: usize, interval: usize) -> Result<()> {
        if item % interval.max(1) == 0 {
            self.check(phase)
        } else {
            Ok(())
        }
    }
}
