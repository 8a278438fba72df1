//! Cooperative cancellation token passed down the call stack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, StoreError};

/// A cheap, cloneable cancellation handle.
///
/// Every public operation that accepts one checks it at entry, at each
/// per-row boundary, before statement execution, and after blocking awaits,
/// raising [`StoreError::Cancelled`] synchronously the first time it
/// observes a cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Check the token, returning `Err(StoreError::Cancelled)` if set.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Check an `Option<&CancellationToken>`, treating `None` as never-cancelled.
pub fn check_opt(token: Option<&CancellationToken>) -> Result<()> {
    match token {
        Some(t) => t.check(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let t = CancellationToken::new();
        assert!(t.check().is_ok());
    }

    #[test]
    fn cancel_is_observed() {
        let t = CancellationToken::new();
        t.cancel();
        assert!(matches!(t.check(), Err(StoreError::Cancelled)));
    }

    #[test]
    fn clone_shares_state() {
        let t = CancellationToken::new();
        let t2 = t.clone();
        t.cancel();
        assert!(t2.is_cancelled());
    }

    #[test]
    fn none_token_never_cancels() {
        assert!(check_opt(None).is_ok());
    }
}
