use crate::error::LimitExceeded;
use std::sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
};

/// Job-wide count of skipped items, shared by every chunk worker of a run.
#[derive(Debug)]
pub struct FaultBudget {
    skip_limit: u64,
    skipped: AtomicU64,
    breach: OnceLock<LimitExceeded>,
}

impl FaultBudget {
    pub fn new(skip_limit: u64) -> Self {
        Self {
            skip_limit,
            skipped: AtomicU64::new(0),
            breach: OnceLock::new(),
        }
    }

    /// Counts one skipped item. Fails once the total goes past the limit; the
    /// first breach is kept and every later caller sees the budget as exhausted.
    pub fn try_skip(&self, error: &str) -> Result<(), LimitExceeded> {
        let skipped = self.skipped.fetch_add(1, Ordering::SeqCst) + 1;
        if skipped <= self.skip_limit {
            return Ok(());
        }

        let breach = LimitExceeded {
            limit: self.skip_limit,
            skipped,
            last_error: error.to_string(),
        };
        let _ = self.breach.set(breach.clone());
        Err(breach)
    }

    /// Fails with the recorded breach once the budget is exhausted.
    pub fn check(&self) -> Result<(), LimitExceeded> {
        match self.breach.get() {
            Some(breach) => Err(breach.clone()),
            None => Ok(()),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.breach.get().is_some()
    }

    /// The breach that exhausted the budget, if any.
    pub fn breach(&self) -> Option<&LimitExceeded> {
        self.breach.get()
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    pub fn skip_limit(&self) -> u64 {
        self.skip_limit
    }
}
