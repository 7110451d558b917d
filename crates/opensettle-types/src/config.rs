//! Configuration types for the settlement executor and dispatcher.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{OpensettleError, Result};

/// Timing configuration for the settlement executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Hard deadline for a single transfer-oracle submission. A submission
    /// that has not resolved by then is surfaced as pending; the caller
    /// re-drives the payment to poll for the outcome.
    pub transfer_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: Duration::from_millis(constants::DEFAULT_TRANSFER_TIMEOUT_MS),
        }
    }
}

/// Retry policy for settlement dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum handler attempts before the payment is dead-lettered.
    pub max_attempts: u32,
    /// Delay before the second attempt; attempt `n` waits `base * 2^(n-1)`.
    pub base_backoff: Duration,
    /// Cap on any single backoff delay.
    pub max_backoff: Duration,
    /// Total wall-clock budget for one dispatch cycle, sleeps included.
    pub total_budget: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_DISPATCH_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(constants::DEFAULT_DISPATCH_BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(constants::DEFAULT_DISPATCH_MAX_BACKOFF_MS),
            total_budget: Duration::from_millis(constants::DEFAULT_DISPATCH_TOTAL_BUDGET_MS),
        }
    }
}

impl DispatchConfig {
    /// # Errors
    /// Returns a configuration error naming the first check that fails.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(OpensettleError::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_backoff < self.base_backoff {
            return Err(OpensettleError::Configuration(
                "max_backoff must be >= base_backoff".to_string(),
            ));
        }
        if self.total_budget.is_zero() {
            return Err(OpensettleError::Configuration(
                "total_budget must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
