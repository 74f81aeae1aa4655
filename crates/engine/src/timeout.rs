//! Operation budgets
//!
//! Budgets are advisory: a timed-out future is dropped, but any write it
//! already handed to storage may still complete. Callers must treat a
//! timeout as "outcome unknown".

use std::future::Future;
use std::time::Duration;

use tracing::warn;
use trellis_core::{Error, Result};

/// Run `operation` within `budget`, failing with a timeout error when exceeded
pub async fn with_budget<T, F>(operation: &str, budget: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, budget_ms = budget.as_millis() as u64, "operation timed out");
            Err(Error::timeout(operation, budget))
        }
    }
}
