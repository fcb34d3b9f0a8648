//! Transaction finality polling
//!
//! Polls the ledger at a fixed interval until the transaction is included or
//! the deadline passes. Poll failures are swallowed: only the deadline ends
//! polling. An in-flight poll is dropped when the deadline fires.

use super::{LedgerQuery, TransactionRef};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default interval between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Outcome of waiting for a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Finality {
    /// Included with no execution error
    Confirmed,
    /// Deadline passed before inclusion was observed
    TimedOut,
    /// Included, but execution failed on the ledger
    Reverted(String),
}

/// Waits for ledger finality of submitted transactions
#[derive(Clone)]
pub struct ConfirmationWaiter {
    ledger: Arc<dyn LedgerQuery>,
    poll_interval: Duration,
}

impl ConfirmationWaiter {
    pub fn new(ledger: Arc<dyn LedgerQuery>) -> Self {
        Self::with_poll_interval(ledger, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(ledger: Arc<dyn LedgerQuery>, poll_interval: Duration) -> Self {
        Self {
            ledger,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait for `tx` to become final, giving up after `timeout`
    pub async fn await_finality(&self, tx: &TransactionRef, timeout: Duration) -> Finality {
        self.await_finality_until(tx, Instant::now() + timeout).await
    }

    /// Wait for `tx` to become final, giving up at `deadline`. No poll is
    /// issued or awaited past it.
    pub async fn await_finality_until(&self, tx: &TransactionRef, deadline: Instant) -> Finality {
        let started = Instant::now();
        if started >= deadline {
            tracing::warn!("Deadline for {} already passed, not polling", tx);
            return Finality::TimedOut;
        }
        let budget = deadline.saturating_duration_since(started);
        tracing::debug!("Waiting up to {}ms for {} to finalize", budget.as_millis(), tx);

        match tokio::time::timeout_at(deadline, self.poll_until_included(tx)).await {
            Ok(finality) => {
                tracing::info!(
                    "Transaction {} resolved as {:?} after {:?}",
                    tx,
                    finality,
                    started.elapsed()
                );
                finality
            }
            Err(_) => {
                tracing::warn!("Transaction {} not finalized within {}ms", tx, budget.as_millis());
                Finality::TimedOut
            }
        }
    }

    /// Query the ledger exactly once
    pub async fn check_once(&self, tx: &TransactionRef) -> Option<Finality> {
        match self.ledger.transaction_status(tx).await {
            Ok(status) if status.is_confirmed() => Some(Finality::Confirmed),
            Ok(status) if status.included => Some(Finality::Reverted(describe(status.execution_error))),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Status check for {} failed: {}", tx, e);
                None
            }
        }
    }

    async fn poll_until_included(&self, tx: &TransactionRef) -> Finality {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.ledger.transaction_status(tx).await {
                Ok(status) if status.is_confirmed() => return Finality::Confirmed,
                Ok(status) if status.included => {
                    return Finality::Reverted(describe(status.execution_error));
                }
                Ok(_) => tracing::trace!("Poll #{}: {} not yet included", attempt, tx),
                Err(e) => tracing::debug!("Poll #{} for {} failed, retrying: {}", attempt, tx, e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn describe(error: Option<serde_json::Value>) -> String {
    match error {
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => "unknown execution error".to_string(),
    }
}
