//! Fire-and-forget credit billing.
//!
//! The request path enqueues billing operations into a bounded channel and
//! returns immediately; a single process-wide aggregator task batches them
//! per (team, subscription, extract) and flushes to the billing ledger.
//! Ledger failures are logged and never reach a request.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::traits::BillingLedger;

const CHANNEL_CAPACITY: usize = 1024;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// One billing operation from the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingOp {
    pub team_id: String,
    pub sub_id: Option<String>,
    pub credits: u64,
    pub is_extract: bool,
}

/// Cheap handle for enqueueing billing operations.
#[derive(Clone)]
pub struct BillingHandle {
    tx: mpsc::Sender<BillingOp>,
}

impl BillingHandle {
    /// Enqueue without blocking. A full or closed channel drops the
    /// operation with a warning; the caller is never failed.
    pub fn enqueue(&self, op: BillingOp) {
        if let Err(e) = self.tx.try_send(op) {
            tracing::warn!(error = %e, "Dropping billing operation");
        }
    }

    /// Handle with no aggregator behind it. Operations are dropped;
    /// useful for tests and auth-disabled deployments.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    /// Handle over a plain bounded channel, exposing the receiving side.
    /// Lets callers observe billing operations without an aggregator.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<BillingOp>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

/// Process-wide billing aggregator task.
pub struct BillingAggregator;

impl BillingAggregator {
    /// Spawn the aggregator. Returns the enqueue handle and the task handle;
    /// cancel the token to drain and stop.
    pub fn spawn<L: BillingLedger>(
        ledger: L,
        cancel: CancellationToken,
    ) -> (BillingHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<BillingOp>(CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut pending: HashMap<(String, Option<String>, bool), u64> = HashMap::new();
            let mut flush = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    op = rx.recv() => match op {
                        Some(op) => {
                            *pending
                                .entry((op.team_id, op.sub_id, op.is_extract))
                                .or_insert(0) += op.credits;
                        }
                        None => break,
                    },
                    _ = flush.tick() => {
                        Self::flush(&ledger, &mut pending).await;
                    }
                    () = cancel.cancelled() => break,
                }
            }

            // Drain anything still buffered in the channel, then flush once.
            while let Ok(op) = rx.try_recv() {
                *pending
                    .entry((op.team_id, op.sub_id, op.is_extract))
                    .or_insert(0) += op.credits;
            }
            Self::flush(&ledger, &mut pending).await;
        });

        (BillingHandle { tx }, task)
    }

    async fn flush<L: BillingLedger>(
        ledger: &L,
        pending: &mut HashMap<(String, Option<String>, bool), u64>,
    ) {
        for ((team_id, sub_id, is_extract), credits) in pending.drain() {
            if let Err(e) = ledger
                .record_usage(&team_id, sub_id.as_deref(), credits, is_extract)
                .await
            {
                tracing::error!(
                    team_id = %team_id,
                    credits = %credits,
                    error = %e,
                    "Failed to record credit usage"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockLedger;

    #[tokio::test]
    async fn aggregates_per_team_and_flushes_on_shutdown() {
        let ledger = MockLedger::new();
        let cancel = CancellationToken::new();
        let (handle, task) = BillingAggregator::spawn(ledger.clone(), cancel.clone());

        handle.enqueue(BillingOp {
            team_id: "team-1".into(),
            sub_id: Some("sub-1".into()),
            credits: 1,
            is_extract: false,
        });
        handle.enqueue(BillingOp {
            team_id: "team-1".into(),
            sub_id: Some("sub-1".into()),
            credits: 4,
            is_extract: false,
        });
        handle.enqueue(BillingOp {
            team_id: "team-2".into(),
            sub_id: None,
            credits: 1,
            is_extract: true,
        });

        // Give the task a chance to pull from the channel, then stop it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        task.await.unwrap();

        let recorded = ledger.recorded.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        let team1 = recorded
            .iter()
            .find(|(team, ..)| team == "team-1")
            .expect("team-1 usage recorded");
        assert_eq!(team1.2, 5);
        let team2 = recorded
            .iter()
            .find(|(team, ..)| team == "team-2")
            .expect("team-2 usage recorded");
        assert_eq!(team2.2, 1);
        assert!(team2.3);
    }

    #[tokio::test]
    async fn ledger_failure_is_swallowed() {
        let ledger = MockLedger::failing();
        let cancel = CancellationToken::new();
        let (handle, task) = BillingAggregator::spawn(ledger, cancel.clone());

        handle.enqueue(BillingOp {
            team_id: "team-1".into(),
            sub_id: None,
            credits: 1,
            is_extract: false,
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        // The task must terminate cleanly despite ledger errors.
        task.await.unwrap();
    }

    #[tokio::test]
    async fn disconnected_handle_drops_silently() {
        let handle = BillingHandle::disconnected();
        handle.enqueue(BillingOp {
            team_id: "team-1".into(),
            sub_id: None,
            credits: 1,
            is_extract: false,
        });
    }
}
