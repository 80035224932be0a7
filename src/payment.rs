//! Payment Confirmation Watcher
//!
//! Watches the ledger for a confirmed transaction carrying a reference
//! marker. One watcher owns one polling task and at most one in-flight
//! query; each tick waits for the previous query to settle. Cancellation is
//! cooperative: an in-flight query is never aborted, its late result is
//! discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::rpc::LedgerRpc;
use crate::tree::changelog::ExecutionTrace;

/// Watcher states. `Invalid` is a transient observation: a transaction
/// carried the marker but failed validation, and the watcher keeps going so
/// a bad submission cannot block the legitimate one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Watching,
    Confirmed,
    Invalid,
    Stopped,
}

/// Caller-supplied check that the found transaction actually pays what it
/// should (amount, destination).
pub type PaymentValidator = Arc<dyn Fn(&ExecutionTrace) -> bool + Send + Sync>;

/// Watcher tuning
#[derive(Debug, Clone, Copy)]
pub struct PaymentWatcherConfig {
    /// Fixed polling interval. Short-lived user-facing window; no backoff.
    pub poll_interval: Duration,
}

impl Default for PaymentWatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Handle to a running watch. Dropping the handle does not stop the task;
/// call `cancel`.
pub struct PaymentWatchHandle {
    events: mpsc::UnboundedReceiver<PaymentState>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PaymentWatchHandle {
    /// Stop scheduling further queries. The current in-flight query, if
    /// any, is left to settle and its result discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Next state transition; `None` once the watcher task has finished
    /// and drained.
    pub async fn recv(&mut self) -> Option<PaymentState> {
        self.events.recv().await
    }

    /// Wait for the watcher task to finish
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Spawn a watcher for `reference`, emitting one state per observation.
pub fn watch(
    rpc: Arc<dyn LedgerRpc>,
    reference: Pubkey,
    validator: PaymentValidator,
    config: PaymentWatcherConfig,
) -> PaymentWatchHandle {
    let (events, receiver) = mpsc::unbounded_channel();
    let cancelled = Arc::new(AtomicBool::new(false));

    let flag = cancelled.clone();
    let task = tokio::spawn(async move {
        run_watch(rpc, reference, validator, config, flag, events).await;
    });

    PaymentWatchHandle {
        events: receiver,
        cancelled,
        task,
    }
}

async fn run_watch(
    rpc: Arc<dyn LedgerRpc>,
    reference: Pubkey,
    validator: PaymentValidator,
    config: PaymentWatcherConfig,
    cancelled: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<PaymentState>,
) {
    let mut ticker = tokio::time::interval(config.poll_interval);
    // a slow query must not cause a burst of catch-up queries
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if cancelled.load(Ordering::SeqCst) {
            break;
        }

        let found = match rpc.find_reference(&reference).await {
            Ok(found) => found,
            Err(error) => {
                // provider hiccup; the marker may still appear next tick
                tracing::warn!(%reference, %error, "reference lookup failed");
                continue;
            }
        };
        if cancelled.load(Ordering::SeqCst) {
            break;
        }

        let Some(signature) = found else {
            // steady state while the user has not paid yet
            let _ = events.send(PaymentState::Watching);
            continue;
        };

        let trace = match rpc.get_execution_trace(&signature).await {
            Ok(trace) => trace,
            Err(error) => {
                tracing::warn!(%signature, %error, "trace fetch failed");
                continue;
            }
        };
        if cancelled.load(Ordering::SeqCst) {
            break;
        }

        if validator(&trace) {
            tracing::info!(%reference, %signature, "payment confirmed");
            let _ = events.send(PaymentState::Confirmed);
            return;
        }

        // A transaction carried the marker but fails validation. Keep
        // watching; the legitimate payment may still land.
        tracing::warn!(%reference, %signature, "transaction carrying marker failed validation");
        let _ = events.send(PaymentState::Invalid);
    }

    let _ = events.send(PaymentState::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockLedgerRpc;
    use solana_sdk::signature::Signature;

    fn fast_config() -> PaymentWatcherConfig {
        PaymentWatcherConfig {
            poll_interval: Duration::from_millis(1),
        }
    }

    fn accept_all() -> PaymentValidator {
        Arc::new(|_| true)
    }

    fn reject_all() -> PaymentValidator {
        Arc::new(|_| false)
    }

    #[tokio::test]
    async fn test_not_found_then_confirmed_sequence() {
        let reference = Pubkey::new_unique();
        let mut rpc = MockLedgerRpc::new();

        let mut remaining_misses = 3;
        rpc.expect_find_reference().returning(move |_| {
            if remaining_misses > 0 {
                remaining_misses -= 1;
                Ok(None)
            } else {
                Ok(Some(Signature::default()))
            }
        });
        rpc.expect_get_execution_trace()
            .returning(|_| Ok(ExecutionTrace::default()));

        let mut handle = watch(Arc::new(rpc), reference, accept_all(), fast_config());

        let mut states = Vec::new();
        while let Some(state) = handle.recv().await {
            states.push(state);
        }
        assert_eq!(
            states,
            vec![
                PaymentState::Watching,
                PaymentState::Watching,
                PaymentState::Watching,
                PaymentState::Confirmed,
            ]
        );
        handle.join().await;
    }

    #[tokio::test]
    async fn test_invalid_is_transient_then_confirms() {
        let reference = Pubkey::new_unique();
        let mut rpc = MockLedgerRpc::new();

        rpc.expect_find_reference()
            .returning(|_| Ok(Some(Signature::default())));
        rpc.expect_get_execution_trace()
            .returning(|_| Ok(ExecutionTrace::default()));

        // reject the first observation, accept the second
        let calls = std::sync::Mutex::new(0u32);
        let validator: PaymentValidator = Arc::new(move |_| {
            let mut calls = calls.lock().unwrap();
            *calls += 1;
            *calls > 1
        });

        let mut handle = watch(Arc::new(rpc), reference, validator, fast_config());

        assert_eq!(handle.recv().await, Some(PaymentState::Invalid));
        assert_eq!(handle.recv().await, Some(PaymentState::Confirmed));
        assert_eq!(handle.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancel_stops_further_queries() {
        let reference = Pubkey::new_unique();
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_find_reference().returning(|_| Ok(None));

        let mut handle = watch(Arc::new(rpc), reference, reject_all(), fast_config());

        // observe at least one tick, then cancel mid-sequence
        assert_eq!(handle.recv().await, Some(PaymentState::Watching));
        handle.cancel();

        let mut last = None;
        while let Some(state) = handle.recv().await {
            assert_ne!(state, PaymentState::Confirmed);
            last = Some(state);
        }
        assert_eq!(last, Some(PaymentState::Stopped));
        handle.join().await;
    }

    #[tokio::test]
    async fn test_provider_errors_do_not_surface() {
        let reference = Pubkey::new_unique();
        let mut rpc = MockLedgerRpc::new();

        let mut fail_first = true;
        rpc.expect_find_reference().returning(move |_| {
            if fail_first {
                fail_first = false;
                Err(crate::rpc::RpcError::Request("boom".to_string()))
            } else {
                Ok(Some(Signature::default()))
            }
        });
        rpc.expect_get_execution_trace()
            .returning(|_| Ok(ExecutionTrace::default()));

        let mut handle = watch(Arc::new(rpc), reference, accept_all(), fast_config());

        // first observable state is Confirmed: the error tick emits nothing
        assert_eq!(handle.recv().await, Some(PaymentState::Confirmed));
    }
}
