//! Debounced view refresh
//!
//! A trigger waits for an idle delay before running its job. A newer trigger
//! aborts the older task, and every dispatch carries a sequence number so a
//! result is only published while it is still the latest one issued.

use crate::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Published state of a debounced view.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum ViewState<T> {
    Idle,
    Insufficient { required: usize, available: usize },
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> ViewState<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, ViewState::Ready(_))
    }
}

struct Shared<T> {
    /// Latest sequence number issued; guards every publish.
    sequence: Mutex<u64>,
    state_tx: watch::Sender<ViewState<T>>,
}

impl<T> Shared<T> {
    fn next_sequence(&self) -> u64 {
        let mut sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        *sequence += 1;
        *sequence
    }

    /// Publish `state` if `seq` is still the latest dispatch.
    fn publish_if_current(&self, seq: u64, state: ViewState<T>) -> bool {
        let sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        if *sequence != seq {
            return false;
        }
        self.state_tx.send_replace(state);
        true
    }

    fn publish_now(&self, state: ViewState<T>) -> u64 {
        let mut sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        *sequence += 1;
        self.state_tx.send_replace(state);
        *sequence
    }
}

pub struct Debouncer<T> {
    name: &'static str,
    delay: Duration,
    failure_message: &'static str,
    shared: Arc<Shared<T>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, delay: Duration, failure_message: &'static str) -> Self {
        let (state_tx, _) = watch::channel(ViewState::Idle);
        Self {
            name,
            delay,
            failure_message,
            shared: Arc::new(Shared {
                sequence: Mutex::new(0),
                state_tx,
            }),
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `job` after the idle delay, superseding anything outstanding.
    /// Returns the sequence number assigned to this dispatch.
    pub fn trigger<F, Fut>(&self, job: F) -> u64
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        // Held until the handle is stored, so a trigger that was issued
        // earlier can never abort a later one.
        let mut pending = self.lock_pending();
        let seq = self.shared.next_sequence();
        let shared = Arc::clone(&self.shared);
        let delay = self.delay;
        let name = self.name;
        let failure_message = self.failure_message;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if !shared.publish_if_current(seq, ViewState::Loading) {
                return;
            }
            debug!(view = name, seq, "Dispatching debounced job");

            let state = match job().await {
                Ok(value) => ViewState::Ready(value),
                Err(e) => {
                    warn!(view = name, seq, "Debounced job failed: {}", e);
                    ViewState::Failed(failure_message.to_string())
                }
            };

            if !shared.publish_if_current(seq, state) {
                debug!(view = name, seq, "Discarding stale result");
            }
        });

        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
        seq
    }

    /// Publish `state` immediately and invalidate outstanding jobs.
    pub fn set_state(&self, state: ViewState<T>) -> u64 {
        let mut pending = self.lock_pending();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        self.shared.publish_now(state)
    }

    pub fn current(&self) -> ViewState<T> {
        self.shared.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState<T>> {
        self.shared.state_tx.subscribe()
    }

    pub fn latest_sequence(&self) -> u64 {
        *self
            .shared
            .sequence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock order is `pending` then `sequence`; spawned tasks only take
    /// `sequence`.
    fn lock_pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackwiseError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn debouncer() -> Debouncer<u32> {
        Debouncer::new("test", Duration::from_millis(700), "Could not refresh view.")
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_delay() {
        let debouncer = debouncer();
        let mut rx = debouncer.subscribe();

        debouncer.trigger(|| async { Ok(7) });
        assert_eq!(debouncer.current(), ViewState::Idle);

        let state = rx.wait_for(|s| s.is_ready()).await.unwrap().clone();
        assert_eq!(state, ViewState::Ready(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_triggers_run_only_last() {
        let debouncer = debouncer();
        let runs = Arc::new(AtomicUsize::new(0));
        let mut rx = debouncer.subscribe();

        for value in 1..=3u32 {
            let runs = Arc::clone(&runs);
            debouncer.trigger(move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let state = rx.wait_for(|s| s.is_ready()).await.unwrap().clone();
        assert_eq!(state, ViewState::Ready(3));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.latest_sequence(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_in_flight_job_never_publishes() {
        let debouncer = debouncer();
        let mut rx = debouncer.subscribe();

        // First job is slow and is already running when the second arrives.
        debouncer.trigger(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(1)
        });
        rx.wait_for(|s| *s == ViewState::Loading).await.unwrap();

        debouncer.trigger(|| async { Ok(2) });

        let state = rx.wait_for(|s| s.is_ready()).await.unwrap().clone();
        assert_eq!(state, ViewState::Ready(2));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(debouncer.current(), ViewState::Ready(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_publishes_generic_message() {
        let debouncer = debouncer();
        let mut rx = debouncer.subscribe();

        debouncer.trigger(|| async { Err(TrackwiseError::LlmError("boom".to_string())) });

        let state = rx
            .wait_for(|s| matches!(s, ViewState::Failed(_)))
            .await
            .unwrap()
            .clone();
        assert_eq!(state, ViewState::Failed("Could not refresh view.".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_state_cancels_pending() {
        let debouncer = debouncer();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        debouncer.trigger(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        debouncer.set_state(ViewState::Insufficient {
            required: 5,
            available: 2,
        });

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(
            debouncer.current(),
            ViewState::Insufficient {
                required: 5,
                available: 2
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_keep_latest_dispatch() {
        let runtime = tokio::runtime::Handle::current();

        for _ in 0..500 {
            let debouncer = Arc::new(Debouncer::<u64>::new(
                "race",
                Duration::from_millis(1),
                "Could not refresh view.",
            ));
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let threads: Vec<_> = (0..2u64)
                .map(|value| {
                    let debouncer = Arc::clone(&debouncer);
                    let barrier = Arc::clone(&barrier);
                    let runtime = runtime.clone();
                    std::thread::spawn(move || {
                        let _entered = runtime.enter();
                        barrier.wait();
                        debouncer.trigger(move || async move { Ok(value) })
                    })
                })
                .collect();
            let sequences: Vec<u64> = threads.into_iter().map(|t| t.join().unwrap()).collect();

            let latest = debouncer.latest_sequence();
            assert_eq!(latest, 2);
            let winner = sequences.iter().position(|seq| *seq == latest).unwrap() as u64;

            let mut rx = debouncer.subscribe();
            let published = tokio::time::timeout(
                Duration::from_secs(5),
                rx.wait_for(|s| *s == ViewState::Ready(winner)),
            )
            .await;
            assert!(published.is_ok(), "latest dispatch was lost");
        }
    }

    #[test]
    fn test_view_state_wire_shape() {
        let ready = serde_json::to_value(ViewState::Ready(vec!["a"])).unwrap();
        assert_eq!(ready["status"], "ready");
        assert_eq!(ready["data"][0], "a");

        let insufficient = serde_json::to_value(ViewState::<u32>::Insufficient {
            required: 5,
            available: 1,
        })
        .unwrap();
        assert_eq!(insufficient["status"], "insufficient");
        assert_eq!(insufficient["data"]["required"], 5);
    }
}
