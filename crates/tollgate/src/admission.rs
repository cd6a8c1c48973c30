//! Bounded-concurrency admission queue.
//!
//! Work submitted with [`AdmissionQueue::enqueue`] waits in a FIFO list until one
//! of `limit` slots is free, then runs on its own tokio task.
//!
//! ## Invariants
//! - At most `limit` admitted tasks run at any moment.
//! - Waiting tasks are admitted strictly in submission order. Tasks admitted
//!   in the same pass are spawned in that order, but on a multi-threaded
//!   runtime their first polls may interleave. With a limit of 1 admission
//!   order is also execution order.
//! - A task holds its slot until its future completes (or panics). A task that
//!   never completes keeps its slot forever.
//!
//! The running count and the pending list are only touched by `advance` and by
//! slot release, which re-enters `advance`.
//!
//! If the [`Admission`] handle is dropped before the task has started, the task
//! is skipped when it reaches the head of the queue. Started tasks always run to
//! completion.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

/// Returned when an admitted task ended without handing back a result.
#[derive(Debug, Error)]
#[error("admitted task ended without producing a result")]
pub struct TaskAborted;

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionStats {
    pub limit: usize,
    pub running: usize,
    pub pending: usize,
}

/// Shared handle to a bounded-concurrency FIFO queue.
#[derive(Clone)]
pub struct AdmissionQueue {
    inner: Arc<Inner>,
}

struct Inner {
    limit: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    running: usize,
    pending: VecDeque<QueuedTask>,
}

struct QueuedTask {
    work: BoxFuture<'static, ()>,
    abandoned: CancellationToken,
}

impl AdmissionQueue {
    /// Create a queue admitting up to `limit` concurrent tasks (at least one).
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                limit: limit.max(1),
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    pub fn stats(&self) -> AdmissionStats {
        let state = self.inner.lock();
        AdmissionStats {
            limit: self.inner.limit,
            running: state.running,
            pending: state.pending.len(),
        }
    }

    /// Submit `work` and return a handle resolving to its output.
    ///
    /// Never waits: the task is queued and started as soon as a slot is free.
    pub fn enqueue<F, T>(&self, work: F) -> Admission<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let abandoned = CancellationToken::new();

        let task = QueuedTask {
            work: async move {
                // The waiter may have gone away; the result is simply dropped then.
                let _ = tx.send(work.await);
            }
            .boxed(),
            abandoned: abandoned.clone(),
        };

        self.inner.lock().pending.push_back(task);
        self.inner.advance();

        Admission {
            rx,
            _abandon_on_drop: abandoned.drop_guard(),
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start queued tasks while slots are free.
    fn advance(self: &Arc<Self>) {
        let admitted = {
            let mut state = self.lock();
            let mut admitted = Vec::new();
            while state.running < self.limit {
                let Some(task) = state.pending.pop_front() else {
                    break;
                };
                if task.abandoned.is_cancelled() {
                    trace!("Skipping abandoned task");
                    continue;
                }
                state.running += 1;
                admitted.push(task.work);
            }
            if !admitted.is_empty() {
                debug!(
                    admitted = admitted.len(),
                    running = state.running,
                    pending = state.pending.len(),
                    "Admitted queued tasks"
                );
            }
            admitted
        };

        for work in admitted {
            let slot = Slot {
                inner: Arc::clone(self),
            };
            tokio::spawn(async move {
                work.await;
                drop(slot);
            });
        }
    }

    fn release(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            state.running = state.running.saturating_sub(1);
        }
        self.advance();
    }
}

/// One occupied concurrency slot; freed on drop, including during a panic unwind.
struct Slot {
    inner: Arc<Inner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.inner.release();
    }
}

/// Completion handle for an enqueued task.
///
/// Dropping it before the task starts withdraws the task from the queue.
pub struct Admission<T> {
    rx: oneshot::Receiver<T>,
    _abandon_on_drop: DropGuard,
}

impl<T> Future for Admission<T> {
    type Output = Result<T, TaskAborted>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map_err(|_| TaskAborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::join_all;
    use tokio::sync::Semaphore;

    #[tokio::test]
    async fn running_tasks_never_exceed_limit() {
        let queue = AdmissionQueue::new(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                queue.enqueue(async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for result in join_all(handles).await {
            result.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stats_track_running_and_pending() {
        let queue = AdmissionQueue::new(2);
        let gate = Arc::new(Semaphore::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let gate = Arc::clone(&gate);
                queue.enqueue(async move {
                    let _permit = gate.acquire().await.unwrap();
                })
            })
            .collect();

        assert_eq!(
            queue.stats(),
            AdmissionStats {
                limit: 2,
                running: 2,
                pending: 3,
            }
        );

        gate.add_permits(5);
        for result in join_all(handles).await {
            result.unwrap();
        }

        let stats = queue.stats();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn tasks_start_in_enqueue_order() {
        for limit in [1, 2] {
            let queue = AdmissionQueue::new(limit);
            let started = Arc::new(Mutex::new(Vec::new()));

            let handles: Vec<_> = (0..8)
                .map(|id| {
                    let started = Arc::clone(&started);
                    queue.enqueue(async move {
                        started.lock().unwrap().push(id);
                        tokio::task::yield_now().await;
                    })
                })
                .collect();

            for result in join_all(handles).await {
                result.unwrap();
            }

            assert_eq!(*started.lock().unwrap(), (0..8).collect::<Vec<_>>());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_slot_runs_in_enqueue_order_across_workers() {
        let queue = AdmissionQueue::new(1);
        let started = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..32)
            .map(|id| {
                let started = Arc::clone(&started);
                queue.enqueue(async move {
                    started.lock().unwrap().push(id);
                    tokio::task::yield_now().await;
                })
            })
            .collect();

        for result in join_all(handles).await {
            result.unwrap();
        }

        assert_eq!(*started.lock().unwrap(), (0..32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn returns_task_output() {
        let queue = AdmissionQueue::new(1);
        let value = queue.enqueue(async { 40 + 2 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn dropped_handle_skips_pending_task() {
        let queue = AdmissionQueue::new(1);
        let gate = Arc::new(Semaphore::new(0));
        let ran = Arc::new(Mutex::new(Vec::new()));

        let blocker = {
            let gate = Arc::clone(&gate);
            let ran = Arc::clone(&ran);
            queue.enqueue(async move {
                let _permit = gate.acquire().await.unwrap();
                ran.lock().unwrap().push("blocker");
            })
        };

        let abandoned = {
            let ran = Arc::clone(&ran);
            queue.enqueue(async move {
                ran.lock().unwrap().push("abandoned");
            })
        };
        drop(abandoned);

        let last = {
            let ran = Arc::clone(&ran);
            queue.enqueue(async move {
                ran.lock().unwrap().push("last");
            })
        };

        assert_eq!(queue.stats().pending, 2);

        gate.add_permits(1);
        blocker.await.unwrap();
        last.await.unwrap();

        assert_eq!(*ran.lock().unwrap(), vec!["blocker", "last"]);
        assert_eq!(queue.stats().pending, 0);
    }

    #[tokio::test]
    async fn panicking_task_releases_its_slot() {
        let queue = AdmissionQueue::new(1);

        let failed = queue.enqueue(async {
            panic!("boom");
        });
        let next = queue.enqueue(async { "still admitted" });

        assert!(failed.await.is_err());
        assert_eq!(next.await.unwrap(), "still admitted");
    }

    #[test]
    fn zero_limit_is_clamped() {
        let queue = AdmissionQueue::new(0);
        assert_eq!(queue.limit(), 1);
    }
}
