//! Derived view engine.
//!
//! Combines the store's live snapshot sequence with the locally held
//! search text and filter mode into a continuously republished
//! [`UiState`]. One pipeline task serializes recomputation, so emissions
//! from the three inputs are never interleaved mid-computation.
//!
//! The pipeline runs only while at least one observer is attached. After
//! the last observer detaches it stays warm for a grace window, so an
//! observer reattaching shortly after (a navigation transition, a polling
//! client) picks up the last computed value with no recomputation gap.
//! Once the window elapses with zero observers the pipeline stops and the
//! published value resets to the default; the next attachment restarts it
//! and recomputation resumes as fresh input emissions arrive.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use crate::models::{Task, TaskFilter};

/// How long the pipeline stays warm after the last observer detaches.
pub const GRACE_WINDOW: Duration = Duration::from_millis(5000);

/// Derived presentation state. Recomputed as a whole, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiState {
    pub tasks: Vec<Task>,
    pub query: String,
    pub filter: TaskFilter,
}

pub struct ViewEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    tasks_rx: watch::Receiver<Vec<Task>>,
    query_tx: watch::Sender<String>,
    filter_tx: watch::Sender<TaskFilter>,
    ui_tx: watch::Sender<UiState>,
    grace: Duration,
    lifecycle: Mutex<Lifecycle>,
}

#[derive(Default)]
struct Lifecycle {
    observers: usize,
    pipeline: Option<JoinHandle<()>>,
    teardown: Option<JoinHandle<()>>,
}

impl ViewEngine {
    pub fn new(tasks_rx: watch::Receiver<Vec<Task>>) -> Self {
        Self::with_grace(tasks_rx, GRACE_WINDOW)
    }

    pub fn with_grace(tasks_rx: watch::Receiver<Vec<Task>>, grace: Duration) -> Self {
        let (query_tx, _) = watch::channel(String::new());
        let (filter_tx, _) = watch::channel(TaskFilter::All);
        let (ui_tx, _) = watch::channel(UiState::default());
        Self {
            inner: Arc::new(EngineInner {
                tasks_rx,
                query_tx,
                filter_tx,
                ui_tx,
                grace,
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        }
    }

    pub fn set_query(&self, query: impl Into<String>) {
        self.inner.query_tx.send_replace(query.into());
    }

    pub fn set_filter(&self, filter: TaskFilter) {
        self.inner.filter_tx.send_replace(filter);
    }

    /// The latest published value. Does not attach an observer.
    pub fn current(&self) -> UiState {
        self.inner.ui_tx.borrow().clone()
    }

    /// Attaches an observer, starting the pipeline if it is not running.
    /// The observer immediately sees the latest published value; dropping
    /// it detaches and, once no observers remain past the grace window,
    /// the pipeline stops.
    pub fn subscribe(&self) -> UiStateObserver {
        let mut lifecycle = self.inner.lock();
        lifecycle.observers += 1;
        if let Some(teardown) = lifecycle.teardown.take() {
            teardown.abort();
        }
        if lifecycle.pipeline.is_none() {
            let inner = Arc::clone(&self.inner);
            lifecycle.pipeline = Some(tokio::spawn(run_pipeline(inner)));
            debug!("view pipeline started");
        }
        drop(lifecycle);

        UiStateObserver {
            rx: self.inner.ui_tx.subscribe(),
            guard: ObserverGuard {
                inner: Arc::clone(&self.inner),
            },
        }
    }

    #[cfg(test)]
    fn observer_count(&self) -> usize {
        self.inner.lock().observers
    }
}

impl EngineInner {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn detach(inner: &Arc<EngineInner>) {
        let mut lifecycle = inner.lock();
        lifecycle.observers = lifecycle.observers.saturating_sub(1);
        if lifecycle.observers > 0 {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(inner);
                lifecycle.teardown = Some(handle.spawn(async move {
                    tokio::time::sleep(inner.grace).await;
                    inner.stop_if_idle();
                }));
            }
            Err(_) => {
                // No runtime left to host the grace timer, stop now.
                drop(lifecycle);
                inner.stop_if_idle();
            }
        }
    }

    fn stop_if_idle(&self) {
        let mut lifecycle = self.lock();
        if lifecycle.observers != 0 {
            return;
        }
        if let Some(pipeline) = lifecycle.pipeline.take() {
            pipeline.abort();
            debug!("view pipeline stopped");
        }
        lifecycle.teardown = None;
        self.ui_tx.send_replace(UiState::default());
    }
}

async fn run_pipeline(inner: Arc<EngineInner>) {
    let mut tasks_rx = inner.tasks_rx.clone();
    // The snapshot current at (re)start counts as seen: recomputation
    // begins with the next emission, not with a replay.
    tasks_rx.mark_unchanged();
    let mut query_rx = inner.query_tx.subscribe();
    let mut filter_rx = inner.filter_tx.subscribe();

    loop {
        let changed = tokio::select! {
            changed = tasks_rx.changed() => changed,
            changed = query_rx.changed() => changed,
            changed = filter_rx.changed() => changed,
        };
        if changed.is_err() {
            break;
        }

        let tasks = tasks_rx.borrow_and_update().clone();
        let query = query_rx.borrow_and_update().clone();
        let filter = *filter_rx.borrow_and_update();
        inner.ui_tx.send_replace(reduce(tasks, &query, filter));
    }
}

/// Pure reducer: search then filter, preserving snapshot order.
fn reduce(tasks: Vec<Task>, query: &str, filter: TaskFilter) -> UiState {
    let needle = query.to_lowercase();
    let tasks = tasks
        .into_iter()
        .filter(|t| t.title.to_lowercase().contains(&needle))
        .filter(|t| match filter {
            TaskFilter::All => true,
            TaskFilter::Active => !t.is_done,
            TaskFilter::Done => t.is_done,
        })
        .collect();
    UiState {
        tasks,
        query: query.to_string(),
        filter,
    }
}

/// Handle for one attached observer. Dropping it detaches.
pub struct UiStateObserver {
    rx: watch::Receiver<UiState>,
    guard: ObserverGuard,
}

impl UiStateObserver {
    /// The latest published value, available immediately on attach.
    pub fn current(&self) -> UiState {
        self.rx.borrow().clone()
    }

    /// Waits for the next published value. Returns `None` when the engine
    /// has gone away.
    pub async fn changed(&mut self) -> Option<UiState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Most-recent-wins stream of published values, starting with the
    /// current one. The observer stays attached for the stream's lifetime.
    pub fn into_stream(self) -> impl Stream<Item = UiState> + Send {
        let UiStateObserver { rx, guard } = self;
        WatchStream::new(rx).map(move |state| {
            let _ = &guard;
            state
        })
    }
}

struct ObserverGuard {
    inner: Arc<EngineInner>,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        EngineInner::detach(&self.inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, done: bool) -> Task {
        let mut task = Task::new(title);
        task.is_done = done;
        task
    }

    #[test]
    fn reduce_applies_query_and_filter_together() {
        let tasks = vec![
            task("buy groceries", false),
            task("buy stamps", true),
            task("call mom", false),
        ];

        let state = reduce(tasks, "buy", TaskFilter::Active);
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].title, "buy groceries");
        assert_eq!(state.query, "buy");
        assert_eq!(state.filter, TaskFilter::Active);
    }

    #[test]
    fn reduce_query_is_case_insensitive() {
        let tasks = vec![task("Buy Groceries", false)];
        let state = reduce(tasks, "gROCER", TaskFilter::All);
        assert_eq!(state.tasks.len(), 1);
    }

    #[test]
    fn reduce_empty_query_matches_everything() {
        let tasks = vec![task("a", false), task("b", true)];
        assert_eq!(reduce(tasks.clone(), "", TaskFilter::All).tasks.len(), 2);
        assert_eq!(reduce(tasks.clone(), "", TaskFilter::Active).tasks.len(), 1);
        assert_eq!(reduce(tasks, "", TaskFilter::Done).tasks.len(), 1);
    }

    #[test]
    fn reduce_no_match_is_empty_not_error() {
        let state = reduce(vec![task("a", false)], "zzz", TaskFilter::All);
        assert!(state.tasks.is_empty());
    }

    #[tokio::test]
    async fn observer_count_follows_subscribe_and_drop() {
        let (_tx, rx) = watch::channel(Vec::new());
        let engine = ViewEngine::with_grace(rx, Duration::from_millis(50));

        let first = engine.subscribe();
        let second = engine.subscribe();
        assert_eq!(engine.observer_count(), 2);

        drop(first);
        assert_eq!(engine.observer_count(), 1);
        drop(second);
        assert_eq!(engine.observer_count(), 0);
    }
}
