//! Search sessions: the caller's handle on one outstanding search.
//!
//! A session owns the search parameters, a cancellation flag, progress
//! counters and everything reduced so far. Results reach the caller three
//! ways: the accumulated list (`usages`, `wait`), an event receiver
//! (`events`) and registered observers (`subscribe`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::SymbolIdentityPath;
use crate::model::{DeclKey, Macro, Usage};

/// Lifecycle of a search. Terminal states are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SearchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchState::Completed | SearchState::Cancelled | SearchState::Failed
        )
    }
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchState::Idle => "idle",
            SearchState::Running => "running",
            SearchState::Completed => "completed",
            SearchState::Cancelled => "cancelled",
            SearchState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Files processed out of files selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// What a session searches for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTarget {
    Symbol(SymbolTarget),
    Macro(Macro),
}

/// A symbol target, kept in a form that survives re-parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolTarget {
    pub key: DeclKey,
    pub identifier: Option<String>,
    /// Declaring file.
    pub file: PathBuf,
    /// Identity path within the declaring file.
    pub path: SymbolIdentityPath,
}

/// Everything needed to run (or re-run) a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParameters {
    pub target: SearchTarget,
    /// Text each usage would be replaced with.
    pub replacement: Option<String>,
    pub is_replace: bool,
}

/// Notifications a session emits, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// Usages from one file, in source order.
    Usages(Vec<Usage>),
    Progress(Progress),
    Finished(SearchState),
}

/// Callbacks for a session. Invoked from the session's reducer thread.
pub trait SearchObserver: Send {
    fn on_usage_batch(&mut self, _usages: &[Usage]) {}
    fn on_progress(&mut self, _progress: Progress) {}
    fn on_finished(&mut self, _state: SearchState) {}
}

/// Final result of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub state: SearchState,
    pub progress: Progress,
    pub usages: Vec<Usage>,
}

// ─── Shared State ───────────────────────────────────────────────

struct Inner {
    state: SearchState,
    results: Vec<Usage>,
    observers: Vec<Box<dyn SearchObserver>>,
    events: Sender<SearchEvent>,
}

/// State shared between a session handle and the thread running it.
pub(crate) struct SessionShared {
    id: Uuid,
    cancel: Arc<AtomicBool>,
    completed: AtomicUsize,
    total: AtomicUsize,
    inner: Mutex<Inner>,
    finished: Condvar,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub(crate) fn progress(&self) -> Progress {
        Progress {
            completed: self.completed.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn state(&self) -> SearchState {
        self.lock().state
    }

    /// Idle -> Running. Fails if the session already left Idle.
    pub(crate) fn begin(&self, total: usize) -> bool {
        let mut inner = self.lock();
        if inner.state != SearchState::Idle {
            return false;
        }
        inner.state = SearchState::Running;
        self.total.store(total, Ordering::SeqCst);
        let progress = self.progress();
        for observer in inner.observers.iter_mut() {
            observer.on_progress(progress);
        }
        let _ = inner.events.send(SearchEvent::Progress(progress));
        true
    }

    /// Append one file's usages to the results.
    pub(crate) fn publish(&self, usages: Vec<Usage>) {
        if usages.is_empty() {
            return;
        }
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return;
        }
        for observer in inner.observers.iter_mut() {
            observer.on_usage_batch(&usages);
        }
        inner.results.extend(usages.iter().cloned());
        let _ = inner.events.send(SearchEvent::Usages(usages));
    }

    /// One more file done.
    pub(crate) fn advance(&self) {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        let progress = self.progress();
        for observer in inner.observers.iter_mut() {
            observer.on_progress(progress);
        }
        let _ = inner.events.send(SearchEvent::Progress(progress));
    }

    /// Enter a terminal state. No-op if already terminal.
    pub(crate) fn finish(&self, state: SearchState) {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return;
        }
        inner.state = state;
        if state == SearchState::Completed {
            self.completed
                .store(self.total.load(Ordering::SeqCst), Ordering::SeqCst);
        }
        for observer in inner.observers.iter_mut() {
            observer.on_finished(state);
        }
        let _ = inner.events.send(SearchEvent::Finished(state));
        debug!(session = %self.id, %state, usages = inner.results.len(), "session finished");
        self.finished.notify_all();
    }

    fn wait_terminal(&self) -> SearchState {
        let mut inner = self.lock();
        while !inner.state.is_terminal() {
            inner = self
                .finished
                .wait(inner)
                .unwrap_or_else(|p| p.into_inner());
        }
        inner.state
    }
}

// ─── Session Handle ─────────────────────────────────────────────

/// Handle on one user-initiated search.
pub struct SearchSession {
    label: String,
    parameters: SearchParameters,
    shared: Arc<SessionShared>,
    events: Mutex<Option<Receiver<SearchEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSession")
            .field("id", &self.shared.id)
            .field("label", &self.label)
            .field("state", &self.state())
            .field("progress", &self.progress())
            .finish()
    }
}

impl SearchSession {
    /// A new idle session.
    pub(crate) fn new(label: impl Into<String>, parameters: SearchParameters) -> (Self, Arc<SessionShared>) {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(SessionShared {
            id: Uuid::new_v4(),
            cancel: Arc::new(AtomicBool::new(false)),
            completed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            inner: Mutex::new(Inner {
                state: SearchState::Idle,
                results: Vec::new(),
                observers: Vec::new(),
                events: tx,
            }),
            finished: Condvar::new(),
        });
        let session = Self {
            label: label.into(),
            parameters,
            shared: Arc::clone(&shared),
            events: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
        };
        (session, shared)
    }

    pub(crate) fn attach(&self, handle: JoinHandle<()>) {
        *self.worker.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    pub fn id(&self) -> Uuid {
        self.shared.id()
    }

    /// The target's qualified name, or the macro name.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parameters(&self) -> &SearchParameters {
        &self.parameters
    }

    pub fn state(&self) -> SearchState {
        self.shared.state()
    }

    pub fn progress(&self) -> Progress {
        self.shared.progress()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Request cancellation. Files already reduced stay in the results.
    pub fn cancel(&self) {
        if !self.shared.cancel.swap(true, Ordering::SeqCst) {
            info!(session = %self.id(), label = %self.label, "search cancelled");
        }
    }

    /// Usages reduced so far.
    pub fn usages(&self) -> Vec<Usage> {
        self.shared.lock().results.clone()
    }

    /// The event stream. Only the first call gets it.
    pub fn events(&self) -> Option<Receiver<SearchEvent>> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    /// Register callbacks. Results reduced before the call are replayed
    /// first, so an observer sees the whole search whenever it subscribes.
    pub fn subscribe(&self, mut observer: Box<dyn SearchObserver>) {
        let mut inner = self.shared.lock();
        if !inner.results.is_empty() {
            observer.on_usage_batch(&inner.results);
        }
        observer.on_progress(self.shared.progress());
        if inner.state.is_terminal() {
            observer.on_finished(inner.state);
            return;
        }
        inner.observers.push(observer);
    }

    /// Block until the session reaches a terminal state.
    pub fn wait(&self) -> SearchOutcome {
        let handle = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(session = %self.id(), "search thread panicked");
                self.shared.finish(SearchState::Failed);
            }
        }
        let state = self.shared.wait_terminal();
        SearchOutcome {
            state,
            progress: self.progress(),
            usages: self.usages(),
        }
    }
}
