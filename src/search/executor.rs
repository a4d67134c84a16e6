//! Search execution.
//!
//! Each session gets an orchestrator thread that selects candidate files,
//! fans the per-file matching out onto the shared rayon pool and reduces
//! the results in arrival order. Workers talk to the reducer over a bounded
//! channel, one message per file. The reducer alone updates the session, so
//! progress and results never race each other.
//!
//! The orchestrator runs outside the pool: it spends its life blocked on
//! the channel and would otherwise hold a worker slot the matchers need.

use rayon::prelude::*;
use rayon::ThreadPool;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::candidates;
use super::matcher::{macro_definition_usage, SymbolQuery, UsageMatcher};
use super::session::{SearchState, SessionShared};
use crate::config::SearchSettings;
use crate::error::Result;
use crate::graph::DependencyCache;
use crate::model::{Macro, Snapshot, SymbolHandle, Usage, WorkingCopy};

pub(crate) enum JobTarget {
    Symbol {
        handle: SymbolHandle,
        query: SymbolQuery,
    },
    Macro {
        definition: Macro,
        replacement: Option<String>,
    },
}

/// One search, ready to run.
pub(crate) struct SearchJob {
    pub target: JobTarget,
    pub snapshot: Arc<Snapshot>,
    pub working_copy: Arc<WorkingCopy>,
    pub matcher: UsageMatcher,
    pub dependencies: Arc<DependencyCache>,
}

/// Runs search jobs on a shared worker pool.
pub struct SearchExecutor {
    pool: Arc<ThreadPool>,
    channel_capacity: usize,
    poll_interval: Duration,
}

impl SearchExecutor {
    pub fn new(settings: &SearchSettings) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.worker_threads)
            .thread_name(|i| format!("findrefs-worker-{}", i))
            .panic_handler(|_| warn!("search worker panicked"))
            .build()?;
        debug!(threads = pool.current_num_threads(), "search pool ready");
        Ok(Self {
            pool: Arc::new(pool),
            channel_capacity: settings.event_capacity.max(1),
            poll_interval: settings.poll_interval(),
        })
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Start `job` for the session behind `shared`. If no thread can be
    /// spawned the session fails.
    pub(crate) fn start(&self, job: SearchJob, shared: Arc<SessionShared>) -> Option<JoinHandle<()>> {
        let pool = Arc::clone(&self.pool);
        let capacity = self.channel_capacity;
        let poll = self.poll_interval;
        let session = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("findrefs-search".to_string())
            .spawn(move || run(job, &session, &pool, capacity, poll));
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(session = %shared.id(), error = %e, "cannot spawn search thread");
                shared.finish(SearchState::Failed);
                None
            }
        }
    }
}

fn run(job: SearchJob, shared: &SessionShared, pool: &ThreadPool, capacity: usize, poll: Duration) {
    if shared.is_cancelled() {
        shared.finish(SearchState::Cancelled);
        return;
    }
    let started = Instant::now();
    let graph = job.dependencies.update_or_reuse(&job.snapshot);

    let (files, preamble) = match &job.target {
        JobTarget::Symbol { handle, .. } => (
            candidates::select_for_symbol(handle, &job.snapshot, &graph),
            None,
        ),
        JobTarget::Macro {
            definition,
            replacement,
        } => (
            candidates::select_for_macro(definition, &graph),
            macro_definition_usage(definition, &job.working_copy, replacement.as_deref()),
        ),
    };

    if !shared.begin(files.len()) {
        return;
    }
    info!(session = %shared.id(), files = files.len(), "search started");
    if let Some(definition) = preamble {
        shared.publish(vec![definition]);
    }

    let state = reduce(files, job.target, job.matcher, shared, pool, capacity, poll);
    shared.finish(state);
    let progress = shared.progress();
    info!(
        session = %shared.id(),
        %state,
        completed = progress.completed,
        total = progress.total,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "search finished"
    );
}

fn reduce(
    files: Vec<PathBuf>,
    target: JobTarget,
    matcher: UsageMatcher,
    shared: &SessionShared,
    pool: &ThreadPool,
    capacity: usize,
    poll: Duration,
) -> SearchState {
    let total = files.len();
    if total == 0 {
        return SearchState::Completed;
    }

    let (tx, rx) = mpsc::sync_channel::<Vec<Usage>>(capacity);
    pool.spawn(move || {
        files.into_par_iter().for_each_with(tx, |tx, file| {
            let usages = match_file(&file, &target, &matcher);
            // The reducer is gone once the session is cancelled.
            let _ = tx.send(usages);
        });
    });
    drain(rx, total, shared, poll)
}

/// One file's usages. A panicking matcher costs that file only.
fn match_file(file: &Path, target: &JobTarget, matcher: &UsageMatcher) -> Vec<Usage> {
    let matched = panic::catch_unwind(AssertUnwindSafe(|| match target {
        JobTarget::Symbol { query, .. } => matcher.match_symbol(file, query),
        JobTarget::Macro {
            definition,
            replacement,
        } => matcher.match_macro(file, definition, replacement.as_deref()),
    }));
    matched.unwrap_or_else(|_| {
        warn!(file = %file.display(), "matcher panicked, file skipped");
        Vec::new()
    })
}

/// Reduce `total` per-file messages into the session.
///
/// Workers that hang up before every file is reported fail the search; the
/// progress stays at what was actually received.
fn drain(rx: Receiver<Vec<Usage>>, total: usize, shared: &SessionShared, poll: Duration) -> SearchState {
    let mut received = 0;
    while received < total {
        if shared.is_cancelled() {
            return SearchState::Cancelled;
        }
        match rx.recv_timeout(poll) {
            Ok(usages) => {
                if shared.is_cancelled() {
                    return SearchState::Cancelled;
                }
                received += 1;
                shared.publish(usages);
                shared.advance();
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!(
                    session = %shared.id(),
                    received,
                    total,
                    "workers stopped early"
                );
                return SearchState::Failed;
            }
        }
    }
    SearchState::Completed
}
