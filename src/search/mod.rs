//! Find-usages and rename searches.
//!
//! [`FindReferences`] is the entry point. It owns the worker pool and the
//! cached dependency graph, and hands out one [`SearchSession`] per search.

pub mod candidates;
pub mod executor;
pub mod matcher;
pub mod session;

pub use candidates::{is_broadcast, select_for_macro, select_for_symbol};
pub use executor::SearchExecutor;
pub use matcher::{macro_definition_usage, SymbolQuery, UsageMatcher};
pub use session::{
    Progress, SearchEvent, SearchObserver, SearchOutcome, SearchParameters, SearchSession,
    SearchState, SearchTarget, SymbolTarget,
};

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SearchSettings;
use crate::error::{FindRefsError, Result};
use crate::graph::{DependencyCache, DependencyGraph};
use crate::identity;
use crate::model::{LookupContext, Macro, Snapshot, SymbolHandle, Usage, WorkingCopy};
use crate::parser::{read_source, FrontEnd};
use executor::{JobTarget, SearchJob};
use session::SessionShared;

/// The find-references engine.
pub struct FindReferences {
    front_end: Arc<dyn FrontEnd>,
    executor: SearchExecutor,
    dependencies: Arc<DependencyCache>,
    settings: SearchSettings,
}

impl FindReferences {
    pub fn new(front_end: Arc<dyn FrontEnd>, settings: SearchSettings) -> Result<Self> {
        let executor = SearchExecutor::new(&settings)?;
        Ok(Self {
            front_end,
            executor,
            dependencies: Arc::new(DependencyCache::new()),
            settings,
        })
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn front_end(&self) -> &Arc<dyn FrontEnd> {
        &self.front_end
    }

    pub fn worker_threads(&self) -> usize {
        self.executor.worker_threads()
    }

    /// The dependency graph for `snapshot`, rebuilt only if the cached one
    /// belongs to another generation.
    pub fn update_dependency_table(&self, snapshot: &Snapshot) -> Arc<DependencyGraph> {
        self.dependencies.update_or_reuse(snapshot)
    }

    pub fn dependency_cache(&self) -> &DependencyCache {
        &self.dependencies
    }

    // ─── Starting Searches ──────────────────────────────────────────

    /// Find all usages of `symbol`.
    pub fn start_usage_search(
        &self,
        symbol: &SymbolHandle,
        context: &LookupContext,
        working_copy: Arc<WorkingCopy>,
    ) -> SearchSession {
        self.find_all(symbol, context, working_copy, None)
    }

    /// Find all usages of `symbol`, annotated with `replacement`. An empty
    /// replacement means the symbol's own identifier.
    pub fn start_rename_search(
        &self,
        symbol: &SymbolHandle,
        context: &LookupContext,
        working_copy: Arc<WorkingCopy>,
        replacement: &str,
    ) -> SearchSession {
        let replacement = if replacement.is_empty() {
            symbol.identifier().unwrap_or_default().to_string()
        } else {
            replacement.to_string()
        };
        self.find_all(symbol, context, working_copy, Some(replacement))
    }

    /// Find all expansions of a macro. The definition itself is reported
    /// first.
    pub fn start_macro_usage_search(
        &self,
        definition: &Macro,
        snapshot: Arc<Snapshot>,
        working_copy: Arc<WorkingCopy>,
    ) -> SearchSession {
        self.find_macro(definition, snapshot, working_copy, None)
    }

    /// Macro search annotated with `replacement` (empty means the macro name).
    pub fn start_macro_rename_search(
        &self,
        definition: &Macro,
        snapshot: Arc<Snapshot>,
        working_copy: Arc<WorkingCopy>,
        replacement: &str,
    ) -> SearchSession {
        let replacement = if replacement.is_empty() {
            definition.name.clone()
        } else {
            replacement.to_string()
        };
        self.find_macro(definition, snapshot, working_copy, Some(replacement))
    }

    /// Re-run a finished search against a newer snapshot.
    ///
    /// The target is re-located by its identity path (symbols) or by name in
    /// its defining file (macros). If that fails the search is stale and the
    /// returned session is already completed with no usages.
    pub fn search_again(
        &self,
        previous: &SearchSession,
        snapshot: Arc<Snapshot>,
        working_copy: Arc<WorkingCopy>,
    ) -> SearchSession {
        let parameters = previous.parameters().clone();
        match &parameters.target {
            SearchTarget::Symbol(target) => match self.relocate(target, &snapshot, &working_copy) {
                Ok(symbol) => {
                    let context = LookupContext::for_symbol(snapshot, &symbol);
                    self.find_all(&symbol, &context, working_copy, parameters.replacement)
                }
                Err(e) => {
                    warn!(label = %previous.label(), error = %e, "search target is stale");
                    stale_session(previous.label(), parameters)
                }
            },
            SearchTarget::Macro(definition) => {
                let relocated = snapshot
                    .document(&definition.file)
                    .and_then(|doc| doc.find_macro(&definition.name))
                    .cloned();
                match relocated {
                    Some(found) => {
                        self.find_macro(&found, snapshot, working_copy, parameters.replacement)
                    }
                    None => {
                        warn!(
                            label = %previous.label(),
                            file = %definition.file.display(),
                            "macro definition is gone"
                        );
                        stale_session(previous.label(), parameters)
                    }
                }
            }
        }
    }

    /// References to `symbol` within the context document only, including
    /// declarations.
    pub fn references(
        &self,
        symbol: &SymbolHandle,
        context: &LookupContext,
        working_copy: &WorkingCopy,
    ) -> Vec<Usage> {
        let key = symbol.key();
        let document = &context.this_document;
        let source = read_source(document.path(), working_copy).unwrap_or_default();
        let lines: Vec<&str> = source.lines().collect();
        document
            .references_to(&key)
            .map(|r| Usage {
                file: document.path().to_path_buf(),
                line: r.position.line,
                column: r.position.column,
                length: r.length,
                line_text: r
                    .position
                    .line
                    .checked_sub(1)
                    .and_then(|i| lines.get(i))
                    .map(|l| l.to_string())
                    .unwrap_or_default(),
                replacement: None,
            })
            .collect()
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn find_all(
        &self,
        symbol: &SymbolHandle,
        context: &LookupContext,
        working_copy: Arc<WorkingCopy>,
        replacement: Option<String>,
    ) -> SearchSession {
        let target = SymbolTarget {
            key: symbol.key(),
            identifier: symbol.identifier().map(str::to_string),
            file: symbol.file().to_path_buf(),
            path: identity::encode(symbol.document().symbols(), symbol.id()),
        };
        let parameters = SearchParameters {
            target: SearchTarget::Symbol(target.clone()),
            is_replace: replacement.is_some(),
            replacement: replacement.clone(),
        };
        let (session, shared) = SearchSession::new(symbol.label(), parameters);

        let identifier = match (symbol.symbol(), target.identifier) {
            (Some(_), Some(identifier)) => identifier,
            _ => {
                let e = FindRefsError::UnidentifiableSymbol(symbol.label());
                warn!(session = %session.id(), error = %e, "search not started");
                shared.finish(SearchState::Failed);
                return session;
            }
        };

        let matcher = UsageMatcher::new(
            Arc::clone(&context.snapshot),
            Arc::clone(&working_copy),
            Arc::clone(&self.front_end),
            shared.cancel_flag(),
        )
        .with_this_document(Arc::clone(&context.this_document))
        .include_declarations(self.settings.include_declarations);

        info!(
            session = %session.id(),
            label = %session.label(),
            replace = replacement.is_some(),
            "starting symbol search"
        );
        let job = SearchJob {
            target: JobTarget::Symbol {
                handle: symbol.clone(),
                query: SymbolQuery {
                    key: target.key,
                    identifier,
                    replacement,
                },
            },
            snapshot: Arc::clone(&context.snapshot),
            working_copy,
            matcher,
            dependencies: Arc::clone(&self.dependencies),
        };
        self.launch(session, shared, job)
    }

    fn find_macro(
        &self,
        definition: &Macro,
        snapshot: Arc<Snapshot>,
        working_copy: Arc<WorkingCopy>,
        replacement: Option<String>,
    ) -> SearchSession {
        let parameters = SearchParameters {
            target: SearchTarget::Macro(definition.clone()),
            is_replace: replacement.is_some(),
            replacement: replacement.clone(),
        };
        let (session, shared) = SearchSession::new(definition.name.clone(), parameters);
        let matcher = UsageMatcher::new(
            Arc::clone(&snapshot),
            Arc::clone(&working_copy),
            Arc::clone(&self.front_end),
            shared.cancel_flag(),
        );

        info!(
            session = %session.id(),
            label = %session.label(),
            file = %definition.file.display(),
            "starting macro search"
        );
        let job = SearchJob {
            target: JobTarget::Macro {
                definition: definition.clone(),
                replacement,
            },
            snapshot,
            working_copy,
            matcher,
            dependencies: Arc::clone(&self.dependencies),
        };
        self.launch(session, shared, job)
    }

    fn launch(&self, session: SearchSession, shared: Arc<SessionShared>, job: SearchJob) -> SearchSession {
        if let Some(handle) = self.executor.start(job, shared) {
            session.attach(handle);
        }
        session
    }

    /// Find the symbol a previous search targeted in a freshly parsed copy
    /// of its declaring file.
    fn relocate(
        &self,
        target: &SymbolTarget,
        snapshot: &Snapshot,
        working_copy: &WorkingCopy,
    ) -> Result<SymbolHandle> {
        let stale = |reason: String| FindRefsError::StaleTarget {
            file: target.file.clone(),
            reason,
        };
        if !snapshot.contains(&target.file) {
            return Err(stale("file is no longer in the snapshot".to_string()));
        }
        let source = read_source(&target.file, working_copy).map_err(|e| stale(e.to_string()))?;
        let preprocessed = self.front_end.preprocess(&target.file, &source);
        let document = self
            .front_end
            .reparse_and_bind(&target.file, &preprocessed, snapshot)
            .map_err(|e| stale(e.to_string()))?;
        let id = identity::locate(&target.path, document.symbols())
            .ok_or_else(|| stale(format!("no symbol at {}", target.path)))?;
        Ok(SymbolHandle::new(Arc::new(document), id))
    }
}

/// A session for a target that no longer exists: completed, no usages.
fn stale_session(label: &str, parameters: SearchParameters) -> SearchSession {
    let (session, shared) = SearchSession::new(label, parameters);
    shared.begin(0);
    shared.finish(SearchState::Completed);
    session
}
