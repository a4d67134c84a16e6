//! Per-file usage matching.
//!
//! Matching one file is independent of every other file, so the executor
//! runs these on the worker pool. A matcher never fails: unreadable or
//! unparsable files are logged and contribute nothing.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::{DeclKey, Document, Macro, Snapshot, Usage, WorkingCopy};
use crate::parser::{read_source, FrontEnd};

/// The symbol being searched for.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolQuery {
    pub key: DeclKey,
    pub identifier: String,
    pub replacement: Option<String>,
}

/// Everything a worker needs to match one file.
#[derive(Clone)]
pub struct UsageMatcher {
    snapshot: Arc<Snapshot>,
    working_copy: Arc<WorkingCopy>,
    front_end: Arc<dyn FrontEnd>,
    this_document: Option<Arc<Document>>,
    cancel: Arc<AtomicBool>,
    include_declarations: bool,
}

impl UsageMatcher {
    pub fn new(
        snapshot: Arc<Snapshot>,
        working_copy: Arc<WorkingCopy>,
        front_end: Arc<dyn FrontEnd>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            snapshot,
            working_copy,
            front_end,
            this_document: None,
            cancel,
            include_declarations: false,
        }
    }

    /// An already bound document to reuse instead of reparsing its file.
    pub fn with_this_document(mut self, document: Arc<Document>) -> Self {
        self.this_document = Some(document);
        self
    }

    pub fn include_declarations(mut self, include: bool) -> Self {
        self.include_declarations = include;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Usages of `query` in `file`, sorted by position.
    pub fn match_symbol(&self, file: &Path, query: &SymbolQuery) -> Vec<Usage> {
        if self.cancelled() {
            return Vec::new();
        }

        if let Some(previous) = self.snapshot.document(file) {
            if !previous.contains_identifier(&query.identifier) {
                return Vec::new();
            }
        }

        let source = match read_source(file, &self.working_copy) {
            Ok(source) => source,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "cannot read file, skipping");
                return Vec::new();
            }
        };

        if self.cancelled() {
            return Vec::new();
        }

        let reusable = self
            .this_document
            .as_ref()
            .filter(|doc| doc.path() == file && doc.is_bound());
        let document = match reusable {
            Some(doc) => Arc::clone(doc),
            None => {
                let preprocessed = self.front_end.preprocess(file, &source);
                match self
                    .front_end
                    .reparse_and_bind(file, &preprocessed, &self.snapshot)
                {
                    Ok(doc) => Arc::new(doc),
                    Err(e) => {
                        warn!(file = %file.display(), error = %e, "cannot parse file, skipping");
                        return Vec::new();
                    }
                }
            }
        };

        if !document.contains_identifier(&query.identifier) {
            return Vec::new();
        }

        let lines: Vec<&str> = source.lines().collect();
        let mut usages: Vec<Usage> = document
            .references_to(&query.key)
            .filter(|r| self.include_declarations || !r.is_declaration)
            .map(|r| Usage {
                file: file.to_path_buf(),
                line: r.position.line,
                column: r.position.column,
                length: r.length,
                line_text: line_text(&lines, r.position.line),
                replacement: query.replacement.clone(),
            })
            .collect();
        usages.sort_by_key(|u| (u.line, u.column));

        debug!(file = %file.display(), usages = usages.len(), "matched file");
        usages
    }

    /// Recorded expansions of `definition` in `file`.
    pub fn match_macro(&self, file: &Path, definition: &Macro, replacement: Option<&str>) -> Vec<Usage> {
        if self.cancelled() {
            return Vec::new();
        }
        let Some(document) = self.snapshot.document(file) else {
            return Vec::new();
        };

        let uses: Vec<_> = document
            .macro_uses()
            .iter()
            .filter(|u| u.definition.same_definition(&definition.file, definition.line))
            .collect();
        if uses.is_empty() {
            return Vec::new();
        }

        let source = match read_source(file, &self.working_copy) {
            Ok(source) => source,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "cannot read file, skipping");
                return Vec::new();
            }
        };
        let lines: Vec<&str> = source.lines().collect();

        let mut usages: Vec<Usage> = uses
            .into_iter()
            .map(|u| Usage {
                file: file.to_path_buf(),
                line: u.position.line,
                column: u.position.column,
                length: u.length,
                line_text: line_text(&lines, u.position.line),
                replacement: replacement.map(str::to_string),
            })
            .collect();
        usages.sort_by_key(|u| (u.line, u.column));
        usages
    }
}

/// The usage reported for a macro's own definition: the macro name on its
/// `#define` line.
pub fn macro_definition_usage(
    definition: &Macro,
    working_copy: &WorkingCopy,
    replacement: Option<&str>,
) -> Option<Usage> {
    let source = match read_source(&definition.file, working_copy) {
        Ok(source) => source,
        Err(e) => {
            warn!(file = %definition.file.display(), error = %e, "cannot read macro definition");
            return None;
        }
    };
    let lines: Vec<&str> = source.lines().collect();
    let text = line_text(&lines, definition.line);
    let column = text
        .find("define")
        .map(|d| d + "define".len())
        .and_then(|start| text[start..].find(&definition.name).map(|c| start + c))
        .unwrap_or(0);
    Some(Usage {
        file: definition.file.clone(),
        line: definition.line,
        column,
        length: definition.name.len(),
        line_text: text,
        replacement: replacement.map(str::to_string),
    })
}

fn line_text(lines: &[&str], line: usize) -> String {
    line.checked_sub(1)
        .and_then(|i| lines.get(i))
        .map(|l| l.to_string())
        .unwrap_or_default()
}
