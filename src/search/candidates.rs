//! Candidate file selection.
//!
//! Decides which files a search visits. Types and namespace-scope symbols
//! can be named from anywhere (forward declarations, redeclarations in
//! unrelated headers), so they broadcast to every file mentioning the
//! identifier. Everything else, including `static` and anonymous-namespace
//! declarations, is only visible to files that include the declaring file.

use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

use crate::graph::DependencyGraph;
use crate::model::{Macro, Snapshot, SymbolHandle, SymbolKind};

/// Whether a symbol is searched for in every file of the snapshot.
pub fn is_broadcast(symbol: &SymbolHandle) -> bool {
    let Some(sym) = symbol.symbol() else {
        return false;
    };
    let table = symbol.document().symbols();
    if table.is_file_local(symbol.id()) {
        return false;
    }
    if sym.kind.is_broadly_visible() {
        return true;
    }
    // A template wraps the declaration it parameterizes.
    let mut scope = table.enclosing_scope(symbol.id());
    while let Some(id) = scope {
        match table.get(id).map(|s| &s.kind) {
            Some(SymbolKind::Template) => scope = table.enclosing_scope(id),
            Some(SymbolKind::Namespace) => return true,
            _ => return false,
        }
    }
    false
}

/// Files to search for a symbol, the declaring file first.
pub fn select_for_symbol(symbol: &SymbolHandle, snapshot: &Snapshot, graph: &DependencyGraph) -> Vec<PathBuf> {
    let own = symbol.file().to_path_buf();
    let mut files = vec![own.clone()];
    let mut seen: HashSet<PathBuf> = HashSet::from([own.clone()]);

    let broadcast = is_broadcast(symbol);
    if broadcast {
        if let Some(identifier) = symbol.identifier() {
            for (path, doc) in snapshot.iter() {
                if doc.contains_identifier(identifier) && seen.insert(path.clone()) {
                    files.push(path.clone());
                }
            }
        }
    } else {
        for path in graph.files_depending_on(&own) {
            if seen.insert(path.clone()) {
                files.push(path.clone());
            }
        }
    }

    debug!(
        symbol = %symbol.label(),
        broadcast,
        candidates = files.len(),
        "selected candidate files"
    );
    files
}

/// Files to search for a macro: the defining file and everything that
/// includes it.
pub fn select_for_macro(definition: &Macro, graph: &DependencyGraph) -> Vec<PathBuf> {
    let mut files = vec![definition.file.clone()];
    files.extend(
        graph
            .files_depending_on(&definition.file)
            .iter()
            .filter(|p| **p != definition.file)
            .cloned(),
    );
    files
}
