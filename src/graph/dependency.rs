//! The include dependency graph.
//!
//! Nodes are snapshot files, an edge `A -> B` means A includes B. For every
//! file we precompute the set of files that reach it through includes, so
//! `files_depending_on` is a lookup. The closure is computed over the
//! condensation (strongly connected components in topological order), so
//! include cycles cost nothing extra.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::model::Snapshot;

static NO_DEPENDENTS: BTreeSet<PathBuf> = BTreeSet::new();

/// Reverse transitive include closure for one snapshot generation.
#[derive(Debug)]
pub struct DependencyGraph {
    generation: u64,
    graph: DiGraph<PathBuf, ()>,
    file_index: HashMap<PathBuf, NodeIndex>,
    dependents: HashMap<PathBuf, BTreeSet<PathBuf>>,
    cycles: usize,
}

impl DependencyGraph {
    /// Build the graph and its closure from a snapshot.
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut graph: DiGraph<PathBuf, ()> = DiGraph::new();
        let mut file_index: HashMap<PathBuf, NodeIndex> = HashMap::with_capacity(snapshot.len());

        // Phase 1: one node per file
        for path in snapshot.paths() {
            let idx = graph.add_node(path.clone());
            file_index.insert(path.clone(), idx);
        }

        // Phase 2: include edges, resolved against the snapshot
        let mut seen: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
        for (path, doc) in snapshot.iter() {
            let Some(&from) = file_index.get(path) else {
                continue;
            };
            for include in doc.includes() {
                let target = include
                    .resolved
                    .clone()
                    .or_else(|| snapshot.resolve_include(path, &include.spelled));
                let Some(&to) = target.as_ref().and_then(|t| file_index.get(t)) else {
                    continue;
                };
                if from != to && seen.insert((from, to)) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        // Phase 3: closure over the condensation.
        // tarjan_scc yields components in reverse topological order.
        let mut sccs = tarjan_scc(&graph);
        sccs.reverse();

        let mut component_of: HashMap<NodeIndex, usize> = HashMap::with_capacity(graph.node_count());
        for (c, members) in sccs.iter().enumerate() {
            for &node in members {
                component_of.insert(node, c);
            }
        }

        let mut reaching: Vec<BTreeSet<NodeIndex>> = vec![BTreeSet::new(); sccs.len()];
        let mut cycles = 0;
        for (c, members) in sccs.iter().enumerate() {
            if members.len() > 1 {
                cycles += 1;
            }
            let mut acc: BTreeSet<NodeIndex> = BTreeSet::new();
            for &node in members {
                for includer in graph.neighbors_directed(node, Direction::Incoming) {
                    let Some(&pc) = component_of.get(&includer) else {
                        continue;
                    };
                    if pc == c {
                        continue;
                    }
                    acc.extend(sccs[pc].iter().copied());
                    acc.extend(reaching[pc].iter().copied());
                }
            }
            reaching[c] = acc;
        }

        let mut dependents: HashMap<PathBuf, BTreeSet<PathBuf>> = HashMap::new();
        for (c, members) in sccs.iter().enumerate() {
            for &node in members {
                let set: BTreeSet<PathBuf> = reaching[c]
                    .iter()
                    .chain(members.iter())
                    .filter(|&&n| n != node)
                    .map(|&n| graph[n].clone())
                    .collect();
                if !set.is_empty() {
                    dependents.insert(graph[node].clone(), set);
                }
            }
        }

        info!(
            generation = snapshot.generation(),
            files = graph.node_count(),
            edges = graph.edge_count(),
            cycles,
            "dependency graph built"
        );

        Self {
            generation: snapshot.generation(),
            graph,
            file_index,
            dependents,
            cycles,
        }
    }

    /// Files that include `path`, directly or transitively. Never contains
    /// `path` itself.
    pub fn files_depending_on(&self, path: &Path) -> &BTreeSet<PathBuf> {
        self.dependents.get(path).unwrap_or(&NO_DEPENDENTS)
    }

    /// Files `path` includes directly.
    #[cfg(test)]
    pub(crate) fn direct_includes(&self, path: &Path) -> Vec<PathBuf> {
        let Some(&idx) = self.file_index.get(path) else {
            return Vec::new();
        };
        let mut out: Vec<PathBuf> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect();
        out.sort();
        out
    }

    /// A graph is valid only for the snapshot generation it was built from.
    pub fn is_valid_for(&self, snapshot: &Snapshot) -> bool {
        self.generation == snapshot.generation()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> DependencyStats {
        DependencyStats {
            generation: self.generation,
            files: self.graph.node_count(),
            include_edges: self.graph.edge_count(),
            include_cycles: self.cycles,
            max_dependents: self.dependents.values().map(|s| s.len()).max().unwrap_or(0),
        }
    }
}

/// Summary numbers for a dependency graph.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyStats {
    pub generation: u64,
    pub files: usize,
    pub include_edges: usize,
    pub include_cycles: usize,
    pub max_dependents: usize,
}

impl std::fmt::Display for DependencyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files, {} include edges, {} include cycles, at most {} dependents per file",
            self.files, self.include_edges, self.include_cycles, self.max_dependents
        )
    }
}

// ─── Shared Cache ───────────────────────────────────────────────

/// The engine-wide cached dependency graph.
///
/// Validation and rebuild happen under one lock, so concurrent searches
/// against the same snapshot build the graph at most once.
#[derive(Debug, Default)]
pub struct DependencyCache {
    current: Mutex<Option<Arc<DependencyGraph>>>,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached graph if it is valid for `snapshot`, else rebuild.
    pub fn update_or_reuse(&self, snapshot: &Snapshot) -> Arc<DependencyGraph> {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(graph) = current.as_ref() {
            if graph.is_valid_for(snapshot) {
                debug!(generation = graph.generation(), "reusing dependency graph");
                return Arc::clone(graph);
            }
        }
        let graph = Arc::new(DependencyGraph::build(snapshot));
        *current = Some(Arc::clone(&graph));
        graph
    }

    /// The cached graph, whatever snapshot it was built for.
    pub fn current(&self) -> Option<Arc<DependencyGraph>> {
        self.current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn invalidate(&self) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}
