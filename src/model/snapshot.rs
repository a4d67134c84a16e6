//! Snapshots, working copies and symbol handles.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::document::Document;
use super::types::*;
use crate::identity;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// The complete set of parsed documents at one point in time.
///
/// Immutable. Every constructed snapshot gets a process-unique generation;
/// two snapshots are interchangeable only if their generations are equal.
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    documents: BTreeMap<PathBuf, Arc<Document>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self {
            generation: next_generation(),
            documents: BTreeMap::new(),
        }
    }

    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = Document>,
    {
        let documents = documents
            .into_iter()
            .map(|doc| (doc.path().to_path_buf(), Arc::new(doc)))
            .collect();
        Self {
            generation: next_generation(),
            documents,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Same parse generation.
    #[cfg(test)]
    pub(crate) fn is_same_generation(&self, other: &Snapshot) -> bool {
        self.generation == other.generation
    }

    /// A new snapshot with `document` added or replaced.
    pub fn with_document(&self, document: Document) -> Snapshot {
        let mut documents = self.documents.clone();
        documents.insert(document.path().to_path_buf(), Arc::new(document));
        Snapshot {
            generation: next_generation(),
            documents,
        }
    }

    pub fn document(&self, path: &Path) -> Option<&Arc<Document>> {
        self.documents.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.documents.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Arc<Document>)> {
        self.documents.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.documents.keys()
    }

    /// Resolve an include as spelled in `includer` to a snapshot file.
    ///
    /// Tries the includer's directory first, then any snapshot file whose
    /// trailing components equal the spelled path.
    pub fn resolve_include(&self, includer: &Path, spelled: &str) -> Option<PathBuf> {
        let spelled_path = Path::new(spelled);
        if let Some(dir) = includer.parent() {
            let candidate = normalize(&dir.join(spelled_path));
            if self.documents.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        self.documents
            .keys()
            .find(|p| p.as_path() != includer && p.ends_with(spelled_path))
            .cloned()
    }

    /// The symbol referenced or declared under a cursor.
    pub fn symbol_at(&self, file: &Path, line: usize, column: usize) -> Option<SymbolHandle> {
        let doc = self.document(file)?;
        let reference = doc.reference_at(line, column)?;
        let key = reference.key.as_ref()?;
        self.find_declaration(key)
    }

    /// The declaring symbol for a declaration key.
    ///
    /// Global keys prefer a definition over a forward declaration.
    pub fn find_declaration(&self, key: &DeclKey) -> Option<SymbolHandle> {
        match key {
            DeclKey::Local { file, path } => {
                let doc = self.document(file)?;
                let id = identity::locate(path, doc.symbols())?;
                Some(SymbolHandle::new(Arc::clone(doc), id))
            }
            DeclKey::Global(name) => {
                let mut fallback: Option<SymbolHandle> = None;
                for doc in self.documents.values() {
                    for (id, symbol) in doc.symbols().iter() {
                        if symbol.name.is_none() {
                            continue;
                        }
                        let Some(segments) = doc.symbols().qualified_name(id) else {
                            continue;
                        };
                        if segments.join("::") != *name {
                            continue;
                        }
                        let handle = SymbolHandle::new(Arc::clone(doc), id);
                        if symbol.kind == SymbolKind::ForwardClassDeclaration {
                            fallback.get_or_insert(handle);
                        } else {
                            return Some(handle);
                        }
                    }
                }
                fallback
            }
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Unsaved editor buffers. Takes precedence over the file on disk.
#[derive(Debug, Clone, Default)]
pub struct WorkingCopy {
    buffers: HashMap<PathBuf, String>,
}

impl WorkingCopy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) {
        self.buffers.insert(path.into(), source.into());
    }

    pub fn source(&self, path: &Path) -> Option<&str> {
        self.buffers.get(path).map(|s| s.as_str())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.buffers.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// A symbol together with the document that owns it.
#[derive(Debug, Clone)]
pub struct SymbolHandle {
    document: Arc<Document>,
    id: SymbolId,
}

impl SymbolHandle {
    pub fn new(document: Arc<Document>, id: SymbolId) -> Self {
        Self { document, id }
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    pub fn file(&self) -> &Path {
        self.document.path()
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        self.document.symbols().get(self.id)
    }

    pub fn identifier(&self) -> Option<&str> {
        self.symbol().and_then(|s| s.identifier())
    }

    /// Declaration key references to this symbol carry.
    ///
    /// In a bound document that is the key of the declaration reference at
    /// the symbol's name (constructors bind to their class, out-of-line
    /// definitions to the member they define).
    pub fn key(&self) -> DeclKey {
        if let Some(symbol) = self.symbol() {
            let bound = self
                .document
                .references()
                .iter()
                .find(|r| r.is_declaration && r.position == symbol.position)
                .and_then(|r| r.key.clone());
            if let Some(key) = bound {
                return key;
            }
        }
        self.document.decl_key(self.id)
    }

    pub fn enclosing_scope(&self) -> Option<&Symbol> {
        self.document
            .symbols()
            .enclosing_scope(self.id)
            .and_then(|p| self.document.symbols().get(p))
    }

    /// `Foo::bar` for global symbols, the bare identifier otherwise.
    pub fn label(&self) -> String {
        match self.document.symbols().qualified_name(self.id) {
            Some(segments) => segments.join("::"),
            None => self.identifier().unwrap_or("<anonymous>").to_string(),
        }
    }
}

/// What a symbol was resolved in: the snapshot and the document under the
/// cursor.
#[derive(Debug, Clone)]
pub struct LookupContext {
    pub snapshot: Arc<Snapshot>,
    pub this_document: Arc<Document>,
}

impl LookupContext {
    pub fn new(snapshot: Arc<Snapshot>, this_document: Arc<Document>) -> Self {
        Self {
            snapshot,
            this_document,
        }
    }

    /// Context for a symbol handle, using its own document.
    pub fn for_symbol(snapshot: Arc<Snapshot>, symbol: &SymbolHandle) -> Self {
        Self::new(snapshot, Arc::clone(symbol.document()))
    }
}
