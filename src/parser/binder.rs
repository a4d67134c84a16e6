//! Name binding.
//!
//! Resolves a parsed document's pending references to declaration keys. Local
//! scopes of the document itself are searched first, then the snapshot-wide
//! index of qualified names along the enclosing namespace and class chain
//! (plus `using namespace` targets). File-local declarations of included
//! headers (`static` and anonymous-namespace members) shadow the index, as
//! they would in the translation unit. Member accesses have no type
//! information, so they bind to the best candidate member by name.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::Result;
use crate::model::{
    DeclKey, Document, Include, Macro, MacroUse, NameRef, PendingRef, RefShape, Snapshot,
    SymbolId, SymbolKind, SymbolTable,
};

/// Limit on base-class hops during member lookup.
const MAX_BASE_DEPTH: usize = 8;

/// Whether a symbol is a constructor (named after its class).
pub(crate) fn is_constructor(table: &SymbolTable, id: SymbolId) -> bool {
    let Some(symbol) = table.get(id) else {
        return false;
    };
    let Some(name) = symbol.name.as_deref() else {
        return false;
    };
    let callable = match &symbol.kind {
        SymbolKind::Function => true,
        SymbolKind::Declaration { type_text } => type_text.contains('('),
        _ => false,
    };
    if !callable {
        return false;
    }
    if let Some(last) = symbol.qualifier.last() {
        return last == name;
    }
    class_of(table, id)
        .and_then(|c| table.get(c))
        .and_then(|c| c.name.as_deref())
        == Some(name)
}

/// Enclosing class of a member, looking through template wrappers.
fn class_of(table: &SymbolTable, id: SymbolId) -> Option<SymbolId> {
    for ancestor in table.ancestors(id) {
        let scope = table.get(ancestor)?;
        match scope.kind {
            SymbolKind::Template => continue,
            SymbolKind::Class => return Some(ancestor),
            _ => return None,
        }
    }
    None
}

fn join(prefix: &str, segments: &[&str]) -> String {
    let mut out = String::from(prefix);
    for segment in segments {
        if !out.is_empty() {
            out.push_str("::");
        }
        out.push_str(segment);
    }
    out
}

// ─── Symbol Index ───────────────────────────────────────────────

/// Qualified names of every globally visible declaration in a snapshot.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    generation: u64,
    /// Spelled qualified name -> canonical qualified name.
    names: HashMap<String, String>,
    /// Member name -> canonical names of class members with that name.
    members: HashMap<String, Vec<String>>,
    /// Class -> its resolved base classes.
    bases: HashMap<String, Vec<String>>,
    classes: HashSet<String>,
}

impl SymbolIndex {
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut index = SymbolIndex {
            generation: snapshot.generation(),
            ..Default::default()
        };
        let mut pending_bases: Vec<(String, Vec<String>, String)> = Vec::new();

        for (_, doc) in snapshot.iter() {
            let table = doc.symbols();
            for (id, symbol) in table.iter() {
                if id == SymbolId::ROOT || is_constructor(table, id) {
                    continue;
                }
                let Some(segments) = table.qualified_name(id) else {
                    continue;
                };
                let canonical = segments.join("::");
                index.names.insert(canonical.clone(), canonical.clone());

                let parent = symbol.parent.and_then(|p| table.get(p));
                if let Some(parent) = parent {
                    if parent.kind == SymbolKind::Enum && segments.len() >= 2 {
                        // Unscoped enumerators are also visible in the enclosing scope.
                        let mut alias = segments[..segments.len() - 2].to_vec();
                        alias.push(segments[segments.len() - 1].clone());
                        index
                            .names
                            .entry(alias.join("::"))
                            .or_insert_with(|| canonical.clone());
                    }
                }
                if class_of(table, id).is_some() {
                    if let Some(name) = symbol.name.clone() {
                        index.members.entry(name).or_default().push(canonical.clone());
                    }
                }
                if symbol.kind == SymbolKind::Class {
                    index.classes.insert(canonical.clone());
                    for &child in table.children(id) {
                        let Some(base) = table.get(child) else {
                            continue;
                        };
                        if base.kind != SymbolKind::BaseClass {
                            continue;
                        }
                        if let Some(name) = base.name.clone() {
                            let mut spelled = base.qualifier.clone();
                            spelled.push(name);
                            pending_bases.push((
                                canonical.clone(),
                                spelled,
                                segments[..segments.len() - 1].join("::"),
                            ));
                        }
                    }
                }
            }
        }

        for (class, spelled, namespace) in pending_bases {
            let spelled: Vec<&str> = spelled.iter().map(|s| s.as_str()).collect();
            let mut prefix = namespace;
            loop {
                if let Some(found) = index.names.get(&join(&prefix, &spelled)) {
                    let found = found.clone();
                    if found != class {
                        index.bases.entry(class.clone()).or_default().push(found);
                    }
                    break;
                }
                if prefix.is_empty() {
                    break;
                }
                prefix = match prefix.rfind("::") {
                    Some(pos) => prefix[..pos].to_string(),
                    None => String::new(),
                };
            }
        }

        for candidates in index.members.values_mut() {
            candidates.sort();
            candidates.dedup();
        }

        debug!(
            generation = index.generation,
            names = index.names.len(),
            classes = index.classes.len(),
            "symbol index built"
        );
        index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, qualified: &str) -> bool {
        self.names.contains_key(qualified)
    }

    /// Look up `segments` inside `scope`, following base classes.
    fn lookup_in(&self, scope: &str, segments: &[&str], depth: usize) -> Option<String> {
        if let Some(found) = self.names.get(&join(scope, segments)) {
            return Some(found.clone());
        }
        if depth >= MAX_BASE_DEPTH {
            return None;
        }
        let scope = self.names.get(scope).map(|s| s.as_str()).unwrap_or(scope);
        for base in self.bases.get(scope).into_iter().flatten() {
            if let Some(found) = self.lookup_in(base, segments, depth + 1) {
                return Some(found);
            }
        }
        None
    }

    fn members_named(&self, name: &str) -> &[String] {
        self.members.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn is_class(&self, qualified: &str) -> bool {
        self.classes.contains(qualified)
    }
}

// ─── Binder ─────────────────────────────────────────────────────

/// Binds documents, caching the symbol index per snapshot generation.
#[derive(Debug, Default)]
pub struct Binder {
    index: Mutex<Option<Arc<SymbolIndex>>>,
}

impl Binder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The symbol index for a snapshot, built at most once per generation.
    pub fn index_for(&self, snapshot: &Snapshot) -> Arc<SymbolIndex> {
        let mut current = self.index.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(index) = current.as_ref() {
            if index.generation() == snapshot.generation() {
                return Arc::clone(index);
            }
        }
        let index = Arc::new(SymbolIndex::build(snapshot));
        *current = Some(Arc::clone(&index));
        index
    }

    pub fn bind(&self, document: Document, snapshot: &Snapshot) -> Result<Document> {
        let index = self.index_for(snapshot);

        let includes: Vec<Include> = document
            .includes()
            .iter()
            .map(|inc| Include {
                resolved: inc
                    .resolved
                    .clone()
                    .or_else(|| snapshot.resolve_include(document.path(), &inc.spelled)),
                ..inc.clone()
            })
            .collect();
        let included = IncludedScope::collect(&document, &includes, snapshot);

        let resolver = Resolver {
            doc: &document,
            index: &index,
            header_locals: &included.file_locals,
        };
        let mut references = Vec::with_capacity(document.pending_refs().len());
        let mut macro_uses = Vec::new();
        let mut unresolved = 0usize;

        for pending in document.pending_refs() {
            if pending.shape == RefShape::Plain {
                if let Some(definition) = visible_macro(&document, &included.macros, pending) {
                    macro_uses.push(MacroUse {
                        definition: definition.clone(),
                        position: pending.position,
                        length: pending.length,
                    });
                    continue;
                }
            }
            let (key, is_declaration) = match &pending.shape {
                RefShape::Declaration(id) => (Some(resolver.declaration_key(*id)), true),
                RefShape::Plain => (resolver.resolve_plain(&pending.name, pending.scope), false),
                RefShape::Qualified(segments) => (
                    resolver.resolve_qualified(segments, &pending.name, pending.scope),
                    false,
                ),
                RefShape::Member => (resolver.resolve_member(&pending.name, pending.scope), false),
            };
            if key.is_none() {
                unresolved += 1;
            }
            references.push(NameRef {
                name: pending.name.clone(),
                position: pending.position,
                length: pending.length,
                key,
                is_declaration,
            });
        }

        debug!(
            file = %document.path().display(),
            references = references.len(),
            macro_uses = macro_uses.len(),
            unresolved,
            "document bound"
        );
        Ok(document.into_bound(references, macro_uses, includes))
    }
}

/// What a document sees of its transitive includes.
#[derive(Debug, Default)]
struct IncludedScope {
    macros: HashMap<String, Macro>,
    /// Name spelled from the global scope -> file-local declaration key.
    file_locals: HashMap<String, DeclKey>,
}

impl IncludedScope {
    fn collect(document: &Document, includes: &[Include], snapshot: &Snapshot) -> Self {
        let mut scope = IncludedScope::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        seen.insert(document.path().to_path_buf());
        let mut queue: VecDeque<PathBuf> = includes.iter().filter_map(|i| i.resolved.clone()).collect();

        while let Some(path) = queue.pop_front() {
            if !seen.insert(path.clone()) {
                continue;
            }
            let Some(doc) = snapshot.document(&path) else {
                continue;
            };
            for m in doc.macros() {
                scope.macros.entry(m.name.clone()).or_insert_with(|| m.clone());
            }
            scope.add_file_locals(doc);
            for inc in doc.includes() {
                let resolved = inc
                    .resolved
                    .clone()
                    .or_else(|| snapshot.resolve_include(&path, &inc.spelled));
                if let Some(next) = resolved {
                    queue.push_back(next);
                }
            }
        }
        scope
    }

    /// Namespace-scope declarations of `doc` that are file-local: statics
    /// and members of anonymous namespaces.
    fn add_file_locals(&mut self, doc: &Document) {
        let table = doc.symbols();
        for (id, symbol) in table.iter() {
            if id == SymbolId::ROOT || !table.is_file_local(id) {
                continue;
            }
            let Some(name) = symbol.name.as_deref() else {
                continue;
            };
            if !matches!(
                symbol.kind,
                SymbolKind::Function
                    | SymbolKind::Declaration { .. }
                    | SymbolKind::Class
                    | SymbolKind::Enum
                    | SymbolKind::Namespace
            ) {
                continue;
            }
            let mut segments = vec![name];
            let mut at_namespace_scope = true;
            for ancestor in table.ancestors(id) {
                match table.get(ancestor).map(|s| (&s.kind, s.name.as_deref())) {
                    Some((SymbolKind::Template, _)) => {}
                    Some((SymbolKind::Namespace, named)) => segments.extend(named),
                    _ => {
                        at_namespace_scope = false;
                        break;
                    }
                }
            }
            if !at_namespace_scope {
                continue;
            }
            segments.reverse();
            self.file_locals
                .entry(segments.join("::"))
                .or_insert_with(|| doc.decl_key(id));
        }
    }
}

fn visible_macro<'a>(
    document: &'a Document,
    included: &'a HashMap<String, Macro>,
    pending: &PendingRef,
) -> Option<&'a Macro> {
    document
        .macros()
        .iter()
        .rev()
        .find(|m| m.name == pending.name && m.offset < pending.position.offset)
        .or_else(|| included.get(&pending.name))
}

// ─── Resolution ─────────────────────────────────────────────────

struct Resolver<'a> {
    doc: &'a Document,
    index: &'a SymbolIndex,
    header_locals: &'a HashMap<String, DeclKey>,
}

impl Resolver<'_> {
    fn table(&self) -> &SymbolTable {
        self.doc.symbols()
    }

    /// `segments` inside `prefix`: included file-locals, then the index.
    fn lookup(&self, prefix: &str, segments: &[&str]) -> Option<DeclKey> {
        if let Some(key) = self.header_locals.get(&join(prefix, segments)) {
            return Some(key.clone());
        }
        self.index.lookup_in(prefix, segments, 0).map(DeclKey::Global)
    }

    /// Key for the symbol a declaration reference introduces.
    fn declaration_key(&self, id: SymbolId) -> DeclKey {
        let table = self.table();
        let Some(symbol) = table.get(id) else {
            return self.doc.decl_key(id);
        };
        let parent = symbol.parent.unwrap_or(SymbolId::ROOT);

        if is_constructor(table, id) {
            // Constructor names refer to their class.
            if let Some(class) = class_of(table, id) {
                return self.doc.decl_key(class);
            }
            if let Some((last, leading)) = symbol.qualifier.split_last() {
                if let Some(key) = self.resolve_qualified(leading, last, parent) {
                    return key;
                }
            }
        }

        if !symbol.qualifier.is_empty() && !table.is_file_local(id) {
            if let Some(name) = symbol.name.as_deref() {
                if let Some(key) = self.resolve_qualified(&symbol.qualifier, name, parent) {
                    return key;
                }
            }
        }
        self.doc.decl_key(id)
    }

    fn resolve_plain(&self, name: &str, scope: SymbolId) -> Option<DeclKey> {
        if let Some(key) = self.resolve_local(name, scope) {
            return Some(key);
        }
        for prefix in self.prefixes(scope) {
            if let Some(key) = self.lookup(&prefix, &[name]) {
                return Some(key);
            }
        }
        None
    }

    fn resolve_qualified(&self, segments: &[String], name: &str, scope: SymbolId) -> Option<DeclKey> {
        let mut spelled: Vec<&str> = segments.iter().map(|s| s.as_str()).collect();
        spelled.push(name);

        if spelled.first() == Some(&"") {
            return self.lookup("", &spelled[1..]);
        }

        // Namespace aliases stand for their target.
        let mut expanded: Vec<String> = Vec::new();
        if let Some(alias) = self.find_local(spelled[0], scope, |k| *k == SymbolKind::NamespaceAlias) {
            if let Some(target) = self.table().get(alias) {
                if !target.qualifier.is_empty() {
                    expanded = target.qualifier.clone();
                }
            }
        }
        let expanded_refs: Vec<&str>;
        let lookup: &[&str] = if expanded.is_empty() {
            &spelled
        } else {
            expanded_refs = expanded
                .iter()
                .map(|s| s.as_str())
                .chain(spelled[1..].iter().copied())
                .collect();
            &expanded_refs
        };

        for prefix in self.prefixes(scope) {
            if let Some(key) = self.lookup(&prefix, lookup) {
                return Some(key);
            }
        }
        None
    }

    fn resolve_member(&self, name: &str, scope: SymbolId) -> Option<DeclKey> {
        // Enclosing classes first: `this->name` and friends.
        for prefix in self.prefixes(scope) {
            if prefix.is_empty() || !self.index.is_class(&prefix) {
                continue;
            }
            if let Some(found) = self.index.lookup_in(&prefix, &[name], 0) {
                return Some(DeclKey::Global(found));
            }
        }
        // Members of classes declared in this document.
        let table = self.table();
        for (id, symbol) in table.iter() {
            if symbol.name.as_deref() == Some(name) && class_of(table, id).is_some() {
                return Some(self.doc.decl_key(id));
            }
        }
        self.index
            .members_named(name)
            .first()
            .map(|found| DeclKey::Global(found.clone()))
    }

    /// Search the document's own scopes, innermost first.
    fn resolve_local(&self, name: &str, scope: SymbolId) -> Option<DeclKey> {
        let id = self.find_local(name, scope, |kind| {
            !matches!(
                kind,
                SymbolKind::Block
                    | SymbolKind::BaseClass
                    | SymbolKind::UsingDirective
                    | SymbolKind::Template
            )
        })?;
        let symbol = self.table().get(id)?;
        match symbol.kind {
            SymbolKind::UsingDeclaration => {
                let scope = symbol.parent.unwrap_or(SymbolId::ROOT);
                self.resolve_qualified(&symbol.qualifier, name, scope)
                    .or_else(|| Some(self.doc.decl_key(id)))
            }
            SymbolKind::NamespaceAlias => match symbol.qualifier.split_last() {
                Some((last, leading)) => {
                    let scope = symbol.parent.unwrap_or(SymbolId::ROOT);
                    self.resolve_qualified(leading, last, scope)
                        .or_else(|| Some(self.doc.decl_key(id)))
                }
                None => Some(self.doc.decl_key(id)),
            },
            _ => Some(self.doc.decl_key(id)),
        }
    }

    /// First symbol named `name` visible from `scope` in this document.
    fn find_local(
        &self,
        name: &str,
        scope: SymbolId,
        accept: impl Fn(&SymbolKind) -> bool,
    ) -> Option<SymbolId> {
        let table = self.table();
        for s in std::iter::once(scope).chain(table.ancestors(scope)) {
            let mut queue: VecDeque<SymbolId> = table.children(s).iter().copied().collect();
            while let Some(child) = queue.pop_front() {
                let Some(symbol) = table.get(child) else {
                    continue;
                };
                // Members of these are visible in the enclosing scope.
                let transparent = match symbol.kind {
                    SymbolKind::Template | SymbolKind::Enum => true,
                    SymbolKind::Namespace => symbol.name.is_none(),
                    _ => false,
                };
                if transparent {
                    queue.extend(table.children(child).iter().copied());
                }
                if symbol.name.as_deref() == Some(name)
                    && accept(&symbol.kind)
                    && !is_constructor(table, child)
                {
                    return Some(child);
                }
            }
        }
        None
    }

    /// Qualified scopes to try, innermost first, ending with the global scope.
    fn prefixes(&self, scope: SymbolId) -> Vec<String> {
        let table = self.table();
        let mut out: Vec<String> = Vec::new();
        let mut using: Vec<String> = Vec::new();

        for s in std::iter::once(scope).chain(table.ancestors(scope)) {
            let Some(symbol) = table.get(s) else {
                continue;
            };
            match symbol.kind {
                SymbolKind::Class | SymbolKind::Enum | SymbolKind::Namespace if s != SymbolId::ROOT => {
                    if let Some(segments) = table.qualified_name(s) {
                        out.push(segments.join("::"));
                    }
                }
                SymbolKind::Function => {
                    // Out-of-line member: the body sees the class scope.
                    if let Some((last, leading)) = symbol.qualifier.split_last() {
                        let outer = symbol.parent.unwrap_or(SymbolId::ROOT);
                        if let Some(DeclKey::Global(class)) =
                            self.resolve_qualified(leading, last, outer)
                        {
                            out.push(class);
                        }
                    }
                }
                _ => {}
            }
            for &child in table.children(s) {
                if let Some(directive) = table.get(child) {
                    if directive.kind == SymbolKind::UsingDirective {
                        if let Some(name) = directive.name.as_deref() {
                            let mut target = directive.qualifier.clone();
                            target.push(name.to_string());
                            using.push(target.join("::"));
                        }
                    }
                }
            }
        }
        out.extend(using);
        out.push(String::new());

        let mut seen = HashSet::new();
        out.retain(|p| seen.insert(p.clone()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentBuilder, SourcePos};

    fn pos(line: usize, column: usize) -> SourcePos {
        SourcePos::new(line, column, line * 100 + column)
    }

    fn decl(type_text: &str) -> SymbolKind {
        SymbolKind::Declaration {
            type_text: type_text.to_string(),
        }
    }

    fn pending(name: &str, line: usize, scope: SymbolId, shape: RefShape) -> PendingRef {
        PendingRef {
            name: name.to_string(),
            position: pos(line, 0),
            length: name.len(),
            scope,
            shape,
        }
    }

    /// a.h: namespace app { class Foo { int count; void bar(); }; }
    fn header() -> Document {
        let mut b = DocumentBuilder::new("a.h");
        let ns = b.add_symbol(SymbolId::ROOT, SymbolKind::Namespace, Some("app"), pos(1, 10));
        let foo = b.add_symbol(ns, SymbolKind::Class, Some("Foo"), pos(2, 6));
        b.add_symbol(foo, decl("int"), Some("count"), pos(3, 8));
        b.add_symbol(foo, decl("void()"), Some("bar"), pos(4, 9));
        b.add_macro("MAX", pos(6, 8), 30);
        b.build()
    }

    #[test]
    fn test_index_names_and_members() {
        let snapshot = Snapshot::from_documents(vec![header()]);
        let index = SymbolIndex::build(&snapshot);
        assert!(index.contains("app"));
        assert!(index.contains("app::Foo::bar"));
        assert_eq!(index.members_named("count"), &["app::Foo::count".to_string()]);
        assert!(index.is_class("app::Foo"));
    }

    #[test]
    fn test_bind_out_of_line_member() {
        let snapshot = Snapshot::from_documents(vec![header()]);

        // a.cpp:
        //   #include "a.h"
        //   using namespace app;
        //   void Foo::bar() { count = MAX(1, 2); }
        let mut b = DocumentBuilder::new("a.cpp");
        b.add_include("a.h", 1, None);
        b.add_symbol(SymbolId::ROOT, SymbolKind::UsingDirective, Some("app"), pos(2, 16));
        let def = b.add_symbol(SymbolId::ROOT, SymbolKind::Function, Some("bar"), pos(3, 10));
        b.symbol_mut(def).unwrap().qualifier = vec!["Foo".to_string()];
        let body = b.add_symbol(def, SymbolKind::Block, None, pos(3, 16));
        b.add_pending(pending("Foo", 3, SymbolId::ROOT, RefShape::Plain));
        b.add_pending(pending("bar", 3, SymbolId::ROOT, RefShape::Declaration(def)));
        b.add_pending(pending("count", 3, body, RefShape::Plain));
        b.add_pending(pending("MAX", 3, body, RefShape::Plain));
        let doc = b.build();

        let binder = Binder::new();
        let bound = binder.bind(doc, &snapshot).unwrap();
        assert!(bound.is_bound());
        assert!(bound.pending_refs().is_empty());
        assert_eq!(bound.includes()[0].resolved, Some(PathBuf::from("a.h")));

        let keys: Vec<Option<String>> = bound
            .references()
            .iter()
            .map(|r| r.key.as_ref().map(|k| k.to_string()))
            .collect();
        assert_eq!(
            keys,
            vec![
                Some("app::Foo".to_string()),
                Some("app::Foo::bar".to_string()),
                Some("app::Foo::count".to_string()),
            ]
        );
        assert!(bound.references()[1].is_declaration);

        assert_eq!(bound.macro_uses().len(), 1);
        assert_eq!(bound.macro_uses()[0].definition.file, PathBuf::from("a.h"));
    }

    #[test]
    fn test_bind_locals_shadow_globals() {
        let mut lib = DocumentBuilder::new("lib.h");
        lib.add_symbol(SymbolId::ROOT, decl("int"), Some("value"), pos(1, 4));
        let snapshot = Snapshot::from_documents(vec![lib.build()]);

        let mut b = DocumentBuilder::new("main.cpp");
        let func = b.add_symbol(SymbolId::ROOT, SymbolKind::Function, Some("main"), pos(1, 4));
        let arg = b.add_symbol(func, SymbolKind::Argument, Some("value"), pos(1, 13));
        let body = b.add_symbol(func, SymbolKind::Block, None, pos(1, 20));
        b.add_pending(pending("value", 2, body, RefShape::Plain));
        b.add_pending(pending("value", 3, SymbolId::ROOT, RefShape::Plain));
        b.add_pending(pending("unknown", 4, body, RefShape::Plain));
        let expected_local = b.decl_key(arg);
        let bound = Binder::new().bind(b.build(), &snapshot).unwrap();

        let refs = bound.references();
        assert_eq!(refs[0].key, Some(expected_local));
        assert_eq!(refs[1].key, Some(DeclKey::Global("value".to_string())));
        assert_eq!(refs[2].key, None);
    }

    #[test]
    fn test_bind_member_and_qualified() {
        let snapshot = Snapshot::from_documents(vec![header()]);

        let mut b = DocumentBuilder::new("b.cpp");
        let func = b.add_symbol(SymbolId::ROOT, SymbolKind::Function, Some("run"), pos(1, 5));
        let body = b.add_symbol(func, SymbolKind::Block, None, pos(1, 11));
        b.add_pending(pending("bar", 2, body, RefShape::Member));
        b.add_pending(pending("Foo", 3, body, RefShape::Qualified(vec!["app".to_string()])));
        b.add_pending(pending(
            "Foo",
            4,
            body,
            RefShape::Qualified(vec![String::new(), "app".to_string()]),
        ));
        let bound = Binder::new().bind(b.build(), &snapshot).unwrap();

        let keys: Vec<Option<DeclKey>> = bound.references().iter().map(|r| r.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                Some(DeclKey::Global("app::Foo::bar".to_string())),
                Some(DeclKey::Global("app::Foo".to_string())),
                Some(DeclKey::Global("app::Foo".to_string())),
            ]
        );
    }

    #[test]
    fn test_constructor_binds_to_class() {
        let mut b = DocumentBuilder::new("w.h");
        let class = b.add_symbol(SymbolId::ROOT, SymbolKind::Class, Some("Widget"), pos(1, 6));
        let ctor = b.add_symbol(class, decl("()"), Some("Widget"), pos(2, 4));
        b.add_pending(pending("Widget", 2, class, RefShape::Declaration(ctor)));
        b.add_pending(pending("Widget", 3, class, RefShape::Plain));
        let doc = b.build();
        let snapshot = Snapshot::from_documents(vec![doc.clone()]);

        let bound = Binder::new().bind(doc, &snapshot).unwrap();
        for r in bound.references() {
            assert_eq!(r.key, Some(DeclKey::Global("Widget".to_string())));
        }
        assert!(!SymbolIndex::build(&snapshot).contains("Widget::Widget"));
    }

    #[test]
    fn test_header_file_locals_bind_in_includers() {
        // h.h:
        //   static int helper();
        //   namespace app { namespace { int counter; } }
        let mut h = DocumentBuilder::new("h.h");
        let helper = h.add_symbol(SymbolId::ROOT, decl("int()"), Some("helper"), pos(1, 11));
        h.symbol_mut(helper).unwrap().is_static = true;
        let ns = h.add_symbol(SymbolId::ROOT, SymbolKind::Namespace, Some("app"), pos(2, 10));
        let anon = h.add_symbol(ns, SymbolKind::Namespace, None, pos(2, 16));
        let counter = h.add_symbol(anon, decl("int"), Some("counter"), pos(2, 32));
        let header = h.build();
        let helper_key = header.decl_key(helper);
        let counter_key = header.decl_key(counter);
        assert!(matches!(helper_key, DeclKey::Local { .. }));
        let snapshot = Snapshot::from_documents(vec![header]);
        assert!(!SymbolIndex::build(&snapshot).contains("helper"));

        let mut b = DocumentBuilder::new("a.cpp");
        b.add_include("h.h", 1, None);
        let func = b.add_symbol(SymbolId::ROOT, SymbolKind::Function, Some("run"), pos(2, 5));
        let body = b.add_symbol(func, SymbolKind::Block, None, pos(2, 11));
        b.add_pending(pending("helper", 3, body, RefShape::Plain));
        b.add_pending(pending("counter", 4, body, RefShape::Qualified(vec!["app".to_string()])));
        let bound = Binder::new().bind(b.build(), &snapshot).unwrap();

        let keys: Vec<Option<DeclKey>> = bound.references().iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![Some(helper_key), Some(counter_key)]);

        // Without the include the statics stay invisible.
        let mut c = DocumentBuilder::new("c.cpp");
        c.add_pending(pending("helper", 1, SymbolId::ROOT, RefShape::Plain));
        let unrelated = Binder::new().bind(c.build(), &snapshot).unwrap();
        assert_eq!(unrelated.references()[0].key, None);
    }

    #[test]
    fn test_index_cached_per_generation() {
        let binder = Binder::new();
        let s1 = Snapshot::from_documents(vec![header()]);
        let a = binder.index_for(&s1);
        let b = binder.index_for(&s1);
        assert!(Arc::ptr_eq(&a, &b));
        let s2 = s1.with_document(DocumentBuilder::new("x.cpp").build());
        assert!(!Arc::ptr_eq(&a, &binder.index_for(&s2)));
    }
}
