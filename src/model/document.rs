//! Documents: one parsed (and possibly bound) source file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::types::*;
use crate::identity;

/// Arena of symbols for one document. `SymbolId::ROOT` is the global namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: vec![Symbol {
                kind: SymbolKind::Namespace,
                name: None,
                parent: None,
                children: Vec::new(),
                position: SourcePos::default(),
                is_static: false,
                qualifier: Vec::new(),
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.len() <= 1
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.0)
    }

    pub fn get_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        self.symbols.get_mut(id.0)
    }

    /// Append a symbol as the last member of `parent`.
    ///
    /// Unknown parents fall back to the global namespace.
    pub fn add(
        &mut self,
        parent: SymbolId,
        kind: SymbolKind,
        name: Option<String>,
        position: SourcePos,
    ) -> SymbolId {
        let parent = if parent.0 < self.symbols.len() {
            parent
        } else {
            SymbolId::ROOT
        };
        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            kind,
            name,
            parent: Some(parent),
            children: Vec::new(),
            position,
            is_static: false,
            qualifier: Vec::new(),
        });
        self.symbols[parent.0].children.push(id);
        id
    }

    pub fn children(&self, id: SymbolId) -> &[SymbolId] {
        self.get(id).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    pub fn enclosing_scope(&self, id: SymbolId) -> Option<SymbolId> {
        self.get(id).and_then(|s| s.parent)
    }

    /// Enclosing scopes from the innermost outwards, not including `id`.
    pub fn ancestors(&self, id: SymbolId) -> Ancestors<'_> {
        Ancestors {
            table: self,
            next: self.enclosing_scope(id),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i), s))
    }

    /// Whether the symbol can only be named from inside its own file.
    pub fn is_file_local(&self, id: SymbolId) -> bool {
        let Some(symbol) = self.get(id) else {
            return true;
        };
        if symbol.name.is_none() {
            return true;
        }
        if matches!(
            symbol.kind,
            SymbolKind::Argument
                | SymbolKind::TypenameArgument
                | SymbolKind::BaseClass
                | SymbolKind::UsingDirective
                | SymbolKind::UsingDeclaration
                | SymbolKind::NamespaceAlias
        ) {
            return true;
        }
        if symbol.is_static {
            if let Some(parent) = symbol.parent.and_then(|p| self.get(p)) {
                if parent.kind == SymbolKind::Namespace {
                    return true;
                }
            }
        }
        for ancestor in self.ancestors(id) {
            let Some(scope) = self.get(ancestor) else {
                continue;
            };
            if scope.kind.is_local_scope() {
                return true;
            }
            if ancestor != SymbolId::ROOT
                && scope.kind != SymbolKind::Template
                && scope.name.is_none()
            {
                return true;
            }
        }
        false
    }

    /// Fully-qualified name segments, or `None` for file-local symbols.
    pub fn qualified_name(&self, id: SymbolId) -> Option<Vec<String>> {
        if self.is_file_local(id) {
            return None;
        }
        let symbol = self.get(id)?;
        let mut segments: Vec<String> = Vec::new();
        segments.push(symbol.name.clone()?);
        segments.extend(symbol.qualifier.iter().rev().cloned());
        for ancestor in self.ancestors(id) {
            let scope = self.get(ancestor)?;
            if ancestor == SymbolId::ROOT || scope.kind == SymbolKind::Template {
                continue;
            }
            segments.push(scope.name.clone()?);
            segments.extend(scope.qualifier.iter().rev().cloned());
        }
        segments.reverse();
        Some(segments)
    }

    /// Declaration identity of a symbol declared in `file`.
    pub fn decl_key(&self, file: &Path, id: SymbolId) -> DeclKey {
        match self.qualified_name(id) {
            Some(segments) => DeclKey::Global(segments.join("::")),
            None => DeclKey::Local {
                file: file.to_path_buf(),
                path: identity::encode(self, id),
            },
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over enclosing scopes.
pub struct Ancestors<'a> {
    table: &'a SymbolTable,
    next: Option<SymbolId>,
}

impl Iterator for Ancestors<'_> {
    type Item = SymbolId;

    fn next(&mut self) -> Option<SymbolId> {
        let current = self.next?;
        self.next = self.table.enclosing_scope(current);
        Some(current)
    }
}

/// One source file as seen by the front-end.
///
/// A document is immutable once built. Binding produces a new document.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    table: SymbolTable,
    identifiers: HashSet<String>,
    includes: Vec<Include>,
    macros: Vec<Macro>,
    pending: Vec<PendingRef>,
    references: Vec<NameRef>,
    macro_uses: Vec<MacroUse>,
    bound: bool,
}

impl Document {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.table
    }

    /// Token-stream check: does the identifier occur anywhere in the file?
    pub fn contains_identifier(&self, name: &str) -> bool {
        self.identifiers.contains(name)
    }

    pub fn includes(&self) -> &[Include] {
        &self.includes
    }

    /// Macros defined in this file, in definition order.
    pub fn macros(&self) -> &[Macro] {
        &self.macros
    }

    pub fn find_macro(&self, name: &str) -> Option<&Macro> {
        self.macros.iter().rev().find(|m| m.name == name)
    }

    pub fn pending_refs(&self) -> &[PendingRef] {
        &self.pending
    }

    /// Bound name references in source order.
    pub fn references(&self) -> &[NameRef] {
        &self.references
    }

    /// Recorded macro expansions in source order.
    pub fn macro_uses(&self) -> &[MacroUse] {
        &self.macro_uses
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn decl_key(&self, id: SymbolId) -> DeclKey {
        self.table.decl_key(&self.path, id)
    }

    /// References that resolved to `key`, in source order.
    pub fn references_to<'a>(&'a self, key: &'a DeclKey) -> impl Iterator<Item = &'a NameRef> + 'a {
        self.references
            .iter()
            .filter(move |r| r.key.as_ref() == Some(key))
    }

    /// The name reference covering a cursor position.
    pub fn reference_at(&self, line: usize, column: usize) -> Option<&NameRef> {
        self.references.iter().find(|r| {
            r.position.line == line
                && column >= r.position.column
                && column < r.position.column + r.length.max(1)
        })
    }

    /// The symbol whose name is declared at a position.
    pub fn symbol_declared_at(&self, position: SourcePos) -> Option<SymbolId> {
        self.table
            .iter()
            .find(|(id, s)| *id != SymbolId::ROOT && s.position == position && s.name.is_some())
            .map(|(id, _)| id)
    }

    /// Produce the bound revision of this document.
    pub fn into_bound(
        self,
        references: Vec<NameRef>,
        macro_uses: Vec<MacroUse>,
        includes: Vec<Include>,
    ) -> Document {
        let mut references = references;
        references.sort_by_key(|r| r.position.offset);
        let mut macro_uses = macro_uses;
        macro_uses.sort_by_key(|u| u.position.offset);
        Document {
            references,
            macro_uses,
            includes,
            pending: Vec::new(),
            bound: true,
            ..self
        }
    }
}

/// Incremental construction of a [`Document`].
///
/// Used by front-ends while walking a syntax tree, and directly by callers
/// that already have a symbol table from elsewhere.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    path: PathBuf,
    table: SymbolTable,
    identifiers: HashSet<String>,
    includes: Vec<Include>,
    macros: Vec<Macro>,
    pending: Vec<PendingRef>,
    references: Vec<NameRef>,
    macro_uses: Vec<MacroUse>,
    bound: bool,
}

impl DocumentBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: SymbolTable::new(),
            identifiers: HashSet::new(),
            includes: Vec::new(),
            macros: Vec::new(),
            pending: Vec::new(),
            references: Vec::new(),
            macro_uses: Vec::new(),
            bound: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.table
    }

    pub fn add_symbol(
        &mut self,
        parent: SymbolId,
        kind: SymbolKind,
        name: Option<&str>,
        position: SourcePos,
    ) -> SymbolId {
        if let Some(name) = name {
            self.identifiers.insert(name.to_string());
        }
        self.table
            .add(parent, kind, name.map(|n| n.to_string()), position)
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        self.table.get_mut(id)
    }

    pub fn add_identifier(&mut self, name: impl Into<String>) {
        self.identifiers.insert(name.into());
    }

    pub fn add_identifiers<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifiers.extend(names.into_iter().map(Into::into));
    }

    pub fn add_include(&mut self, spelled: impl Into<String>, line: usize, resolved: Option<PathBuf>) {
        self.includes.push(Include {
            spelled: spelled.into(),
            line,
            resolved,
        });
    }

    pub fn add_macro(&mut self, name: &str, position: SourcePos, length: usize) -> Macro {
        self.identifiers.insert(name.to_string());
        let m = Macro {
            name: name.to_string(),
            file: self.path.clone(),
            line: position.line,
            offset: position.offset,
            length,
        };
        self.macros.push(m.clone());
        m
    }

    pub fn add_pending(&mut self, pending: PendingRef) {
        self.identifiers.insert(pending.name.clone());
        self.pending.push(pending);
    }

    /// Record an already-resolved reference.
    pub fn add_reference(&mut self, reference: NameRef) {
        self.identifiers.insert(reference.name.clone());
        self.references.push(reference);
    }

    pub fn add_macro_use(&mut self, definition: Macro, position: SourcePos, length: usize) {
        self.identifiers.insert(definition.name.clone());
        self.macro_uses.push(MacroUse {
            definition,
            position,
            length,
        });
    }

    pub fn decl_key(&self, id: SymbolId) -> DeclKey {
        self.table.decl_key(&self.path, id)
    }

    /// Mark the document as fully bound (its references are final).
    pub fn bound(mut self) -> Self {
        self.bound = true;
        self
    }

    pub fn build(self) -> Document {
        let mut references = self.references;
        references.sort_by_key(|r| r.position.offset);
        let mut macro_uses = self.macro_uses;
        macro_uses.sort_by_key(|u| u.position.offset);
        Document {
            path: self.path,
            table: self.table,
            identifiers: self.identifiers,
            includes: self.includes,
            macros: self.macros,
            pending: self.pending,
            references,
            macro_uses,
            bound: self.bound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: usize, column: usize) -> SourcePos {
        SourcePos::new(line, column, line * 100 + column)
    }

    #[test]
    fn test_qualified_names() {
        let mut b = DocumentBuilder::new("a.h");
        let ns = b.add_symbol(SymbolId::ROOT, SymbolKind::Namespace, Some("app"), pos(1, 10));
        let class = b.add_symbol(ns, SymbolKind::Class, Some("Foo"), pos(2, 6));
        let method = b.add_symbol(
            class,
            SymbolKind::Declaration {
                type_text: "void()".to_string(),
            },
            Some("bar"),
            pos(3, 9),
        );
        let doc = b.build();

        assert_eq!(
            doc.symbols().qualified_name(method),
            Some(vec!["app".to_string(), "Foo".to_string(), "bar".to_string()])
        );
        assert_eq!(doc.decl_key(method), DeclKey::Global("app::Foo::bar".to_string()));
        assert!(doc.contains_identifier("Foo"));
        assert!(!doc.contains_identifier("Baz"));
    }

    #[test]
    fn test_out_of_line_definition_shares_key() {
        let mut b = DocumentBuilder::new("a.cpp");
        let def = b.add_symbol(SymbolId::ROOT, SymbolKind::Function, Some("bar"), pos(3, 10));
        b.symbol_mut(def).unwrap().qualifier = vec!["Foo".to_string()];
        let doc = b.build();
        assert_eq!(doc.decl_key(def), DeclKey::Global("Foo::bar".to_string()));
    }

    #[test]
    fn test_file_local_symbols() {
        let mut b = DocumentBuilder::new("a.cpp");
        let func = b.add_symbol(SymbolId::ROOT, SymbolKind::Function, Some("run"), pos(1, 5));
        let block = b.add_symbol(func, SymbolKind::Block, None, pos(1, 11));
        let local = b.add_symbol(
            block,
            SymbolKind::Declaration {
                type_text: "int".to_string(),
            },
            Some("count"),
            pos(2, 8),
        );
        let anon = b.add_symbol(SymbolId::ROOT, SymbolKind::Namespace, None, pos(5, 0));
        let hidden = b.add_symbol(anon, SymbolKind::Function, Some("helper"), pos(6, 5));
        let stat = b.add_symbol(SymbolId::ROOT, SymbolKind::Function, Some("util"), pos(9, 12));
        b.symbol_mut(stat).unwrap().is_static = true;
        let doc = b.build();

        assert!(!doc.symbols().is_file_local(func));
        assert!(doc.symbols().is_file_local(local));
        assert!(doc.symbols().is_file_local(hidden));
        assert!(doc.symbols().is_file_local(stat));
        assert!(matches!(doc.decl_key(local), DeclKey::Local { .. }));
    }

    #[test]
    fn test_static_member_is_global() {
        let mut b = DocumentBuilder::new("a.h");
        let class = b.add_symbol(SymbolId::ROOT, SymbolKind::Class, Some("Foo"), pos(1, 6));
        let member = b.add_symbol(
            class,
            SymbolKind::Declaration {
                type_text: "int".to_string(),
            },
            Some("count"),
            pos(2, 15),
        );
        b.symbol_mut(member).unwrap().is_static = true;
        let doc = b.build();
        assert_eq!(doc.decl_key(member), DeclKey::Global("Foo::count".to_string()));
    }

    #[test]
    fn test_references_sorted_and_lookup() {
        let mut b = DocumentBuilder::new("b.cpp");
        let key = DeclKey::Global("Foo".to_string());
        b.add_reference(NameRef {
            name: "Foo".to_string(),
            position: pos(5, 2),
            length: 3,
            key: Some(key.clone()),
            is_declaration: false,
        });
        b.add_reference(NameRef {
            name: "Foo".to_string(),
            position: pos(2, 4),
            length: 3,
            key: Some(key.clone()),
            is_declaration: false,
        });
        let doc = b.bound().build();

        let lines: Vec<usize> = doc.references_to(&key).map(|r| r.position.line).collect();
        assert_eq!(lines, vec![2, 5]);
        assert!(doc.reference_at(5, 4).is_some());
        assert!(doc.reference_at(5, 5).is_none());
        assert!(doc.is_bound());
    }
}
