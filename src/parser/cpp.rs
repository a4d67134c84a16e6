//! Tree-sitter C/C++ front-end.
//!
//! Walks the syntax tree once, building the symbol table and recording every
//! name occurrence as a pending reference for the [`Binder`].

use std::path::Path;
use tracing::debug;
use tree_sitter::{Node, Parser};

use super::binder::Binder;
use super::language::SourceLanguage;
use super::{identifier_tokens, FrontEnd};
use crate::error::{FindRefsError, Result};
use crate::model::{
    Document, DocumentBuilder, PendingRef, RefShape, Snapshot, SourcePos, SymbolId, SymbolKind,
};

/// The C/C++ front-end.
#[derive(Debug, Default)]
pub struct CppFrontEnd {
    binder: Binder,
}

impl CppFrontEnd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binder(&self) -> &Binder {
        &self.binder
    }
}

impl FrontEnd for CppFrontEnd {
    fn parse(&self, path: &Path, source: &str) -> Result<Document> {
        let language = SourceLanguage::from_path(path)
            .ok_or_else(|| FindRefsError::UnsupportedLanguage(path.display().to_string()))?;

        let mut parser = Parser::new();
        parser
            .set_language(&language.tree_sitter_language())
            .map_err(|e| FindRefsError::Parse {
                file: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let tree = parser.parse(source, None).ok_or_else(|| FindRefsError::Parse {
            file: path.to_path_buf(),
            message: "parser returned no tree".to_string(),
        })?;

        let mut walker = Walker {
            source: source.as_bytes(),
            builder: DocumentBuilder::new(path),
        };
        walker.visit(tree.root_node(), SymbolId::ROOT);
        walker.builder.add_identifiers(identifier_tokens(source));

        let document = walker.builder.build();
        debug!(
            file = %path.display(),
            language = language.name(),
            symbols = document.symbols().len(),
            pending = document.pending_refs().len(),
            "parsed"
        );
        Ok(document)
    }

    fn bind(&self, document: Document, snapshot: &Snapshot) -> Result<Document> {
        self.binder.bind(document, snapshot)
    }

    fn preprocess(&self, _path: &Path, source: &str) -> String {
        blank_disabled_regions(source)
    }
}

// ─── Preprocessing ──────────────────────────────────────────────

/// Blank out `#if 0` regions, keeping every byte offset and line intact.
pub fn blank_disabled_regions(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut depth = 0usize;

    for line in source.split_inclusive('\n') {
        let directive = directive_of(line);
        if depth == 0 {
            if directive.as_deref() == Some("if 0") {
                depth = 1;
            }
            out.push_str(line);
            continue;
        }
        match directive.as_deref() {
            Some(d) if d.starts_with("if") => depth += 1,
            Some("endif") => depth -= 1,
            Some(d) if depth == 1 && (d.starts_with("else") || d.starts_with("elif")) => depth = 0,
            _ => {}
        }
        let conditional = directive
            .as_deref()
            .is_some_and(|d| d.starts_with("if") || d.starts_with("el") || d == "endif");
        if depth == 0 || conditional {
            out.push_str(line);
        } else {
            for c in line.chars() {
                if c == '\n' || c == '\r' {
                    out.push(c);
                } else {
                    out.extend(std::iter::repeat(' ').take(c.len_utf8()));
                }
            }
        }
    }
    out
}

/// `"if 0"`, `"endif"`, ... for a preprocessor line.
fn directive_of(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix('#')?;
    let words: Vec<&str> = rest.split_whitespace().collect();
    match words.as_slice() {
        [] => None,
        [first, second, ..] if *first == "if" => Some(format!("if {}", second)),
        [first, ..] => Some(first.to_string()),
    }
}

// ─── Tree Walk ──────────────────────────────────────────────────

struct Walker<'a> {
    source: &'a [u8],
    builder: DocumentBuilder,
}

/// A possibly qualified name taken from a declarator.
struct DeclName<'t> {
    name: String,
    node: Node<'t>,
    qualifier: Vec<String>,
    /// Nodes naming the qualifier segments (`Foo` in `Foo::bar`).
    qualifier_nodes: Vec<Node<'t>>,
    /// The class named by a destructor (`Foo` in `~Foo`).
    destructor_of: Option<Node<'t>>,
}

fn pos(node: &Node) -> SourcePos {
    let start = node.start_position();
    SourcePos::new(start.row + 1, start.column, node.start_byte())
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl<'a> Walker<'a> {
    fn text(&self, node: &Node) -> String {
        node.utf8_text(self.source).unwrap_or("").to_string()
    }

    fn visit_children(&mut self, node: Node, scope: SymbolId) {
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.visit(child, scope);
            }
        }
    }

    fn visit(&mut self, node: Node, scope: SymbolId) {
        match node.kind() {
            "comment" | "string_literal" | "raw_string_literal" | "char_literal"
            | "concatenated_string" | "system_lib_string" | "preproc_arg" | "number_literal"
            | "primitive_type" | "statement_identifier" | "operator_name" => {}

            "preproc_include" => {
                if let Some(path) = node.child_by_field_name("path") {
                    let spelled = self.text(&path);
                    let spelled = spelled.trim_matches(|c| c == '"' || c == '<' || c == '>');
                    self.builder
                        .add_include(spelled, node.start_position().row + 1, None);
                }
            }
            "preproc_def" | "preproc_function_def" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let length = self.text(&node).trim_end().len();
                    let name = self.text(&name);
                    self.builder.add_macro(&name, pos(&node), length);
                }
            }
            "preproc_ifdef" => {
                let skip = node.child_by_field_name("name").map(|n| n.id());
                for i in 0..node.child_count() {
                    if let Some(child) = node.child(i) {
                        if Some(child.id()) != skip {
                            self.visit(child, scope);
                        }
                    }
                }
            }
            "preproc_if" | "preproc_elif" => {
                let skip = node.child_by_field_name("condition").map(|n| n.id());
                for i in 0..node.child_count() {
                    if let Some(child) = node.child(i) {
                        if Some(child.id()) != skip {
                            self.visit(child, scope);
                        }
                    }
                }
            }

            "namespace_definition" => self.visit_namespace(node, scope),
            "namespace_alias_definition" => self.visit_namespace_alias(node, scope),
            "using_declaration" => self.visit_using(node, scope),
            "class_specifier" | "struct_specifier" | "union_specifier" => {
                self.visit_class(node, scope)
            }
            "enum_specifier" => self.visit_enum(node, scope),
            "function_definition" => self.visit_function(node, scope),
            "declaration" | "field_declaration" => self.visit_declaration(node, scope),
            "template_declaration" => self.visit_template(node, scope),
            "type_definition" => self.visit_typedef(node, scope),
            "alias_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(scope, decl_kind("using"), &name);
                }
                if let Some(ty) = node.child_by_field_name("type") {
                    self.visit(ty, scope);
                }
            }
            "compound_statement" | "for_statement" | "for_range_loop" => {
                let block = self
                    .builder
                    .add_symbol(scope, SymbolKind::Block, None, pos(&node));
                self.visit_children(node, block);
            }

            "field_expression" => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    self.visit(argument, scope);
                }
                if let Some(field) = node.child_by_field_name("field") {
                    if field.kind() == "field_identifier" {
                        self.reference(&field, scope, RefShape::Member);
                    } else {
                        self.visit(field, scope);
                    }
                }
            }
            "qualified_identifier" | "qualified_type_identifier" | "nested_namespace_specifier" => {
                self.visit_qualified(node, scope)
            }
            "template_type" | "template_function" | "template_method" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.visit(name, scope);
                }
                if let Some(args) = node.child_by_field_name("arguments") {
                    self.visit(args, scope);
                }
            }
            "destructor_name" => {
                for i in 0..node.child_count() {
                    if let Some(child) = node.child(i) {
                        if child.kind() == "identifier" {
                            self.reference(&child, scope, RefShape::Plain);
                        }
                    }
                }
            }
            "identifier" | "type_identifier" | "field_identifier" | "namespace_identifier" => {
                self.reference(&node, scope, RefShape::Plain);
            }

            _ => self.visit_children(node, scope),
        }
    }

    // ─── Symbols ────────────────────────────────────────────────

    /// Add a named symbol and its declaration reference.
    fn declare(&mut self, scope: SymbolId, kind: SymbolKind, name: &Node) -> SymbolId {
        let text = self.text(name);
        let id = self.builder.add_symbol(scope, kind, Some(&text), pos(name));
        self.push_pending(text, name, scope, RefShape::Declaration(id));
        id
    }

    fn declare_name(&mut self, scope: SymbolId, kind: SymbolKind, name: &DeclName) -> SymbolId {
        let id = self
            .builder
            .add_symbol(scope, kind, Some(&name.name), pos(&name.node));
        if let Some(symbol) = self.builder.symbol_mut(id) {
            symbol.qualifier = name.qualifier.clone();
        }
        self.qualifier_refs(&name.qualifier, &name.qualifier_nodes, scope);
        if let Some(class) = name.destructor_of {
            self.reference(&class, scope, RefShape::Plain);
        }
        self.push_pending(name.name.clone(), &name.node, scope, RefShape::Declaration(id));
        id
    }

    fn reference(&mut self, node: &Node, scope: SymbolId, shape: RefShape) {
        let text = self.text(node);
        if text.is_empty() {
            return;
        }
        self.push_pending(text, node, scope, shape);
    }

    fn push_pending(&mut self, name: String, node: &Node, scope: SymbolId, shape: RefShape) {
        let length = node.end_byte() - node.start_byte();
        self.builder.add_pending(PendingRef {
            name,
            position: pos(node),
            length,
            scope,
            shape,
        });
    }

    /// References for the segments of a qualifier: the first is looked up
    /// plainly, each later one inside the segments before it.
    fn qualifier_refs(&mut self, segments: &[String], nodes: &[Node], scope: SymbolId) {
        let offset = segments.len() - nodes.len().min(segments.len());
        for (i, node) in nodes.iter().enumerate() {
            let leading = &segments[..offset + i];
            let shape = if leading.is_empty() {
                RefShape::Plain
            } else {
                RefShape::Qualified(leading.to_vec())
            };
            self.reference(node, scope, shape);
        }
    }

    fn is_static(&self, node: &Node) -> bool {
        (0..node.child_count())
            .filter_map(|i| node.child(i))
            .any(|c| c.kind() == "storage_class_specifier" && self.text(&c) == "static")
    }

    // ─── Names ──────────────────────────────────────────────────

    /// Flatten `a::b::c` into segments. A leading `::` yields an empty segment.
    fn flatten_qualified<'t>(&mut self, node: Node<'t>, scope: SymbolId) -> (Vec<String>, Vec<Node<'t>>) {
        let mut segments = Vec::new();
        let mut nodes = Vec::new();
        let mut current = Some(node);
        let mut first = true;

        while let Some(n) = current.take() {
            match n.kind() {
                "qualified_identifier" | "qualified_type_identifier" => {
                    match n.child_by_field_name("scope") {
                        Some(s) => self.push_segment(s, scope, &mut segments, &mut nodes),
                        None if first => segments.push(String::new()),
                        None => {}
                    }
                    current = n.child_by_field_name("name");
                }
                "nested_namespace_specifier" => {
                    for i in 0..n.named_child_count() {
                        if let Some(child) = n.named_child(i) {
                            self.push_segment(child, scope, &mut segments, &mut nodes);
                        }
                    }
                }
                _ => self.push_segment(n, scope, &mut segments, &mut nodes),
            }
            first = false;
        }
        (segments, nodes)
    }

    fn push_segment<'t>(
        &mut self,
        node: Node<'t>,
        scope: SymbolId,
        segments: &mut Vec<String>,
        nodes: &mut Vec<Node<'t>>,
    ) {
        match node.kind() {
            "template_type" | "template_function" | "template_method" => {
                if let Some(args) = node.child_by_field_name("arguments") {
                    self.visit(args, scope);
                }
                if let Some(name) = node.child_by_field_name("name") {
                    segments.push(self.text(&name));
                    nodes.push(name);
                }
            }
            "nested_namespace_specifier" | "qualified_identifier" | "qualified_type_identifier" => {
                let (inner, inner_nodes) = self.flatten_qualified(node, scope);
                segments.extend(inner);
                nodes.extend(inner_nodes);
            }
            _ => {
                segments.push(self.text(&node));
                nodes.push(node);
            }
        }
    }

    fn visit_qualified(&mut self, node: Node, scope: SymbolId) {
        let (segments, nodes) = self.flatten_qualified(node, scope);
        let global = segments.first().is_some_and(|s| s.is_empty());
        let offset = usize::from(global);
        for (i, n) in nodes.iter().enumerate() {
            if n.kind() == "destructor_name" {
                self.visit(*n, scope);
                continue;
            }
            if n.kind() == "operator_name" {
                continue;
            }
            let leading = &segments[..offset + i];
            let shape = if leading.is_empty() {
                RefShape::Plain
            } else {
                RefShape::Qualified(leading.to_vec())
            };
            self.reference(n, scope, shape);
        }
    }

    /// Dig the name out of a declarator chain.
    fn decl_name<'t>(&mut self, declarator: Node<'t>, scope: SymbolId) -> Option<DeclName<'t>> {
        let mut node = declarator;
        loop {
            match node.kind() {
                "pointer_declarator" | "init_declarator" | "array_declarator"
                | "function_declarator" | "parenthesized_declarator" | "attributed_declarator"
                | "reference_declarator" => {
                    node = match node.child_by_field_name("declarator") {
                        Some(inner) => inner,
                        None => {
                            let count = node.named_child_count();
                            (0..count).rev().find_map(|i| node.named_child(i))?
                        }
                    };
                }
                "qualified_identifier" => {
                    let (mut segments, mut nodes) = self.flatten_qualified(node, scope);
                    let last = nodes.pop()?;
                    segments.pop();
                    if segments.first().is_some_and(|s| s.is_empty()) {
                        segments.remove(0);
                    }
                    let mut name = self.decl_name(last, scope)?;
                    name.qualifier = segments;
                    name.qualifier_nodes = nodes;
                    return Some(name);
                }
                "destructor_name" => {
                    let class = (0..node.child_count())
                        .filter_map(|i| node.child(i))
                        .find(|c| c.kind() == "identifier");
                    return Some(DeclName {
                        name: collapse_ws(&self.text(&node)).replace(' ', ""),
                        node,
                        qualifier: Vec::new(),
                        qualifier_nodes: Vec::new(),
                        destructor_of: class,
                    });
                }
                "template_function" => {
                    if let Some(args) = node.child_by_field_name("arguments") {
                        self.visit(args, scope);
                    }
                    node = node.child_by_field_name("name")?;
                }
                "identifier" | "field_identifier" | "type_identifier" | "operator_name" => {
                    return Some(DeclName {
                        name: self.text(&node),
                        node,
                        qualifier: Vec::new(),
                        qualifier_nodes: Vec::new(),
                        destructor_of: None,
                    });
                }
                _ => return None,
            }
        }
    }

    /// The function declarator inside a declarator chain, if any.
    fn function_declarator<'t>(declarator: Node<'t>) -> Option<Node<'t>> {
        let mut node = declarator;
        loop {
            match node.kind() {
                "function_declarator" => return Some(node),
                "pointer_declarator" | "reference_declarator" | "parenthesized_declarator"
                | "attributed_declarator" => {
                    node = match node.child_by_field_name("declarator") {
                        Some(inner) => inner,
                        None => {
                            let count = node.named_child_count();
                            (0..count).rev().find_map(|i| node.named_child(i))?
                        }
                    };
                }
                _ => return None,
            }
        }
    }

    /// Pointer and reference markers of a declarator chain, for type text.
    fn declarator_suffix(declarator: Node) -> String {
        let mut suffix = String::new();
        let mut node = Some(declarator);
        while let Some(n) = node {
            match n.kind() {
                "pointer_declarator" => suffix.push('*'),
                "reference_declarator" => suffix.push('&'),
                "array_declarator" => suffix.push_str("[]"),
                _ => {}
            }
            node = n.child_by_field_name("declarator");
        }
        suffix
    }

    fn param_types(&mut self, params: Node, scope: SymbolId, declare_args: bool) -> String {
        let mut types = Vec::new();
        for i in 0..params.named_child_count() {
            let Some(param) = params.named_child(i) else {
                continue;
            };
            match param.kind() {
                "parameter_declaration" | "optional_parameter_declaration" => {
                    let ty = param.child_by_field_name("type");
                    let declarator = param.child_by_field_name("declarator");
                    let mut text = ty.map(|t| collapse_ws(&self.text(&t))).unwrap_or_default();
                    if let Some(d) = declarator {
                        text.push_str(&Self::declarator_suffix(d));
                    }
                    types.push(text);

                    if let Some(t) = ty {
                        self.visit(t, scope);
                    }
                    if declare_args {
                        if let Some(d) = declarator {
                            if let Some(name) = self.decl_name(d, scope) {
                                self.declare_name(scope, SymbolKind::Argument, &name);
                            }
                        }
                    }
                    if let Some(default) = param.child_by_field_name("default_value") {
                        self.visit(default, scope);
                    }
                }
                "variadic_parameter_declaration" | "variadic_parameter" => types.push("...".to_string()),
                _ => {}
            }
        }
        format!("({})", types.join(","))
    }

    // ─── Declarations ───────────────────────────────────────────

    fn visit_namespace(&mut self, node: Node, scope: SymbolId) {
        let mut inner = scope;
        match node.child_by_field_name("name") {
            Some(name) if name.kind() == "nested_namespace_specifier" => {
                for i in 0..name.named_child_count() {
                    if let Some(segment) = name.named_child(i) {
                        inner = self.declare(inner, SymbolKind::Namespace, &segment);
                    }
                }
            }
            Some(name) => inner = self.declare(scope, SymbolKind::Namespace, &name),
            None => {
                inner = self
                    .builder
                    .add_symbol(scope, SymbolKind::Namespace, None, pos(&node));
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, inner);
        }
    }

    fn visit_namespace_alias(&mut self, node: Node, scope: SymbolId) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let target = (0..node.named_child_count())
            .filter_map(|i| node.named_child(i))
            .find(|c| c.id() != name.id());
        let id = self.declare(scope, SymbolKind::NamespaceAlias, &name);
        if let Some(target) = target {
            let (segments, nodes) = self.flatten_qualified(target, scope);
            if let Some(symbol) = self.builder.symbol_mut(id) {
                symbol.qualifier = segments.iter().filter(|s| !s.is_empty()).cloned().collect();
            }
            self.qualifier_refs(&segments, &nodes, scope);
        }
    }

    fn visit_using(&mut self, node: Node, scope: SymbolId) {
        let is_directive = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .any(|c| c.kind() == "namespace");
        let Some(target) = (0..node.named_child_count())
            .filter_map(|i| node.named_child(i))
            .find(|c| {
                matches!(
                    c.kind(),
                    "identifier" | "qualified_identifier" | "namespace_identifier" | "nested_namespace_specifier"
                )
            })
        else {
            return;
        };

        let (mut segments, nodes) = self.flatten_qualified(target, scope);
        self.qualifier_refs(&segments, &nodes, scope);
        if segments.first().is_some_and(|s| s.is_empty()) {
            segments.remove(0);
        }
        let Some(name) = segments.pop() else {
            return;
        };
        let kind = if is_directive {
            SymbolKind::UsingDirective
        } else {
            SymbolKind::UsingDeclaration
        };
        let id = self.builder.add_symbol(scope, kind, Some(&name), pos(&target));
        if let Some(symbol) = self.builder.symbol_mut(id) {
            symbol.qualifier = segments;
        }
    }

    fn visit_class(&mut self, node: Node, scope: SymbolId) {
        let name = node.child_by_field_name("name");
        let body = node.child_by_field_name("body");

        let Some(body) = body else {
            let Some(name) = name else {
                return;
            };
            let is_forward = node.parent().is_some_and(|p| match p.kind() {
                "declaration" | "field_declaration" => p.child_by_field_name("declarator").is_none(),
                "translation_unit" | "declaration_list" | "template_declaration" => true,
                _ => false,
            });
            if is_forward && name.kind() == "type_identifier" {
                self.declare(scope, SymbolKind::ForwardClassDeclaration, &name);
            } else {
                self.visit(name, scope);
            }
            return;
        };

        let class = match name {
            Some(name) => match self.decl_name_of_type(name, scope) {
                Some(decl) => self.declare_name(scope, SymbolKind::Class, &decl),
                None => self.builder.add_symbol(scope, SymbolKind::Class, None, pos(&node)),
            },
            None => self.builder.add_symbol(scope, SymbolKind::Class, None, pos(&node)),
        };

        for i in 0..node.child_count() {
            let Some(child) = node.child(i) else {
                continue;
            };
            if child.kind() != "base_class_clause" {
                continue;
            }
            for j in 0..child.named_child_count() {
                let Some(base) = child.named_child(j) else {
                    continue;
                };
                if !matches!(
                    base.kind(),
                    "type_identifier" | "qualified_type_identifier" | "template_type"
                ) {
                    continue;
                }
                let (mut segments, nodes) = self.flatten_qualified(base, scope);
                self.qualifier_refs(&segments, &nodes, scope);
                if segments.first().is_some_and(|s| s.is_empty()) {
                    segments.remove(0);
                }
                if let Some(last) = segments.pop() {
                    let id = self
                        .builder
                        .add_symbol(class, SymbolKind::BaseClass, Some(&last), pos(&base));
                    if let Some(symbol) = self.builder.symbol_mut(id) {
                        symbol.qualifier = segments;
                    }
                }
            }
        }

        self.visit_children(body, class);
    }

    /// Name of a class-like specifier: plain, qualified or a specialization.
    fn decl_name_of_type<'t>(&mut self, name: Node<'t>, scope: SymbolId) -> Option<DeclName<'t>> {
        match name.kind() {
            "type_identifier" => Some(DeclName {
                name: self.text(&name),
                node: name,
                qualifier: Vec::new(),
                qualifier_nodes: Vec::new(),
                destructor_of: None,
            }),
            "template_type" => {
                if let Some(args) = name.child_by_field_name("arguments") {
                    self.visit(args, scope);
                }
                let inner = name.child_by_field_name("name")?;
                self.decl_name_of_type(inner, scope)
            }
            "qualified_type_identifier" => {
                let (mut segments, mut nodes) = self.flatten_qualified(name, scope);
                let last = nodes.pop()?;
                let text = segments.pop()?;
                if segments.first().is_some_and(|s| s.is_empty()) {
                    segments.remove(0);
                }
                Some(DeclName {
                    name: text,
                    node: last,
                    qualifier: segments,
                    qualifier_nodes: nodes,
                    destructor_of: None,
                })
            }
            _ => None,
        }
    }

    fn visit_enum(&mut self, node: Node, scope: SymbolId) {
        let name = node.child_by_field_name("name");
        let Some(body) = node.child_by_field_name("body") else {
            if let Some(name) = name {
                self.visit(name, scope);
            }
            return;
        };
        let enum_name = name.map(|n| self.text(&n)).unwrap_or_else(|| "int".to_string());
        let id = match name {
            Some(name) => self.declare(scope, SymbolKind::Enum, &name),
            None => self.builder.add_symbol(scope, SymbolKind::Enum, None, pos(&node)),
        };
        if let Some(base) = node.child_by_field_name("base") {
            self.visit(base, scope);
        }
        for i in 0..body.named_child_count() {
            let Some(enumerator) = body.named_child(i) else {
                continue;
            };
            if enumerator.kind() != "enumerator" {
                continue;
            }
            if let Some(value_name) = enumerator.child_by_field_name("name") {
                self.declare(id, decl_kind(&enum_name), &value_name);
            }
            if let Some(value) = enumerator.child_by_field_name("value") {
                self.visit(value, id);
            }
        }
    }

    fn visit_function(&mut self, node: Node, scope: SymbolId) {
        let is_static = self.is_static(&node);
        let (Some(declarator), Some(body)) = (
            node.child_by_field_name("declarator"),
            node.child_by_field_name("body"),
        ) else {
            self.visit_children(node, scope);
            return;
        };
        let Some(func_decl) = Self::function_declarator(declarator) else {
            self.visit_children(node, scope);
            return;
        };

        if let Some(ty) = node.child_by_field_name("type") {
            self.visit(ty, scope);
        }
        let name = func_decl
            .child_by_field_name("declarator")
            .and_then(|d| self.decl_name(d, scope));
        let function = match name {
            Some(name) => self.declare_name(scope, SymbolKind::Function, &name),
            None => self
                .builder
                .add_symbol(scope, SymbolKind::Function, None, pos(&node)),
        };
        if let Some(symbol) = self.builder.symbol_mut(function) {
            symbol.is_static = is_static;
        }
        if let Some(params) = func_decl.child_by_field_name("parameters") {
            self.param_types(params, function, true);
        }

        // Member initializers, trailing return types and the like.
        let skip = [
            node.child_by_field_name("type").map(|n| n.id()),
            Some(declarator.id()),
            Some(body.id()),
        ];
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                if !skip.contains(&Some(child.id())) && child.kind() != "storage_class_specifier" {
                    self.visit(child, function);
                }
            }
        }

        let block = self
            .builder
            .add_symbol(function, SymbolKind::Block, None, pos(&body));
        self.visit_children(body, block);
    }

    fn visit_declaration(&mut self, node: Node, scope: SymbolId) {
        let is_static = self.is_static(&node);
        let ty = node.child_by_field_name("type");
        let type_text = ty.map(|t| collapse_ws(&self.text(&t))).unwrap_or_default();
        if let Some(t) = ty {
            self.visit(t, scope);
        }

        let mut cursor = node.walk();
        let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();
        for declarator in declarators {
            let kind = match Self::function_declarator(declarator) {
                Some(func_decl) => {
                    let params = func_decl
                        .child_by_field_name("parameters")
                        .map(|p| self.param_types(p, scope, false))
                        .unwrap_or_else(|| "()".to_string());
                    decl_kind(&format!("{}{}", type_text, params))
                }
                None => decl_kind(&format!("{}{}", type_text, Self::declarator_suffix(declarator))),
            };
            if let Some(name) = self.decl_name(declarator, scope) {
                let id = self.declare_name(scope, kind, &name);
                if let Some(symbol) = self.builder.symbol_mut(id) {
                    symbol.is_static = is_static;
                }
            }
            if declarator.kind() == "init_declarator" {
                if let Some(value) = declarator.child_by_field_name("value") {
                    self.visit(value, scope);
                }
            }
        }
        if let Some(value) = node.child_by_field_name("default_value") {
            self.visit(value, scope);
        }
    }

    fn visit_template(&mut self, node: Node, scope: SymbolId) {
        let template = self
            .builder
            .add_symbol(scope, SymbolKind::Template, None, pos(&node));
        let params = node.child_by_field_name("parameters");
        if let Some(params) = params {
            for i in 0..params.named_child_count() {
                let Some(param) = params.named_child(i) else {
                    continue;
                };
                match param.kind() {
                    "type_parameter_declaration" | "optional_type_parameter_declaration"
                    | "variadic_type_parameter_declaration" => {
                        let name = param.child_by_field_name("name").or_else(|| {
                            (0..param.named_child_count())
                                .filter_map(|j| param.named_child(j))
                                .find(|c| c.kind() == "type_identifier")
                        });
                        if let Some(name) = name {
                            self.declare(template, SymbolKind::TypenameArgument, &name);
                        }
                        if let Some(default) = param.child_by_field_name("default_type") {
                            self.visit(default, template);
                        }
                    }
                    "parameter_declaration" | "optional_parameter_declaration" => {
                        if let Some(t) = param.child_by_field_name("type") {
                            self.visit(t, template);
                        }
                        if let Some(d) = param.child_by_field_name("declarator") {
                            if let Some(name) = self.decl_name(d, template) {
                                self.declare_name(template, SymbolKind::Argument, &name);
                            }
                        }
                    }
                    _ => self.visit(param, template),
                }
            }
        }
        let skip = params.map(|p| p.id());
        for i in 0..node.named_child_count() {
            if let Some(child) = node.named_child(i) {
                if Some(child.id()) != skip {
                    self.visit(child, template);
                }
            }
        }
    }

    fn visit_typedef(&mut self, node: Node, scope: SymbolId) {
        let ty = node.child_by_field_name("type");
        let type_text = ty.map(|t| collapse_ws(&self.text(&t))).unwrap_or_default();
        if let Some(t) = ty {
            self.visit(t, scope);
        }
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();
        for declarator in declarators {
            if let Some(name) = self.decl_name(declarator, scope) {
                self.declare_name(scope, decl_kind(&format!("typedef {}", type_text)), &name);
            }
        }
    }
}

fn decl_kind(type_text: &str) -> SymbolKind {
    SymbolKind::Declaration {
        type_text: type_text.to_string(),
    }
}
