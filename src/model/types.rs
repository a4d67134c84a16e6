//! Core types of the code model.
//!
//! Symbols, name references, macros and usages. Everything here is plain
//! data; documents own it and share it behind `Arc`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::identity::SymbolIdentityPath;

/// Index of a symbol inside its document's symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub usize);

impl SymbolId {
    /// The global namespace of every document.
    pub const ROOT: SymbolId = SymbolId(0);
}

/// A position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourcePos {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column (0-indexed, in bytes).
    pub column: usize,
    /// Byte offset from the start of the file.
    pub offset: usize,
}

impl SourcePos {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

/// The kind of a symbol. Closed set; all kind-specific behavior matches on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// A namespace (the global scope is an unnamed namespace).
    Namespace,
    /// `namespace fs = std::filesystem;`
    NamespaceAlias,
    /// A class, struct or union with a body.
    Class,
    /// `class Foo;`
    ForwardClassDeclaration,
    /// An enum with a body.
    Enum,
    /// A function definition.
    Function,
    /// A template declaration wrapping its templated entity.
    Template,
    /// A compound statement.
    Block,
    /// A variable, field, enumerator, typedef or function declaration.
    Declaration {
        /// Normalized type text, part of the identity tag.
        type_text: String,
    },
    /// A function parameter.
    Argument,
    /// A template type parameter.
    TypenameArgument,
    /// An entry in a class's base-clause.
    BaseClass,
    /// `using namespace N;`
    UsingDirective,
    /// `using N::name;`
    UsingDeclaration,
}

impl SymbolKind {
    /// Identity tag used by [`crate::identity`].
    pub fn tag(&self) -> String {
        match self {
            SymbolKind::Namespace => "n".to_string(),
            SymbolKind::NamespaceAlias => "na".to_string(),
            SymbolKind::Class => "c".to_string(),
            SymbolKind::ForwardClassDeclaration => "fcd".to_string(),
            SymbolKind::Enum => "e".to_string(),
            SymbolKind::Function => "f".to_string(),
            SymbolKind::Template => "t".to_string(),
            SymbolKind::Block => "b".to_string(),
            SymbolKind::Declaration { type_text } => format!("d,{}", type_text),
            SymbolKind::Argument => "a".to_string(),
            SymbolKind::TypenameArgument => "ta".to_string(),
            SymbolKind::BaseClass => "bc".to_string(),
            SymbolKind::UsingDirective => "u".to_string(),
            SymbolKind::UsingDeclaration => "ud".to_string(),
        }
    }

    /// Whether symbols of this kind can contain other symbols.
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            SymbolKind::Namespace
                | SymbolKind::Class
                | SymbolKind::Enum
                | SymbolKind::Function
                | SymbolKind::Template
                | SymbolKind::Block
        )
    }

    /// Scopes whose members are invisible outside the file.
    pub fn is_local_scope(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Block)
    }

    /// Type-like or namespace-like declarations that may be referenced from
    /// files that never include the declaring file directly.
    pub fn is_broadly_visible(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::ForwardClassDeclaration | SymbolKind::Namespace
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Namespace => write!(f, "namespace"),
            SymbolKind::NamespaceAlias => write!(f, "namespace alias"),
            SymbolKind::Class => write!(f, "class"),
            SymbolKind::ForwardClassDeclaration => write!(f, "forward declaration"),
            SymbolKind::Enum => write!(f, "enum"),
            SymbolKind::Function => write!(f, "function"),
            SymbolKind::Template => write!(f, "template"),
            SymbolKind::Block => write!(f, "block"),
            SymbolKind::Declaration { .. } => write!(f, "declaration"),
            SymbolKind::Argument => write!(f, "argument"),
            SymbolKind::TypenameArgument => write!(f, "template argument"),
            SymbolKind::BaseClass => write!(f, "base class"),
            SymbolKind::UsingDirective => write!(f, "using directive"),
            SymbolKind::UsingDeclaration => write!(f, "using declaration"),
        }
    }
}

/// A symbol in a document's symbol table.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub kind: SymbolKind,
    /// Identifier, if the symbol has one.
    pub name: Option<String>,
    /// Enclosing scope. `None` only for the global namespace.
    pub parent: Option<SymbolId>,
    /// Members in declaration order.
    pub children: Vec<SymbolId>,
    pub position: SourcePos,
    /// Declared with `static` storage.
    pub is_static: bool,
    /// Scope qualifier of an out-of-line definition (`Foo` in `void Foo::bar()`).
    pub qualifier: Vec<String>,
}

impl Symbol {
    pub fn identifier(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// The identity of a declaration, comparable across documents and revisions.
///
/// Symbols reachable by qualified name share a `Global` key wherever they are
/// declared, so a forward declaration, the class definition and every
/// reference to either compare equal. File-local symbols are keyed by their
/// declaring file and identity path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKey {
    Global(String),
    Local {
        file: PathBuf,
        path: SymbolIdentityPath,
    },
}

impl fmt::Display for DeclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclKey::Global(name) => write!(f, "{}", name),
            DeclKey::Local { file, path } => write!(f, "{}#{}", file.display(), path),
        }
    }
}

/// A bound occurrence of a name in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRef {
    pub name: String,
    pub position: SourcePos,
    /// Length in bytes.
    pub length: usize,
    /// What the name resolved to, if anything.
    pub key: Option<DeclKey>,
    /// This occurrence introduces a declaration.
    pub is_declaration: bool,
}

/// How an unresolved name was spelled, recorded by the parser for the binder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefShape {
    /// The name of a symbol being declared.
    Declaration(SymbolId),
    /// A bare identifier.
    Plain,
    /// The last segment of `A::B::name`; holds the leading segments.
    Qualified(Vec<String>),
    /// The member in `object.name` or `ptr->name`.
    Member,
}

/// A name occurrence awaiting binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRef {
    pub name: String,
    pub position: SourcePos,
    pub length: usize,
    /// Innermost scope containing the occurrence.
    pub scope: SymbolId,
    pub shape: RefShape,
}

/// An `#include` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    /// The path as written between the quotes or angle brackets.
    pub spelled: String,
    pub line: usize,
    /// The snapshot file it resolved to.
    pub resolved: Option<PathBuf>,
}

/// A preprocessor macro definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Macro {
    pub name: String,
    /// Defining file.
    pub file: PathBuf,
    /// Line of the `#define` (1-indexed).
    pub line: usize,
    /// Byte offset of the definition.
    pub offset: usize,
    /// Byte length of the definition.
    pub length: usize,
}

impl Macro {
    /// Macros are identified structurally: same defining file and line.
    pub fn same_definition(&self, file: &std::path::Path, line: usize) -> bool {
        self.line == line && self.file == file
    }
}

/// A recorded expansion of a macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroUse {
    /// The macro as defined where the expansion happened.
    pub definition: Macro,
    pub position: SourcePos,
    pub length: usize,
}

/// One usage found by a search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Usage {
    pub file: PathBuf,
    /// Line number (1-indexed).
    pub line: usize,
    /// Column (0-indexed, in bytes).
    pub column: usize,
    /// Length in bytes.
    pub length: usize,
    /// The full source line, from the unpreprocessed text.
    pub line_text: String,
    /// Text to replace this usage with, for rename sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file.display(),
            self.line,
            self.column + 1,
            self.line_text.trim_end()
        )
    }
}
