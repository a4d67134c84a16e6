//! Symbol identity paths.
//!
//! A symbol is identified by the chain of scopes leading to it, one token per
//! level from the global namespace down. A token is the symbol's kind tag plus
//! either its identifier or, for unnamed symbols, its index among the unnamed
//! siblings with the same tag. Nothing positional (offsets, lines) goes in, so
//! a path survives edits that do not restructure the scopes along it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{SymbolId, SymbolTable};

/// Identifier text, or ordinal among same-tag unnamed siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameOrOrdinal {
    Name(String),
    Ordinal(usize),
}

/// One level of a [`SymbolIdentityPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolIdentityToken {
    pub tag: String,
    pub name: NameOrOrdinal,
}

impl fmt::Display for SymbolIdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            NameOrOrdinal::Name(name) => write!(f, "{}:{}", self.tag, name),
            NameOrOrdinal::Ordinal(n) => write!(f, "{}#{}", self.tag, n),
        }
    }
}

/// Root-first token sequence identifying a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SymbolIdentityPath(pub Vec<SymbolIdentityToken>);

impl SymbolIdentityPath {
    pub fn tokens(&self) -> &[SymbolIdentityToken] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SymbolIdentityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

/// Token for a single symbol, relative to its enclosing scope.
fn token_for(table: &SymbolTable, id: SymbolId) -> Option<SymbolIdentityToken> {
    let symbol = table.get(id)?;
    let tag = symbol.kind.tag();
    let name = match &symbol.name {
        Some(name) => NameOrOrdinal::Name(name.clone()),
        None => {
            let siblings = symbol
                .parent
                .map(|p| table.children(p))
                .unwrap_or(&[]);
            let ordinal = siblings
                .iter()
                .take_while(|&&s| s != id)
                .filter_map(|&s| table.get(s))
                .filter(|s| s.name.is_none() && s.kind.tag() == tag)
                .count();
            NameOrOrdinal::Ordinal(ordinal)
        }
    };
    Some(SymbolIdentityToken { tag, name })
}

/// Encode a symbol's identity path. The first token is always the global
/// namespace.
pub fn encode(table: &SymbolTable, id: SymbolId) -> SymbolIdentityPath {
    let mut tokens: Vec<SymbolIdentityToken> = std::iter::once(id)
        .chain(table.ancestors(id))
        .filter_map(|s| token_for(table, s))
        .collect();
    tokens.reverse();
    SymbolIdentityPath(tokens)
}

/// Find the symbol a path denotes in a (re-parsed) symbol table.
///
/// Every child matching a token is tried in order, backtracking when the
/// rest of the path cannot be consumed beneath it, so a reopened namespace
/// or a repeated name does not hide a later match.
pub fn locate(path: &SymbolIdentityPath, table: &SymbolTable) -> Option<SymbolId> {
    let (root, rest) = path.tokens().split_first()?;
    if token_for(table, SymbolId::ROOT).as_ref() != Some(root) {
        return None;
    }
    locate_below(table, SymbolId::ROOT, rest)
}

fn locate_below(
    table: &SymbolTable,
    scope: SymbolId,
    tokens: &[SymbolIdentityToken],
) -> Option<SymbolId> {
    let Some((first, rest)) = tokens.split_first() else {
        return Some(scope);
    };

    let mut unnamed_seen = 0;
    for &child in table.children(scope) {
        let Some(symbol) = table.get(child) else {
            continue;
        };
        if symbol.kind.tag() != first.tag {
            continue;
        }
        let hit = match (&first.name, &symbol.name) {
            (NameOrOrdinal::Name(wanted), Some(name)) => wanted == name,
            (NameOrOrdinal::Ordinal(wanted), None) => {
                let hit = unnamed_seen == *wanted;
                unnamed_seen += 1;
                hit
            }
            _ => false,
        };
        if hit {
            if let Some(found) = locate_below(table, child, rest) {
                return Some(found);
            }
        }
    }
    None
}
