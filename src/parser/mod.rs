//! The parser/front-end collaborator.
//!
//! The search engine only talks to a [`FrontEnd`]: something that turns
//! source text into a [`Document`] and binds its names against a snapshot.
//! [`CppFrontEnd`] is the tree-sitter implementation used by the CLI.

pub mod binder;
pub mod cpp;
pub mod language;

pub use binder::{Binder, SymbolIndex};
pub use cpp::CppFrontEnd;
pub use language::SourceLanguage;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{FindRefsError, Result};
use crate::model::{Document, Snapshot, WorkingCopy};

/// Turns source text into documents.
pub trait FrontEnd: Send + Sync {
    /// Parse without binding. The result carries pending references.
    fn parse(&self, path: &Path, source: &str) -> Result<Document>;

    /// Resolve a parsed document's pending references against a snapshot.
    fn bind(&self, document: Document, snapshot: &Snapshot) -> Result<Document>;

    /// Preprocess raw source. Must keep line structure intact so positions
    /// in the output are valid in the input.
    fn preprocess(&self, _path: &Path, source: &str) -> String {
        source.to_string()
    }

    /// Parse and bind in one step.
    fn reparse_and_bind(&self, path: &Path, source: &str, snapshot: &Snapshot) -> Result<Document> {
        let document = self.parse(path, source)?;
        self.bind(document, snapshot)
    }
}

/// Source for a file: the working copy if it has the file, else the disk.
pub fn read_source(path: &Path, working_copy: &WorkingCopy) -> Result<String> {
    if let Some(text) = working_copy.source(path) {
        return Ok(text.to_string());
    }
    fs::read_to_string(path).map_err(|e| FindRefsError::io(path, e))
}

/// Identifier tokens of a C/C++ source, skipping comments and literals.
///
/// A plain lexer rather than the tree-sitter parse: `#define` bodies are
/// opaque to the grammar, and their tokens must still count.
pub fn identifier_tokens(source: &str) -> HashSet<String> {
    let bytes = source.as_bytes();
    let mut out = HashSet::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 2;
            }
            b'"' | b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b && bytes[i] != b'\n' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            _ if b == b'_' || b.is_ascii_alphabetic() => {
                let start = i;
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                out.insert(source[start..i].to_string());
            }
            _ if b.is_ascii_digit() => {
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i] == b'.' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_tokens() {
        let tokens = identifier_tokens(
            r#"
// Foo in a comment
/* Bar in a block */
int main() { auto s = "Baz"; char c = 'q'; return 0x1Fu + count_2; }
"#,
        );
        assert!(tokens.contains("main"));
        assert!(tokens.contains("count_2"));
        assert!(tokens.contains("auto"));
        assert!(!tokens.contains("Foo"));
        assert!(!tokens.contains("Bar"));
        assert!(!tokens.contains("Baz"));
        assert!(!tokens.contains("q"));
        assert!(!tokens.contains("x1Fu"));
    }

    #[test]
    fn test_read_source_prefers_working_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cpp");
        fs::write(&path, "int disk;").unwrap();

        let mut wc = WorkingCopy::new();
        assert_eq!(read_source(&path, &wc).unwrap(), "int disk;");
        wc.insert(path.clone(), "int buffer;");
        assert_eq!(read_source(&path, &wc).unwrap(), "int buffer;");

        let missing = dir.path().join("missing.cpp");
        assert!(matches!(
            read_source(&missing, &WorkingCopy::new()),
            Err(FindRefsError::Io { .. })
        ));
    }
}
