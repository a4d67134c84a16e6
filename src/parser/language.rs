//! Language detection and tree-sitter grammar loading.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tree_sitter::Language;

/// Source languages the front-end understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceLanguage {
    C,
    Cpp,
    /// A header; parsed with the C++ grammar since it is a superset for our purposes.
    Header,
}

impl SourceLanguage {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "c" => Some(SourceLanguage::C),
            "cpp" | "cc" | "cxx" | "c++" => Some(SourceLanguage::Cpp),
            "h" | "hh" | "hpp" | "hxx" | "inl" => Some(SourceLanguage::Header),
            _ => None,
        }
    }

    /// Get the tree-sitter Language for this language.
    pub fn tree_sitter_language(&self) -> Language {
        tree_sitter_cpp::LANGUAGE.into()
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            SourceLanguage::C => "C",
            SourceLanguage::Cpp => "C++",
            SourceLanguage::Header => "C/C++ header",
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, SourceLanguage::Header)
    }
}
