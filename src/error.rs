//! Error types for findrefs.
//!
//! Per-file failures during a search never surface here: the matcher logs
//! them and contributes zero usages. Only pre-flight checks and the
//! surrounding plumbing (config, snapshot building, replace) return errors.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for findrefs operations.
#[derive(Error, Debug)]
pub enum FindRefsError {
    /// I/O error while reading or writing a source file.
    #[error("I/O error for path {path}: {source}")]
    Io {
        /// The file path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The front-end could not produce a document.
    #[error("Parse error in {file}: {message}")]
    Parse {
        /// The file that failed to parse.
        file: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// No front-end handles this file type.
    #[error("Unsupported language for file: {0}")]
    UnsupportedLanguage(String),

    /// The search target has neither an identifier nor a usable position.
    #[error("Symbol cannot be identified: {0}")]
    UnidentifiableSymbol(String),

    /// A symbol found in an older snapshot could not be re-located.
    #[error("Stale target in {file}: {reason}")]
    StaleTarget {
        /// The file that declared the symbol.
        file: PathBuf,
        /// Why re-location failed.
        reason: String,
    },

    /// No symbol at the requested location or with the requested key.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Configuration could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// The worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Applying a replacement failed.
    #[error("Replace failed for {path}: {message}")]
    Replace {
        /// The file being rewritten.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },
}

impl FindRefsError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FindRefsError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for FindRefsError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        FindRefsError::ThreadPool(err.to_string())
    }
}

/// Result type alias for findrefs operations.
pub type Result<T> = std::result::Result<T, FindRefsError>;
