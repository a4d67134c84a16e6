//! The code model consumed by the search engine.

pub mod document;
pub mod snapshot;
pub mod types;

pub use document::{Document, DocumentBuilder, SymbolTable};
pub use snapshot::{LookupContext, Snapshot, SymbolHandle, WorkingCopy};
pub use types::*;
