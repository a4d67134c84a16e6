//! Snapshot construction and the include dependency graph.

pub mod builder;
pub mod dependency;

pub use builder::{build_snapshot, rebuild_file, scan_stats, ScanStats};
pub use dependency::{DependencyCache, DependencyGraph, DependencyStats};
