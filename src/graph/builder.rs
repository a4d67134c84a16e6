//! Snapshot builder — scans a directory and parses every C/C++ file.
//!
//! Walks source files respecting .gitignore, parses each in parallel, then
//! binds every document against the parsed set so the resulting snapshot is
//! fully bound.

use ignore::WalkBuilder;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::config::IndexSettings;
use crate::error::{FindRefsError, Result};
use crate::model::{Document, Snapshot, WorkingCopy};
use crate::parser::{read_source, FrontEnd, SourceLanguage};

fn source_files(root: &Path, settings: &IndexSettings) -> Vec<PathBuf> {
    WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| settings.accepts(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Build a bound snapshot from all source files under `root`.
///
/// Files that cannot be read or parsed are logged and left out.
pub fn build_snapshot(root: &Path, settings: &IndexSettings, front_end: &dyn FrontEnd) -> Result<Snapshot> {
    if !root.is_dir() {
        return Err(FindRefsError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }
    let files = source_files(root, settings);
    let parsed: Mutex<Vec<Document>> = Mutex::new(Vec::with_capacity(files.len()));

    files.par_iter().for_each(|path| {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable file");
                return;
            }
        };
        let source = front_end.preprocess(path, &source);
        match front_end.parse(path, &source) {
            Ok(doc) => {
                if let Ok(mut docs) = parsed.lock() {
                    docs.push(doc);
                }
            }
            Err(e) => warn!(file = %path.display(), error = %e, "skipping unparsable file"),
        }
    });

    let parsed = parsed.into_inner().unwrap_or_default();
    let unbound = Snapshot::from_documents(parsed);

    let bound: Vec<Document> = unbound
        .iter()
        .collect::<Vec<_>>()
        .par_iter()
        .filter_map(|(path, doc)| match front_end.bind(Document::clone(doc), &unbound) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "binding failed");
                None
            }
        })
        .collect();

    let snapshot = Snapshot::from_documents(bound);
    info!(
        root = %root.display(),
        files = snapshot.len(),
        generation = snapshot.generation(),
        "snapshot built"
    );
    Ok(snapshot)
}

/// Reparse one file (preferring its working-copy buffer) into a new snapshot.
pub fn rebuild_file(
    snapshot: &Snapshot,
    path: &Path,
    front_end: &dyn FrontEnd,
    working_copy: &WorkingCopy,
) -> Result<Snapshot> {
    let source = read_source(path, working_copy)?;
    let source = front_end.preprocess(path, &source);
    let document = front_end.reparse_and_bind(path, &source, snapshot)?;
    Ok(snapshot.with_document(document))
}

/// Get statistics about what files would be parsed in a directory.
pub fn scan_stats(root: &Path, settings: &IndexSettings) -> ScanStats {
    let mut stats = ScanStats::default();
    for path in source_files(root, settings) {
        stats.total_files += 1;
        match SourceLanguage::from_path(&path) {
            Some(lang) if lang.is_header() => stats.headers += 1,
            Some(_) => stats.sources += 1,
            None => stats.other += 1,
        }
    }
    stats
}

#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub total_files: usize,
    pub sources: usize,
    pub headers: usize,
    pub other: usize,
}

impl std::fmt::Display for ScanStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Found {} source files ({} translation units, {} headers, {} other)",
            self.total_files, self.sources, self.headers, self.other
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeclKey;
    use crate::parser::CppFrontEnd;

    #[test]
    fn test_build_snapshot_binds_across_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.h"), "int shared();\n").unwrap();
        fs::write(
            dir.path().join("a.cpp"),
            "#include \"a.h\"\nint main() { return shared(); }\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "shared").unwrap();

        let snapshot = build_snapshot(dir.path(), &IndexSettings::default(), &CppFrontEnd::new()).unwrap();
        assert_eq!(snapshot.len(), 2);

        let unit = snapshot.document(&dir.path().join("a.cpp")).unwrap();
        assert!(unit.is_bound());
        assert_eq!(unit.includes()[0].resolved, Some(dir.path().join("a.h")));
        let key = DeclKey::Global("shared".to_string());
        assert_eq!(unit.references_to(&key).count(), 1);
    }

    #[test]
    fn test_build_snapshot_missing_root() {
        let result = build_snapshot(
            Path::new("/nonexistent/findrefs-root"),
            &IndexSettings::default(),
            &CppFrontEnd::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_scan_stats() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.h"), "").unwrap();
        fs::write(dir.path().join("a.cpp"), "").unwrap();
        fs::write(dir.path().join("b.c"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let stats = scan_stats(dir.path(), &IndexSettings::default());
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.headers, 1);
        assert_eq!(stats.sources, 2);
    }

    #[test]
    fn test_rebuild_file_uses_working_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cpp");
        fs::write(&path, "int before;\n").unwrap();
        let front = CppFrontEnd::new();
        let snapshot = build_snapshot(dir.path(), &IndexSettings::default(), &front).unwrap();

        let mut wc = WorkingCopy::new();
        wc.insert(path.clone(), "int after;\n");
        let next = rebuild_file(&snapshot, &path, &front, &wc).unwrap();
        assert!(!next.is_same_generation(&snapshot));
        let doc = next.document(&path).unwrap();
        assert!(doc.contains_identifier("after"));
        assert!(!doc.contains_identifier("before"));
    }
}
