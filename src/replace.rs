//! Applying a rename.
//!
//! The search only reports where the old name occurs. Turning those
//! usages into edits goes through [`ReplacePrimitive`], so an editor can
//! apply them to its own buffers. [`DiskReplacer`] rewrites files in place.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{FindRefsError, Result};
use crate::model::Usage;

/// Replaces every usage's span with `text`. Returns the files it changed.
pub trait ReplacePrimitive {
    fn replace_all(&self, text: &str, usages: &[Usage]) -> Result<Vec<PathBuf>>;
}

/// Writes replacements straight to disk.
///
/// Each file is read once, every edit is checked against it, and the file
/// is written once. A file with any out-of-range edit is left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskReplacer;

impl DiskReplacer {
    pub fn new() -> Self {
        Self
    }
}

impl ReplacePrimitive for DiskReplacer {
    fn replace_all(&self, text: &str, usages: &[Usage]) -> Result<Vec<PathBuf>> {
        let mut by_file: BTreeMap<&Path, Vec<&Usage>> = BTreeMap::new();
        for usage in usages {
            by_file.entry(usage.file.as_path()).or_default().push(usage);
        }

        let mut changed = Vec::new();
        for (path, edits) in by_file {
            let content = fs::read_to_string(path).map_err(|e| FindRefsError::io(path, e))?;
            let rewritten = apply_edits(path, &content, text, &edits)?;
            if rewritten != content {
                fs::write(path, rewritten.as_bytes()).map_err(|e| FindRefsError::io(path, e))?;
                debug!(file = %path.display(), edits = edits.len(), "rewrote file");
                changed.push(path.to_path_buf());
            }
        }
        info!(files = changed.len(), text, "replacement applied");
        Ok(changed)
    }
}

/// Apply edits to one file's content, right to left within each line so
/// earlier columns stay valid.
fn apply_edits(path: &Path, content: &str, text: &str, edits: &[&Usage]) -> Result<String> {
    let mut lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();

    let mut ordered: Vec<&Usage> = edits.to_vec();
    ordered.sort_by(|a, b| (b.line, b.column).cmp(&(a.line, a.column)));
    ordered.dedup_by_key(|u| (u.line, u.column));

    for usage in ordered {
        let out_of_range = || FindRefsError::Replace {
            path: path.to_path_buf(),
            message: format!("no span {}+{} on line {}", usage.column, usage.length, usage.line),
        };
        let line = usage
            .line
            .checked_sub(1)
            .and_then(|i| lines.get_mut(i))
            .ok_or_else(out_of_range)?;
        let end = usage.column + usage.length;
        let body_len = line.trim_end_matches(['\n', '\r']).len();
        if end > body_len || !line.is_char_boundary(usage.column) || !line.is_char_boundary(end) {
            return Err(out_of_range());
        }
        line.replace_range(usage.column..end, text);
    }
    Ok(lines.concat())
}
