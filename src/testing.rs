//! Test fixtures shared by the unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{FindRefsError, Result};
use crate::model::{Document, Snapshot};
use crate::parser::FrontEnd;

/// Counts parse calls made through a [`FixtureFrontEnd`].
#[derive(Debug, Clone, Default)]
pub(crate) struct ParseCounter(Arc<AtomicUsize>);

impl ParseCounter {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Blocks parses until opened.
#[derive(Debug, Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    pub(crate) fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
    }
}

/// A front-end that hands back prebuilt documents by path.
pub(crate) struct FixtureFrontEnd {
    documents: HashMap<PathBuf, Document>,
    parses: ParseCounter,
    gate: Option<Arc<Gate>>,
    panics_on: Option<PathBuf>,
}

impl FixtureFrontEnd {
    pub(crate) fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|d| (d.path().to_path_buf(), d))
                .collect(),
            parses: ParseCounter::default(),
            gate: None,
            panics_on: None,
        }
    }

    /// Every parse waits until the returned gate is opened.
    pub(crate) fn gated(mut self) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Parsing `path` panics.
    pub(crate) fn panicking_on(mut self, path: impl Into<PathBuf>) -> Self {
        self.panics_on = Some(path.into());
        self
    }

    pub(crate) fn parse_counter(&self) -> ParseCounter {
        self.parses.clone()
    }
}

impl FrontEnd for FixtureFrontEnd {
    fn parse(&self, path: &Path, _source: &str) -> Result<Document> {
        self.parses.0.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if self.panics_on.as_deref() == Some(path) {
            panic!("parser crashed on {}", path.display());
        }
        self.documents
            .get(path)
            .cloned()
            .ok_or_else(|| FindRefsError::Parse {
                file: path.to_path_buf(),
                message: "no fixture document".to_string(),
            })
    }

    fn bind(&self, document: Document, _snapshot: &Snapshot) -> Result<Document> {
        Ok(document)
    }
}
