//! # findrefs
//!
//! Find usages and rename for C/C++ code bases.
//!
//! findrefs answers "where is this symbol used?" by combining a cheap
//! include-graph filter with full semantic matching: only files that can
//! see the symbol are parsed and bound, and only name references that
//! resolve to the same declaration are reported.
//!
//! ## Key Features
//!
//! - **Semantic**: usages are matched by declaration identity, not by text
//! - **Pruned**: file-local symbols only search files that include their declaring file
//! - **Concurrent**: files are matched in parallel, with cooperative cancellation
//! - **Re-runnable**: a search can be repeated against a newer snapshot
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use findrefs::{build_snapshot, CppFrontEnd, FindReferences, IndexSettings, LookupContext};
//! use findrefs::{SearchSettings, WorkingCopy};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let front_end = Arc::new(CppFrontEnd::new());
//! let snapshot = build_snapshot(Path::new("."), &IndexSettings::default(), &*front_end).unwrap();
//! let snapshot = Arc::new(snapshot);
//! let engine = FindReferences::new(front_end, SearchSettings::default()).unwrap();
//!
//! // The symbol under a cursor in src/widget.cpp, line 12, column 8
//! let symbol = snapshot.symbol_at(Path::new("./src/widget.cpp"), 12, 8).unwrap();
//! let context = LookupContext::for_symbol(Arc::clone(&snapshot), &symbol);
//! let session = engine.start_usage_search(&symbol, &context, Arc::new(WorkingCopy::new()));
//! for usage in session.wait().usages {
//!     println!("{}", usage);
//! }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod identity;
pub mod model;
pub mod parser;
pub mod replace;
pub mod search;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use config::{FindRefsConfig, IndexSettings, SearchSettings};
pub use error::{FindRefsError, Result};

// Model re-exports
pub use identity::{SymbolIdentityPath, SymbolIdentityToken};
pub use model::{
    DeclKey, Document, LookupContext, Macro, Snapshot, SymbolHandle, SymbolKind, Usage,
    WorkingCopy,
};

// Snapshot building and the front-end
pub use graph::{build_snapshot, rebuild_file, DependencyCache, DependencyGraph, DependencyStats};
pub use parser::{CppFrontEnd, FrontEnd, SourceLanguage};

// Searching and renaming
pub use replace::{DiskReplacer, ReplacePrimitive};
pub use search::{
    FindReferences, Progress, SearchEvent, SearchObserver, SearchOutcome, SearchParameters,
    SearchSession, SearchState, SearchTarget,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentBuilder, NameRef, SourcePos, SymbolId};
    use crate::search::UsageMatcher;
    use crate::testing::FixtureFrontEnd;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn pos(line: usize, column: usize) -> SourcePos {
        SourcePos::new(line, column, line * 100 + column)
    }

    fn global(name: &str) -> DeclKey {
        DeclKey::Global(name.to_string())
    }

    fn reference(name: &str, line: usize, column: usize, key: &str, is_declaration: bool) -> NameRef {
        NameRef {
            name: name.to_string(),
            position: pos(line, column),
            length: name.len(),
            key: Some(global(key)),
            is_declaration,
        }
    }

    /// A bound unit including `includes`, with `(name, line, column, key)`
    /// references.
    fn unit(path: &str, includes: &[&str], refs: &[(&str, usize, usize, &str)]) -> Document {
        let mut b = DocumentBuilder::new(path);
        for (i, include) in includes.iter().enumerate() {
            b.add_include(*include, i + 1, Some(PathBuf::from(include)));
        }
        for &(name, line, column, key) in refs {
            b.add_reference(reference(name, line, column, key, false));
        }
        b.bound().build()
    }

    fn sorted(mut usages: Vec<Usage>) -> Vec<(PathBuf, usize, usize)> {
        usages.sort_by(|a, b| (&a.file, a.line, a.column).cmp(&(&b.file, b.line, b.column)));
        usages.into_iter().map(|u| (u.file, u.line, u.column)).collect()
    }

    fn engine(front: FixtureFrontEnd) -> FindReferences {
        let settings = SearchSettings {
            worker_threads: 2,
            poll_interval_ms: 5,
            ..SearchSettings::default()
        };
        FindReferences::new(Arc::new(front), settings).unwrap()
    }

    struct Fixture {
        documents: Vec<Document>,
        snapshot: Arc<Snapshot>,
        working_copy: Arc<WorkingCopy>,
        target: SymbolHandle,
    }

    impl Fixture {
        fn context(&self) -> LookupContext {
            LookupContext::for_symbol(Arc::clone(&self.snapshot), &self.target)
        }

        fn front_end(&self) -> FixtureFrontEnd {
            FixtureFrontEnd::new(self.documents.clone())
        }
    }

    /// `Foo::bar()` declared in a.h, called from a.cpp and b.cpp. c.cpp has
    /// an unrelated `bar` and does not include a.h.
    fn scenario_a() -> Fixture {
        let mut h = DocumentBuilder::new("a.h");
        let foo = h.add_symbol(SymbolId::ROOT, SymbolKind::Class, Some("Foo"), pos(1, 6));
        let bar = h.add_symbol(
            foo,
            SymbolKind::Declaration {
                type_text: "void()".to_string(),
            },
            Some("bar"),
            pos(3, 9),
        );
        h.add_reference(reference("Foo", 1, 6, "Foo", true));
        h.add_reference(reference("bar", 3, 9, "Foo::bar", true));
        let header = h.bound().build();

        let documents = vec![
            header.clone(),
            unit("a.cpp", &["a.h"], &[("Foo", 4, 9, "Foo"), ("bar", 5, 7, "Foo::bar")]),
            unit("b.cpp", &["a.h"], &[("Foo", 2, 11, "Foo"), ("bar", 3, 6, "Foo::bar")]),
            unit("c.cpp", &[], &[("bar", 2, 4, "Other::bar")]),
        ];

        let mut wc = WorkingCopy::new();
        wc.insert("a.h", "class Foo {\npublic:\n    void bar();\n};\n");
        wc.insert("a.cpp", "#include \"a.h\"\n\n\nvoid run(Foo* f) {\n    f->bar();\n}\n");
        wc.insert("b.cpp", "#include \"a.h\"\nvoid other(Foo& g) {\n    g.bar();\n}\n");
        wc.insert("c.cpp", "struct Other { void bar(); };\n    bar();\n");

        Fixture {
            snapshot: Arc::new(Snapshot::from_documents(documents.clone())),
            documents,
            working_copy: Arc::new(wc),
            target: SymbolHandle::new(Arc::new(header), bar),
        }
    }

    #[test]
    fn test_scenario_a_member_function_usages() {
        let fx = scenario_a();
        let engine = engine(fx.front_end());
        let session = engine.start_usage_search(&fx.target, &fx.context(), Arc::clone(&fx.working_copy));
        assert_eq!(session.label(), "Foo::bar");

        let outcome = session.wait();
        assert_eq!(outcome.state, SearchState::Completed);
        assert_eq!(outcome.progress, Progress { completed: 3, total: 3 });
        assert_eq!(
            sorted(outcome.usages.clone()),
            vec![(PathBuf::from("a.cpp"), 5, 7), (PathBuf::from("b.cpp"), 3, 6)]
        );
        let b = outcome.usages.iter().find(|u| u.file == Path::new("b.cpp")).unwrap();
        assert_eq!(b.line_text, "    g.bar();");
        assert!(b.replacement.is_none());
    }

    #[test]
    fn test_panicking_file_contributes_nothing() {
        let fx = scenario_a();
        let engine = engine(fx.front_end().panicking_on("b.cpp"));
        let outcome = engine
            .start_usage_search(&fx.target, &fx.context(), Arc::clone(&fx.working_copy))
            .wait();

        assert_eq!(outcome.state, SearchState::Completed);
        assert_eq!(outcome.progress, Progress { completed: 3, total: 3 });
        assert_eq!(sorted(outcome.usages), vec![(PathBuf::from("a.cpp"), 5, 7)]);
    }

    #[test]
    fn test_scenario_b_forward_declared_class_broadcasts() {
        let mut fwd = DocumentBuilder::new("fwd.h");
        fwd.add_symbol(
            SymbolId::ROOT,
            SymbolKind::ForwardClassDeclaration,
            Some("Foo"),
            pos(1, 6),
        );
        fwd.add_reference(reference("Foo", 1, 6, "Foo", true));
        let mut def = DocumentBuilder::new("a.h");
        let foo = def.add_symbol(SymbolId::ROOT, SymbolKind::Class, Some("Foo"), pos(1, 6));
        def.add_reference(reference("Foo", 1, 6, "Foo", true));
        let def = def.bound().build();

        let documents = vec![
            fwd.bound().build(),
            def.clone(),
            unit("c.cpp", &["fwd.h"], &[("Foo", 4, 4, "Foo")]),
            unit("d.cpp", &[], &[("Bar", 1, 0, "Bar")]),
        ];
        let mut wc = WorkingCopy::new();
        for doc in &documents {
            wc.insert(doc.path(), "\n\n\nFoo* ptr = nullptr;\n");
        }
        let snapshot = Arc::new(Snapshot::from_documents(documents.clone()));
        let target = SymbolHandle::new(Arc::new(def), foo);
        let context = LookupContext::for_symbol(Arc::clone(&snapshot), &target);

        let engine = engine(FixtureFrontEnd::new(documents));
        let outcome = engine
            .start_usage_search(&target, &context, Arc::new(wc))
            .wait();
        assert_eq!(outcome.state, SearchState::Completed);
        // a.h, c.cpp and fwd.h mention Foo; d.cpp does not.
        assert_eq!(outcome.progress.total, 3);
        assert_eq!(sorted(outcome.usages), vec![(PathBuf::from("c.cpp"), 4, 4)]);
    }

    #[test]
    fn test_scenario_c_macro_usages_without_parsing() {
        let mut header = DocumentBuilder::new("m.h");
        let max = header.add_macro("MAX", pos(1, 0), 40);
        let mut d = DocumentBuilder::new("d.cpp");
        d.add_include("m.h", 1, Some(PathBuf::from("m.h")));
        d.add_macro_use(max.clone(), pos(10, 8), 3);
        let documents = vec![header.build(), d.bound().build()];

        let mut wc = WorkingCopy::new();
        wc.insert("m.h", "#define MAX(a, b) ((a) > (b) ? (a) : (b))\n");
        wc.insert("d.cpp", format!("#include \"m.h\"{}\nint x = MAX(1, 2);\n", "\n".repeat(8)));

        let front = FixtureFrontEnd::new(documents.clone());
        let parses = front.parse_counter();
        let engine = engine(front);
        let session = engine.start_macro_usage_search(
            &max,
            Arc::new(Snapshot::from_documents(documents)),
            Arc::new(wc),
        );
        assert_eq!(session.label(), "MAX");

        let outcome = session.wait();
        assert_eq!(outcome.state, SearchState::Completed);
        assert_eq!(outcome.progress, Progress { completed: 2, total: 2 });
        assert_eq!(outcome.usages.len(), 2);
        assert_eq!(outcome.usages[0].file, PathBuf::from("m.h"));
        assert_eq!(outcome.usages[0].column, 8);
        assert_eq!(outcome.usages[1].file, PathBuf::from("d.cpp"));
        assert_eq!(outcome.usages[1].line, 10);
        assert_eq!(outcome.usages[1].line_text, "int x = MAX(1, 2);");
        assert_eq!(parses.get(), 0);
    }

    #[test]
    fn test_scenario_d_rename_annotates_usages() {
        let fx = scenario_a();
        let engine = engine(fx.front_end());
        let plain = engine
            .start_usage_search(&fx.target, &fx.context(), Arc::clone(&fx.working_copy))
            .wait();
        let session = engine.start_rename_search(
            &fx.target,
            &fx.context(),
            Arc::clone(&fx.working_copy),
            "baz",
        );
        assert!(session.parameters().is_replace);
        assert_eq!(session.parameters().replacement.as_deref(), Some("baz"));

        let renamed = session.wait();
        assert_eq!(renamed.usages.len(), 2);
        assert!(renamed
            .usages
            .iter()
            .all(|u| u.replacement.as_deref() == Some("baz")));
        assert_eq!(sorted(renamed.usages), sorted(plain.usages));
    }

    #[test]
    fn test_rename_defaults_to_identifier() {
        let fx = scenario_a();
        let engine = engine(fx.front_end());
        let session = engine.start_rename_search(&fx.target, &fx.context(), Arc::clone(&fx.working_copy), "");
        assert_eq!(session.parameters().replacement.as_deref(), Some("bar"));
        assert_eq!(session.wait().state, SearchState::Completed);
    }

    #[test]
    fn test_unnamed_symbol_fails_up_front() {
        let mut b = DocumentBuilder::new("a.cpp");
        let func = b.add_symbol(SymbolId::ROOT, SymbolKind::Function, Some("run"), pos(1, 5));
        let block = b.add_symbol(func, SymbolKind::Block, None, pos(1, 11));
        let doc = b.bound().build();
        let snapshot = Arc::new(Snapshot::from_documents(vec![doc.clone()]));
        let target = SymbolHandle::new(Arc::new(doc.clone()), block);
        let context = LookupContext::for_symbol(snapshot, &target);

        let engine = engine(FixtureFrontEnd::new(vec![doc]));
        let session = engine.start_usage_search(&target, &context, Arc::new(WorkingCopy::new()));
        assert_eq!(session.state(), SearchState::Failed);
        let outcome = session.wait();
        assert_eq!(outcome.state, SearchState::Failed);
        assert!(outcome.usages.is_empty());
        assert_eq!(outcome.progress.total, 0);
    }

    #[test]
    fn test_cancel_after_first_file() {
        let fx = scenario_a();
        // a.h gets a usage of its own and two more includers.
        let mut h = DocumentBuilder::new("a.h");
        let foo = h.add_symbol(SymbolId::ROOT, SymbolKind::Class, Some("Foo"), pos(1, 6));
        let bar = h.add_symbol(
            foo,
            SymbolKind::Declaration {
                type_text: "void()".to_string(),
            },
            Some("bar"),
            pos(3, 9),
        );
        h.add_reference(reference("bar", 3, 9, "Foo::bar", true));
        h.add_reference(reference("bar", 5, 4, "Foo::bar", false));
        let header = h.bound().build();
        let mut documents = vec![header.clone()];
        documents.extend(fx.documents.iter().skip(1).cloned());
        documents.push(unit("e.cpp", &["a.h"], &[("bar", 1, 0, "Foo::bar")]));

        let mut wc = WorkingCopy::new();
        for doc in &documents {
            wc.insert(doc.path(), "bar();\n");
        }
        let snapshot = Arc::new(Snapshot::from_documents(documents.clone()));
        let target = SymbolHandle::new(Arc::new(header), bar);
        let context = LookupContext::for_symbol(Arc::clone(&snapshot), &target);

        let (front, gate) = FixtureFrontEnd::new(documents).gated();
        let engine = engine(front);
        let session = engine.start_usage_search(&target, &context, Arc::new(wc));
        let events = session.events().unwrap();

        // a.h is reused without parsing; every other file waits on the gate.
        loop {
            match events.recv_timeout(Duration::from_secs(10)) {
                Ok(SearchEvent::Progress(p)) if p.completed == 1 => break,
                Ok(_) => continue,
                Err(e) => panic!("no progress: {}", e),
            }
        }
        session.cancel();
        gate.open();

        let outcome = session.wait();
        assert_eq!(outcome.state, SearchState::Cancelled);
        assert_eq!(outcome.progress.total, 4);
        assert!(outcome.progress.completed < outcome.progress.total);
        assert_eq!(sorted(outcome.usages), vec![(PathBuf::from("a.h"), 5, 4)]);

        let rest: Vec<SearchEvent> = events.try_iter().collect();
        assert_eq!(rest, vec![SearchEvent::Finished(SearchState::Cancelled)]);
    }

    #[test]
    fn test_concurrent_matches_sequential() {
        let fx = scenario_a();
        let front: Arc<dyn FrontEnd> = Arc::new(fx.front_end());
        let matcher = UsageMatcher::new(
            Arc::clone(&fx.snapshot),
            Arc::clone(&fx.working_copy),
            Arc::clone(&front),
            Arc::new(AtomicBool::new(false)),
        )
        .with_this_document(Arc::clone(fx.target.document()));
        let query = search::SymbolQuery {
            key: fx.target.key(),
            identifier: "bar".to_string(),
            replacement: None,
        };
        let mut sequential = Vec::new();
        for path in fx.snapshot.paths() {
            sequential.extend(matcher.match_symbol(path, &query));
        }

        let engine = FindReferences::new(front, SearchSettings::default()).unwrap();
        let concurrent = engine
            .start_usage_search(&fx.target, &fx.context(), Arc::clone(&fx.working_copy))
            .wait();
        assert_eq!(sorted(concurrent.usages), sorted(sequential));
    }

    #[test]
    fn test_observer_sees_whole_search() {
        #[derive(Default)]
        struct Totals {
            usages: usize,
            finished: Option<SearchState>,
        }
        struct Collect(Arc<Mutex<Totals>>);
        impl SearchObserver for Collect {
            fn on_usage_batch(&mut self, usages: &[Usage]) {
                self.0.lock().unwrap().usages += usages.len();
            }
            fn on_finished(&mut self, state: SearchState) {
                self.0.lock().unwrap().finished = Some(state);
            }
        }

        let fx = scenario_a();
        let engine = engine(fx.front_end());
        let totals = Arc::new(Mutex::new(Totals::default()));
        let session = engine.start_usage_search(&fx.target, &fx.context(), Arc::clone(&fx.working_copy));
        session.subscribe(Box::new(Collect(Arc::clone(&totals))));
        session.wait();

        let totals = totals.lock().unwrap();
        assert_eq!(totals.usages, 2);
        assert_eq!(totals.finished, Some(SearchState::Completed));
    }

    #[test]
    fn test_search_again_relocates_symbol() {
        let fx = scenario_a();
        let engine = engine(fx.front_end());
        let first = engine.start_usage_search(&fx.target, &fx.context(), Arc::clone(&fx.working_copy));
        first.wait();

        // A new includer of a.h that never mentions bar.
        let edited = fx.snapshot.with_document(unit("e.cpp", &["a.h"], &[]));
        let again = engine.search_again(&first, Arc::new(edited), Arc::clone(&fx.working_copy));
        assert_ne!(again.id(), first.id());
        assert_eq!(again.label(), "Foo::bar");

        let outcome = again.wait();
        assert_eq!(outcome.state, SearchState::Completed);
        assert_eq!(outcome.progress.total, 4);
        assert_eq!(outcome.usages.len(), 2);
    }

    #[test]
    fn test_search_again_stale_target_is_empty() {
        let fx = scenario_a();
        let engine = engine(fx.front_end());
        let first = engine.start_usage_search(&fx.target, &fx.context(), Arc::clone(&fx.working_copy));
        first.wait();

        let without_header = Snapshot::from_documents(fx.documents.iter().skip(1).cloned());
        let again = engine.search_again(&first, Arc::new(without_header), Arc::clone(&fx.working_copy));
        let outcome = again.wait();
        assert_eq!(outcome.state, SearchState::Completed);
        assert!(outcome.usages.is_empty());
        assert_eq!(outcome.progress, Progress::default());
    }

    #[test]
    fn test_references_in_this_document() {
        let fx = scenario_a();
        let engine = engine(fx.front_end());
        let refs = engine.references(&fx.target, &fx.context(), &fx.working_copy);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].line_text, "    void bar();");
    }

    #[test]
    fn test_dependency_table_reused_per_generation() {
        let fx = scenario_a();
        let engine = engine(fx.front_end());
        let a = engine.update_dependency_table(&fx.snapshot);
        let b = engine.update_dependency_table(&fx.snapshot);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.files_depending_on(Path::new("a.h")).len(), 2);
    }

    #[test]
    fn test_end_to_end_with_cpp_front_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.h"), "class Foo {\npublic:\n    void bar();\n};\n").unwrap();
        std::fs::write(
            dir.path().join("a.cpp"),
            "#include \"a.h\"\nvoid Foo::bar() {}\nvoid run(Foo* f) {\n    f->bar();\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.cpp"),
            "#include \"a.h\"\nvoid other(Foo& g) {\n    g.bar();\n}\n",
        )
        .unwrap();

        let front_end = Arc::new(CppFrontEnd::new());
        let snapshot = build_snapshot(dir.path(), &IndexSettings::default(), &*front_end).unwrap();
        let snapshot = Arc::new(snapshot);
        let engine = FindReferences::new(front_end, SearchSettings::default()).unwrap();

        let symbol = snapshot.symbol_at(&dir.path().join("b.cpp"), 3, 6).unwrap();
        assert_eq!(symbol.label(), "Foo::bar");
        let context = LookupContext::for_symbol(Arc::clone(&snapshot), &symbol);
        let outcome = engine
            .start_usage_search(&symbol, &context, Arc::new(WorkingCopy::new()))
            .wait();

        assert_eq!(outcome.state, SearchState::Completed);
        assert_eq!(
            sorted(outcome.usages),
            vec![
                (dir.path().join("a.cpp"), 4, 7),
                (dir.path().join("b.cpp"), 3, 6),
            ]
        );
    }

    fn usages_from_header(header: &str, unit: &str, line: usize, column: usize) -> (String, Vec<(PathBuf, usize, usize)>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("h.h"), header).unwrap();
        std::fs::write(dir.path().join("a.cpp"), unit).unwrap();
        std::fs::write(dir.path().join("other.cpp"), "int helper() { return 2; }\nint counter = 3;\n").unwrap();

        let front_end = Arc::new(CppFrontEnd::new());
        let snapshot = Arc::new(build_snapshot(dir.path(), &IndexSettings::default(), &*front_end).unwrap());
        let engine = FindReferences::new(front_end, SearchSettings::default()).unwrap();

        let symbol = snapshot.symbol_at(&dir.path().join("h.h"), line, column).unwrap();
        let context = LookupContext::for_symbol(Arc::clone(&snapshot), &symbol);
        let outcome = engine
            .start_usage_search(&symbol, &context, Arc::new(WorkingCopy::new()))
            .wait();
        assert_eq!(outcome.state, SearchState::Completed);

        let relative = sorted(outcome.usages)
            .into_iter()
            .map(|(file, line, column)| (file.strip_prefix(dir.path()).unwrap().to_path_buf(), line, column))
            .collect();
        (symbol.label(), relative)
    }

    #[test]
    fn test_header_static_found_in_includer() {
        let (label, usages) = usages_from_header(
            "static int helper() { return 1; }\n",
            "#include \"h.h\"\nint main() { return helper(); }\n",
            1,
            11,
        );
        assert_eq!(label, "helper");
        assert_eq!(usages, vec![(PathBuf::from("a.cpp"), 2, 20)]);
    }

    #[test]
    fn test_header_anonymous_namespace_found_in_includer() {
        let (label, usages) = usages_from_header(
            "namespace {\nint counter = 0;\n}\n",
            "#include \"h.h\"\nint next() { return ++counter; }\n",
            2,
            4,
        );
        assert_eq!(label, "counter");
        assert_eq!(usages, vec![(PathBuf::from("a.cpp"), 2, 22)]);
    }
}
