//! findrefs CLI - find usages and rename in C/C++ code.
//!
//! Usage:
//!   findrefs usages <file> <line> <column>            # Usages of the symbol under the cursor
//!   findrefs rename <file> <line> <column> <name>     # Rename preview
//!   findrefs rename <file> <line> <column> <name> --apply
//!   findrefs macro <file> <name>                      # Expansions of a macro
//!   findrefs stats                                    # Snapshot statistics

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use findrefs::graph::scan_stats;
use findrefs::{
    build_snapshot, CppFrontEnd, DiskReplacer, FindRefsConfig, FindRefsError, FindReferences, LookupContext,
    Progress, ReplacePrimitive, SearchObserver, SearchOutcome, SearchSession, SearchState,
    Snapshot, SymbolHandle, WorkingCopy,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "findrefs")]
#[command(about = "findrefs - find usages and rename for C/C++", long_about = None)]
struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Config file (default: <root>/.findrefs/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find all usages of the symbol at a position
    Usages {
        /// Source file, relative to the root
        file: PathBuf,
        /// Line (1-based)
        line: usize,
        /// Column (1-based)
        column: usize,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find the usages a rename would touch, and optionally apply it
    Rename {
        file: PathBuf,
        line: usize,
        column: usize,
        /// New name
        new_name: String,
        /// Rewrite the files on disk
        #[arg(long)]
        apply: bool,
        #[arg(long)]
        json: bool,
    },

    /// Find all expansions of a macro defined in a file
    Macro {
        /// File containing the #define
        file: PathBuf,
        /// Macro name
        name: String,
        #[arg(long)]
        json: bool,
    },

    /// Show snapshot and include graph statistics
    Stats,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = cli.root.canonicalize().unwrap_or(cli.root);
    let config_path = cli
        .config
        .unwrap_or_else(|| root.join(".findrefs").join("config.toml"));
    let config = FindRefsConfig::load(&config_path);

    match cli.command {
        Commands::Stats => print_stats(&root, &config),
        command => search(command, &root, &config),
    }
}

fn search(command: Commands, root: &Path, config: &FindRefsConfig) -> Result<()> {
    let front_end = Arc::new(CppFrontEnd::new());
    let start = Instant::now();
    let snapshot = build_snapshot(root, &config.index, &*front_end)
        .with_context(|| format!("cannot index {}", root.display()))?;
    eprintln!(
        "Indexed {} files in {:.2}s",
        snapshot.len(),
        start.elapsed().as_secs_f64()
    );
    let snapshot = Arc::new(snapshot);
    let engine = FindReferences::new(front_end, config.search.clone())?;
    let working_copy = Arc::new(WorkingCopy::new());

    match command {
        Commands::Usages {
            file,
            line,
            column,
            json,
        } => {
            let symbol = symbol_at(&snapshot, root, &file, line, column)?;
            let context = LookupContext::for_symbol(Arc::clone(&snapshot), &symbol);
            let session = engine.start_usage_search(&symbol, &context, working_copy);
            let outcome = finish(&session)?;
            print_outcome(&session, &outcome, json)?;
        }

        Commands::Rename {
            file,
            line,
            column,
            new_name,
            apply,
            json,
        } => {
            let symbol = symbol_at(&snapshot, root, &file, line, column)?;
            let context = LookupContext::for_symbol(Arc::clone(&snapshot), &symbol);
            let session = engine.start_rename_search(&symbol, &context, working_copy, &new_name);
            let outcome = finish(&session)?;
            print_outcome(&session, &outcome, json)?;

            if apply {
                let text = session.parameters().replacement.clone().unwrap_or(new_name);
                let changed = DiskReplacer::new().replace_all(&text, &outcome.usages)?;
                eprintln!("Rewrote {} files", changed.len());
                for path in changed {
                    eprintln!("  {}", display_path(root, &path));
                }
            }
        }

        Commands::Macro { file, name, json } => {
            let path = resolve(root, &file);
            let definition = snapshot
                .document(&path)
                .and_then(|doc| doc.find_macro(&name))
                .cloned()
                .ok_or_else(|| {
                    FindRefsError::SymbolNotFound(format!("macro {} in {}", name, file.display()))
                })?;
            let session = engine.start_macro_usage_search(&definition, snapshot, working_copy);
            let outcome = finish(&session)?;
            print_outcome(&session, &outcome, json)?;
        }

        Commands::Stats => print_stats(root, config)?,
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────

fn resolve(root: &Path, file: &Path) -> PathBuf {
    let joined = root.join(file);
    joined.canonicalize().unwrap_or(joined)
}

fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn symbol_at(snapshot: &Snapshot, root: &Path, file: &Path, line: usize, column: usize) -> Result<SymbolHandle> {
    if line == 0 || column == 0 {
        bail!("line and column are 1-based");
    }
    let path = resolve(root, file);
    if !snapshot.contains(&path) {
        bail!("{} is not part of the indexed sources", file.display());
    }
    snapshot
        .symbol_at(&path, line, column - 1)
        .ok_or_else(|| {
            FindRefsError::SymbolNotFound(format!("{}:{}:{}", file.display(), line, column)).into()
        })
}

/// Reports progress on stderr.
struct ProgressReporter;

impl SearchObserver for ProgressReporter {
    fn on_progress(&mut self, progress: Progress) {
        eprint!("\rSearching... {}", progress);
        let _ = std::io::stderr().flush();
    }

    fn on_finished(&mut self, state: SearchState) {
        eprintln!(" ({})", state);
    }
}

fn finish(session: &SearchSession) -> Result<SearchOutcome> {
    session.subscribe(Box::new(ProgressReporter));
    let outcome = session.wait();
    if outcome.state == SearchState::Failed {
        bail!("could not search for {}", session.label());
    }
    Ok(outcome)
}

fn print_outcome(session: &SearchSession, outcome: &SearchOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!("{} ({} usages)", session.label(), outcome.usages.len());
    println!("══════════════════════════");
    let mut usages = outcome.usages.clone();
    usages.sort_by(|a, b| (&a.file, a.line, a.column).cmp(&(&b.file, b.line, b.column)));
    for usage in usages {
        let replacement = usage
            .replacement
            .as_deref()
            .map(|r| format!("  -> {}", r))
            .unwrap_or_default();
        println!(
            "{}:{}:{}: {}{}",
            usage.file.display(),
            usage.line,
            usage.column + 1,
            usage.line_text.trim(),
            replacement
        );
    }
    Ok(())
}

fn print_stats(root: &Path, config: &FindRefsConfig) -> Result<()> {
    let scan = scan_stats(root, &config.index);
    println!("findrefs - Snapshot Statistics");
    println!("══════════════════════════════");
    println!("{}", scan);

    let front_end = Arc::new(CppFrontEnd::new());
    let snapshot = build_snapshot(root, &config.index, &*front_end)?;
    let engine = FindReferences::new(front_end, config.search.clone())?;
    let graph = engine.update_dependency_table(&snapshot);
    println!("Parsed:  {} files", snapshot.len());
    println!("Include: {}", graph.stats());
    println!("Workers: {}", engine.worker_threads());
    Ok(())
}
