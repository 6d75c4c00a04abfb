//! Driver (component C8).
//!
//! Parses process-wide options, expands a single directory argument into
//! the recursive set of argument files, wires the default (reference)
//! compiler set, runs the Scheduler, and maps the result to a process exit
//! code: `0` success, `1` build failure, `-1` on an uncaught worker panic.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use pipeline_build::cache::SummaryCache;
use pipeline_build::compilers::reference::{
    ReferenceFrontEndFactory, ReferencePickleExtractor, ReferenceSecondaryCompiler,
};
use pipeline_build::exporter::Exporter;
use pipeline_build::options::BuildOptions;
use pipeline_build::parser::{self, ARGS_FILE_EXT};
use pipeline_build::report::Reporter;
use pipeline_build::runner::Runner;
use pipeline_build::scheduler::Scheduler;
use pipeline_build::Project;

fn main() {
    let options = BuildOptions::parse();
    init_logging(options.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(options.parallelism())
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start the worker pool: {e}");
            std::process::exit(-1);
        }
    };

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(run(options))));

    match outcome {
        Ok(Ok(true)) => std::process::exit(0),
        Ok(Ok(false)) => std::process::exit(1),
        Ok(Err(e)) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            eprintln!("uncaught worker exception: {message}");
            std::process::exit(-1);
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(options: BuildOptions) -> pipeline_build::Result<bool> {
    let reporter = Arc::new(Reporter::new());

    let args_files = discover_argument_files(&options.inputs);
    let mut projects: Vec<Project> = Vec::with_capacity(args_files.len());
    for path in &args_files {
        match parser::parse_argument_file(path) {
            Ok(project) => projects.push(project),
            Err(e) => reporter.error(&e.to_string()),
        }
    }
    if reporter.has_errors() {
        return Ok(false);
    }

    let cache = match &options.pickle_cache {
        Some(root) => Arc::new(SummaryCache::persistent(root.clone(), options.use_jar)),
        None => Arc::new(SummaryCache::ephemeral(options.use_jar)?),
    };
    let exporter = Arc::new(Exporter::new(cache.clone(), Arc::new(ReferencePickleExtractor), options.use_jar));
    let runner = Arc::new(Runner::new(
        Arc::new(ReferenceFrontEndFactory),
        Arc::new(ReferenceSecondaryCompiler),
        exporter.clone(),
        cache,
    ));

    let scheduler = Scheduler::new(runner, exporter, reporter.clone(), options.strategy, options.parallelism());
    let summary = scheduler.run(projects, &options.out_dir(), &options.label).await?;

    reporter.echo(&format!("build finished in {:.1}ms", summary.wall_clock_ms));
    if !summary.failed_projects.is_empty() {
        reporter.error(&format!("failed projects: {}", summary.failed_projects.join(", ")));
    }
    Ok(summary.success)
}

/// A single directory argument is scanned recursively for files ending in
/// `.args`; otherwise the inputs are taken literally as argument-file
/// paths (spec.md §4.8).
fn discover_argument_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    if let [only] = inputs {
        if only.is_dir() {
            let mut files: Vec<PathBuf> = walkdir::WalkDir::new(only)
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .map(walkdir::DirEntry::into_path)
                .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(ARGS_FILE_EXT))
                .collect();
            files.sort();
            return files;
        }
    }
    inputs.to_vec()
}
