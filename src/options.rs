//! Process-wide options (spec.md §6), parsed with `clap` the same way
//! `examples/foundry-rs-foundry/benches/src/main.rs`'s `Cli` struct derives
//! from `clap::Parser`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Which sub-stage wait policy the scheduler applies to each dependency
/// edge (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Downstream outline waits only on the upstream's `outline_done` for
    /// Outline-classed edges; Macro/Plugin edges still wait on `java_done`.
    Pipeline,
    /// Every dependency, regardless of class, is waited on via `java_done`.
    Traditional,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Pipeline
    }
}

/// Positional arguments and process options for a single build invocation.
#[derive(Debug, Parser)]
#[command(name = "pipeline-build", about = "Pipelined parallel build driver")]
pub struct BuildOptions {
    /// Either a single directory (scanned recursively for `*.args` files)
    /// or an explicit list of argument-file paths.
    pub inputs: Vec<PathBuf>,

    /// Scheduling strategy.
    #[arg(long, value_enum, default_value_t = Strategy::Pipeline)]
    pub strategy: Strategy,

    /// Maximum number of worker threads. Defaults to the available
    /// parallelism.
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Root directory for the summary cache. Defaults to a fresh temporary
    /// directory removed at process exit.
    #[arg(long)]
    pub pickle_cache: Option<PathBuf>,

    /// Package exported summaries into an archive instead of a directory
    /// tree.
    #[arg(long)]
    pub use_jar: bool,

    /// Forwarded to the front end; this driver only threads the flag
    /// through, it never inspects it.
    #[arg(long)]
    pub cache_macro_classloader: bool,

    /// Forwarded to the front end; this driver only threads the flag
    /// through, it never inspects it.
    #[arg(long)]
    pub cache_plugin_classloader: bool,

    /// Name embedded in the trace file (`build-<label>.trace`) and log
    /// lines for this run.
    #[arg(long, default_value = "build")]
    pub label: String,

    /// Increase log verbosity; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Directory `projects.dot` and the trace file are written to.
    /// Defaults to the current directory.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

impl BuildOptions {
    pub fn parallelism(&self) -> usize {
        self.parallelism.unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }

    pub fn out_dir(&self) -> PathBuf {
        self.out_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_is_pipeline() {
        assert_eq!(Strategy::default(), Strategy::Pipeline);
    }
}
