//! Data model (spec.md §3): [`Project`], [`Group`] and the single-shot
//! [`Signal`] completion primitive every stage resolves exactly once.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::watch;

use crate::compilers::CompilerSettings;
use crate::error::{BuildError, Result};
use crate::timer::Timer;

/// Outcome carried by a completed [`Signal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalResult {
    Success,
    Failure(String),
}

impl SignalResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SignalResult::Success)
    }
}

/// A write-once cell with a multi-consumer async await, modeled the same
/// way `examples/gakonst-ethers-rs`'s IPC transport models a pending
/// request: a channel half kept around for any number of waiters to poll.
/// Unlike a `oneshot::Receiver` (single-consumer), we keep a
/// `watch::Receiver`, which can be cloned freely, and layer write-once
/// enforcement on top with an `AtomicBool` guard — `watch` itself is fine
/// with repeated sends, but spec.md invariant 3 requires at-most-once
/// completion per signal.
#[derive(Debug)]
pub struct Signal {
    tx: watch::Sender<Option<SignalResult>>,
    rx: watch::Receiver<Option<SignalResult>>,
    completed: AtomicBool,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self { tx, rx, completed: AtomicBool::new(false) }
    }

    /// Completes the signal. Errors if it was already completed.
    pub fn complete(&self, result: SignalResult) -> Result<()> {
        if self.completed.swap(true, Ordering::SeqCst) {
            return Err(BuildError::DoubleCompletion(self.debug_label()));
        }
        let _ = self.tx.send(Some(result));
        Ok(())
    }

    /// Completes the signal, but tolerates being called after the signal
    /// already resolved — used on failure paths (spec.md §7) where both the
    /// outline and group signals of a failing project are marked failed and
    /// either may already have resolved.
    pub fn complete_idempotent(&self, result: SignalResult) {
        if !self.completed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Some(result));
        }
    }

    /// Awaits completion, returning the resolved result to any number of
    /// concurrent callers.
    pub async fn wait(&self) -> SignalResult {
        let mut rx = self.rx.clone();
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return SignalResult::Failure("signal sender dropped without completing".into());
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn peek(&self) -> Option<SignalResult> {
        self.rx.borrow().clone()
    }

    fn debug_label(&self) -> String {
        format!("{:p}", self)
    }
}

/// A batch of source files compiled together in one front-end run
/// (spec.md GLOSSARY — Group).
#[derive(Debug)]
pub struct Group {
    pub id: usize,
    pub files: Vec<PathBuf>,
    pub timer: Mutex<Timer>,
    pub done: Signal,
}

impl Group {
    pub fn new(id: usize, files: Vec<PathBuf>) -> Self {
        Self { id, timer: Mutex::new(Timer::new(format!("group-{id}"))), files, done: Signal::new() }
    }
}

/// One compilation unit (spec.md §3 — "Project", internally called `Task`
/// in the source this was distilled from).
#[derive(Debug)]
pub struct Project {
    pub label: String,
    pub args_file: PathBuf,
    pub output_dir: PathBuf,
    pub source_files: Vec<PathBuf>,
    pub classpath: Vec<PathBuf>,
    pub macro_classpath: Vec<PathBuf>,
    pub plugin_classpath: Vec<PathBuf>,
    pub settings: CompilerSettings,

    pub groups: Vec<Group>,

    pub outline_done: Signal,
    pub java_done: Signal,

    pub outline_timer: Mutex<Timer>,
    pub pickle_export_timer: Mutex<Timer>,
    pub java_timer: Mutex<Timer>,

    pub outline_critical_path_ms: Mutex<Option<f64>>,
    pub regular_critical_path_ms: Mutex<Option<f64>>,
    pub full_critical_path_ms: Mutex<Option<f64>>,
}

impl Project {
    pub fn new(
        label: String,
        args_file: PathBuf,
        output_dir: PathBuf,
        source_files: Vec<PathBuf>,
        classpath: Vec<PathBuf>,
        macro_classpath: Vec<PathBuf>,
        plugin_classpath: Vec<PathBuf>,
        settings: CompilerSettings,
        groups: Vec<Group>,
    ) -> Self {
        Self {
            label: label.clone(),
            args_file,
            output_dir,
            source_files,
            classpath,
            macro_classpath,
            plugin_classpath,
            settings,
            groups,
            outline_done: Signal::new(),
            java_done: Signal::new(),
            outline_timer: Mutex::new(Timer::new(format!("{label}-outline"))),
            pickle_export_timer: Mutex::new(Timer::new(format!("{label}-pickle-export"))),
            java_timer: Mutex::new(Timer::new(format!("{label}-java"))),
            outline_critical_path_ms: Mutex::new(None),
            regular_critical_path_ms: Mutex::new(None),
            full_critical_path_ms: Mutex::new(None),
        }
    }

    /// Collapses `groups` to a single group over every source file.
    /// Called by the scheduler for every project when the pipeline
    /// strategy is active (invariant 4: `groups.len == 1` under pipeline).
    pub fn collapse_to_single_group(&mut self) {
        if self.groups.len() == 1 {
            return;
        }
        self.groups = vec![Group::new(0, self.source_files.clone())];
    }

    /// Whether any of this project's sources are in the secondary language
    /// (spec.md §4.6 `java_compile`).
    pub fn has_secondary_sources(&self) -> bool {
        self.source_files.iter().any(|p| is_secondary_source(p))
    }

    pub fn secondary_sources(&self) -> Vec<PathBuf> {
        self.source_files.iter().filter(|p| is_secondary_source(p)).cloned().collect()
    }
}

/// Extension used for the secondary-language source files (spec.md §6).
pub const SECONDARY_SOURCE_EXT: &str = "java";

pub fn is_secondary_source(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case(SECONDARY_SOURCE_EXT)).unwrap_or(false)
}
