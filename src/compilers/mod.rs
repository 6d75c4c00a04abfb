//! External collaborator contracts (spec.md §6).
//!
//! The front-end/back-end compilers and the secondary-language compiler are
//! black boxes; this module defines the narrow trait surface the rest of
//! the crate needs from them, plus a deterministic reference
//! implementation (`reference`) used by the driver's default wiring and by
//! the test suite. Swapping in a real compiler means implementing
//! [`FrontEndFactory`]/[`FrontEndCompiler`]/[`SecondaryCompiler`]/
//! [`PickleExtractor`] against the real tool and handing the driver that
//! implementation instead.

pub mod reference;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

/// Opaque bag of parsed front-end options (spec.md §6's "Settings record").
/// The driver only needs to carry it from the argument-file parser to
/// compiler construction; it never inspects the contents.
#[derive(Debug, Clone, Default)]
pub struct CompilerSettings {
    pub output_dir: PathBuf,
    pub classpath: Vec<PathBuf>,
    pub extra_args: Vec<String>,
}

/// One exported symbol signature: a name, the chain of enclosing symbols
/// (used to derive the `.sig` file's directory), and the summary bytes.
/// `data` is reference-counted so exporters can dedupe by buffer identity
/// (`Arc::ptr_eq`) the way spec.md §9's design note recommends, without
/// copying the bytes to compare them.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub owner_chain: Vec<String>,
    pub name: String,
    pub data: Arc<Vec<u8>>,
}

/// The symbol table materialized at the outline/pickler phase boundary.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    pub symbols: Vec<Symbol>,
}

/// Diagnostics produced by one `compile()` call.
#[derive(Debug, Default, Clone)]
pub struct CompileReport {
    pub has_errors: bool,
    pub messages: Vec<String>,
}

/// The front end's narrow contract: construct, compile (observing the
/// phase-advance callback once), close.
pub trait FrontEndCompiler: Send {
    /// Compiles `files`. `on_outline` must be invoked exactly once, at the
    /// summary-materialization phase boundary, with the symbols known at
    /// that point. Returns the final compile report once the whole run
    /// (not just the outline phase) has finished.
    fn compile(
        &mut self,
        files: &[PathBuf],
        on_outline: &mut (dyn FnMut(&SymbolTable) + Send),
    ) -> Result<CompileReport>;

    fn close(&mut self);
}

/// Constructs front-end instances from settings. A project's pipeline path
/// constructs one instance and keeps it until the whole pipeline closes; a
/// leaf/traditional project constructs one fresh instance per group.
pub trait FrontEndFactory: Send + Sync {
    fn new_compiler(&self, settings: &CompilerSettings) -> Box<dyn FrontEndCompiler>;
}

/// The secondary-language compiler's narrow contract (spec.md §6).
pub trait SecondaryCompiler: Send + Sync {
    fn compile(&self, output_dir: &Path, classpath: &[PathBuf], files: &[PathBuf]) -> Result<bool>;
}

/// The pickle extractor's narrow contract (spec.md §6).
pub trait PickleExtractor: Send + Sync {
    fn process(&self, input_archive: &Path, output_archive: &Path) -> Result<()>;
}
