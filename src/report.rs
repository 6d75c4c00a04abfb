//! The process-wide progress reporter (spec.md §5: "a single process-wide
//! instance used from the scheduling thread only; per-project compiler
//! instances carry their own reporters").
//!
//! This crate's compiler contract (§6) hands every [`CompileReport`] back
//! directly rather than asking the front end to share this reporter, so in
//! practice `Reporter` here only serves the scheduler-level echo/progress
//! lines; it's kept as its own type instead of `println!`-ing inline
//! because spec.md calls it out as a distinct component with its own
//! has_errors/flush/finish-shaped lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct Reporter {
    errors: AtomicUsize,
    warnings: AtomicUsize,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echo(&self, message: &str) {
        info!("{message}");
        println!("{message}");
    }

    pub fn error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        error!("{message}");
        eprintln!("error: {message}");
    }

    pub fn warn(&self, message: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        warn!("{message}");
        eprintln!("warning: {message}");
    }

    pub fn has_errors(&self) -> bool {
        self.errors.load(Ordering::SeqCst) > 0
    }

    /// Flushes buffered output. `println!`/`eprintln!` are unbuffered line
    /// writers in this implementation, so this is a no-op kept for contract
    /// symmetry with the front end's own `reporter.flush()` (spec.md §6).
    pub fn flush(&self) {}

    /// Returns whether the run, as observed through this reporter, should
    /// be considered successful.
    pub fn finish(&self) -> bool {
        !self.has_errors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_error_count() {
        let r = Reporter::new();
        assert!(r.finish());
        r.error("boom");
        assert!(r.has_errors());
        assert!(!r.finish());
    }
}
