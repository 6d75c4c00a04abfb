//! A pipelined parallel build driver.
//!
//! The crate schedules a dependency graph of [`Project`]s, each of which
//! compiles through a two-phase front end/back end, so that a downstream
//! project can start type-checking against an upstream's *symbol summary*
//! well before the upstream has finished emitting object code.
//!
//! See the module-level docs on [`scheduler`] for the pipelining strategy
//! and [`graph`] for how the dependency DAG is classified.

#[macro_use]
extern crate tracing;

pub mod cache;
pub mod compilers;
pub mod error;
pub mod exporter;
pub mod graph;
pub mod options;
pub mod parser;
pub mod project;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod timer;
pub mod trace;

pub use error::{BuildError, Result};
pub use graph::Dag;
pub use options::{BuildOptions, Strategy};
pub use project::Project;
pub use scheduler::{BuildSummary, Scheduler};
