//! Crate-wide error type.
//!
//! Mirrors the shape of a typical foundry-style error enum: transparent
//! wrappers around the I/O and parsing failures that naturally occur at the
//! edges (reading argument files, writing cache entries, walking
//! directories), plus a handful of domain-specific variants for conditions
//! this crate itself detects.

use std::path::PathBuf;

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Walkdir(#[from] walkdir::Error),

    #[error(transparent)]
    Glob(#[from] glob::PatternError),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    Message(String),

    #[error("argument file {path}: {message}")]
    ArgFile { path: PathBuf, message: String },

    #[error("two projects both produce output directory {0}")]
    DuplicateOutputDir(PathBuf),

    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("signal for {0} completed more than once")]
    DoubleCompletion(String),

    #[error("compilation failed for {label}: {message}")]
    Compile { label: String, message: String },

    #[error("build timed out waiting for all projects to complete")]
    StallTimeout,
}

impl BuildError {
    pub fn msg(msg: impl std::fmt::Display) -> Self {
        BuildError::Message(msg.to_string())
    }
}
