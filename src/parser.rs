//! Project Parser (component C3).
//!
//! Converts one argument file into a [`Project`]. Tokenization here is the
//! "external tokenizer" spec.md §6 treats as glue: whitespace-separated
//! tokens, `#`-prefixed lines ignored, flags consumed with exactly one
//! value each. Everything else on the line is treated as a positional
//! source file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::compilers::CompilerSettings;
use crate::error::{BuildError, Result};
use crate::project::{Group, Project};

/// Extension the Driver recognizes when recursively scanning a directory
/// for argument files (spec.md §4.8).
pub const ARGS_FILE_EXT: &str = "args";

const CLASSPATH_FLAG: &str = "--classpath";
const MACRO_CLASSPATH_FLAG: &str = "--macro-classpath";
const PLUGIN_CLASSPATH_FLAG: &str = "--plugin-classpath";
const OUTPUT_DIR_FLAG: &str = "-d";

/// The maximum number of files compiled together in one group when a
/// project isn't collapsed to a single group (spec.md §4.6).
pub const GROUP_SIZE: usize = 128;

pub fn parse_argument_file(path: &Path) -> Result<Project> {
    let raw = fs::read_to_string(path)
        .map_err(|e| BuildError::ArgFile { path: path.to_path_buf(), message: e.to_string() })?;

    let tokens = tokenize(&raw);

    let mut classpath_raw: Vec<String> = Vec::new();
    let mut macro_classpath_raw: Vec<String> = Vec::new();
    let mut plugin_classpath_raw: Vec<String> = Vec::new();
    let mut output_dir_raw: Option<String> = None;
    let mut source_files_raw: Vec<String> = Vec::new();

    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        match token.as_str() {
            CLASSPATH_FLAG => classpath_raw.extend(expect_value(path, &mut iter, CLASSPATH_FLAG)?.split_entries()),
            MACRO_CLASSPATH_FLAG => {
                macro_classpath_raw.extend(expect_value(path, &mut iter, MACRO_CLASSPATH_FLAG)?.split_entries())
            }
            PLUGIN_CLASSPATH_FLAG => {
                plugin_classpath_raw.extend(expect_value(path, &mut iter, PLUGIN_CLASSPATH_FLAG)?.split_entries())
            }
            OUTPUT_DIR_FLAG => output_dir_raw = Some(expect_value(path, &mut iter, OUTPUT_DIR_FLAG)?),
            other => source_files_raw.push(other.to_string()),
        }
    }

    let output_dir_raw = output_dir_raw
        .ok_or_else(|| BuildError::ArgFile { path: path.to_path_buf(), message: "missing -d <output-dir>".into() })?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let output_dir = canonicalize_lenient(base, Path::new(&output_dir_raw))?;
    let classpath = expand_and_canonicalize(base, &classpath_raw)?;
    let macro_classpath = expand_and_canonicalize(base, &macro_classpath_raw)?;
    let plugin_classpath = expand_and_canonicalize(base, &plugin_classpath_raw)?;
    let source_files = {
        let mut files: Vec<PathBuf> = source_files_raw
            .iter()
            .map(|f| canonicalize_lenient(base, Path::new(f)))
            .collect::<Result<_>>()?;
        files.sort();
        files
    };

    let label = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "project".into());

    let settings = CompilerSettings { output_dir: output_dir.clone(), classpath: classpath.clone(), extra_args: Vec::new() };

    // Group partitioning (spec.md §4.6): a single group if the sources
    // include the canonical standard-library root marker, otherwise
    // ceil(n/128) roughly-equal, sorted chunks. The pipeline strategy's
    // override to a single group happens later, in the runner, once the
    // scheduling strategy is known.
    let groups = if has_stdlib_marker(&source_files) {
        vec![Group::new(0, source_files.clone())]
    } else {
        partition_groups(&source_files)
    };

    Ok(Project::new(
        label,
        path.to_path_buf(),
        output_dir,
        source_files,
        classpath,
        macro_classpath,
        plugin_classpath,
        settings,
        groups,
    ))
}

/// The canonical standard-library root marker: a file literally named
/// `__stdlib_root__` placed at the top of the library's source tree.
pub const STDLIB_MARKER: &str = "__stdlib_root__";

fn has_stdlib_marker(files: &[PathBuf]) -> bool {
    files.iter().any(|f| f.file_name().and_then(|n| n.to_str()) == Some(STDLIB_MARKER))
}

/// Partitions `files` (assumed sorted) into `ceil(n / GROUP_SIZE)` groups
/// of roughly equal size.
pub fn partition_groups(files: &[PathBuf]) -> Vec<Group> {
    if files.is_empty() {
        return vec![Group::new(0, Vec::new())];
    }
    let num_groups = files.len().div_ceil(GROUP_SIZE);
    let chunk_size = files.len().div_ceil(num_groups);
    files
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, chunk)| Group::new(i, chunk.to_vec()))
        .collect()
}

fn tokenize(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        })
        .flat_map(|line| line.split_whitespace())
        .map(|s| s.to_string())
        .collect()
}

fn expect_value(
    path: &Path,
    iter: &mut std::iter::Peekable<std::vec::IntoIter<String>>,
    flag: &str,
) -> Result<String> {
    iter.next().ok_or_else(|| BuildError::ArgFile {
        path: path.to_path_buf(),
        message: format!("{flag} requires a value"),
    })
}

trait SplitEntries {
    fn split_entries(&self) -> Vec<String>;
}

impl SplitEntries for String {
    fn split_entries(&self) -> Vec<String> {
        self.split(path_list_separator()).filter(|s| !s.is_empty()).map(|s| s.to_string()).collect()
    }
}

#[cfg(windows)]
fn path_list_separator() -> char {
    ';'
}

#[cfg(not(windows))]
fn path_list_separator() -> char {
    ':'
}

fn expand_and_canonicalize(base: &Path, entries: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in entries {
        if let Some(prefix) = entry.strip_suffix('*') {
            let pattern = format!("{prefix}*");
            let pattern_path = base.join(&pattern);
            let mut matches: Vec<PathBuf> = glob::glob(&pattern_path.to_string_lossy())?
                .filter_map(std::result::Result::ok)
                .filter(|p| p.is_file())
                .collect();
            matches.sort();
            for m in matches {
                out.push(canonicalize_lenient(base, &m)?);
            }
        } else {
            out.push(canonicalize_lenient(base, Path::new(entry))?);
        }
    }
    Ok(out)
}

/// Canonicalizes `path` (joined against `base` if relative) via
/// `dunce::canonicalize`, which strips the `\\?\` UNC prefix `std`'s
/// canonicalize leaves on Windows. Falls back to the lexically-joined path
/// if the target doesn't exist yet (e.g. an output directory that hasn't
/// been created).
fn canonicalize_lenient(base: &Path, path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
    match dunce::canonicalize(&joined) {
        Ok(p) => Ok(p),
        Err(_) => Ok(joined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_minimal_project() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("A.src");
        fs::write(&src, "hello").unwrap();
        let out = dir.path().join("out");
        let args = dir.path().join("a.args");
        fs::write(&args, format!("-d {}\nA.src\n", out.display())).unwrap();

        let project = parse_argument_file(&args).unwrap();
        assert_eq!(project.label, "a");
        assert_eq!(project.source_files.len(), 1);
        assert!(project.classpath.is_empty());
    }

    #[test]
    fn parses_classpath_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.src"), "hello").unwrap();
        let upstream_out = dir.path().join("upstream-out");
        fs::create_dir_all(&upstream_out).unwrap();
        let out = dir.path().join("out");

        let args = dir.path().join("b.args");
        let sep = if cfg!(windows) { ";" } else { ":" };
        fs::write(
            &args,
            format!(
                "# a comment\n-d {}\n--classpath {}{}{}\nA.src\n",
                out.display(),
                upstream_out.display(),
                sep,
                upstream_out.display()
            ),
        )
        .unwrap();

        let project = parse_argument_file(&args).unwrap();
        assert_eq!(project.classpath.len(), 2);
    }

    #[test]
    fn missing_output_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = dir.path().join("c.args");
        fs::write(&args, "A.src\n").unwrap();
        assert!(parse_argument_file(&args).is_err());
    }

    #[test]
    fn partition_groups_ceil_divides() {
        let files: Vec<PathBuf> = (0..300).map(|i| PathBuf::from(format!("F{i}.src"))).collect();
        let groups = partition_groups(&files);
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.files.len() <= 100));
    }

    #[test]
    fn stdlib_marker_forces_single_group() {
        let mut files: Vec<PathBuf> = (0..300).map(|i| PathBuf::from(format!("F{i}.src"))).collect();
        files.push(PathBuf::from(STDLIB_MARKER));
        assert!(has_stdlib_marker(&files));
    }
}
