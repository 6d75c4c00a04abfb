//! A deterministic reference implementation of the §6 compiler contracts.
//!
//! This is the compiler the driver wires in by default and the one the
//! test suite drives. It has nothing to do with any real front end: it
//! "compiles" a source file by hashing its contents into a single symbol
//! named after the file stem, and "fails" a file whose contents contain the
//! literal marker [`COMPILE_ERROR_MARKER`]. That is enough to exercise
//! every wait condition, failure-propagation path and cache interaction in
//! the scheduler without depending on an actual language toolchain.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compilers::{
    CompileReport, CompilerSettings, FrontEndCompiler, FrontEndFactory, PickleExtractor,
    SecondaryCompiler, Symbol, SymbolTable,
};
use crate::error::Result;

/// Any source file containing this literal string fails to compile.
pub const COMPILE_ERROR_MARKER: &str = "COMPILE_ERROR";

pub struct ReferenceFrontEndFactory;

impl FrontEndFactory for ReferenceFrontEndFactory {
    fn new_compiler(&self, settings: &CompilerSettings) -> Box<dyn FrontEndCompiler> {
        Box::new(ReferenceFrontEnd { output_dir: settings.output_dir.clone(), closed: false })
    }
}

pub struct ReferenceFrontEnd {
    output_dir: PathBuf,
    closed: bool,
}

impl FrontEndCompiler for ReferenceFrontEnd {
    fn compile(
        &mut self,
        files: &[PathBuf],
        on_outline: &mut (dyn FnMut(&SymbolTable) + Send),
    ) -> Result<CompileReport> {
        let mut table = SymbolTable::default();
        let mut messages = Vec::new();
        let mut has_errors = false;

        for file in files {
            let contents = fs::read(file)?;
            if String::from_utf8_lossy(&contents).contains(COMPILE_ERROR_MARKER) {
                has_errors = true;
                messages.push(format!("{}: contains error marker", file.display()));
                continue;
            }
            let owner_chain: Vec<String> = file
                .parent()
                .map(|p| p.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect())
                .unwrap_or_default();
            let name = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            table.symbols.push(Symbol { owner_chain, name, data: Arc::new(contents) });
        }

        // Phase boundary: summary data for every (non-errored) file is now known.
        on_outline(&table);

        if !has_errors {
            fs::create_dir_all(&self.output_dir)?;
            for file in files {
                let stem = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                let obj = self.output_dir.join(format!("{stem}.obj"));
                fs::write(obj, b"object code")?;
            }
        }

        Ok(CompileReport { has_errors, messages })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

impl Drop for ReferenceFrontEnd {
    fn drop(&mut self) {
        if !self.closed {
            warn!("front-end compiler for {} dropped without close()", self.output_dir.display());
        }
    }
}

/// Reference secondary-language ("javac") compiler.
pub struct ReferenceSecondaryCompiler;

impl SecondaryCompiler for ReferenceSecondaryCompiler {
    fn compile(&self, output_dir: &Path, _classpath: &[PathBuf], files: &[PathBuf]) -> Result<bool> {
        fs::create_dir_all(output_dir)?;
        for file in files {
            let contents = fs::read(file)?;
            if String::from_utf8_lossy(&contents).contains(COMPILE_ERROR_MARKER) {
                return Ok(false);
            }
            let stem = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            fs::write(output_dir.join(format!("{stem}.class")), b"class file")?;
        }
        Ok(true)
    }
}

/// Reference pickle extractor: treats the input as already holding the
/// summaries it needs to expose and simply mirrors it to the output path.
pub struct ReferencePickleExtractor;

impl PickleExtractor for ReferencePickleExtractor {
    fn process(&self, input_archive: &Path, output_archive: &Path) -> Result<()> {
        if let Some(parent) = output_archive.parent() {
            fs::create_dir_all(parent)?;
        }
        if input_archive.is_dir() {
            copy_dir_recursive(input_archive, output_archive)?;
        } else {
            fs::copy(input_archive, output_archive)?;
        }
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let dest_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            fs::copy(entry.path(), dest_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn compiles_clean_sources() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("A.src");
        fs::write(&src, "hello").unwrap();
        let out = dir.path().join("out");
        let factory = ReferenceFrontEndFactory;
        let settings = CompilerSettings { output_dir: out.clone(), classpath: vec![], extra_args: vec![] };
        let mut compiler = factory.new_compiler(&settings);
        let mut seen = None;
        let report = compiler.compile(&[src], &mut |t| seen = Some(t.clone())).unwrap();
        assert!(!report.has_errors);
        assert_eq!(seen.unwrap().symbols.len(), 1);
        assert!(out.join("A.obj").exists());
        compiler.close();
    }

    #[test]
    fn flags_error_marker() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("A.src");
        fs::write(&src, "COMPILE_ERROR here").unwrap();
        let factory = ReferenceFrontEndFactory;
        let settings =
            CompilerSettings { output_dir: dir.path().join("out"), classpath: vec![], extra_args: vec![] };
        let mut compiler = factory.new_compiler(&settings);
        let report = compiler.compile(&[src], &mut |_| {}).unwrap();
        assert!(report.has_errors);
    }
}
