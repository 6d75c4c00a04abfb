//! Summary Exporter (component C5).
//!
//! Two jobs: pre-extract external classpath entries into the summary
//! cache before any project runner starts (spec.md §4.5, §5 — this phase
//! is single-threaded and happens-before every Runner), and, per produced
//! project, turn the in-memory [`SymbolTable`] materialized at the outline
//! boundary into one `.sig` file per symbol under a directory hierarchy
//! mirroring each symbol's ownership chain.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::SummaryCache;
use crate::compilers::{PickleExtractor, SymbolTable};
use crate::error::Result;
use crate::report::Reporter;
use crate::timer::Timer;

pub struct Exporter {
    cache: Arc<SummaryCache>,
    extractor: Arc<dyn PickleExtractor>,
    use_jar: bool,
}

impl Exporter {
    pub fn new(cache: Arc<SummaryCache>, extractor: Arc<dyn PickleExtractor>, use_jar: bool) -> Self {
        Self { cache, extractor, use_jar }
    }

    /// Pre-scans every external classpath entry (spec.md §5: "single-
    /// threaded, before any Runner starts"). Entries already fresh in the
    /// cache are left alone, which is what makes a re-run against a
    /// persistent cache skip re-extraction entirely (spec.md §8 round-trip
    /// property).
    pub fn prescan_external_classpath(
        &self,
        entries: &HashSet<PathBuf>,
        reporter: &Reporter,
    ) -> Result<()> {
        let mut timer = Timer::new("external-classpath-scan");
        timer.start()?;

        let mut sorted: Vec<&PathBuf> = entries.iter().collect();
        sorted.sort();

        for entry in sorted {
            if self.cache.is_fresh(entry)? {
                trace!(entry = %entry.display(), "external classpath entry already cached");
                continue;
            }
            let dest = self.cache.cache_path_for(entry);
            self.extractor.process(entry, &dest)?;
            self.cache.publish(entry, &dest)?;
            reporter.echo(&format!("Exported pickles for {}", entry.display()));
        }

        timer.stop()?;
        debug!(ms = timer.duration_ms(), "external classpath scan complete");
        Ok(())
    }

    /// Writes one `.sig` file per symbol under
    /// `<cache_root>/<normalized output_dir>/<owner_chain>/<name>.sig`,
    /// then publishes the directory (or, with `use_jar`, a zip archive of
    /// it) keyed by `output_dir`. Duplicate buffers (by `Arc` identity) are
    /// written exactly once; symbols are sorted by owner chain then name so
    /// the write order is deterministic for a given input.
    pub fn export_symbols(&self, output_dir: &Path, symbols: &SymbolTable) -> Result<PathBuf> {
        let staging = tempfile::Builder::new().prefix("pipeline-export-").tempdir()?;

        let mut ordered = symbols.symbols.clone();
        ordered.sort_by(|a, b| {
            (a.owner_chain.join("/"), a.name.as_str()).cmp(&(b.owner_chain.join("/"), b.name.as_str()))
        });

        let mut seen = HashSet::new();
        let mut written = 0usize;
        for symbol in &ordered {
            let identity = Arc::as_ptr(&symbol.data) as usize;
            if !seen.insert(identity) {
                continue;
            }
            let mut dir = staging.path().to_path_buf();
            for segment in &symbol.owner_chain {
                dir.push(sanitize_segment(segment));
            }
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(format!("{}.sig", sanitize_segment(&symbol.name))), symbol.data.as_slice())?;
            written += 1;
        }
        trace!(written, total = ordered.len(), "wrote symbol summaries");

        let artifact: PathBuf = if self.use_jar {
            let archive = staging.path().with_extension("jar");
            write_zip_archive(staging.path(), &archive)?;
            archive
        } else {
            staging.path().to_path_buf()
        };

        self.cache.publish(output_dir, &artifact)
    }
}

fn sanitize_segment(segment: &str) -> String {
    segment.replace(['/', '\\'], "_")
}

fn write_zip_archive(src_dir: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::create(dest)?;
    let mut zip = zip::ZipWriter::new(file);
    let options: zip::write::FileOptions<()> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    add_dir_to_zip(&mut zip, src_dir, src_dir, &options)?;
    zip.finish()?;
    Ok(())
}

fn add_dir_to_zip(
    zip: &mut zip::ZipWriter<fs::File>,
    root: &Path,
    dir: &Path,
    options: &zip::write::FileOptions<()>,
) -> Result<()> {
    use std::io::Write;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
        if entry.file_type()?.is_dir() {
            zip.add_directory(format!("{name}/"), *options)?;
            add_dir_to_zip(zip, root, &path, options)?;
        } else {
            zip.start_file(name, *options)?;
            zip.write_all(&fs::read(&path)?)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilers::Symbol;
    use crate::compilers::reference::ReferencePickleExtractor;

    fn symbol(owner: &[&str], name: &str, bytes: &[u8]) -> Symbol {
        Symbol {
            owner_chain: owner.iter().map(|s| s.to_string()).collect(),
            name: name.to_string(),
            data: Arc::new(bytes.to_vec()),
        }
    }

    #[test]
    fn exports_one_file_per_symbol_and_dedupes_identity() {
        let cache = Arc::new(SummaryCache::ephemeral(false).unwrap());
        let exporter = Exporter::new(cache.clone(), Arc::new(ReferencePickleExtractor), false);

        let shared = Arc::new(b"shared".to_vec());
        let mut table = SymbolTable::default();
        table.symbols.push(Symbol { owner_chain: vec!["pkg".into()], name: "A".into(), data: shared.clone() });
        table.symbols.push(Symbol { owner_chain: vec!["pkg".into()], name: "A".into(), data: shared });
        table.symbols.push(symbol(&["pkg"], "B", b"b"));

        let out_dir = tempfile::tempdir().unwrap();
        fs::write(out_dir.path().join("marker"), b"x").unwrap();
        let published = exporter.export_symbols(out_dir.path(), &table).unwrap();

        let mut sig_files = Vec::new();
        for entry in walkdir::WalkDir::new(&published) {
            let entry = entry.unwrap();
            if entry.file_type().is_file() {
                sig_files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        sig_files.sort();
        assert_eq!(sig_files, vec!["A.sig", "B.sig"]);
    }

    #[test]
    fn use_jar_produces_archive() {
        let cache = Arc::new(SummaryCache::ephemeral(true).unwrap());
        let exporter = Exporter::new(cache, Arc::new(ReferencePickleExtractor), true);
        let mut table = SymbolTable::default();
        table.symbols.push(symbol(&["pkg"], "A", b"a"));
        let out_dir = tempfile::tempdir().unwrap();
        fs::write(out_dir.path().join("marker"), b"x").unwrap();
        let published = exporter.export_symbols(out_dir.path(), &table).unwrap();
        assert_eq!(published.extension().unwrap(), "jar");
        assert!(published.is_file());
    }
}
