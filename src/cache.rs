//! Content-addressed summary cache (component C2).
//!
//! Maps a source path (an external classpath entry, or a project's output
//! directory) to the exported-summary artifact derived from it. The
//! mapping from source to cache path mirrors the path-rebasing trick the
//! teacher crate uses to relativize a path against a project root
//! (`rebase_path` in the single-crate `foundry-compilers::lib`): here we
//! mirror the *absolute* source path under the cache root instead of
//! rebasing it against another absolute path, since the cache root never
//! needs to be escaped with `..` components.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use path_slash::PathExt;

use crate::error::Result;

enum CacheRoot {
    Ephemeral(tempfile::TempDir),
    Persistent(PathBuf),
}

impl CacheRoot {
    fn path(&self) -> &Path {
        match self {
            CacheRoot::Ephemeral(dir) => dir.path(),
            CacheRoot::Persistent(path) => path,
        }
    }
}

/// The on-disk, content-addressed store of exported summary artifacts.
pub struct SummaryCache {
    root: CacheRoot,
    use_jar: bool,
    map: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl SummaryCache {
    /// A process-local cache rooted under a freshly allocated temp
    /// directory, removed when the cache is dropped (spec.md §4.2).
    pub fn ephemeral(use_jar: bool) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("pipeline-summary-cache-").tempdir()?;
        Ok(Self { root: CacheRoot::Ephemeral(dir), use_jar, map: Mutex::new(HashMap::new()) })
    }

    /// A cache rooted at a caller-supplied, persistent location. Never
    /// removed; governed by the mtime-staleness protocol across runs.
    pub fn persistent(root: PathBuf, use_jar: bool) -> Self {
        Self { root: CacheRoot::Persistent(root), use_jar, map: Mutex::new(HashMap::new()) }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Deterministic mapping from a source path to where its exported
    /// artifact lives under the cache root.
    pub fn cache_path_for(&self, source: &Path) -> PathBuf {
        let mirrored = mirror_under(self.root.path(), source);
        if self.use_jar {
            mirrored.with_extension("jar")
        } else {
            mirrored
        }
    }

    /// Copies `artifact` (file or directory) into the cache under
    /// `source`'s mirrored path, then stamps the cached artifact's mtime to
    /// match `source`'s mtime (spec.md invariant 6), and records the
    /// mapping for fast in-process `substitute()` lookups.
    pub fn publish(&self, source: &Path, artifact: &Path) -> Result<PathBuf> {
        let dest = self.cache_path_for(source);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if dest.exists() {
            if dest.is_dir() {
                fs::remove_dir_all(&dest)?;
            } else {
                fs::remove_file(&dest)?;
            }
        }
        if artifact.is_dir() {
            copy_dir_recursive(artifact, &dest)?;
        } else {
            fs::copy(artifact, &dest)?;
        }

        let source_mtime = fs::metadata(source)?.modified()?;
        stamp_mtime(&dest, source_mtime)?;

        self.map.lock().unwrap().insert(source.to_path_buf(), dest.clone());
        Ok(dest)
    }

    /// Returns the cached artifact for `classpath_entry` if one has been
    /// published in this process; otherwise returns the entry unchanged.
    pub fn substitute(&self, classpath_entry: &Path) -> PathBuf {
        self.map
            .lock()
            .unwrap()
            .get(classpath_entry)
            .cloned()
            .unwrap_or_else(|| classpath_entry.to_path_buf())
    }

    /// Staleness check (spec.md invariant 6 / §8 round-trip property):
    /// the cached artifact exists on disk and its mtime matches the
    /// source's *current* mtime, read straight from the filesystem so this
    /// works across process restarts against a persistent cache, not just
    /// against this run's in-memory map.
    pub fn is_fresh(&self, source: &Path) -> Result<bool> {
        let dest = self.cache_path_for(source);
        if !dest.exists() {
            return Ok(false);
        }
        let source_mtime = fs::metadata(source)?.modified()?;
        let cached_mtime = fs::metadata(&dest)?.modified()?;
        Ok(source_mtime == cached_mtime)
    }
}

fn mirror_under(root: &Path, source: &Path) -> PathBuf {
    let mut relative = PathBuf::new();
    for component in source.components() {
        match component {
            std::path::Component::RootDir | std::path::Component::Prefix(_) => {}
            std::path::Component::ParentDir => relative.push("__up__"),
            other => relative.push(other.as_os_str()),
        }
    }
    root.join(PathBuf::from(relative.to_slash_lossy().into_owned()))
}

fn stamp_mtime(path: &Path, mtime: SystemTime) -> Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path)
        .or_else(|_| fs::File::open(path))?;
    file.set_modified(mtime)?;
    Ok(())
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
    use std::fs::File;

    #[test]
    fn publish_then_substitute_roundtrips() {
        let cache = SummaryCache::ephemeral(false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lib.archive");
        File::create(&source).unwrap();
        let artifact = dir.path().join("lib.sig");
        fs::write(&artifact, b"summary").unwrap();

        let cached = cache.publish(&source, &artifact).unwrap();
        assert_eq!(cache.substitute(&source), cached);
        assert_eq!(cache.substitute(Path::new("/not/cached")), PathBuf::from("/not/cached"));
    }

    #[test]
    fn publish_stamps_mtime_and_freshness_holds() {
        let cache = SummaryCache::ephemeral(false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lib.archive");
        fs::write(&source, b"src").unwrap();
        let artifact = dir.path().join("lib.sig");
        fs::write(&artifact, b"summary").unwrap();

        cache.publish(&source, &artifact).unwrap();
        assert!(cache.is_fresh(&source).unwrap());
    }

    #[test]
    fn stale_when_source_touched_after_publish() {
        let cache = SummaryCache::ephemeral(false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lib.archive");
        fs::write(&source, b"src").unwrap();
        let artifact = dir.path().join("lib.sig");
        fs::write(&artifact, b"summary").unwrap();
        cache.publish(&source, &artifact).unwrap();

        let future = SystemTime::now() + std::time::Duration::from_secs(10);
        File::options().write(true).open(&source).unwrap().set_modified(future).unwrap();

        assert!(!cache.is_fresh(&source).unwrap());
    }

    #[test]
    fn cache_path_mirrors_source_hierarchy() {
        let cache = SummaryCache::ephemeral(false).unwrap();
        let a = cache.cache_path_for(Path::new("/a/b/c.archive"));
        assert!(a.starts_with(cache.root()));
        assert!(a.ends_with("a/b/c.archive"));
    }

    #[test]
    fn use_jar_suffixes_with_jar_extension() {
        let cache = SummaryCache::ephemeral(true).unwrap();
        let a = cache.cache_path_for(Path::new("/a/b.archive"));
        assert_eq!(a.extension().unwrap(), "jar");
    }
}
