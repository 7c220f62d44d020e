//! Filesystem capability consumed by the verifier and the search engine.
//!
//! Production code goes through [`LocalFs`]; tests use [`MemoryFs`] so that
//! verification can be exercised without touching disk.
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;

/// A relative path that cannot leave the directory it is joined to.
pub fn is_confined(path: &Path) -> bool {
    !path.is_absolute() && path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Read-only view of a file tree.
///
/// All implementations must be `Send + Sync` so a single instance can be
/// shared by the worker pool behind an `Arc`.
pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Immediate children of `dir` (files and directories).
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn modified(&self, path: &Path) -> Option<DateTime<Utc>>;

    /// Every file below `root`, depth first, in listing order.
    fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = self.list(&dir) else {
                continue;
            };
            for entry in entries.into_iter().rev() {
                if self.list(&entry).is_ok() {
                    pending.push(entry);
                } else {
                    files.push(entry);
                }
            }
        }
        files
    }

    /// Lossy UTF-8 read.
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Resolve `path` to an existing entry.
    ///
    /// When the exact-case path is absent, the parent directory is searched
    /// for a case-insensitive name match before giving up.
    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        if self.exists(path) {
            return Some(path.to_path_buf());
        }
        let wanted = path.file_name()?.to_string_lossy().to_lowercase();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let parent = self.resolve(&parent)?;
        self.list(&parent).ok()?.into_iter().find(|entry| {
            entry
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase() == wanted)
                .unwrap_or(false)
        })
    }
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn modified(&self, path: &Path) -> Option<DateTime<Utc>> {
        let meta = std::fs::metadata(path).ok()?;
        meta.modified().ok().map(DateTime::<Utc>::from)
    }

    // Walk builder respects .gitignore by default
    fn walk(&self, root: &Path) -> Vec<PathBuf> {
        WalkBuilder::new(root)
            .hidden(false)
            .build()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
            .map(|e| e.into_path())
            .collect()
    }
}

/// In-memory file tree for tests.
///
/// Directories are implied by the files stored below them.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RwLock<BTreeMap<PathBuf, (String, DateTime<Utc>)>>,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), (content.into(), Utc::now()));
        }
    }

    pub fn remove(&self, path: &Path) {
        if let Ok(mut files) = self.files.write() {
            files.remove(path);
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        if path == Path::new(".") || path.as_os_str().is_empty() {
            return true;
        }
        self.files
            .read()
            .map(|files| files.keys().any(|f| f.starts_with(path) && f != path))
            .unwrap_or(false)
    }
}

impl Filesystem for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        let is_file = self
            .files
            .read()
            .map(|files| files.contains_key(path))
            .unwrap_or(false);
        is_file || self.is_dir(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let files = self
            .files
            .read()
            .map_err(|_| io::Error::other("memory fs poisoned"))?;
        files
            .get(path)
            .map(|(content, _)| content.clone().into_bytes())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.is_dir(dir) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                dir.display().to_string(),
            ));
        }
        let files = self
            .files
            .read()
            .map_err(|_| io::Error::other("memory fs poisoned"))?;
        let root_listing = dir == Path::new(".") || dir.as_os_str().is_empty();
        let mut children: Vec<PathBuf> = Vec::new();
        for file in files.keys() {
            let rest = if root_listing {
                Some(file.as_path())
            } else {
                file.strip_prefix(dir).ok()
            };
            let Some(first) = rest.and_then(|r| r.components().next()) else {
                continue;
            };
            let child = if root_listing {
                PathBuf::from(first.as_os_str())
            } else {
                dir.join(first.as_os_str())
            };
            if !children.contains(&child) {
                children.push(child);
            }
        }
        Ok(children)
    }

    fn modified(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.files
            .read()
            .ok()
            .and_then(|files| files.get(path).map(|(_, at)| *at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_fs_read_and_list() {
        let fs = MemoryFs::new();
        fs.insert("src/components/Widget.tsx", "export function Widget() {}");
        fs.insert("src/index.ts", "export * from './components/Widget';");

        assert!(fs.exists(Path::new("src/components/Widget.tsx")));
        assert!(fs.exists(Path::new("src/components")));
        assert!(!fs.exists(Path::new("src/missing.ts")));

        let listing = fs.list(Path::new("src")).unwrap();
        assert_eq!(
            listing,
            vec![
                PathBuf::from("src/components"),
                PathBuf::from("src/index.ts")
            ]
        );
        assert_eq!(
            fs.read_to_string(Path::new("src/index.ts")).unwrap(),
            "export * from './components/Widget';"
        );
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let fs = MemoryFs::new();
        fs.insert("src/components/Widget.tsx", "x");

        let resolved = fs.resolve(Path::new("src/components/widget.tsx"));
        assert_eq!(resolved, Some(PathBuf::from("src/components/Widget.tsx")));

        let resolved_dir = fs.resolve(Path::new("src/Components/WIDGET.tsx"));
        assert_eq!(
            resolved_dir,
            Some(PathBuf::from("src/components/Widget.tsx"))
        );

        assert!(fs.resolve(Path::new("src/components/Gadget.tsx")).is_none());
    }

    #[test]
    fn test_memory_fs_walk() {
        let fs = MemoryFs::new();
        fs.insert("src/components/Widget.tsx", "a");
        fs.insert("src/index.ts", "b");
        fs.insert("README.md", "c");

        let mut files = fs.walk(Path::new("."));
        files.sort();
        assert_eq!(
            files,
            vec![
                PathBuf::from("README.md"),
                PathBuf::from("src/components/Widget.tsx"),
                PathBuf::from("src/index.ts"),
            ]
        );
        assert_eq!(fs.walk(Path::new("src/components")), vec![PathBuf::from("src/components/Widget.tsx")]);
    }

    #[test]
    fn test_local_fs_walk_skips_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "export const a = 1;").unwrap();
        std::fs::write(dir.path().join(".ignore"), "dist/\n").unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/a.js"), "var a = 1;").unwrap();

        let files = LocalFs.walk(dir.path());
        assert!(files.iter().any(|f| f.ends_with("src/a.ts")));
        assert!(!files.iter().any(|f| f.ends_with("dist/a.js")));
    }

    #[test]
    fn test_local_fs_resolve() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Button.tsx"), "export const Button = 1;").unwrap();

        let fs = LocalFs;
        let resolved = fs.resolve(&dir.path().join("button.tsx")).unwrap();
        assert!(resolved.exists());
        assert!(fs.resolve(&dir.path().join("Missing.tsx")).is_none());
        assert!(fs.modified(&resolved).is_some());
    }

    #[test]
    fn test_is_confined() {
        assert!(is_confined(Path::new("src/a.ts")));
        assert!(is_confined(Path::new("./src/a.ts")));
        assert!(!is_confined(Path::new("../a.ts")));
        assert!(!is_confined(Path::new("src/../../a.ts")));
        assert!(!is_confined(Path::new("/etc/a.ts")));
    }
}
