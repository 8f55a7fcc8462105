//! Project model: the process-wide collection of loaded file trees.
//!
//! The model is the single source of truth for all mutation. Every component
//! reads and writes file state through it, one operation at a time; there is
//! no locking because batch execution is strictly sequential.

mod source_file;

pub use source_file::{Declaration, QuoteStyle, SourceFile};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::RetryPolicy;
use crate::error::{EngineError, Result};
use crate::logging::SharedSink;
use crate::paths::PathResolver;

/// Directories never scanned for project files.
const EXCLUDED_DIRS: &[&str] = &["**/node_modules/**", "**/.git/**", "**/dist/**", "**/build/**"];

/// Loads, caches, and persists source files for one project root.
///
/// Invariant: at most one loaded handle per normalized path. `persist` is the
/// commit point of an operation; a failed persist after an in-memory mutation
/// leaves memory and disk divergent, and the caller must `force_reload`
/// before retrying.
pub struct ProjectModel {
    resolver: PathResolver,
    files: HashMap<PathBuf, SourceFile>,
    retry: RetryPolicy,
    sink: SharedSink,
    excluded: GlobSet,
    dry_run: bool,
}

impl ProjectModel {
    /// Create a model rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, retry: RetryPolicy, sink: SharedSink) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in EXCLUDED_DIRS {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            resolver: PathResolver::new(root),
            files: HashMap::new(),
            retry,
            sink,
            excluded: builder.build()?,
            dry_run: false,
        })
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// In dry-run mode `persist` marks handles clean without touching disk,
    /// so previews can run the full pipeline against in-memory text only.
    pub fn set_dry_run(&mut self, on: bool) {
        self.dry_run = on;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Normalized key for a path.
    pub fn key(&self, path: impl AsRef<Path>) -> PathBuf {
        self.resolver.absolutize(path)
    }

    /// Load a file if present on disk, returning the cached handle on
    /// repeated calls without reparsing.
    pub fn ensure(&mut self, path: impl AsRef<Path>) -> Result<Option<&SourceFile>> {
        Ok(self.ensure_mut(path)?.map(|f| &*f))
    }

    /// Mutable variant of [`ProjectModel::ensure`].
    pub fn ensure_mut(&mut self, path: impl AsRef<Path>) -> Result<Option<&mut SourceFile>> {
        let key = self.key(path.as_ref());
        if !self.files.contains_key(&key) {
            let Some(on_disk) = self.locate_on_disk(&key)? else {
                return Ok(None);
            };
            let text = fs::read_to_string(&on_disk)?;
            let file = SourceFile::parse(key.clone(), text)?;
            self.sink.debug(&format!("loaded {}", key.display()));
            self.files.insert(key.clone(), file);
        }
        Ok(self.files.get_mut(&key))
    }

    /// Find the on-disk path for `key`: the exact normalized path first, then
    /// a listing of the parent directory matched by file name (tolerates
    /// case-differing paths handed in by the host).
    fn locate_on_disk(&self, key: &Path) -> Result<Option<PathBuf>> {
        if self.retry.wait_until(|| key.exists()) {
            return Ok(Some(key.to_path_buf()));
        }
        let (Some(parent), Some(file_name)) = (key.parent(), key.file_name()) else {
            return Ok(None);
        };
        if !parent.is_dir() {
            return Ok(None);
        }
        let wanted = file_name.to_string_lossy().to_lowercase();
        for entry in fs::read_dir(parent)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().to_lowercase() == wanted {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Like `ensure` but an absent file is an error.
    pub fn require_mut(&mut self, path: impl AsRef<Path>) -> Result<&mut SourceFile> {
        let key = self.key(path.as_ref());
        self.ensure_mut(&key)?.ok_or(EngineError::FileNotFound(key))
    }

    /// Immutable lookup of an already-loaded handle.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&SourceFile> {
        self.files.get(&self.key(path))
    }

    /// Create a new in-memory file (dirty until persisted). Errors if a
    /// handle for the path is already loaded.
    pub fn create(&mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Result<&mut SourceFile> {
        let key = self.key(path.as_ref());
        if self.files.contains_key(&key) {
            return Err(EngineError::Validation(format!(
                "File already loaded: {}",
                key.display()
            )));
        }
        let mut file = SourceFile::parse(key.clone(), text)?;
        // A created file must reach disk even if its text is never edited.
        file.mark_dirty();
        self.sink.debug(&format!("created {}", key.display()));
        self.files.insert(key.clone(), file);
        Ok(self.files.get_mut(&key).expect("just inserted"))
    }

    /// Load `path`, creating an empty file when it does not exist on disk.
    pub fn ensure_or_create(&mut self, path: impl AsRef<Path>) -> Result<&mut SourceFile> {
        let key = self.key(path.as_ref());
        if self.files.contains_key(&key) || self.locate_on_disk(&key)?.is_some() {
            return self.require_mut(&key);
        }
        self.create(&key, "")
    }

    /// Evict and reparse from disk, so later reads observe external writes.
    pub fn force_reload(&mut self, path: impl AsRef<Path>) -> Result<Option<&mut SourceFile>> {
        let key = self.key(path.as_ref());
        self.files.remove(&key);
        self.ensure_mut(&key)
    }

    /// Write a file's in-memory text to disk. This is the commit point.
    pub fn persist(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let key = self.key(path.as_ref());
        let file = self
            .files
            .get_mut(&key)
            .ok_or_else(|| EngineError::FileNotFound(key.clone()))?;
        if !self.dry_run {
            if let Some(parent) = key.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&key, file.text())?;
        }
        file.mark_clean();
        self.sink.debug(&format!("persisted {}", key.display()));
        Ok(())
    }

    /// Persist every dirty handle, returning the paths written.
    pub fn persist_dirty(&mut self) -> Result<Vec<PathBuf>> {
        let dirty: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(_, f)| f.is_dirty())
            .map(|(p, _)| p.clone())
            .collect();
        for path in &dirty {
            self.persist(path)?;
        }
        Ok(dirty)
    }

    /// All source files under the root, on disk or created in memory.
    pub fn project_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(self.resolver.root())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| self.resolver.is_source_file(p) && !self.excluded.is_match(p))
            .map(|p| self.resolver.absolutize(p))
            .collect();

        for path in self.files.keys() {
            if !files.contains(path) {
                files.push(path.clone());
            }
        }
        files.sort();
        files
    }

    /// True if the path exists on disk or as a created in-memory handle.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        let key = self.key(path.as_ref());
        self.files.contains_key(&key) || key.exists()
    }
}
