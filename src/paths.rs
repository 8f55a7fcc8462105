//! Path resolution: normalized absolute paths and relative module specifiers.

use std::path::{Component, Path, PathBuf};

/// Source file extensions the engine understands.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

/// Resolves file paths and module specifiers for one project root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver anchored at the project root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
        }
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalize a path to an absolute path under the root.
    ///
    /// Relative paths are joined onto the root; `.` and `..` components are
    /// resolved lexically so the same file always maps to one key.
    pub fn absolutize(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.root.join(path))
        }
    }

    /// True if the path has a source extension the engine handles.
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SOURCE_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)))
    }

    /// Compute the module specifier used to import `target` from `importer`.
    ///
    /// The specifier is relative to the importer's directory, has the source
    /// extension stripped, and starts with `./` when the target is not above
    /// the importer (`../services/profileService`, `./userService`).
    pub fn module_specifier(&self, importer: &Path, target: &Path) -> String {
        let importer = self.absolutize(importer);
        let target = self.absolutize(target);

        let from_dir = importer.parent().unwrap_or(Path::new("/"));
        let relative = relative_path(from_dir, &target);
        let stripped = strip_source_extension(&relative);

        let mut spec = stripped.to_string_lossy().replace('\\', "/");
        if !spec.starts_with("../") && !spec.starts_with("./") {
            spec = format!("./{spec}");
        }
        spec
    }

    /// Resolve a relative module specifier used in `importer` back to the
    /// project files it could denote, most specific first.
    ///
    /// `./x` yields `x.ts`, `x.tsx`, `x.js`, `x.jsx`, then `x/index.*` (the
    /// barrel form). Non-relative specifiers (package imports) yield nothing.
    pub fn resolve_specifier(&self, importer: &Path, specifier: &str) -> Vec<PathBuf> {
        if !specifier.starts_with('.') {
            return Vec::new();
        }
        let importer = self.absolutize(importer);
        let base = importer
            .parent()
            .unwrap_or(Path::new("/"))
            .join(specifier);
        let base = normalize(&base);

        let mut candidates = Vec::new();
        // An explicit extension wins.
        if self.is_source_file(&base) {
            candidates.push(base.clone());
        }
        for ext in SOURCE_EXTENSIONS {
            candidates.push(base.with_extension(ext));
        }
        for ext in SOURCE_EXTENSIONS {
            candidates.push(base.join(format!("index.{ext}")));
        }
        candidates
    }

    /// True if `specifier` written in `importer` denotes `target`.
    pub fn specifier_points_to(&self, importer: &Path, specifier: &str, target: &Path) -> bool {
        let target = self.absolutize(target);
        self.resolve_specifier(importer, specifier)
            .iter()
            .any(|c| *c == target)
    }
}

/// Lexically resolve `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Relative path from directory `from` to file `to` (both absolute).
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component.as_os_str());
    }
    out
}

fn strip_source_extension(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if SOURCE_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)) => {
            path.with_extension("")
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_removes_dot_segments() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d.ts")),
            PathBuf::from("/a/c/d.ts")
        );
    }

    #[test]
    fn test_module_specifier_sibling() {
        let resolver = PathResolver::new("/proj");
        let spec = resolver.module_specifier(
            Path::new("/proj/src/services/profileService.ts"),
            Path::new("/proj/src/services/userService.ts"),
        );
        assert_eq!(spec, "./userService");
    }

    #[test]
    fn test_module_specifier_parent_dir() {
        let resolver = PathResolver::new("/proj");
        let spec = resolver.module_specifier(
            Path::new("/proj/src/services/userService.ts"),
            Path::new("/proj/src/models/User.ts"),
        );
        assert_eq!(spec, "../models/User");
    }

    #[test]
    fn test_resolve_specifier_candidates() {
        let resolver = PathResolver::new("/proj");
        let candidates = resolver.resolve_specifier(
            Path::new("/proj/src/app.ts"),
            "./services/userService",
        );
        assert!(candidates.contains(&PathBuf::from("/proj/src/services/userService.ts")));
        assert!(candidates.contains(&PathBuf::from("/proj/src/services/userService/index.ts")));
    }

    #[test]
    fn test_specifier_points_to_barrel_index() {
        let resolver = PathResolver::new("/proj");
        assert!(resolver.specifier_points_to(
            Path::new("/proj/src/app.ts"),
            "./services",
            Path::new("/proj/src/services/index.ts"),
        ));
    }

    #[test]
    fn test_package_specifier_never_resolves() {
        let resolver = PathResolver::new("/proj");
        assert!(
            resolver
                .resolve_specifier(Path::new("/proj/src/app.ts"), "react")
                .is_empty()
        );
    }

    #[test]
    fn test_absolutize_relative_to_root() {
        let resolver = PathResolver::new("/proj");
        assert_eq!(
            resolver.absolutize("src/app.ts"),
            PathBuf::from("/proj/src/app.ts")
        );
    }
}
