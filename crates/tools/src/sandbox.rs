//! Confines file back-end paths to a single root directory.

use crate::error::ToolError;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PathGuard {
    sandbox_root: PathBuf,
}

impl PathGuard {
    pub fn new(sandbox_root: impl AsRef<Path>) -> Result<Self, ToolError> {
        let root = fs::canonicalize(sandbox_root)
            .map_err(|e| ToolError::SandboxViolation(format!("Invalid sandbox root: {}", e)))?;
        Ok(Self { sandbox_root: root })
    }

    pub fn root(&self) -> &Path {
        &self.sandbox_root
    }

    /// Resolve an existing path inside the sandbox.
    pub fn validate(&self, path: impl AsRef<Path>) -> Result<PathBuf, ToolError> {
        let full_path = self.sandbox_root.join(Self::relative(path.as_ref())?);

        let canonical = fs::canonicalize(&full_path).map_err(|_| {
            ToolError::SandboxViolation("Path does not exist or is inaccessible".into())
        })?;

        // Symlinks are resolved above, so this also catches links pointing out.
        if !canonical.starts_with(&self.sandbox_root) {
            return Err(ToolError::SandboxViolation("Path escapes sandbox".into()));
        }

        Ok(canonical)
    }

    /// Resolve a path that may not exist yet (write and move targets).
    pub fn validate_new(&self, path: impl AsRef<Path>) -> Result<PathBuf, ToolError> {
        let relative = Self::relative(path.as_ref())?;
        if relative.as_os_str().is_empty() {
            return Err(ToolError::SandboxViolation("Path must name a file".into()));
        }

        let mut current = self.sandbox_root.clone();
        for component in relative.components() {
            current.push(component);
            if current.symlink_metadata().is_ok() {
                let canonical = fs::canonicalize(&current).map_err(|_| {
                    ToolError::SandboxViolation("Path does not resolve".into())
                })?;
                if !canonical.starts_with(&self.sandbox_root) {
                    return Err(ToolError::SandboxViolation("Symlink escapes sandbox".into()));
                }
            }
        }

        Ok(self.sandbox_root.join(relative))
    }

    /// Path relative to the root, for reporting back to callers.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.sandbox_root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }

    fn relative(path: &Path) -> Result<PathBuf, ToolError> {
        if path.is_absolute() {
            return Err(ToolError::SandboxViolation("Absolute paths not allowed".into()));
        }

        let mut clean = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(ToolError::SandboxViolation("Path traversal detected".into()))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::SandboxViolation("Absolute paths not allowed".into()))
                }
            }
        }
        Ok(clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rejects_absolute_and_traversal() {
        let temp = TempDir::new().unwrap();
        let guard = PathGuard::new(temp.path()).unwrap();

        assert!(guard.validate("/etc/passwd").is_err());
        assert!(guard.validate("../outside").is_err());
        assert!(guard.validate_new("a/../../b").is_err());
    }

    #[test]
    fn test_accepts_nested_new_path() {
        let temp = TempDir::new().unwrap();
        let guard = PathGuard::new(temp.path()).unwrap();

        let path = guard.validate_new("./notes/today.txt").unwrap();
        assert_eq!(path, guard.root().join("notes/today.txt"));
        assert_eq!(guard.display_path(&path), "notes/today.txt");
    }

    #[test]
    fn test_empty_path_is_root_for_reads_only() {
        let temp = TempDir::new().unwrap();
        let guard = PathGuard::new(temp.path()).unwrap();

        assert_eq!(guard.validate(".").unwrap(), guard.root());
        assert!(guard.validate_new(".").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let outside = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).unwrap();
        let guard = PathGuard::new(temp.path()).unwrap();

        assert!(guard.validate("link/secret.txt").is_err());
        assert!(guard.validate_new("link/new.txt").is_err());
    }
}
