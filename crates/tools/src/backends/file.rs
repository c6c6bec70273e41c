//! Sandboxed `file.*` operations.

use super::parse_params;
use crate::error::ToolError;
use crate::executors::ToolBackend;
use crate::sandbox::PathGuard;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use toolgate_policy::registry::ToolKey;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_READ_BYTES: u64 = 10 * 1024 * 1024; // 10MB
const MAX_ENTRIES: usize = 1000;
const MAX_SEARCH_RESULTS: usize = 200;

#[derive(Deserialize)]
struct PathInput {
    #[serde(default = "current_dir")]
    path: String,
}

#[derive(Deserialize)]
struct SearchInput {
    #[serde(default = "current_dir")]
    path: String,
    pattern: String,
}

#[derive(Deserialize)]
struct WriteInput {
    path: String,
    content: String,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Deserialize)]
struct MoveInput {
    from: String,
    to: String,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Deserialize)]
struct DeleteInput {
    path: String,
    #[serde(default)]
    recursive: bool,
}

fn current_dir() -> String {
    ".".to_string()
}

pub struct FileBackend {
    guard: PathGuard,
}

impl FileBackend {
    pub fn new(sandbox_root: impl AsRef<Path>) -> Result<Self, ToolError> {
        Ok(Self {
            guard: PathGuard::new(sandbox_root)?,
        })
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    async fn read(&self, input: PathInput) -> Result<Value, ToolError> {
        let path = self.guard.validate(&input.path)?;
        let metadata = fs::metadata(&path).await.map_err(io_failure)?;
        if metadata.len() > MAX_READ_BYTES {
            return Err(ToolError::Validation("File too large".into()));
        }
        let content = fs::read_to_string(&path).await.map_err(io_failure)?;
        Ok(json!({ "path": self.guard.display_path(&path), "content": content }))
    }

    async fn list(&self, input: PathInput) -> Result<Value, ToolError> {
        let path = self.guard.validate(&input.path)?;
        let mut dir = fs::read_dir(&path).await.map_err(io_failure)?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(io_failure)? {
            if entries.len() >= MAX_ENTRIES {
                break;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push((name, is_dir));
        }
        entries.sort();

        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, is_dir)| json!({ "name": name, "isDir": is_dir }))
            .collect();
        Ok(json!({ "path": self.guard.display_path(&path), "entries": entries }))
    }

    async fn search(&self, input: SearchInput) -> Result<Value, ToolError> {
        if input.pattern.trim().is_empty() {
            return Err(ToolError::Validation("pattern must not be empty".into()));
        }
        let needle = input.pattern.to_lowercase();
        let start = self.guard.validate(&input.path)?;

        let mut matches = Vec::new();
        let mut pending: Vec<PathBuf> = vec![start];
        'walk: while let Some(dir) = pending.pop() {
            let mut reader = match fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(e) => {
                    debug!("Skipping unreadable directory {}: {}", dir.display(), e);
                    continue;
                }
            };
            while let Some(entry) = reader.next_entry().await.map_err(io_failure)? {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type().await.map_err(io_failure)?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                }
                if name.to_lowercase().contains(&needle) {
                    matches.push(self.guard.display_path(&entry.path()));
                    if matches.len() >= MAX_SEARCH_RESULTS {
                        break 'walk;
                    }
                }
            }
        }
        matches.sort();

        Ok(json!({ "pattern": input.pattern, "matches": matches }))
    }

    async fn write(&self, input: WriteInput) -> Result<Value, ToolError> {
        let path = self.guard.validate_new(&input.path)?;

        if path.exists() && !input.overwrite {
            return Err(ToolError::Validation(
                "File exists and overwrite=false".into(),
            ));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_failure)?;
        }

        // Fresh name plus create_new: an existing entry (symlink included) is
        // never opened through.
        let file_name = path
            .file_name()
            .ok_or_else(|| ToolError::SandboxViolation("Path must name a file".into()))?;
        let temp_path = path.with_file_name(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            Uuid::new_v4().simple()
        ));

        if let Err(e) = write_then_rename(&temp_path, &path, input.content.as_bytes()).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove temp file {}: {}", temp_path.display(), cleanup);
                }
            }
            return Err(io_failure(e));
        }

        Ok(json!({
            "path": self.guard.display_path(&path),
            "bytesWritten": input.content.len(),
        }))
    }

    async fn move_path(&self, input: MoveInput) -> Result<Value, ToolError> {
        let from = self.guard.validate(&input.from)?;
        let to = self.guard.validate_new(&input.to)?;

        if from == self.guard.root() {
            return Err(ToolError::Validation("Cannot move the sandbox root".into()));
        }
        if to.exists() && !input.overwrite {
            return Err(ToolError::Validation(
                "Destination exists and overwrite=false".into(),
            ));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await.map_err(io_failure)?;
        }
        fs::rename(&from, &to).await.map_err(io_failure)?;

        Ok(json!({
            "from": self.guard.display_path(&from),
            "to": self.guard.display_path(&to),
        }))
    }

    async fn delete(&self, input: DeleteInput) -> Result<Value, ToolError> {
        let path = self.guard.validate(&input.path)?;
        if path == self.guard.root() {
            return Err(ToolError::Validation("Cannot delete the sandbox root".into()));
        }

        let metadata = fs::metadata(&path).await.map_err(io_failure)?;
        if metadata.is_dir() {
            if !input.recursive {
                return Err(ToolError::Validation(
                    "Path is a directory; set recursive=true to delete it".into(),
                ));
            }
            fs::remove_dir_all(&path).await.map_err(io_failure)?;
        } else {
            fs::remove_file(&path).await.map_err(io_failure)?;
        }

        Ok(json!({ "deleted": self.guard.display_path(&path) }))
    }
}

#[async_trait]
impl ToolBackend for FileBackend {
    async fn execute(&self, key: ToolKey, params: Value) -> Result<Value, ToolError> {
        match key {
            ToolKey::FileRead => self.read(parse_params(params)?).await,
            ToolKey::FileList => self.list(parse_params(params)?).await,
            ToolKey::FileSearch => self.search(parse_params(params)?).await,
            ToolKey::FileWrite => self.write(parse_params(params)?).await,
            ToolKey::FileMove => self.move_path(parse_params(params)?).await,
            ToolKey::FileDelete => self.delete(parse_params(params)?).await,
            other => Err(ToolError::Unsupported(other.to_string())),
        }
    }
}

async fn write_then_rename(temp_path: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp_path, path).await
}

fn io_failure(e: std::io::Error) -> ToolError {
    ToolError::ExecutionFailed(e.to_string())
}
