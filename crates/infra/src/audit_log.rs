//! Append-only, per-line encrypted audit trail.
//!
//! Every line is `encrypt(json({entry_hash, prev_hash, ..entry}))`. The hash
//! chain starts at `"genesis"` and lets `verify_integrity` detect edited,
//! reordered or removed lines.

use crate::cipher::Cipher;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use toolgate_policy::audit::{AuditEntry, AuditSink};
use tracing::{debug, error, warn};

const GENESIS: &str = "genesis";

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encryption error: {0}")]
    Cipher(#[from] crate::cipher::CipherError),

    #[error("Chain integrity violation at line {line}: {reason}")]
    IntegrityViolation { line: usize, reason: String },
}

#[derive(Serialize, Deserialize, Clone)]
struct ChainedEntry {
    entry_hash: String,
    prev_hash: String,
    #[serde(flatten)]
    entry: AuditEntry,
}

pub struct AuditLog {
    log_path: PathBuf,
    cipher: Arc<dyn Cipher>,
    last_hash: Mutex<String>,
}

impl AuditLog {
    /// Open (or create) the log at `log_path` and pick up the chain head.
    pub async fn open<P: AsRef<Path>>(
        log_path: P,
        cipher: Arc<dyn Cipher>,
    ) -> Result<Self, AuditError> {
        let log_path = log_path.as_ref().to_path_buf();

        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let last_hash = Self::chain_head(&log_path, cipher.as_ref()).await?;

        Ok(Self {
            log_path,
            cipher,
            last_hash: Mutex::new(last_hash),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Stamp, chain, encrypt and append one entry.
    ///
    /// Never fails: a write problem is logged and the entry is dropped.
    pub async fn append(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.try_append(entry).await {
            error!("Failed to write audit entry '{}': {}", action, e);
        }
    }

    async fn try_append(&self, mut entry: AuditEntry) -> Result<(), AuditError> {
        entry.timestamp = Utc::now();

        // Held across the write so the chain stays linear.
        let mut last_hash = self.last_hash.lock().await;

        let entry_hash = chain_hash(&last_hash, &entry)?;
        let chained = ChainedEntry {
            entry_hash: entry_hash.clone(),
            prev_hash: last_hash.clone(),
            entry,
        };

        let line = self.cipher.encrypt(&serde_json::to_string(&chained)?)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.sync_all().await?;

        *last_hash = entry_hash;
        debug!("Audit entry appended: {}", chained.entry.action);
        Ok(())
    }

    /// The last `limit` entries, most recent first.
    ///
    /// Lines that fail to decrypt or parse are skipped.
    pub async fn read(&self, limit: usize) -> Vec<AuditEntry> {
        let content = match tokio::fs::read_to_string(&self.log_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!("Failed to read audit log {}: {}", self.log_path.display(), e);
                return Vec::new();
            }
        };

        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(limit);

        lines[start..]
            .iter()
            .rev()
            .filter_map(|line| match self.decode(line) {
                Ok(chained) => Some(chained.entry),
                Err(e) => {
                    warn!("Skipping unreadable audit line: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Walk the whole chain; returns the number of verified entries.
    pub async fn verify_integrity(&self) -> Result<usize, AuditError> {
        let content = match tokio::fs::read_to_string(&self.log_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut prev_hash = GENESIS.to_string();
        let mut count = 0;

        for (idx, line) in content.lines().enumerate() {
            let line_num = idx + 1;
            if line.trim().is_empty() {
                continue;
            }

            let chained = self
                .decode(line)
                .map_err(|e| AuditError::IntegrityViolation {
                    line: line_num,
                    reason: format!("unreadable entry: {}", e),
                })?;

            if chained.prev_hash != prev_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_num,
                    reason: format!(
                        "hash chain broken, expected prev_hash '{}', got '{}'",
                        prev_hash, chained.prev_hash
                    ),
                });
            }

            let computed = chain_hash(&prev_hash, &chained.entry)?;
            if computed != chained.entry_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_num,
                    reason: "entry hash mismatch".to_string(),
                });
            }

            prev_hash = chained.entry_hash;
            count += 1;
        }

        Ok(count)
    }

    fn decode(&self, line: &str) -> Result<ChainedEntry, AuditError> {
        let plaintext = self.cipher.decrypt(line)?;
        Ok(serde_json::from_str(&plaintext)?)
    }

    async fn chain_head(log_path: &Path, cipher: &dyn Cipher) -> Result<String, AuditError> {
        let content = match tokio::fs::read_to_string(log_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(GENESIS.to_string()),
            Err(e) => return Err(e.into()),
        };

        // A torn or foreign final line is ignored; the chain continues from the
        // last entry that can be read.
        let head = content
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .find_map(|line| {
                let plaintext = cipher.decrypt(line).ok()?;
                serde_json::from_str::<ChainedEntry>(&plaintext).ok()
            })
            .map(|chained| chained.entry_hash)
            .unwrap_or_else(|| GENESIS.to_string());

        Ok(head)
    }
}

fn chain_hash(prev_hash: &str, entry: &AuditEntry) -> Result<String, serde_json::Error> {
    let entry_json = serde_json::to_string(entry)?;
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(entry_json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[async_trait]
impl AuditSink for AuditLog {
    async fn record(&self, entry: AuditEntry) {
        self.append(entry).await;
    }
}
