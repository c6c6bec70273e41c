use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toolgate_policy::security::SecurityConfig;

pub const CONFIG_ENV: &str = "TOOLGATE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "toolgate.toml";

/// `toolgate.toml`. Relative file paths are resolved against `data_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub registry_file: PathBuf,
    pub audit_log: PathBuf,
    pub master_key_file: PathBuf,
    pub sandbox_root: PathBuf,
    pub confirmation_timeout_secs: u64,
    pub tool_timeout_ms: u64,
    pub lock_timeout_ms: u64,
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".toolgate"),
            registry_file: PathBuf::from("agents.enc"),
            audit_log: PathBuf::from("audit.log"),
            master_key_file: PathBuf::from("master.key"),
            sandbox_root: PathBuf::from("workspace"),
            confirmation_timeout_secs: 120,
            tool_timeout_ms: 30_000,
            lock_timeout_ms: 30_000,
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    /// Explicit path, then `$TOOLGATE_CONFIG`, then `./toolgate.toml`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Missing file gives the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(&self.registry_file)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.audit_log)
    }

    pub fn master_key_path(&self) -> PathBuf {
        self.data_dir.join(&self.master_key_file)
    }

    pub fn sandbox_path(&self) -> PathBuf {
        self.data_dir.join(&self.sandbox_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
data_dir = "/var/lib/toolgate"
tool_timeout_ms = 5000

[security]
allowDangerousTools = true
"#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/toolgate"));
        assert_eq!(config.tool_timeout_ms, 5000);
        assert_eq!(config.confirmation_timeout_secs, 120);
        assert!(config.security.allow_dangerous_tools);
        assert!(!config.security.allow_critical_tools);
        assert!(config.security.require_user_confirmation);
        assert_eq!(
            config.registry_path(),
            PathBuf::from("/var/lib/toolgate/agents.enc")
        );
    }

    #[test]
    fn test_absolute_file_overrides_data_dir() {
        let config = Config {
            audit_log: PathBuf::from("/tmp/elsewhere/audit.log"),
            ..Default::default()
        };
        assert_eq!(
            config.audit_log_path(),
            PathBuf::from("/tmp/elsewhere/audit.log")
        );
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = Config::resolve_path(Some(Path::new("custom.toml")));
        assert_eq!(path, PathBuf::from("custom.toml"));
    }
}
