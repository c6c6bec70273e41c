use crate::context::Toolgate;
use anyhow::{Context, Result};
use std::path::Path;

/// `Toolgate::open` has already created the data directory, master key and
/// audit log; this adds the config file, sandbox and an empty registry.
pub async fn run(toolgate: &Toolgate, config_path: &Path) -> Result<()> {
    println!("🔧 Initializing toolgate\n");
    let config = &toolgate.config;

    if config_path.exists() {
        println!("Config: {} (existing)", config_path.display());
    } else {
        config.save(config_path)?;
        println!("Config: {} (created)", config_path.display());
    }

    let sandbox = config.sandbox_path();
    std::fs::create_dir_all(&sandbox)
        .with_context(|| format!("Failed to create sandbox {}", sandbox.display()))?;

    let registry_path = config.registry_path();
    let mut registry = toolgate.store.load().await;
    if !registry_path.exists() {
        toolgate
            .store
            .save(&mut registry)
            .await
            .context("Failed to write the agent registry")?;
    }

    println!("Data directory: {}", config.data_dir.display());
    println!("Master key: {}", config.master_key_path().display());
    println!("Registry: {} ({} agents)", registry_path.display(), registry.agents.len());
    println!("Audit log: {}", config.audit_log_path().display());
    println!("Sandbox: {}", sandbox.display());
    println!("\n✅ Ready");
    Ok(())
}
