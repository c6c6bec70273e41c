use crate::context::Toolgate;
use anyhow::Result;

pub struct Check {
    pub name: &'static str,
    pub result: Result<String, String>,
}

pub async fn run(toolgate: &Toolgate) -> Result<()> {
    println!("🏥 Health Check\n");

    let checks = checks(toolgate).await;
    let healthy = checks.iter().all(|c| c.result.is_ok());
    for check in &checks {
        match &check.result {
            Ok(detail) => println!("{}... ✓ {}", check.name, detail),
            Err(reason) => println!("{}... ✗ ({})", check.name, reason),
        }
    }

    println!();
    if healthy {
        println!("✅ All checks passed");
        Ok(())
    } else {
        anyhow::bail!("Health check failed");
    }
}

pub async fn checks(toolgate: &Toolgate) -> Vec<Check> {
    let config = &toolgate.config;
    let mut checks = Vec::new();

    checks.push(Check {
        name: "📁 Data directory",
        result: if config.data_dir.is_dir() {
            Ok(config.data_dir.display().to_string())
        } else {
            Err("missing".to_string())
        },
    });

    let registry_path = config.registry_path();
    checks.push(Check {
        name: "🗂️  Agent registry",
        result: match std::fs::read_to_string(&registry_path) {
            Ok(content) => match toolgate.cipher.decrypt(&content) {
                Ok(_) => Ok(format!("{} agents", toolgate.store.list_agents().await.len())),
                Err(e) => Err(format!("cannot decrypt: {}", e)),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err("not found, run 'toolgate init'".to_string())
            }
            Err(e) => Err(e.to_string()),
        },
    });

    checks.push(Check {
        name: "🔍 Audit chain",
        result: toolgate
            .audit
            .verify_integrity()
            .await
            .map(|count| format!("{} entries", count))
            .map_err(|e| e.to_string()),
    });

    let sandbox = config.sandbox_path();
    checks.push(Check {
        name: "📦 Sandbox",
        result: if sandbox.is_dir() {
            Ok(sandbox.display().to_string())
        } else {
            Err("missing, run 'toolgate init'".to_string())
        },
    });

    checks
}
