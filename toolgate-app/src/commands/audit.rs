use crate::cli::AuditCommand;
use crate::context::Toolgate;
use anyhow::{Context, Result};
use toolgate_policy::audit::AuditEntry;

pub async fn run(toolgate: &Toolgate, command: AuditCommand) -> Result<()> {
    match command {
        AuditCommand::Tail { lines } => {
            for entry in toolgate.audit.read(lines).await {
                println!("{}", format_entry(&entry));
            }
        }
        AuditCommand::Verify => {
            let count = toolgate
                .audit
                .verify_integrity()
                .await
                .context("Audit log integrity check failed")?;
            println!("✓ {} entries, hash chain intact", count);
        }
    }
    Ok(())
}

pub fn format_entry(entry: &AuditEntry) -> String {
    let mut line = format!(
        "{} [{}] {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        entry.severity,
        entry.action
    );
    if let Some(agent) = &entry.agent_id {
        line.push_str(&format!(" agent={}", agent));
    }
    if let Some(tool) = &entry.tool_used {
        line.push_str(&format!(" tool={}", tool));
    }
    if let Some(confirmed) = entry.user_confirmed {
        line.push_str(&format!(" confirmed={}", confirmed));
    }
    if let Some(details) = &entry.details {
        line.push_str(&format!(" - {}", details));
    }
    line
}
