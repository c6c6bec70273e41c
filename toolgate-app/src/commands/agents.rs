use crate::cli::{AgentsCommand, CreateAgentArgs};
use crate::context::Toolgate;
use anyhow::{Context, Result};
use std::fmt::Write;
use toolgate_infra::agent_store::{AgentStore, StoreError};
use toolgate_policy::agent::{Agent, AgentDraft, AgentPolicyPatch};

pub async fn run(toolgate: &Toolgate, command: AgentsCommand) -> Result<()> {
    let store = &toolgate.store;
    match command {
        AgentsCommand::List => {
            let registry = store.load().await;
            let agents: Vec<&Agent> = registry.agents.values().collect();
            print!("{}", render_list(&agents, registry.active_agent_id.as_deref()));
        }
        AgentsCommand::Create(args) => {
            let agent = report(store.create_agent(draft_from_args(args)).await)?;
            println!("✓ Created agent {} ({})", agent.name, agent.id);
        }
        AgentsCommand::Import { file } => {
            let draft = AgentDraft::from_yaml_file(&file)
                .await
                .with_context(|| format!("Failed to read agent file {}", file.display()))?;
            let agent = report(store.create_agent(draft).await)?;
            println!("✓ Imported agent {} ({})", agent.name, agent.id);
        }
        AgentsCommand::Delete { id } => {
            let id = resolve_agent_id(store, &id).await;
            let agent = report(store.delete_agent(&id).await)?;
            println!("✓ Deleted agent {} ({})", agent.name, agent.id);
        }
        AgentsCommand::Clone { id } => {
            let id = resolve_agent_id(store, &id).await;
            let agent = report(store.clone_agent(&id).await)?;
            println!("✓ Cloned into {} ({})", agent.name, agent.id);
        }
        AgentsCommand::Activate { id, clear } => {
            if clear {
                report(store.set_active_agent(None).await)?;
                println!("✓ Active agent cleared");
            } else {
                let Some(id) = id else {
                    anyhow::bail!("Give an agent id or --clear");
                };
                let id = resolve_agent_id(store, &id).await;
                report(store.set_active_agent(Some(&id)).await)?;
                println!("✓ Active agent set to {}", id);
            }
        }
    }
    Ok(())
}

pub fn draft_from_args(args: CreateAgentArgs) -> AgentDraft {
    let mut draft = AgentDraft::new(args.name, args.prompt).with_tools(args.tools);
    draft.model = args.model;
    draft.policy = AgentPolicyPatch {
        security_level: args.security_level,
        ..Default::default()
    };
    draft
}

/// Accepts an id or an agent name that matches exactly one agent.
pub async fn resolve_agent_id(store: &AgentStore, id_or_name: &str) -> String {
    let agents = store.list_agents().await;
    if agents.iter().any(|a| a.id == id_or_name) {
        return id_or_name.to_string();
    }
    let mut named = agents.iter().filter(|a| a.name == id_or_name);
    match (named.next(), named.next()) {
        (Some(agent), None) => agent.id.clone(),
        _ => id_or_name.to_string(),
    }
}

pub fn render_list(agents: &[&Agent], active: Option<&str>) -> String {
    if agents.is_empty() {
        return "No agents registered\n".to_string();
    }
    let mut out = String::new();
    for agent in agents {
        let marker = if Some(agent.id.as_str()) == active { "*" } else { " " };
        let tools: Vec<String> = agent.tools.iter().map(|t| t.to_string()).collect();
        let _ = writeln!(
            out,
            "{} {}  {}  [{}]",
            marker,
            agent.id,
            agent.name,
            tools.join(", ")
        );
    }
    out
}

/// Prints validation details before handing the error to anyhow.
fn report<T>(result: Result<T, StoreError>) -> Result<T> {
    if let Err(StoreError::Validation(report)) = &result {
        for error in &report.errors {
            eprintln!("  ✗ {}", error);
        }
        for warning in &report.security_warnings {
            eprintln!("  ⚠️  {}", warning);
        }
    }
    Ok(result?)
}
