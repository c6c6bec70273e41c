use crate::cli::ExecArgs;
use crate::commands::agents::resolve_agent_id;
use crate::context::Toolgate;
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use toolgate_tools::confirmation::{
    ConfirmationGate, StaticConfirmationGate, TerminalConfirmationGate,
};
use toolgate_tools::dispatcher::ToolOutcome;

pub async fn run(toolgate: &Toolgate, args: ExecArgs) -> Result<()> {
    let outcome = execute(toolgate, args).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        anyhow::bail!(
            "{}",
            outcome.error.unwrap_or_else(|| "Tool call failed".to_string())
        );
    }
    Ok(())
}

pub async fn execute(toolgate: &Toolgate, args: ExecArgs) -> Result<ToolOutcome> {
    let params = parse_params(args.params.as_deref())?;

    let gate: Arc<dyn ConfirmationGate> = if args.yes {
        Arc::new(StaticConfirmationGate::allow())
    } else if args.no_input {
        Arc::new(StaticConfirmationGate::deny())
    } else {
        Arc::new(TerminalConfirmationGate::new(toolgate.confirmation_timeout()))
    };

    let agent_id = resolve_agent_id(&toolgate.store, &args.agent).await;
    let dispatcher = toolgate.dispatcher(gate)?;
    Ok(dispatcher
        .execute_agent_tool(&agent_id, &args.tool, params)
        .await)
}

pub fn parse_params(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Object(Default::default())),
        Some(text) => serde_json::from_str(text).context("Parameters must be valid JSON"),
    }
}
