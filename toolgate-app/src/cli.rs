use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "toolgate",
    version,
    about = "Policy, permission and audit gate for agent tool calls"
)]
pub struct Cli {
    /// Config file (defaults to $TOOLGATE_CONFIG, then ./toolgate.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the data directory, master key, registry and config file
    Init,
    /// Show the tool catalog and what the current config allows
    Tools {
        /// Print the simplified category -> operations view instead
        #[arg(long)]
        operations: bool,
    },
    /// Manage agents
    #[command(subcommand)]
    Agents(AgentsCommand),
    /// Run a tool on behalf of an agent
    Exec(ExecArgs),
    /// Inspect the audit trail
    #[command(subcommand)]
    Audit(AuditCommand),
    /// Check that config, key, registry and audit log are usable
    Health,
}

#[derive(Subcommand, Debug)]
pub enum AgentsCommand {
    List,
    Create(CreateAgentArgs),
    /// Import an agent definition from a YAML file
    Import { file: PathBuf },
    Delete { id: String },
    Clone { id: String },
    /// Make an agent active, or clear the active agent with --clear
    Activate {
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        clear: bool,
    },
}

#[derive(Args, Debug)]
pub struct CreateAgentArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub prompt: String,
    #[arg(long)]
    pub model: Option<String>,
    /// Tool key, repeatable (e.g. --tool file.read --tool file.list)
    #[arg(long = "tool")]
    pub tools: Vec<String>,
    /// restricted | normal | elevated
    #[arg(long)]
    pub security_level: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Agent id or unique name
    pub agent: String,
    /// Tool key, e.g. file.read
    pub tool: String,
    /// Parameters as a JSON object
    pub params: Option<String>,
    /// Answer yes to every confirmation
    #[arg(long, conflicts_with = "no_input")]
    pub yes: bool,
    /// Never prompt; confirmations are denied
    #[arg(long)]
    pub no_input: bool,
}

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Most recent entries first
    Tail {
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,
    },
    /// Walk the hash chain and report the first break
    Verify,
}
