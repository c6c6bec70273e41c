//! Read-only process inspection backed by `sysinfo`.

use super::parse_params;
use crate::error::ToolError;
use crate::executors::ToolBackend;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sysinfo::{Pid, System};
use tokio::task;
use toolgate_policy::registry::ToolKey;

const DEFAULT_LIMIT: usize = 25;

#[derive(Deserialize)]
struct ListInput {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct GetInput {
    pid: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub status: String,
    pub cpu_usage: f32,
    pub memory: u64,
    pub parent_pid: Option<u32>,
}

impl ProcessInfo {
    fn from_process(pid: Pid, process: &sysinfo::Process) -> Self {
        Self {
            pid: pid.as_u32(),
            name: process.name().to_string(),
            status: process.status().to_string(),
            cpu_usage: process.cpu_usage(),
            memory: process.memory(),
            parent_pid: process.parent().map(|p| p.as_u32()),
        }
    }
}

/// Serves `process.list` and `process.get`. `process.kill` never reaches a
/// back-end.
#[derive(Default)]
pub struct ProcessBackend;

impl ProcessBackend {
    pub fn new() -> Self {
        Self
    }

    async fn list(&self, input: ListInput) -> Result<Value, ToolError> {
        let limit = input.limit.unwrap_or(DEFAULT_LIMIT);
        let filter = input.name.map(|n| n.to_lowercase());

        let processes = task::spawn_blocking(move || {
            let mut system = System::new_all();
            system.refresh_all();

            let mut processes: Vec<ProcessInfo> = system
                .processes()
                .iter()
                .map(|(pid, process)| ProcessInfo::from_process(*pid, process))
                .filter(|info| {
                    filter
                        .as_ref()
                        .map_or(true, |f| info.name.to_lowercase().contains(f))
                })
                .collect();
            processes.sort_by(|a, b| b.cpu_usage.total_cmp(&a.cpu_usage).then(a.pid.cmp(&b.pid)));
            processes.truncate(limit);
            processes
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        Ok(json!({ "count": processes.len(), "processes": processes }))
    }

    async fn get(&self, input: GetInput) -> Result<Value, ToolError> {
        let pid = input.pid;
        let info = task::spawn_blocking(move || {
            let mut system = System::new_all();
            system.refresh_all();
            system
                .process(Pid::from_u32(pid))
                .map(|process| ProcessInfo::from_process(Pid::from_u32(pid), process))
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        match info {
            Some(info) => Ok(json!({ "process": info })),
            None => Err(ToolError::ExecutionFailed(format!("No process with pid {}", pid))),
        }
    }
}

#[async_trait]
impl ToolBackend for ProcessBackend {
    async fn execute(&self, key: ToolKey, params: Value) -> Result<Value, ToolError> {
        match key {
            ToolKey::ProcessList => self.list(parse_params(params)?).await,
            ToolKey::ProcessGet => self.get(parse_params(params)?).await,
            other => Err(ToolError::Unsupported(other.to_string())),
        }
    }
}
