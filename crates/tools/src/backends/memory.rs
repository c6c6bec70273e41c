//! In-process conversation summaries for `memory.*`.

use super::parse_params;
use crate::error::ToolError;
use crate::executors::ToolBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use toolgate_policy::registry::ToolKey;

const MAX_SUMMARY_LEN: usize = 16 * 1024;
/// Oldest summaries are dropped past this count.
pub const MAX_SUMMARIES: usize = 500;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct GetInput {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct AddInput {
    content: String,
}

#[derive(Default)]
pub struct MemoryBackend {
    summaries: Mutex<Vec<Summary>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.summaries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, input: GetInput) -> Value {
        let summaries = self.summaries.lock();
        let limit = input.limit.unwrap_or(summaries.len());
        let recent: Vec<&Summary> = summaries.iter().rev().take(limit).collect();
        json!({ "summaries": recent })
    }

    fn add(&self, input: AddInput) -> Result<Value, ToolError> {
        let content = input.content.trim();
        if content.is_empty() {
            return Err(ToolError::Validation("content must not be empty".into()));
        }
        if content.len() > MAX_SUMMARY_LEN {
            return Err(ToolError::Validation("summary is too long".into()));
        }

        let summary = Summary {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let id = summary.id.clone();

        let mut summaries = self.summaries.lock();
        summaries.push(summary);
        let overflow = summaries.len().saturating_sub(MAX_SUMMARIES);
        if overflow > 0 {
            summaries.drain(..overflow);
        }
        Ok(json!({ "id": id }))
    }

    fn clear(&self) -> Value {
        let mut summaries = self.summaries.lock();
        let cleared = summaries.len();
        summaries.clear();
        json!({ "cleared": cleared })
    }
}

#[async_trait]
impl ToolBackend for MemoryBackend {
    async fn execute(&self, key: ToolKey, params: Value) -> Result<Value, ToolError> {
        match key {
            ToolKey::MemoryGetSummaries => Ok(self.get(parse_params(params)?)),
            ToolKey::MemoryAddSummary => self.add(parse_params(params)?),
            ToolKey::MemoryClearSummaries => Ok(self.clear()),
            other => Err(ToolError::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_get_clear() {
        let backend = MemoryBackend::new();
        backend
            .execute(ToolKey::MemoryAddSummary, json!({ "content": "first" }))
            .await
            .unwrap();
        backend
            .execute(ToolKey::MemoryAddSummary, json!({ "content": "second" }))
            .await
            .unwrap();

        let got = backend
            .execute(ToolKey::MemoryGetSummaries, json!({ "limit": 1 }))
            .await
            .unwrap();
        assert_eq!(got["summaries"][0]["content"], "second");
        assert_eq!(got["summaries"].as_array().unwrap().len(), 1);

        let cleared = backend
            .execute(ToolKey::MemoryClearSummaries, Value::Null)
            .await
            .unwrap();
        assert_eq!(cleared["cleared"], 2);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_oldest_summaries_evicted_past_cap() {
        let backend = MemoryBackend::new();
        for i in 0..MAX_SUMMARIES + 3 {
            backend
                .add(AddInput {
                    content: format!("summary {}", i),
                })
                .unwrap();
        }

        assert_eq!(backend.len(), MAX_SUMMARIES);
        let all = backend.get(GetInput { limit: None });
        let summaries = all["summaries"].as_array().unwrap();
        assert_eq!(summaries[0]["content"], format!("summary {}", MAX_SUMMARIES + 2));
        assert_eq!(summaries[MAX_SUMMARIES - 1]["content"], "summary 3");
    }

    #[tokio::test]
    async fn test_empty_summary_rejected() {
        let backend = MemoryBackend::new();
        let result = backend
            .execute(ToolKey::MemoryAddSummary, json!({ "content": "   " }))
            .await;
        assert!(matches!(result, Err(ToolError::Validation(_))));
    }
}
