use crate::denylist;
use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use toolgate_policy::registry::{ToolCategory, ToolKey};
use tracing::debug;

/// A concrete implementation of one tool category.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn execute(&self, key: ToolKey, params: Value) -> Result<Value, ToolError>;
}

/// Wraps a back-end for one category and re-checks the hard denylist before
/// every call, so a back-end can never be reached for a disabled operation.
pub struct CategoryExecutor {
    category: ToolCategory,
    backend: Arc<dyn ToolBackend>,
}

impl CategoryExecutor {
    pub fn new(category: ToolCategory, backend: Arc<dyn ToolBackend>) -> Self {
        Self { category, backend }
    }

    pub fn category(&self) -> ToolCategory {
        self.category
    }

    pub async fn execute(&self, key: ToolKey, params: Value) -> Result<Value, ToolError> {
        if key.category() != self.category {
            return Err(ToolError::Validation(format!(
                "Tool '{}' does not belong to category '{}'",
                key, self.category
            )));
        }
        denylist::ensure_enabled(key)?;

        debug!("Executing {} via {} executor", key, self.category);
        self.backend.execute(key, params).await
    }
}

/// Explicit category → executor map.
#[derive(Default)]
pub struct ExecutorSet {
    executors: HashMap<ToolCategory, Arc<CategoryExecutor>>,
}

impl ExecutorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, category: ToolCategory, backend: Arc<dyn ToolBackend>) {
        self.executors
            .insert(category, Arc::new(CategoryExecutor::new(category, backend)));
    }

    pub fn with(mut self, category: ToolCategory, backend: Arc<dyn ToolBackend>) -> Self {
        self.register(category, backend);
        self
    }

    pub fn route(&self, key: ToolKey) -> Result<Arc<CategoryExecutor>, ToolError> {
        self.executors
            .get(&key.category())
            .cloned()
            .ok_or(ToolError::NoBackend(key.category()))
    }

    pub fn categories(&self) -> Vec<ToolCategory> {
        let mut categories: Vec<_> = self.executors.keys().copied().collect();
        categories.sort();
        categories
    }
}
