//! Shipped back-ends. Other categories are provided by the embedding
//! application through [`crate::executors::ToolBackend`].

pub mod file;
pub mod memory;
pub mod process;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use process::ProcessBackend;

use crate::error::ToolError;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub(crate) fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, ToolError> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| ToolError::Validation(e.to_string()))
}
