use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Malformed tool key '{0}': expected <category>.<operation>")]
    MalformedKey(String),
}
