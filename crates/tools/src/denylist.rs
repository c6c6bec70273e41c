//! Operations that never run, whatever the security config or agent says.

use crate::error::ToolError;
use toolgate_policy::registry::ToolKey;

pub fn ensure_enabled(key: ToolKey) -> Result<(), ToolError> {
    match key.hard_disabled_reason() {
        Some(reason) => Err(ToolError::Disabled(reason)),
        None => Ok(()),
    }
}

pub fn is_hard_disabled(key: ToolKey) -> bool {
    key.hard_disabled_reason().is_some()
}

pub fn disabled_keys() -> impl Iterator<Item = ToolKey> {
    ToolKey::ALL.into_iter().filter(|key| is_hard_disabled(*key))
}
