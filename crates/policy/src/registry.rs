//! Tool risk registry.
//!
//! Every tool the system can ever run is listed here exactly once. Keys are
//! resolved into [`ToolKey`] at the boundary; everything past that point works
//! with the typed key.

use crate::error::PolicyError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Moderate,
    Dangerous,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Safe,
        RiskLevel::Moderate,
        RiskLevel::Dangerous,
        RiskLevel::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Dangerous => "dangerous",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == value)
    }

    /// Dangerous and critical tools are gated by the security config.
    pub fn is_elevated(self) -> bool {
        matches!(self, RiskLevel::Dangerous | RiskLevel::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    File,
    Model,
    Vector,
    Process,
    System,
    Network,
    Memory,
    Messaging,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 8] = [
        ToolCategory::File,
        ToolCategory::Model,
        ToolCategory::Vector,
        ToolCategory::Process,
        ToolCategory::System,
        ToolCategory::Network,
        ToolCategory::Memory,
        ToolCategory::Messaging,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolCategory::File => "file",
            ToolCategory::Model => "model",
            ToolCategory::Vector => "vector",
            ToolCategory::Process => "process",
            ToolCategory::System => "system",
            ToolCategory::Network => "network",
            ToolCategory::Memory => "memory",
            ToolCategory::Messaging => "messaging",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed identity of one invocable capability.
///
/// The string form is `"<category>.<operation>"`; it is parsed once and never
/// split again downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ToolKey {
    FileRead,
    FileList,
    FileSearch,
    FileWrite,
    FileMove,
    FileDelete,
    ModelGenerate,
    ModelList,
    ModelSummarize,
    ModelPull,
    VectorQuery,
    VectorListCollections,
    VectorAdd,
    VectorDelete,
    ProcessList,
    ProcessGet,
    ProcessKill,
    SystemExecuteCommand,
    NetworkPing,
    NetworkHttpRequest,
    NetworkWebsocketConnect,
    MemoryGetSummaries,
    MemoryAddSummary,
    MemoryClearSummaries,
    MessagingListConversations,
    MessagingReadMessages,
    MessagingGetUnread,
    MessagingSendMessage,
    MessagingReply,
}

impl ToolKey {
    pub const ALL: [ToolKey; 29] = [
        ToolKey::FileRead,
        ToolKey::FileList,
        ToolKey::FileSearch,
        ToolKey::FileWrite,
        ToolKey::FileMove,
        ToolKey::FileDelete,
        ToolKey::ModelGenerate,
        ToolKey::ModelList,
        ToolKey::ModelSummarize,
        ToolKey::ModelPull,
        ToolKey::VectorQuery,
        ToolKey::VectorListCollections,
        ToolKey::VectorAdd,
        ToolKey::VectorDelete,
        ToolKey::ProcessList,
        ToolKey::ProcessGet,
        ToolKey::ProcessKill,
        ToolKey::SystemExecuteCommand,
        ToolKey::NetworkPing,
        ToolKey::NetworkHttpRequest,
        ToolKey::NetworkWebsocketConnect,
        ToolKey::MemoryGetSummaries,
        ToolKey::MemoryAddSummary,
        ToolKey::MemoryClearSummaries,
        ToolKey::MessagingListConversations,
        ToolKey::MessagingReadMessages,
        ToolKey::MessagingGetUnread,
        ToolKey::MessagingSendMessage,
        ToolKey::MessagingReply,
    ];

    pub fn category(self) -> ToolCategory {
        match self {
            ToolKey::FileRead
            | ToolKey::FileList
            | ToolKey::FileSearch
            | ToolKey::FileWrite
            | ToolKey::FileMove
            | ToolKey::FileDelete => ToolCategory::File,
            ToolKey::ModelGenerate
            | ToolKey::ModelList
            | ToolKey::ModelSummarize
            | ToolKey::ModelPull => ToolCategory::Model,
            ToolKey::VectorQuery
            | ToolKey::VectorListCollections
            | ToolKey::VectorAdd
            | ToolKey::VectorDelete => ToolCategory::Vector,
            ToolKey::ProcessList | ToolKey::ProcessGet | ToolKey::ProcessKill => {
                ToolCategory::Process
            }
            ToolKey::SystemExecuteCommand => ToolCategory::System,
            ToolKey::NetworkPing
            | ToolKey::NetworkHttpRequest
            | ToolKey::NetworkWebsocketConnect => ToolCategory::Network,
            ToolKey::MemoryGetSummaries
            | ToolKey::MemoryAddSummary
            | ToolKey::MemoryClearSummaries => ToolCategory::Memory,
            ToolKey::MessagingListConversations
            | ToolKey::MessagingReadMessages
            | ToolKey::MessagingGetUnread
            | ToolKey::MessagingSendMessage
            | ToolKey::MessagingReply => ToolCategory::Messaging,
        }
    }

    pub fn operation(self) -> &'static str {
        match self {
            ToolKey::FileRead => "read",
            ToolKey::FileList => "list",
            ToolKey::FileSearch => "search",
            ToolKey::FileWrite => "write",
            ToolKey::FileMove => "move",
            ToolKey::FileDelete => "delete",
            ToolKey::ModelGenerate => "generate",
            ToolKey::ModelList => "list",
            ToolKey::ModelSummarize => "summarize",
            ToolKey::ModelPull => "pull",
            ToolKey::VectorQuery => "query",
            ToolKey::VectorListCollections => "list_collections",
            ToolKey::VectorAdd => "add",
            ToolKey::VectorDelete => "delete",
            ToolKey::ProcessList => "list",
            ToolKey::ProcessGet => "get",
            ToolKey::ProcessKill => "kill",
            ToolKey::SystemExecuteCommand => "execute_command",
            ToolKey::NetworkPing => "ping",
            ToolKey::NetworkHttpRequest => "http_request",
            ToolKey::NetworkWebsocketConnect => "websocket_connect",
            ToolKey::MemoryGetSummaries => "get_summaries",
            ToolKey::MemoryAddSummary => "add_summary",
            ToolKey::MemoryClearSummaries => "clear_summaries",
            ToolKey::MessagingListConversations => "list_conversations",
            ToolKey::MessagingReadMessages => "read_messages",
            ToolKey::MessagingGetUnread => "get_unread",
            ToolKey::MessagingSendMessage => "send_message",
            ToolKey::MessagingReply => "reply",
        }
    }

    /// Operations that can never run, whatever the security config says.
    ///
    /// This list is compiled in on purpose and has no runtime override.
    pub fn hard_disabled_reason(self) -> Option<&'static str> {
        match self {
            ToolKey::SystemExecuteCommand => {
                Some("System command execution is disabled for security reasons")
            }
            ToolKey::ProcessKill => Some("Process termination is disabled for security reasons"),
            ToolKey::NetworkHttpRequest => {
                Some("Arbitrary HTTP requests are disabled for security reasons")
            }
            ToolKey::NetworkWebsocketConnect => {
                Some("WebSocket connections are disabled for security reasons")
            }
            ToolKey::MessagingSendMessage => {
                Some("Sending direct messages is disabled for security reasons")
            }
            ToolKey::MessagingReply => {
                Some("Replying to direct messages is disabled for security reasons")
            }
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Result<Self, PolicyError> {
        let Some((category, operation)) = value.split_once('.') else {
            return Err(PolicyError::MalformedKey(value.to_string()));
        };
        if category.is_empty() || operation.is_empty() {
            return Err(PolicyError::MalformedKey(value.to_string()));
        }

        Self::ALL
            .into_iter()
            .find(|key| key.category().as_str() == category && key.operation() == operation)
            .ok_or_else(|| PolicyError::UnknownTool(value.to_string()))
    }
}

impl fmt::Display for ToolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category(), self.operation())
    }
}

impl FromStr for ToolKey {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ToolKey {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ToolKey> for String {
    fn from(key: ToolKey) -> Self {
        key.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub key: ToolKey,
    pub category: ToolCategory,
    pub operation: &'static str,
    pub risk_level: RiskLevel,
    pub requires_confirmation: bool,
    pub description: &'static str,
}

impl ToolDescriptor {
    fn new(
        key: ToolKey,
        risk_level: RiskLevel,
        requires_confirmation: bool,
        description: &'static str,
    ) -> Self {
        Self {
            key,
            category: key.category(),
            operation: key.operation(),
            risk_level,
            requires_confirmation,
            description,
        }
    }
}

/// Immutable catalog mapping each tool key to its risk metadata.
pub struct ToolRegistry {
    descriptors: HashMap<ToolKey, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        use RiskLevel::*;
        use ToolKey::*;

        let catalog = [
            ToolDescriptor::new(FileRead, Safe, false, "Read the contents of a file"),
            ToolDescriptor::new(FileList, Safe, false, "List the entries of a directory"),
            ToolDescriptor::new(FileSearch, Safe, false, "Search file names under a directory"),
            ToolDescriptor::new(FileWrite, Moderate, true, "Write content to a file"),
            ToolDescriptor::new(FileMove, Dangerous, true, "Move or rename a file"),
            ToolDescriptor::new(FileDelete, Critical, true, "Delete a file"),
            ToolDescriptor::new(ModelGenerate, Safe, false, "Generate text with a local model"),
            ToolDescriptor::new(ModelList, Safe, false, "List installed models"),
            ToolDescriptor::new(ModelSummarize, Safe, false, "Summarize text with a local model"),
            ToolDescriptor::new(ModelPull, Moderate, true, "Download a model"),
            ToolDescriptor::new(VectorQuery, Safe, false, "Query a vector store collection"),
            ToolDescriptor::new(
                VectorListCollections,
                Safe,
                false,
                "List vector store collections",
            ),
            ToolDescriptor::new(
                VectorAdd,
                Moderate,
                true,
                "Add documents to a vector store collection",
            ),
            ToolDescriptor::new(
                VectorDelete,
                Dangerous,
                true,
                "Delete documents from a vector store collection",
            ),
            ToolDescriptor::new(ProcessList, Safe, false, "List running processes"),
            ToolDescriptor::new(ProcessGet, Safe, false, "Inspect a running process"),
            ToolDescriptor::new(ProcessKill, Critical, true, "Terminate a running process"),
            ToolDescriptor::new(
                SystemExecuteCommand,
                Critical,
                true,
                "Execute an arbitrary system command",
            ),
            ToolDescriptor::new(NetworkPing, Moderate, false, "Ping a network host"),
            ToolDescriptor::new(
                NetworkHttpRequest,
                Dangerous,
                true,
                "Send an arbitrary HTTP request",
            ),
            ToolDescriptor::new(
                NetworkWebsocketConnect,
                Dangerous,
                true,
                "Open an arbitrary WebSocket connection",
            ),
            ToolDescriptor::new(
                MemoryGetSummaries,
                Safe,
                false,
                "Read stored conversation summaries",
            ),
            ToolDescriptor::new(MemoryAddSummary, Moderate, false, "Store a conversation summary"),
            ToolDescriptor::new(
                MemoryClearSummaries,
                Dangerous,
                true,
                "Clear stored conversation summaries",
            ),
            ToolDescriptor::new(
                MessagingListConversations,
                Safe,
                false,
                "List messaging conversations",
            ),
            ToolDescriptor::new(
                MessagingReadMessages,
                Moderate,
                false,
                "Read messages in a conversation",
            ),
            ToolDescriptor::new(MessagingGetUnread, Safe, false, "Get unread messages"),
            ToolDescriptor::new(MessagingSendMessage, Critical, true, "Send a direct message"),
            ToolDescriptor::new(MessagingReply, Critical, true, "Reply to a direct message"),
        ];

        Self {
            descriptors: catalog.into_iter().map(|d| (d.key, d)).collect(),
        }
    }

    /// Look up a tool by its string key. Unknown or malformed keys yield `None`.
    pub fn lookup(&self, tool_key: &str) -> Option<&ToolDescriptor> {
        ToolKey::parse(tool_key)
            .ok()
            .and_then(|key| self.descriptors.get(&key))
    }

    pub fn get(&self, key: ToolKey) -> Option<&ToolDescriptor> {
        self.descriptors.get(&key)
    }

    /// All descriptors in declaration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> + '_ {
        ToolKey::ALL
            .iter()
            .filter_map(move |key| self.descriptors.get(key))
    }

    pub fn count(&self) -> usize {
        self.descriptors.len()
    }

    /// Simplified `category -> [operation]` view offered to agents when they
    /// enumerate tools. Derived from the full catalog and never lists an
    /// operation that is hard-disabled.
    pub fn available_operations(&self) -> BTreeMap<ToolCategory, Vec<&'static str>> {
        let mut view: BTreeMap<ToolCategory, Vec<&'static str>> = BTreeMap::new();
        for descriptor in self.descriptors() {
            if descriptor.key.hard_disabled_reason().is_some() {
                continue;
            }
            view.entry(descriptor.category)
                .or_default()
                .push(descriptor.operation);
        }
        view
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_has_a_descriptor() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.count(), ToolKey::ALL.len());
        for key in ToolKey::ALL {
            assert!(registry.get(key).is_some(), "missing descriptor for {key}");
        }
    }

    #[test]
    fn test_key_string_form() {
        for key in ToolKey::ALL {
            let text = key.to_string();
            assert_eq!(ToolKey::parse(&text).unwrap(), key);
        }
        assert_eq!(
            ToolKey::SystemExecuteCommand.to_string(),
            "system.execute_command"
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ToolKey::parse("file"),
            Err(PolicyError::MalformedKey(_))
        ));
        assert!(matches!(
            ToolKey::parse(".read"),
            Err(PolicyError::MalformedKey(_))
        ));
        assert!(matches!(
            ToolKey::parse("file.teleport"),
            Err(PolicyError::UnknownTool(_))
        ));
    }

    #[test]
    fn test_lookup() {
        let registry = ToolRegistry::new();
        let descriptor = registry.lookup("file.read").unwrap();
        assert_eq!(descriptor.risk_level, RiskLevel::Safe);
        assert_eq!(descriptor.category, ToolCategory::File);
        assert!(registry.lookup("file.teleport").is_none());
        assert!(registry.lookup("").is_none());
    }

    #[test]
    fn test_available_operations_hides_hard_disabled() {
        let registry = ToolRegistry::new();
        let view = registry.available_operations();

        assert!(!view.contains_key(&ToolCategory::System));
        assert!(!view[&ToolCategory::Process].contains(&"kill"));
        assert!(!view[&ToolCategory::Messaging].contains(&"send_message"));
        assert_eq!(view[&ToolCategory::Network], vec!["ping"]);
        assert!(view[&ToolCategory::File].contains(&"read"));
    }

    #[test]
    fn test_hard_disabled_tools_are_elevated() {
        let registry = ToolRegistry::new();
        for key in ToolKey::ALL {
            if key.hard_disabled_reason().is_some() {
                assert!(registry.get(key).unwrap().risk_level.is_elevated());
            }
        }
    }

    #[test]
    fn test_key_serde_as_string() {
        let json = serde_json::to_string(&ToolKey::VectorListCollections).unwrap();
        assert_eq!(json, "\"vector.list_collections\"");
        let key: ToolKey = serde_json::from_str("\"memory.add_summary\"").unwrap();
        assert_eq!(key, ToolKey::MemoryAddSummary);
        assert!(serde_json::from_str::<ToolKey>("\"nope.nope\"").is_err());
    }
}
