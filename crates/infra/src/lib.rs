//! Encrypted persistence for the agent registry and the audit trail.

pub mod agent_store;
pub mod audit_log;
pub mod cipher;

pub use agent_store::{AgentRegistry, AgentStore, StoreError, REGISTRY_VERSION};
pub use audit_log::{AuditError, AuditLog};
pub use cipher::{AesGcmCipher, Cipher, CipherError};
