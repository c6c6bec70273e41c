pub mod agents;
pub mod audit;
pub mod exec;
pub mod health;
pub mod init;
pub mod tools;
