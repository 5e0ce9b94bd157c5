//! Receipt bot core library: webhook gateway, signature checks, receipt analysis, and storage
//! used by the CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod pipeline;
pub mod receipt;
pub mod signature;
pub mod store;
