#[cfg(feature = "audit-log")]
pub mod audit_cmd;
pub mod completions;
pub mod delete;
pub mod download;
pub mod fetch;
pub mod init;
pub mod list;
pub mod publish;
pub mod register;
pub mod upload;
