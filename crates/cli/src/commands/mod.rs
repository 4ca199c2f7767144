//! Command handlers for the Recall CLI.

pub mod query;
pub mod shell;

pub use query::QueryCommand;
pub use shell::ShellCommand;
