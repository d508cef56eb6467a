//! Configuration management for the agent: loading and validating the TOML config file.
//!
//! The access point table, destinations and interface names are fixed for the lifetime of
//! the process, so unlike a long-running server config there is no file watching here.

mod loader;
mod types;

pub use loader::*;
pub use types::*;
