//! I/O helpers for formatter commands.

pub mod audit;
pub mod config;
pub mod inputs;
pub mod rules_file;
