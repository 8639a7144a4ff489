//! Deterministic, pure logic shared by the formatter.
//!
//! Core modules must be free of I/O side effects. They parse and validate
//! rule data and compare snapshots, returning deterministic outputs suitable
//! for tests.

pub mod action;
pub mod pages;
pub mod raw_command;
pub mod rules;
pub mod selector;
pub mod snapshot;
pub mod units;
pub mod warnings;
