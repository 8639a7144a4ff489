//! Declarative `.docx` formatting pipeline.
//!
//! A rule set (engine preference, safety policy, ordered steps) is applied to
//! a document through a pluggable backend [`engine::Engine`]. The crate is
//! split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (rule model, selector and action
//!   grammar, snapshot comparison). No I/O.
//! - **[`engine`]**: The backend abstraction plus the in-memory docx backend
//!   and the live automation backend.
//! - **[`io`]**: Side-effecting helpers (config, rule files, inputs, audit).
//!
//! Orchestration modules ([`resolve`], [`dispatch`], [`recipes`],
//! [`pipeline`], [`batch`]) combine them to implement CLI commands.

pub mod batch;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod recipes;
pub mod resolve;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
