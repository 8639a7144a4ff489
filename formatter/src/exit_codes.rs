//! Stable exit codes for `format-docx` commands.

/// Every input processed (or the command succeeded).
pub const OK: i32 = 0;
/// Rules, engine, open, step or save failure, or no input matched.
pub const FAILURE: i32 = 1;
