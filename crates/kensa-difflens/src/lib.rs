//! Unified diff parsing and path filtering.
//!
//! Turns raw diff text into per-file chunks with resolved line numbers, and
//! drops files that should never reach the review engine.

pub mod filter;
pub mod parser;
