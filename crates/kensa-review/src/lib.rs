//! Review orchestration for kensa.
//!
//! Builds prompts, calls the text-generation engine once per changed file,
//! decodes the answers, and publishes the aggregated report to GitHub.

pub mod event;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod response;
pub mod state;
