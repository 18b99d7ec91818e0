//! Core types, configuration, and error handling for kensa.
//!
//! This crate provides the shared foundation used by the other kensa crates:
//! - [`KensaError`]: unified error type using `thiserror`
//! - [`KensaConfig`]: configuration loaded from `.kensa.toml` and the environment
//! - Shared types: [`ReviewContext`], [`ReviewItem`], [`LineRef`],
//!   [`FileReview`], [`PromptVariant`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{parse_exclude_list, GitHubConfig, KensaConfig, LlmConfig, ReviewConfig};
pub use error::KensaError;
pub use types::{
    FileReview, LineRef, OutputFormat, PromptVariant, RepoRef, ReviewContext, ReviewItem,
};

/// A convenience `Result` type for kensa operations.
pub type Result<T> = std::result::Result<T, KensaError>;
