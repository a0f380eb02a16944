//! Top-level pipeline error.
//!
//! Each stage owns its own error enum; `PipelineError` aggregates them so the
//! driver can propagate with `?` and the CLI can render a single message.

use crate::config::ConfigError;
use crate::insights::FetchError;
use crate::loader::LoadError;
use crate::window::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl PipelineError {
    /// Short, stable label for the failing stage (used in the final log line).
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Validation(_) => "validation",
            PipelineError::Fetch(FetchError::Upstream { .. }) => "upstream",
            PipelineError::Fetch(FetchError::Transport(_)) => "transport",
            PipelineError::Fetch(FetchError::MalformedResponse(_)) => "upstream",
            PipelineError::Load(_) => "load",
        }
    }
}
