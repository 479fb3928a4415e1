//! Crate-level errors.
//!
//! [`EngineError`] is what the config layer, the agent and the offload worker
//! return. Script failures keep their own [`PipelineError`] and only become
//! an `EngineError` when they cross into one of those layers.

use crate::pipeline::PipelineError;
use crate::types::Category;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// No store or offload queue exists for the category
    #[error("Unsupported category: {0}")]
    UnsupportedCategory(Category),

    /// Bad or unreadable `pointflow.toml`, or a bad environment override
    #[error("Configuration error: {0}")]
    Config(String),

    /// An offload queue was closed under a sender
    #[error("Channel error: {0}")]
    Channel(String),

    /// Malformed agent input or point JSON
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Wrap the error under a context message
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// `context` / `with_context` on engine results
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`], building the message only on error
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = EngineError::Config("missing [offload] addresses".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: missing [offload] addresses"
        );
    }

    #[test]
    fn test_context_chain() {
        let res: Result<()> = Err(EngineError::Channel("closed".to_string()));
        let err = res.context("Failed to enqueue points").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to enqueue points: Channel error: closed"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unsupported_category_display() {
        let err = EngineError::UnsupportedCategory(Category::UnknownCategory);
        assert!(err.to_string().contains("unknown_category"));
    }

    #[test]
    fn test_pipeline_error_converts() {
        let err: EngineError = PipelineError::NoScript.into();
        assert!(matches!(err, EngineError::Pipeline(PipelineError::NoScript)));
    }
}
