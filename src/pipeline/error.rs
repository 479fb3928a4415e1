//! Pipeline-specific error types.

use crate::scripting::RuntimeError;
use crate::types::Category;
use thiserror::Error;

/// Errors that can occur while compiling or running scripts.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Script {name} failed to compile: {message}")]
    Compile { name: String, message: String },

    #[error("Category {0} has no script support")]
    UnsupportedCategory(Category),

    #[error("No script to run")]
    NoScript,

    #[error("No point to process")]
    NoData,

    #[error("Script runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
