use jweave_classfile::ClassFileError;
use thiserror::Error;

/// Internal weaving failures. None of these escape [`crate::Weaver::rewrite`];
/// they exist so the fail-open boundary has something precise to log.
#[derive(Debug, Error)]
pub enum WeaveError {
    #[error("class file: {0}")]
    ClassFile(#[from] ClassFileError),

    #[error("circular inheritance through {0}")]
    CircularInheritance(String),

    #[error("catalog schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, WeaveError>;
