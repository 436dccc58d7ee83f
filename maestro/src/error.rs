//! Top-level runtime error, aggregating subsystem errors for the serve/cli
//! layers. Subsystems keep their own thiserror enums.

use crate::sdk::SdkError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sdk(#[from] SdkError),
    #[error("configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Invalid(String),
}

impl RuntimeError {
    pub fn config(msg: impl Into<String>) -> Self {
        RuntimeError::Config(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        RuntimeError::Invalid(msg.into())
    }
}
