//! Workflow errors
//!
//! Engine failures carry an optional domain cause. When present, the cause is
//! surfaced to the caller as-is; otherwise the failure is wrapped with the
//! context of the operation that hit it.

use thiserror::Error;

use idm_anyops::AnyOpsError;

use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::policy::PolicyError;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Domain failure raised from inside the process engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainCause {
    #[error("client validation: {0}")]
    ClientValidation(String),

    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    #[error("parsing validation: {0}")]
    ParsingValidation(String),
}

/// Failure reported by a [`crate::engine::ProcessEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
    pub cause: Option<DomainCause>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: DomainCause) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("client validation failed: {0}")]
    ClientValidation(String),

    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    #[error("parsing validation failed: {0}")]
    ParsingValidation(String),

    #[error("{context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: EngineError,
    },

    #[error("{user} is not candidate for task {task_id}")]
    NotCandidate { user: String, task_id: String },

    #[error("task {task_id} assigned to {owner:?} but submitted by {submitter}")]
    TaskOwnerMismatch {
        task_id: String,
        owner: Option<String>,
        submitter: String,
    },

    #[error("wrong or expired token for user {0}")]
    WrongToken(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    AnyOps(#[from] AnyOpsError),
}

impl WorkflowError {
    /// Surface the domain cause of an engine failure, or wrap it with `context`.
    pub fn from_engine(err: EngineError, context: impl Into<String>) -> Self {
        match err.cause {
            Some(DomainCause::ClientValidation(msg)) => Self::ClientValidation(msg),
            Some(DomainCause::InvalidEntity(msg)) => Self::InvalidEntity(msg),
            Some(DomainCause::ParsingValidation(msg)) => Self::ParsingValidation(msg),
            None => Self::Engine {
                context: context.into(),
                source: err,
            },
        }
    }
}

impl From<PolicyError> for WorkflowError {
    fn from(err: PolicyError) -> Self {
        Self::InvalidEntity(err.to_string())
    }
}
