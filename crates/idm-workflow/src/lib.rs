//! idm-workflow - User Lifecycle Workflow Adapter
//!
//! Maps user lifecycle operations onto a process instance hosted by a
//! [`ProcessEngine`], persists the resulting status and computes which
//! external resources need propagation.
//!
//! ```text
//!                    ┌──────────────────────┐
//!   create/update ──►│ UserWorkflowAdapter  │──► WorkflowResult
//!   suspend/...      │  policies, cipher    │     (propagation, performed tasks)
//!                    └───┬──────┬───────┬───┘
//!                        │      │       │
//!              ProcessEngine  UserStore  ContextStore
//!           (MemoryProcessEngine + YAML definitions)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use idm_workflow::{
//!     MemoryContextStore, MemoryProcessEngine, MemoryUserStore, UserWorkflowAdapter,
//!     WorkflowConfig,
//! };
//!
//! let config = WorkflowConfig::from_env()?;
//! let engine = MemoryProcessEngine::load(config.definition_path.as_deref())?;
//! let adapter = UserWorkflowAdapter::new(
//!     Arc::new(engine),
//!     Arc::new(MemoryUserStore::new()),
//!     Arc::new(MemoryContextStore::new()),
//!     config,
//! )?;
//!
//! let created = adapter.create("admin", &user_to, false, None, true).await?;
//! ```

pub mod adapter;
pub mod config;
pub mod context;
pub mod crypto;
pub mod definition;
pub mod engine;
pub mod error;
pub mod form;
pub mod memory_engine;
pub mod policy;
pub mod propagation;
pub mod result;
pub mod store;
pub mod user;

pub use adapter::UserWorkflowAdapter;
pub use config::{ConfigError, WorkflowConfig};
pub use context::{PendingPropagation, ProcessContext, PropagationState};
pub use crypto::{CryptoError, PasswordCipher};
pub use definition::{DefinitionError, DefinitionLoader, WorkflowDefinition};
pub use engine::{
    FormDefinition, FormProperty, FormPropertyType, ProcessEngine, StartContext, StartOutcome,
    TaskContext, TaskInfo, TaskOutcome, TaskPayload,
};
pub use error::{DomainCause, EngineError, Result, WorkflowError};
pub use form::{WorkflowForm, WorkflowFormProperty};
pub use memory_engine::MemoryProcessEngine;
pub use policy::{AccountPolicy, PasswordPolicy, PolicyEnforcer, PolicyError};
pub use propagation::{LinkedAccountRef, PropagationByResource, ResourceOperation};
pub use result::WorkflowResult;
pub use store::{ContextStore, MemoryContextStore, MemoryUserStore, StoreError, UserStore};
pub use user::User;
