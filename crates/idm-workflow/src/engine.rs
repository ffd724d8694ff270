//! Process engine port
//!
//! The adapter never holds process state of its own: every transition is a
//! call into a [`ProcessEngine`], with the executor, the user snapshot and a
//! typed payload passed explicitly.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idm_anyops::{UserTO, UserUR};

use crate::error::EngineError;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormPropertyType {
    #[default]
    String,
    Long,
    Enum,
    Date,
    Boolean,
}

impl FormPropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Long => "long",
            Self::Enum => "enum",
            Self::Date => "date",
            Self::Boolean => "boolean",
        }
    }
}

impl std::fmt::Display for FormPropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormProperty {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub property_type: FormPropertyType,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default = "default_true")]
    pub writable: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub date_pattern: Option<String>,
    /// Allowed values of an enum property, id to label.
    #[serde(default)]
    pub enum_values: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl FormProperty {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            property_type: FormPropertyType::default(),
            value: None,
            readable: true,
            writable: true,
            required: false,
            date_pattern: None,
            enum_values: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDefinition {
    pub form_key: String,
    pub properties: Vec<FormProperty>,
}

/// A user task waiting on a process instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: String,
    pub process_instance_id: String,
    /// Id of the task within the definition; doubles as the user status.
    pub definition_key: String,
    pub name: String,
    pub owner: Option<String>,
    pub assignee: Option<String>,
    pub candidate_users: Vec<String>,
    pub candidate_groups: Vec<String>,
    pub create_time: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub form: Option<FormDefinition>,
}

impl TaskInfo {
    pub fn has_form(&self) -> bool {
        self.form.is_some()
    }

    pub fn is_candidate(&self, user: &str, groups: &[String]) -> bool {
        self.candidate_users.iter().any(|c| c == user)
            || self.owner.as_deref() == Some(user)
            || self.assignee.as_deref() == Some(user)
            || self.candidate_groups.iter().any(|g| groups.contains(g))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartContext {
    pub executor: String,
    pub user: UserTO,
    /// Explicit enabled flag requested by the caller, if any.
    pub enabled: Option<bool>,
    pub store_password: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub workflow_id: String,
    /// Enabled flag of the state the process landed in, when it has one.
    pub enabled: Option<bool>,
    pub propagate_enable: Option<bool>,
    pub generate_token: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    None,
    Activate { token: String },
    Update { request: UserUR },
    PasswordReset,
    ConfirmPasswordReset { token: String, password: String },
    Custom(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskContext {
    pub executor: String,
    /// Task name, e.g. `update` or `suspend`.
    pub task: String,
    pub user: UserTO,
    pub payload: TaskPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Definition key of the completed task.
    pub task: String,
    pub enabled: Option<bool>,
    pub propagate_enable: Option<bool>,
    pub generate_token: bool,
}

#[async_trait]
pub trait ProcessEngine: Send + Sync {
    // ── Process ──

    async fn start(&self, process_key: &str, ctx: StartContext) -> EngineResult<StartOutcome>;
    async fn is_active(&self, workflow_id: &str) -> EngineResult<bool>;

    // ── Tasks ──

    async fn active_tasks(&self, workflow_id: &str) -> EngineResult<Vec<TaskInfo>>;
    async fn find_task(&self, task_id: &str) -> EngineResult<Option<TaskInfo>>;
    async fn complete_task(&self, task_id: &str, ctx: TaskContext) -> EngineResult<TaskOutcome>;

    /// Task names that can be completed from the current state.
    async fn available_tasks(&self, workflow_id: &str) -> EngineResult<Vec<String>>;

    // ── Forms ──

    async fn form_tasks(&self) -> EngineResult<Vec<TaskInfo>>;
    async fn set_owner(&self, task_id: &str, owner: &str) -> EngineResult<()>;
    async fn submit_form(
        &self,
        task_id: &str,
        submitter: &str,
        values: BTreeMap<String, String>,
    ) -> EngineResult<TaskOutcome>;

    // ── History ──

    /// Activities performed so far, oldest first.
    async fn performed_activities(&self, workflow_id: &str) -> EngineResult<Vec<String>>;
    async fn delete_history(&self, workflow_id: &str) -> EngineResult<()>;
}
