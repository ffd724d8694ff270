//! In-memory process engine
//!
//! Runs YAML workflow definitions. One user task is active per running
//! instance; completing it follows the transition matching the task name.
//! History survives the end of the process until explicitly deleted.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::definition::{DefinitionError, DefinitionLoader, WorkflowDefinition, SUBMIT_TASK};
use crate::engine::{
    EngineResult, FormDefinition, FormPropertyType, ProcessEngine, StartContext, StartOutcome,
    TaskContext, TaskInfo, TaskOutcome, TaskPayload,
};
use crate::error::{DomainCause, EngineError};

/// Activity recorded when a process starts.
pub const START_ACTIVITY: &str = "create";

#[derive(Debug, Clone)]
struct ProcessInstance {
    id: String,
    process_key: String,
    /// None once the process has ended.
    state: Option<String>,
    task: Option<TaskInfo>,
    history: Vec<String>,
}

/// Effect of entering a state, reported back to the caller.
struct Entered {
    enabled: Option<bool>,
    propagate_enable: Option<bool>,
    generate_token: bool,
}

pub struct MemoryProcessEngine {
    definitions: HashMap<String, WorkflowDefinition>,
    instances: RwLock<HashMap<String, ProcessInstance>>,
}

impl MemoryProcessEngine {
    pub fn new(definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.key.clone(), d))
                .collect(),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Engine running the bundled user workflow.
    pub fn bundled() -> Result<Self, DefinitionError> {
        Ok(Self::new([DefinitionLoader::bundled()?]))
    }

    /// Definitions from a file or a directory of YAML files; the bundled one
    /// when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, DefinitionError> {
        match path {
            None => Self::bundled(),
            Some(p) if p.is_dir() => Ok(Self::new(DefinitionLoader::load_from_dir(p)?.into_values())),
            Some(p) => Ok(Self::new([DefinitionLoader::load_from_file(p)?])),
        }
    }

    fn definition(&self, key: &str) -> EngineResult<&WorkflowDefinition> {
        self.definitions
            .get(key)
            .ok_or_else(|| EngineError::new(format!("no process definition with key {key}")))
    }

    /// Move `instance` into `state`, creating its user task.
    fn enter(
        def: &WorkflowDefinition,
        instance: &mut ProcessInstance,
        state: &str,
    ) -> EngineResult<Entered> {
        let state_def = def.state(state).ok_or_else(|| {
            EngineError::new(format!("unknown state {state} in {}", def.key))
        })?;

        let now = Utc::now();
        let form = state_def.form.as_ref();
        instance.task = Some(TaskInfo {
            id: Uuid::new_v4().to_string(),
            process_instance_id: instance.id.clone(),
            definition_key: state.to_string(),
            name: state_def.name.clone().unwrap_or_else(|| state.to_string()),
            owner: None,
            assignee: None,
            candidate_users: form.map(|f| f.candidate_users.clone()).unwrap_or_default(),
            candidate_groups: form.map(|f| f.candidate_groups.clone()).unwrap_or_default(),
            create_time: now,
            due_date: form.and_then(|f| f.due_hours).map(|h| now + Duration::hours(h)),
            form: form.map(|f| FormDefinition {
                form_key: f.key.clone(),
                properties: f.properties.clone(),
            }),
        });
        instance.state = Some(state.to_string());
        instance.history.push(state.to_string());

        Ok(Entered {
            enabled: state_def.enabled,
            propagate_enable: state_def.propagate_enable,
            generate_token: state_def.generate_token,
        })
    }

    /// Complete the current task of `instance` through `task`.
    fn advance(
        def: &WorkflowDefinition,
        instance: &mut ProcessInstance,
        task: &str,
        vars: &BTreeMap<String, String>,
    ) -> EngineResult<TaskOutcome> {
        let (state, completed) = match (&instance.state, &instance.task) {
            (Some(state), Some(current)) => (state.clone(), current.definition_key.clone()),
            _ => {
                return Err(EngineError::new(format!(
                    "process {} is not active",
                    instance.id
                )))
            }
        };

        let transition = def.transition(&state, task, vars).ok_or_else(|| {
            EngineError::new(format!("no transition for task '{task}' from state '{state}'"))
        })?;
        let to = transition.to.clone();
        let transition_token = transition.generate_token;

        instance.history.push(task.to_string());
        debug!(process = %instance.id, from = %state, task, to = ?to, "transition");

        let entered = match to {
            Some(next) => Some(Self::enter(def, instance, &next)?),
            None => {
                instance.state = None;
                instance.task = None;
                info!(process = %instance.id, "process ended");
                None
            }
        };

        Ok(TaskOutcome {
            task: completed,
            enabled: entered.as_ref().and_then(|e| e.enabled),
            propagate_enable: entered.as_ref().and_then(|e| e.propagate_enable),
            generate_token: transition_token || entered.is_some_and(|e| e.generate_token),
        })
    }

    fn instance_mut<'a>(
        instances: &'a mut HashMap<String, ProcessInstance>,
        task_id: &str,
    ) -> EngineResult<&'a mut ProcessInstance> {
        instances
            .values_mut()
            .find(|i| i.task.as_ref().is_some_and(|t| t.id == task_id))
            .ok_or_else(|| EngineError::new(format!("task {task_id} not found")))
    }
}

/// Check submitted values against the form: required writable properties
/// must have a value, typed properties must parse.
fn validate_form(
    form: &FormDefinition,
    values: &BTreeMap<String, String>,
) -> EngineResult<()> {
    for prop in form.properties.iter().filter(|p| p.writable) {
        let value = values.get(&prop.id).map(String::as_str).filter(|v| !v.is_empty());

        let Some(value) = value else {
            if prop.required {
                return Err(EngineError::with_cause(
                    format!("form {} is incomplete", form.form_key),
                    DomainCause::ClientValidation(format!("{} is required", prop.id)),
                ));
            }
            continue;
        };

        let parses = match prop.property_type {
            FormPropertyType::Boolean => value.parse::<bool>().is_ok(),
            FormPropertyType::Long => value.parse::<i64>().is_ok(),
            FormPropertyType::Enum => prop.enum_values.contains_key(value),
            FormPropertyType::String | FormPropertyType::Date => true,
        };
        if !parses {
            return Err(EngineError::with_cause(
                format!("form {} has invalid values", form.form_key),
                DomainCause::ParsingValidation(format!(
                    "{value} is not a valid {} for {}",
                    prop.property_type, prop.id
                )),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl ProcessEngine for MemoryProcessEngine {
    async fn start(&self, process_key: &str, ctx: StartContext) -> EngineResult<StartOutcome> {
        let def = self.definition(process_key)?;

        let mut vars = BTreeMap::new();
        if let Some(enabled) = ctx.enabled {
            vars.insert("enabled".to_string(), enabled.to_string());
        }
        vars.insert("executor".to_string(), ctx.executor.clone());

        let state = def
            .start_state(&vars)
            .ok_or_else(|| EngineError::new(format!("no start route of {process_key} matches")))?
            .to_string();

        let mut instance = ProcessInstance {
            id: Uuid::new_v4().to_string(),
            process_key: process_key.to_string(),
            state: None,
            task: None,
            history: vec![START_ACTIVITY.to_string()],
        };
        let entered = Self::enter(def, &mut instance, &state)?;

        info!(
            process = %instance.id,
            process_key,
            state = %state,
            username = ?ctx.user.username,
            "process started"
        );

        let workflow_id = instance.id.clone();
        self.instances
            .write()
            .await
            .insert(workflow_id.clone(), instance);

        Ok(StartOutcome {
            workflow_id,
            enabled: entered.enabled,
            propagate_enable: entered.propagate_enable,
            generate_token: entered.generate_token,
        })
    }

    async fn is_active(&self, workflow_id: &str) -> EngineResult<bool> {
        Ok(self
            .instances
            .read()
            .await
            .get(workflow_id)
            .is_some_and(|i| i.state.is_some()))
    }

    async fn active_tasks(&self, workflow_id: &str) -> EngineResult<Vec<TaskInfo>> {
        let instances = self.instances.read().await;
        let instance = instances
            .get(workflow_id)
            .ok_or_else(|| EngineError::new(format!("process {workflow_id} not found")))?;
        Ok(instance.task.iter().cloned().collect())
    }

    async fn find_task(&self, task_id: &str) -> EngineResult<Option<TaskInfo>> {
        Ok(self
            .instances
            .read()
            .await
            .values()
            .filter_map(|i| i.task.as_ref())
            .find(|t| t.id == task_id)
            .cloned())
    }

    async fn complete_task(&self, task_id: &str, ctx: TaskContext) -> EngineResult<TaskOutcome> {
        let mut instances = self.instances.write().await;
        let instance = Self::instance_mut(&mut instances, task_id)?;
        let def = self.definition(&instance.process_key)?;

        let mut vars = match &ctx.payload {
            TaskPayload::Custom(values) => values.clone(),
            _ => BTreeMap::new(),
        };
        vars.insert("executor".to_string(), ctx.executor.clone());

        Self::advance(def, instance, &ctx.task, &vars)
    }

    async fn available_tasks(&self, workflow_id: &str) -> EngineResult<Vec<String>> {
        let instances = self.instances.read().await;
        let instance = instances
            .get(workflow_id)
            .ok_or_else(|| EngineError::new(format!("process {workflow_id} not found")))?;
        let def = self.definition(&instance.process_key)?;

        Ok(instance
            .state
            .as_deref()
            .map(|s| def.tasks_from(s))
            .unwrap_or_default())
    }

    async fn form_tasks(&self) -> EngineResult<Vec<TaskInfo>> {
        let instances = self.instances.read().await;
        let mut tasks: Vec<TaskInfo> = instances
            .values()
            .filter_map(|i| i.task.as_ref())
            .filter(|t| t.has_form())
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.create_time.cmp(&b.create_time));
        Ok(tasks)
    }

    async fn set_owner(&self, task_id: &str, owner: &str) -> EngineResult<()> {
        let mut instances = self.instances.write().await;
        let instance = Self::instance_mut(&mut instances, task_id)?;
        if let Some(task) = instance.task.as_mut() {
            task.owner = Some(owner.to_string());
        }
        Ok(())
    }

    async fn submit_form(
        &self,
        task_id: &str,
        submitter: &str,
        values: BTreeMap<String, String>,
    ) -> EngineResult<TaskOutcome> {
        let mut instances = self.instances.write().await;
        let instance = Self::instance_mut(&mut instances, task_id)?;
        let def = self.definition(&instance.process_key)?;

        let form = instance
            .task
            .as_ref()
            .and_then(|t| t.form.as_ref())
            .ok_or_else(|| EngineError::new(format!("task {task_id} has no form")))?;
        validate_form(form, &values)?;

        debug!(task_id, submitter, "form submitted");
        Self::advance(def, instance, SUBMIT_TASK, &values)
    }

    async fn performed_activities(&self, workflow_id: &str) -> EngineResult<Vec<String>> {
        Ok(self
            .instances
            .read()
            .await
            .get(workflow_id)
            .map(|i| i.history.clone())
            .unwrap_or_default())
    }

    async fn delete_history(&self, workflow_id: &str) -> EngineResult<()> {
        let mut instances = self.instances.write().await;
        if instances.get(workflow_id).is_some_and(|i| i.state.is_some()) {
            return Err(EngineError::new(format!(
                "process {workflow_id} is still running"
            )));
        }
        instances.remove(workflow_id);
        Ok(())
    }
}
