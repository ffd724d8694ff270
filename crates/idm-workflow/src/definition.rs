//! Workflow Definition Types and YAML Loading
//!
//! Definitions drive [`crate::memory_engine::MemoryProcessEngine`]. Each state
//! is a user task; tasks are completed by name and the matching transition
//! picks the next state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::FormProperty;

/// Bundled definition of the standard user lifecycle.
pub const BUNDLED_USER_WORKFLOW: &str = include_str!("../definitions/user_workflow.yaml");

/// Transition source matching every state.
pub const ANY_STATE: &str = "*";

/// Task name used when a form is submitted.
pub const SUBMIT_TASK: &str = "submit";

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid definition {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// A complete workflow definition loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Process key, e.g. `userWorkflow`
    pub key: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub description: String,

    /// Start routes, first match wins
    pub start: Vec<RouteDef>,

    pub states: HashMap<String, StateDef>,

    #[serde(default)]
    pub transitions: Vec<TransitionDef>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDef {
    #[serde(default)]
    pub when: Option<Condition>,
    pub to: String,
}

/// Condition on a process variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    /// Values that match (OR)
    #[serde(rename = "in", default)]
    pub in_values: Vec<String>,
    #[serde(default)]
    pub equals: Option<String>,
}

impl Condition {
    /// Without `equals` or `in`, the field only has to be present.
    pub fn matches(&self, vars: &BTreeMap<String, String>) -> bool {
        let value = vars.get(&self.field).map(String::as_str);
        match &self.equals {
            Some(expected) => value == Some(expected.as_str()),
            None if !self.in_values.is_empty() => {
                value.is_some_and(|v| self.in_values.iter().any(|i| i == v))
            }
            None => value.is_some(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Enabled flag the user takes on entering the state
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub propagate_enable: Option<bool>,
    #[serde(default)]
    pub generate_token: bool,
    #[serde(default)]
    pub form: Option<FormDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDef {
    pub key: String,
    #[serde(default)]
    pub candidate_users: Vec<String>,
    #[serde(default)]
    pub candidate_groups: Vec<String>,
    #[serde(default)]
    pub due_hours: Option<i64>,
    #[serde(default)]
    pub properties: Vec<FormProperty>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionDef {
    /// Source state, or `*`
    pub from: String,
    /// Task name completing the source state
    pub task: String,
    /// Target state; none ends the process
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub when: Option<Condition>,
    #[serde(default)]
    pub generate_token: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransitionDef {
    fn applies(&self, state: &str, task: &str, vars: &BTreeMap<String, String>) -> bool {
        (self.from == state || self.from == ANY_STATE)
            && self.task == task
            && self.when.as_ref().is_none_or(|c| c.matches(vars))
    }
}

impl WorkflowDefinition {
    pub fn state(&self, name: &str) -> Option<&StateDef> {
        self.states.get(name)
    }

    /// First start route whose condition holds
    pub fn start_state(&self, vars: &BTreeMap<String, String>) -> Option<&str> {
        self.start
            .iter()
            .find(|r| r.when.as_ref().is_none_or(|c| c.matches(vars)))
            .map(|r| r.to.as_str())
    }

    /// Transition for `task` out of `state`. Transitions declared on the
    /// state itself take precedence over wildcard ones.
    pub fn transition(
        &self,
        state: &str,
        task: &str,
        vars: &BTreeMap<String, String>,
    ) -> Option<&TransitionDef> {
        let mut candidates = self
            .transitions
            .iter()
            .filter(|t| t.applies(state, task, vars));
        let first = candidates.next()?;
        if first.from == ANY_STATE {
            Some(
                candidates
                    .find(|t| t.from == state)
                    .unwrap_or(first),
            )
        } else {
            Some(first)
        }
    }

    /// Task names that can complete `state`, in declaration order
    pub fn tasks_from(&self, state: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.transitions
            .iter()
            .filter(|t| t.from == state || t.from == ANY_STATE)
            .filter(|t| seen.insert(t.task.as_str()))
            .map(|t| t.task.clone())
            .collect()
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        let invalid = |reason: String| DefinitionError::Invalid {
            key: self.key.clone(),
            reason,
        };

        if self.start.is_empty() {
            return Err(invalid("no start route".into()));
        }
        for route in &self.start {
            if !self.states.contains_key(&route.to) {
                return Err(invalid(format!("start route to unknown state {}", route.to)));
            }
        }
        for t in &self.transitions {
            if t.from != ANY_STATE && !self.states.contains_key(&t.from) {
                return Err(invalid(format!("transition from unknown state {}", t.from)));
            }
            if let Some(to) = &t.to {
                if !self.states.contains_key(to) {
                    return Err(invalid(format!("transition to unknown state {to}")));
                }
            }
        }
        Ok(())
    }
}

/// Loader for workflow definitions
pub struct DefinitionLoader;

impl DefinitionLoader {
    /// Load all workflow definitions from a directory
    pub fn load_from_dir(dir: &Path) -> Result<HashMap<String, WorkflowDefinition>, DefinitionError> {
        let mut definitions = HashMap::new();

        if !dir.exists() {
            return Ok(definitions);
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();

            if path
                .extension()
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false)
            {
                let def = Self::load_from_file(&path)?;
                definitions.insert(def.key.clone(), def);
            }
        }

        Ok(definitions)
    }

    pub fn load_from_file(path: &Path) -> Result<WorkflowDefinition, DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(yaml: &str) -> Result<WorkflowDefinition, DefinitionError> {
        let def: WorkflowDefinition = serde_yaml::from_str(yaml)?;
        def.validate()?;
        Ok(def)
    }

    pub fn bundled() -> Result<WorkflowDefinition, DefinitionError> {
        Self::load_from_str(BUNDLED_USER_WORKFLOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPROVAL_WORKFLOW: &str = r#"
key: approvalWorkflow
start:
  - to: createApproval
states:
  createApproval:
    enabled: false
    form:
      key: createApproval
      candidate_groups: [managingDirector]
      properties:
        - id: approveCreate
          type: boolean
          required: true
  active:
    enabled: true
  rejected:
    enabled: false
transitions:
  - from: createApproval
    task: submit
    when: { field: approveCreate, equals: "true" }
    to: active
  - from: createApproval
    task: submit
    to: rejected
  - { from: "*", task: delete, to: null }
  - { from: rejected, task: delete, to: rejected }
"#;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_bundled_definition() {
        let def = DefinitionLoader::bundled().unwrap();
        assert_eq!(def.key, "userWorkflow");
        assert_eq!(def.start_state(&vars(&[])), Some("active"));
        assert_eq!(def.start_state(&vars(&[("enabled", "false")])), Some("suspended"));
        assert_eq!(def.start_state(&vars(&[("enabled", "true")])), Some("active"));

        let suspend = def.transition("active", "suspend", &vars(&[])).unwrap();
        assert_eq!(suspend.to.as_deref(), Some("suspended"));
        assert!(def.transition("suspended", "suspend", &vars(&[])).is_none());

        let delete = def.transition("suspended", "delete", &vars(&[])).unwrap();
        assert!(delete.to.is_none());
    }

    #[test]
    fn test_conditional_routing() {
        let def = DefinitionLoader::load_from_str(APPROVAL_WORKFLOW).unwrap();
        let approved = def
            .transition("createApproval", SUBMIT_TASK, &vars(&[("approveCreate", "true")]))
            .unwrap();
        assert_eq!(approved.to.as_deref(), Some("active"));

        let rejected = def
            .transition("createApproval", SUBMIT_TASK, &vars(&[("approveCreate", "false")]))
            .unwrap();
        assert_eq!(rejected.to.as_deref(), Some("rejected"));
    }

    #[test]
    fn test_state_transition_beats_wildcard() {
        let def = DefinitionLoader::load_from_str(APPROVAL_WORKFLOW).unwrap();
        let t = def.transition("rejected", "delete", &vars(&[])).unwrap();
        assert_eq!(t.to.as_deref(), Some("rejected"));
        assert_eq!(def.tasks_from("createApproval"), vec!["submit", "delete"]);
    }

    #[test]
    fn test_condition_in() {
        let cond = Condition {
            field: "level".into(),
            in_values: vec!["high".into(), "critical".into()],
            equals: None,
        };
        assert!(cond.matches(&vars(&[("level", "critical")])));
        assert!(!cond.matches(&vars(&[("level", "low")])));
        assert!(!cond.matches(&vars(&[])));
    }

    #[test]
    fn test_unknown_state_rejected() {
        let yaml = r#"
key: broken
start:
  - to: nowhere
states:
  active: {}
"#;
        assert!(matches!(
            DefinitionLoader::load_from_str(yaml),
            Err(DefinitionError::Invalid { .. })
        ));
    }

    #[test]
    fn test_load_from_missing_dir() {
        let defs = DefinitionLoader::load_from_dir(Path::new("/nonexistent/definitions")).unwrap();
        assert!(defs.is_empty());
    }
}
