//! Workflow forms
//!
//! A form is the user-facing view of a pending form task: its properties plus
//! the user snapshot and pending update stashed in the process context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idm_anyops::{UserTO, UserUR};

use crate::context::ProcessContext;
use crate::engine::{FormProperty, FormPropertyType, TaskInfo};
use crate::user::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowFormProperty {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: FormPropertyType,
    pub value: Option<String>,
    pub readable: bool,
    pub writable: bool,
    pub required: bool,
    pub date_pattern: Option<String>,
    pub enum_values: BTreeMap<String, String>,
}

impl From<&FormProperty> for WorkflowFormProperty {
    fn from(prop: &FormProperty) -> Self {
        Self {
            id: prop.id.clone(),
            name: prop.name.clone().unwrap_or_else(|| prop.id.clone()),
            property_type: prop.property_type,
            value: prop.value.clone(),
            readable: prop.readable,
            writable: prop.writable,
            required: prop.required,
            date_pattern: prop.date_pattern.clone(),
            enum_values: prop.enum_values.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowForm {
    pub user_key: String,
    pub username: Option<String>,
    pub task_id: String,
    pub form_key: String,
    pub owner: Option<String>,
    pub create_time: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub properties: Vec<WorkflowFormProperty>,
    /// User as it was when the form task was reached.
    pub user_snapshot: Option<UserTO>,
    /// Update waiting for this form, if any.
    pub user_update: Option<UserUR>,
}

impl WorkflowForm {
    /// Form view of `task`, or none when the task carries no form.
    pub fn from_task(task: &TaskInfo, user: &User, context: &ProcessContext) -> Option<Self> {
        let form = task.form.as_ref()?;
        Some(Self {
            user_key: user.key.clone(),
            username: user.username.clone(),
            task_id: task.id.clone(),
            form_key: form.form_key.clone(),
            owner: task.owner.clone(),
            create_time: task.create_time,
            due_date: task.due_date,
            properties: form.properties.iter().map(Into::into).collect(),
            user_snapshot: context.user_snapshot.clone(),
            user_update: context.user_update.clone(),
        })
    }

    pub fn property(&self, id: &str) -> Option<&WorkflowFormProperty> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// Set the value of property `id`; false when there is no such property.
    pub fn set_value(&mut self, id: &str, value: impl Into<String>) -> bool {
        match self.properties.iter_mut().find(|p| p.id == id) {
            Some(prop) => {
                prop.value = Some(value.into());
                true
            }
            None => false,
        }
    }

    /// Values of the writable properties, the only ones sent on submit.
    pub fn properties_for_submit(&self) -> BTreeMap<String, String> {
        self.properties
            .iter()
            .filter(|p| p.writable)
            .filter_map(|p| p.value.clone().map(|v| (p.id.clone(), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FormDefinition;

    fn make_form() -> WorkflowForm {
        let mut approve = FormProperty::new("approveCreate");
        approve.property_type = FormPropertyType::Boolean;
        let mut username = FormProperty::new("username");
        username.writable = false;
        username.value = Some("rossini".into());

        let task = TaskInfo {
            id: "t1".into(),
            process_instance_id: "p1".into(),
            definition_key: "createApproval".into(),
            name: "Create approval".into(),
            owner: None,
            assignee: None,
            candidate_users: vec![],
            candidate_groups: vec!["managingDirector".into()],
            create_time: Utc::now(),
            due_date: None,
            form: Some(FormDefinition {
                form_key: "createApproval".into(),
                properties: vec![approve, username],
            }),
        };
        let user = User::from_to(&UserTO::new("rossini"), false);
        WorkflowForm::from_task(&task, &user, &ProcessContext::new("p1")).unwrap()
    }

    #[test]
    fn test_only_writable_values_submitted() {
        let mut form = make_form();
        assert!(form.properties_for_submit().is_empty());

        assert!(form.set_value("approveCreate", "true"));
        assert!(!form.set_value("missing", "x"));

        let submitted = form.properties_for_submit();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted["approveCreate"], "true");
        assert_eq!(form.property("username").unwrap().name, "username");
    }
}
