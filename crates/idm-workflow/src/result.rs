//! Outcome of a workflow operation

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::propagation::{LinkedAccountRef, PropagationByResource};

/// Operation result plus the propagation it requires and the activities the
/// process went through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult<T> {
    pub result: T,
    pub prop_by_res: PropagationByResource<String>,
    pub prop_by_linked_account: PropagationByResource<LinkedAccountRef>,
    pub performed_tasks: BTreeSet<String>,
}

impl<T> WorkflowResult<T> {
    pub fn new(result: T, performed_tasks: BTreeSet<String>) -> Self {
        Self {
            result,
            prop_by_res: PropagationByResource::default(),
            prop_by_linked_account: PropagationByResource::default(),
            performed_tasks,
        }
    }

    pub fn with_propagation(
        mut self,
        prop_by_res: PropagationByResource<String>,
        prop_by_linked_account: PropagationByResource<LinkedAccountRef>,
    ) -> Self {
        self.prop_by_res = prop_by_res;
        self.prop_by_linked_account = prop_by_linked_account;
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WorkflowResult<U> {
        WorkflowResult {
            result: f(self.result),
            prop_by_res: self.prop_by_res,
            prop_by_linked_account: self.prop_by_linked_account,
            performed_tasks: self.performed_tasks,
        }
    }
}
