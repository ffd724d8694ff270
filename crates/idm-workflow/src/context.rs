//! Process context
//!
//! Variables that ride along with a running process: the user snapshot and
//! pending update shown on approval forms, the last form submitter, and the
//! propagation stashed until an approval completes.

use serde::{Deserialize, Serialize};

use idm_anyops::{UserTO, UserUR};

use crate::propagation::{LinkedAccountRef, PropagationByResource};

/// Propagation computed before a form task and replayed once it is submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPropagation {
    pub prop_by_res: PropagationByResource<String>,
    pub prop_by_linked_account: PropagationByResource<LinkedAccountRef>,
    /// AES-GCM encrypted clear password, when one was being set.
    pub encrypted_password: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PropagationState {
    #[default]
    Idle,
    Pending(PendingPropagation),
}

impl PropagationState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Take the pending propagation, leaving the state idle.
    pub fn take(&mut self) -> Option<PendingPropagation> {
        match std::mem::take(self) {
            Self::Pending(pending) => Some(pending),
            Self::Idle => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessContext {
    pub workflow_id: String,
    pub user_snapshot: Option<UserTO>,
    pub user_update: Option<UserUR>,
    pub form_submitter: Option<String>,
    #[serde(default)]
    pub propagation: PropagationState,
}

impl ProcessContext {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            ..Default::default()
        }
    }
}
