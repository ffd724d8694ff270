//! Patch items for single- and multi-valued fields.

use serde::{Deserialize, Serialize};

/// Operation carried by a patch item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatchOperation {
    #[default]
    AddReplace,
    Delete,
}

impl PatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddReplace => "ADD_REPLACE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Add or remove one value of a set-like string collection
/// (auxiliary classes, resources, roles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringPatchItem {
    #[serde(default)]
    pub operation: PatchOperation,
    pub value: String,
}

impl StringPatchItem {
    pub fn add_replace(value: impl Into<String>) -> Self {
        Self {
            operation: PatchOperation::AddReplace,
            value: value.into(),
        }
    }

    pub fn delete(value: impl Into<String>) -> Self {
        Self {
            operation: PatchOperation::Delete,
            value: value.into(),
        }
    }

    /// Apply to a set-like vector. Adding an already present value is a no-op.
    pub fn apply(&self, target: &mut Vec<String>) {
        match self.operation {
            PatchOperation::AddReplace => {
                if !target.contains(&self.value) {
                    target.push(self.value.clone());
                }
            }
            PatchOperation::Delete => target.retain(|v| v != &self.value),
        }
    }
}

/// Replacement of a single-valued field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacePatchItem<T> {
    pub value: T,
}

impl<T> ReplacePatchItem<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

/// `Some(replacement)` only when `updated` differs from `original`.
pub fn replace_item<T: PartialEq + Clone>(updated: &T, original: &T) -> Option<ReplacePatchItem<T>> {
    (updated != original).then(|| ReplacePatchItem::new(updated.clone()))
}

/// New password value plus the external resources it must be propagated to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether the password is also changed on the identity store itself,
    /// not only on the listed resources.
    #[serde(default = "default_true")]
    pub on_identity_store: bool,
    #[serde(default)]
    pub resources: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl PasswordPatch {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            on_identity_store: true,
            resources: Vec::new(),
        }
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn resources_only(mut self) -> Self {
        self.on_identity_store = false;
        self
    }
}
