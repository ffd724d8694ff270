//! Propagation tasks by resource
//!
//! Tracks which external resources (or linked accounts) need a create,
//! update or delete after a workflow transition. A key belongs to at most
//! one operation at a time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceOperation {
    Create,
    Update,
    Delete,
}

impl ResourceOperation {
    pub const ALL: [ResourceOperation; 3] = [Self::Create, Self::Update, Self::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ResourceOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Linked accounts are addressed by (resource, connector object key value).
pub type LinkedAccountRef = (String, String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationByResource<T: Ord> {
    to_create: BTreeSet<T>,
    to_update: BTreeSet<T>,
    to_delete: BTreeSet<T>,
}

impl<T: Ord> Default for PropagationByResource<T> {
    fn default() -> Self {
        Self {
            to_create: BTreeSet::new(),
            to_update: BTreeSet::new(),
            to_delete: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> PropagationByResource<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_mut(&mut self, op: ResourceOperation) -> &mut BTreeSet<T> {
        match op {
            ResourceOperation::Create => &mut self.to_create,
            ResourceOperation::Update => &mut self.to_update,
            ResourceOperation::Delete => &mut self.to_delete,
        }
    }

    /// Schedule `key` for `op`, dropping it from any other operation.
    pub fn add(&mut self, op: ResourceOperation, key: T) -> bool {
        for other in ResourceOperation::ALL {
            if other != op {
                self.set_mut(other).remove(&key);
            }
        }
        self.set_mut(op).insert(key)
    }

    /// Keys in both sets are updated, new keys created and dropped keys
    /// deleted.
    pub fn from_change(before: &BTreeSet<T>, after: &BTreeSet<T>) -> Self {
        let mut prop = Self::new();
        prop.add_all(ResourceOperation::Update, after.intersection(before).cloned());
        prop.add_all(ResourceOperation::Create, after.difference(before).cloned());
        prop.add_all(ResourceOperation::Delete, before.difference(after).cloned());
        prop
    }

    pub fn add_all<I: IntoIterator<Item = T>>(&mut self, op: ResourceOperation, keys: I) {
        for key in keys {
            self.add(op, key);
        }
    }

    pub fn remove(&mut self, op: ResourceOperation, key: &T) -> bool {
        self.set_mut(op).remove(key)
    }

    /// Replace the keys scheduled for `op`.
    pub fn set<I: IntoIterator<Item = T>>(&mut self, op: ResourceOperation, keys: I) {
        self.set_mut(op).clear();
        self.add_all(op, keys);
    }

    pub fn get(&self, op: ResourceOperation) -> &BTreeSet<T> {
        match op {
            ResourceOperation::Create => &self.to_create,
            ResourceOperation::Update => &self.to_update,
            ResourceOperation::Delete => &self.to_delete,
        }
    }

    pub fn operation_of(&self, key: &T) -> Option<ResourceOperation> {
        ResourceOperation::ALL
            .into_iter()
            .find(|op| self.get(*op).contains(key))
    }

    /// All keys, whatever the operation.
    pub fn keys(&self) -> BTreeSet<T> {
        self.to_create
            .iter()
            .chain(&self.to_update)
            .chain(&self.to_delete)
            .cloned()
            .collect()
    }

    pub fn merge(&mut self, other: PropagationByResource<T>) {
        for op in ResourceOperation::ALL {
            self.add_all(op, other.get(op).iter().cloned());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn clear(&mut self) {
        self.to_create.clear();
        self.to_update.clear();
        self.to_delete.clear();
    }

    /// Move the content out, leaving this instance empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}
