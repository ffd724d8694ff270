//! Attributes
//!
//! An [`Attr`] is the atomic unit of attribute comparison: a schema name plus
//! the values held for it. Value order carries no meaning.

use serde::{Deserialize, Serialize};

use crate::patch_item::PatchOperation;

/// Schema name + values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attr {
    pub schema: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Attr {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values<I, S>(schema: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: schema.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a value
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    /// No values, or a single blank placeholder value.
    pub fn is_empty(&self) -> bool {
        match self.values.as_slice() {
            [] => true,
            [only] => only.is_empty(),
            _ => false,
        }
    }

    /// Multiset comparison of the values, ignoring order.
    pub fn same_values(&self, other: &Attr) -> bool {
        if self.values.len() != other.values.len() {
            return false;
        }
        let mut mine: Vec<&str> = self.values.iter().map(String::as_str).collect();
        let mut theirs: Vec<&str> = other.values.iter().map(String::as_str).collect();
        mine.sort_unstable();
        theirs.sort_unstable();
        mine == theirs
    }
}

impl PartialEq for Attr {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.same_values(other)
    }
}

impl Eq for Attr {}

/// An attribute tagged with the operation to perform on it.
///
/// `attr` is optional on the wire; a patch without it is invalid and gets
/// skipped when applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttrPatch {
    #[serde(default)]
    pub operation: PatchOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<Attr>,
}

impl AttrPatch {
    /// Add or replace `attr`. An empty attribute turns into a delete of its schema.
    pub fn add_replace(attr: Attr) -> Self {
        if attr.is_empty() {
            return Self::delete(attr.schema);
        }
        Self {
            operation: PatchOperation::AddReplace,
            attr: Some(attr),
        }
    }

    pub fn delete(schema: impl Into<String>) -> Self {
        Self {
            operation: PatchOperation::Delete,
            attr: Some(Attr::new(schema)),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.attr.as_ref().map(|a| a.schema.as_str())
    }
}

/// Attributes are equal as collections when both hold the same schemas with
/// the same values, regardless of order.
pub fn attrs_equal(left: &[Attr], right: &[Attr]) -> bool {
    let left = crate::keys::build_attr_map(left);
    let right = crate::keys::build_attr_map(right);
    left.len() == right.len()
        && left
            .iter()
            .all(|(schema, attr)| right.get(schema).is_some_and(|other| attr.same_values(other)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_compare_ignoring_order() {
        let a = Attr::with_values("mail", ["a@x.com", "b@x.com"]);
        let b = Attr::with_values("mail", ["b@x.com", "a@x.com"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicates_count_as_values() {
        let a = Attr::with_values("tag", ["x", "x"]);
        let b = Attr::with_values("tag", ["x", "y"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_schema_is_case_sensitive() {
        let a = Attr::with_values("Mail", ["a"]);
        let b = Attr::with_values("mail", ["a"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_attr() {
        assert!(Attr::new("mail").is_empty());
        assert!(Attr::with_values("mail", [""]).is_empty());
        assert!(!Attr::with_values("mail", ["", ""]).is_empty());
        assert!(!Attr::with_values("mail", ["a"]).is_empty());
    }

    #[test]
    fn test_empty_attr_becomes_delete() {
        let patch = AttrPatch::add_replace(Attr::new("mail"));
        assert_eq!(patch.operation, PatchOperation::Delete);
        assert_eq!(patch.schema(), Some("mail"));
        assert!(patch.attr.as_ref().is_some_and(|a| a.values.is_empty()));
    }

    #[test]
    fn test_attrs_equal_ignores_order() {
        let left = vec![
            Attr::with_values("a", ["1"]),
            Attr::with_values("b", ["2", "3"]),
        ];
        let right = vec![
            Attr::with_values("b", ["3", "2"]),
            Attr::with_values("a", ["1"]),
        ];
        assert!(attrs_equal(&left, &right));
        assert!(!attrs_equal(&left, &right[..1]));
    }
}
