//! Identity keys and keyed views over nested collections.
//!
//! Diff and patch match nested objects by identity, not by position. The
//! builders below index a slice by that identity; when two items share a
//! key the later one wins.

use std::collections::BTreeMap;

use crate::attr::Attr;
use crate::to::{LinkedAccountTO, MembershipTO, RelationshipTO};

/// Relationship identity: (type, other end key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationshipKey {
    pub rel_type: String,
    pub other_end_key: String,
}

impl RelationshipKey {
    pub fn new(rel_type: &str, other_end_key: &str) -> Self {
        Self {
            rel_type: rel_type.to_string(),
            other_end_key: other_end_key.to_string(),
        }
    }
}

/// Linked account identity: (resource, connector object key value).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkedAccountKey {
    pub resource: String,
    pub conn_object_key_value: String,
}

impl LinkedAccountKey {
    pub fn new(resource: &str, conn_object_key_value: &str) -> Self {
        Self {
            resource: resource.to_string(),
            conn_object_key_value: conn_object_key_value.to_string(),
        }
    }
}

pub fn build_attr_map(attrs: &[Attr]) -> BTreeMap<String, &Attr> {
    attrs.iter().map(|a| (a.schema.clone(), a)).collect()
}

pub fn build_relationship_map(
    relationships: &[RelationshipTO],
) -> BTreeMap<RelationshipKey, &RelationshipTO> {
    relationships.iter().map(|r| (r.key(), r)).collect()
}

pub fn build_membership_map(memberships: &[MembershipTO]) -> BTreeMap<String, &MembershipTO> {
    memberships
        .iter()
        .map(|m| (m.group_key.clone(), m))
        .collect()
}

pub fn build_linked_account_map(
    accounts: &[LinkedAccountTO],
) -> BTreeMap<LinkedAccountKey, &LinkedAccountTO> {
    accounts.iter().map(|a| (a.key(), a)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_duplicate_wins() {
        let attrs = vec![
            Attr::with_values("mail", ["old@x.com"]),
            Attr::with_values("mail", ["new@x.com"]),
        ];
        let map = build_attr_map(&attrs);
        assert_eq!(map.len(), 1);
        assert_eq!(map["mail"].values, vec!["new@x.com".to_string()]);
    }

    #[test]
    fn test_relationship_identity_is_type_and_other_end() {
        let rels = vec![
            RelationshipTO::new("neighbor", "p1"),
            RelationshipTO::new("owner", "p1"),
            RelationshipTO::new("neighbor", "p2"),
        ];
        assert_eq!(build_relationship_map(&rels).len(), 3);
    }
}
