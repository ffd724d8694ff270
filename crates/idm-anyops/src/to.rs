//! Entity snapshots
//!
//! Full representations of users, groups and any-objects as exchanged on the
//! wire. Snapshots are transient: built per call, discarded after use.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attr::{attrs_equal, Attr};
use crate::keys::{LinkedAccountKey, RelationshipKey};

/// The three kinds of entity the engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Group,
    AnyObject,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::AnyObject => "any_object",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Nested objects
// ─────────────────────────────────────────────────────────────────────────────

/// Typed link from an entity to another any-object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipTO {
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_end_type: Option<String>,
    pub other_end_key: String,
    #[serde(default)]
    pub plain_attrs: Vec<Attr>,
}

impl RelationshipTO {
    pub fn new(rel_type: impl Into<String>, other_end_key: impl Into<String>) -> Self {
        Self {
            rel_type: rel_type.into(),
            other_end_type: None,
            other_end_key: other_end_key.into(),
            plain_attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, attr: Attr) -> Self {
        self.plain_attrs.push(attr);
        self
    }

    pub fn key(&self) -> RelationshipKey {
        RelationshipKey::new(&self.rel_type, &self.other_end_key)
    }
}

impl PartialEq for RelationshipTO {
    fn eq(&self, other: &Self) -> bool {
        self.rel_type == other.rel_type
            && self.other_end_key == other.other_end_key
            && self.other_end_type == other.other_end_type
            && attrs_equal(&self.plain_attrs, &other.plain_attrs)
    }
}

/// Membership of a user or any-object in a group.
///
/// `group_name` is informational and does not take part in equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipTO {
    pub group_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default)]
    pub plain_attrs: Vec<Attr>,
}

impl MembershipTO {
    pub fn new(group_key: impl Into<String>) -> Self {
        Self {
            group_key: group_key.into(),
            group_name: None,
            plain_attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, attr: Attr) -> Self {
        self.plain_attrs.push(attr);
        self
    }
}

impl PartialEq for MembershipTO {
    fn eq(&self, other: &Self) -> bool {
        self.group_key == other.group_key && attrs_equal(&self.plain_attrs, &other.plain_attrs)
    }
}

/// Account owned by a user on an external resource, beside the main one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccountTO {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub resource: String,
    pub conn_object_key_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub plain_attrs: Vec<Attr>,
}

impl LinkedAccountTO {
    pub fn new(resource: impl Into<String>, conn_object_key_value: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            conn_object_key_value: conn_object_key_value.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> LinkedAccountKey {
        LinkedAccountKey::new(&self.resource, &self.conn_object_key_value)
    }
}

impl PartialEq for LinkedAccountTO {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.resource == other.resource
            && self.conn_object_key_value == other.conn_object_key_value
            && self.username == other.username
            && self.password == other.password
            && self.suspended == other.suspended
            && attrs_equal(&self.plain_attrs, &other.plain_attrs)
    }
}

/// Auxiliary classes a group grants to its members of a given type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeExtension {
    pub any_type: String,
    #[serde(default)]
    pub aux_classes: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// Fields shared by every entity kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default)]
    pub aux_classes: Vec<String>,
    #[serde(default)]
    pub plain_attrs: Vec<Attr>,
    #[serde(default)]
    pub vir_attrs: Vec<Attr>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipTO>,
}

impl AnyFields {
    pub fn plain_attr(&self, schema: &str) -> Option<&Attr> {
        self.plain_attrs.iter().find(|a| a.schema == schema)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTO {
    #[serde(flatten)]
    pub any: AnyFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_answer: Option<String>,
    #[serde(default)]
    pub must_change_password: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub memberships: Vec<MembershipTO>,
    #[serde(default)]
    pub linked_accounts: Vec<LinkedAccountTO>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_change_date: Option<DateTime<Utc>>,
}

impl UserTO {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.any.key = Some(key.into());
        self
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.any.realm = Some(realm.into());
        self
    }

    pub fn with_attr(mut self, attr: Attr) -> Self {
        self.any.plain_attrs.push(attr);
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.any.resources.push(resource.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTO {
    #[serde(flatten)]
    pub any: AnyFields,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_owner: Option<String>,
    /// any type → search condition
    #[serde(default)]
    pub dyn_membership_conds: BTreeMap<String, String>,
    #[serde(default)]
    pub type_extensions: Vec<TypeExtension>,
}

impl GroupTO {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.any.key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyObjectTO {
    #[serde(flatten)]
    pub any: AnyFields,
    #[serde(rename = "type")]
    pub any_type: String,
    pub name: String,
    #[serde(default)]
    pub memberships: Vec<MembershipTO>,
}

impl AnyObjectTO {
    pub fn new(any_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            any_type: any_type.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.any.key = Some(key.into());
        self
    }
}

/// A snapshot of any entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnyTO {
    User(UserTO),
    Group(GroupTO),
    AnyObject(AnyObjectTO),
}

impl AnyTO {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Group(_) => EntityKind::Group,
            Self::AnyObject(_) => EntityKind::AnyObject,
        }
    }

    pub fn any(&self) -> &AnyFields {
        match self {
            Self::User(u) => &u.any,
            Self::Group(g) => &g.any,
            Self::AnyObject(o) => &o.any,
        }
    }

    pub fn any_mut(&mut self) -> &mut AnyFields {
        match self {
            Self::User(u) => &mut u.any,
            Self::Group(g) => &mut g.any,
            Self::AnyObject(o) => &mut o.any,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.any().key.as_deref()
    }
}

impl From<UserTO> for AnyTO {
    fn from(user: UserTO) -> Self {
        Self::User(user)
    }
}

impl From<GroupTO> for AnyTO {
    fn from(group: GroupTO) -> Self {
        Self::Group(group)
    }
}

impl From<AnyObjectTO> for AnyTO {
    fn from(any_object: AnyObjectTO) -> Self {
        Self::AnyObject(any_object)
    }
}
