//! Update requests
//!
//! The delta counterpart of [`crate::to`]: the same fields expressed as patch
//! items. A field left at its default means "no change".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attr::{Attr, AttrPatch};
use crate::patch_item::{PasswordPatch, PatchOperation, ReplacePatchItem, StringPatchItem};
use crate::to::{EntityKind, LinkedAccountTO, TypeExtension};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipUR {
    #[serde(default)]
    pub operation: PatchOperation,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub rel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_end_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_end_key: Option<String>,
    #[serde(default)]
    pub plain_attrs: Vec<Attr>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipUR {
    #[serde(default)]
    pub operation: PatchOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub plain_attrs: Vec<Attr>,
}

impl MembershipUR {
    pub fn add_replace(group: impl Into<String>) -> Self {
        Self {
            operation: PatchOperation::AddReplace,
            group: Some(group.into()),
            plain_attrs: Vec::new(),
        }
    }

    pub fn delete(group: impl Into<String>) -> Self {
        Self {
            operation: PatchOperation::Delete,
            group: Some(group.into()),
            plain_attrs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccountUR {
    #[serde(default)]
    pub operation: PatchOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_account: Option<LinkedAccountTO>,
}

/// Fields shared by every update request kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyPatchFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<ReplacePatchItem<String>>,
    #[serde(default)]
    pub aux_classes: Vec<StringPatchItem>,
    #[serde(default)]
    pub plain_attrs: Vec<AttrPatch>,
    #[serde(default)]
    pub vir_attrs: Vec<AttrPatch>,
    #[serde(default)]
    pub resources: Vec<StringPatchItem>,
    #[serde(default)]
    pub relationships: Vec<RelationshipUR>,
}

impl AnyPatchFields {
    pub fn for_key(key: Option<String>) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }

    /// True when nothing but the key is set.
    pub fn is_empty(&self) -> bool {
        self.realm.is_none()
            && self.aux_classes.is_empty()
            && self.plain_attrs.is_empty()
            && self.vir_attrs.is_empty()
            && self.resources.is_empty()
            && self.relationships.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUR {
    #[serde(flatten)]
    pub any: AnyPatchFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<ReplacePatchItem<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<PasswordPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_question: Option<ReplacePatchItem<Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_answer: Option<ReplacePatchItem<Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_change_password: Option<ReplacePatchItem<bool>>,
    #[serde(default)]
    pub roles: Vec<StringPatchItem>,
    #[serde(default)]
    pub memberships: Vec<MembershipUR>,
    #[serde(default)]
    pub linked_accounts: Vec<LinkedAccountUR>,
}

impl UserUR {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            any: AnyPatchFields::for_key(Some(key.into())),
            ..Default::default()
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.any.key.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.is_empty_apart_from_password()
    }

    /// A request that only changes the password.
    pub fn is_empty_but_password(&self) -> bool {
        self.password.is_some() && self.is_empty_apart_from_password()
    }

    fn is_empty_apart_from_password(&self) -> bool {
        self.any.is_empty()
            && self.username.is_none()
            && self.security_question.is_none()
            && self.security_answer.is_none()
            && self.must_change_password.is_none()
            && self.roles.is_empty()
            && self.memberships.is_empty()
            && self.linked_accounts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUR {
    #[serde(flatten)]
    pub any: AnyPatchFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ReplacePatchItem<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_owner: Option<ReplacePatchItem<Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_owner: Option<ReplacePatchItem<Option<String>>>,
    /// Replaces all conditions when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dyn_membership_conds: Option<BTreeMap<String, String>>,
    /// Replaces all type extensions when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_extensions: Option<Vec<TypeExtension>>,
}

impl GroupUR {
    pub fn is_empty(&self) -> bool {
        self.any.is_empty()
            && self.name.is_none()
            && self.user_owner.is_none()
            && self.group_owner.is_none()
            && self.dyn_membership_conds.is_none()
            && self.type_extensions.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyObjectUR {
    #[serde(flatten)]
    pub any: AnyPatchFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ReplacePatchItem<String>>,
    #[serde(default)]
    pub memberships: Vec<MembershipUR>,
}

impl AnyObjectUR {
    pub fn is_empty(&self) -> bool {
        self.any.is_empty() && self.name.is_none() && self.memberships.is_empty()
    }
}

/// An update request for any entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnyUR {
    User(UserUR),
    Group(GroupUR),
    AnyObject(AnyObjectUR),
}

impl AnyUR {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Group(_) => EntityKind::Group,
            Self::AnyObject(_) => EntityKind::AnyObject,
        }
    }

    pub fn any(&self) -> &AnyPatchFields {
        match self {
            Self::User(u) => &u.any,
            Self::Group(g) => &g.any,
            Self::AnyObject(o) => &o.any,
        }
    }

    pub fn any_mut(&mut self) -> &mut AnyPatchFields {
        match self {
            Self::User(u) => &mut u.any,
            Self::Group(g) => &mut g.any,
            Self::AnyObject(o) => &mut o.any,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.any().key.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::User(u) => u.is_empty(),
            Self::Group(g) => g.is_empty(),
            Self::AnyObject(o) => o.is_empty(),
        }
    }
}

impl From<UserUR> for AnyUR {
    fn from(req: UserUR) -> Self {
        Self::User(req)
    }
}

impl From<GroupUR> for AnyUR {
    fn from(req: GroupUR) -> Self {
        Self::Group(req)
    }
}

impl From<AnyObjectUR> for AnyUR {
    fn from(req: AnyObjectUR) -> Self {
        Self::AnyObject(req)
    }
}
