//! Apply an update request to a snapshot.
//!
//! The snapshot is cloned and every item of the request is applied in order.
//! Items that cannot be applied (missing payload or identity) are logged and
//! skipped; the rest of the request still goes through.

use tracing::warn;

use crate::attr::{Attr, AttrPatch};
use crate::error::{AnyOpsError, Result};
use crate::patch_item::{PatchOperation, StringPatchItem};
use crate::request::{
    AnyObjectUR, AnyPatchFields, AnyUR, GroupUR, LinkedAccountUR, MembershipUR, RelationshipUR,
    UserUR,
};
use crate::to::{
    AnyFields, AnyObjectTO, AnyTO, EntityKind, GroupTO, LinkedAccountTO, MembershipTO,
    RelationshipTO, UserTO,
};

/// Return a copy of `to` with `req` applied.
pub fn patch(to: &AnyTO, req: &AnyUR) -> Result<AnyTO> {
    match (to, req) {
        (AnyTO::User(u), AnyUR::User(r)) => patch_user(u, r).map(AnyTO::User),
        (AnyTO::Group(g), AnyUR::Group(r)) => patch_group(g, r).map(AnyTO::Group),
        (AnyTO::AnyObject(o), AnyUR::AnyObject(r)) => patch_any_object(o, r).map(AnyTO::AnyObject),
        (t, r) => Err(AnyOpsError::KindMismatch {
            left: t.kind(),
            right: r.kind(),
        }),
    }
}

pub fn patch_user(to: &UserTO, req: &UserUR) -> Result<UserTO> {
    check_keys(EntityKind::User, &to.any, &req.any)?;

    let mut result = to.clone();
    patch_any(&mut result.any, &req.any);

    if let Some(username) = &req.username {
        result.username = Some(username.value.clone());
    }
    if let Some(value) = req.password.as_ref().and_then(|p| p.value.as_ref()) {
        result.password = Some(value.clone());
    }
    if let Some(question) = &req.security_question {
        result.security_question = question.value.clone();
    }
    if let Some(answer) = &req.security_answer {
        result.security_answer = answer.value.clone();
    }
    if let Some(must_change) = &req.must_change_password {
        result.must_change_password = must_change.value;
    }

    apply_strings(&mut result.roles, &req.roles);
    apply_memberships(&mut result.memberships, &req.memberships);
    apply_linked_accounts(&mut result.linked_accounts, &req.linked_accounts);

    Ok(result)
}

pub fn patch_group(to: &GroupTO, req: &GroupUR) -> Result<GroupTO> {
    check_keys(EntityKind::Group, &to.any, &req.any)?;

    let mut result = to.clone();
    patch_any(&mut result.any, &req.any);

    if let Some(name) = &req.name {
        result.name = name.value.clone();
    }
    if let Some(owner) = &req.user_owner {
        result.user_owner = owner.value.clone();
    }
    if let Some(owner) = &req.group_owner {
        result.group_owner = owner.value.clone();
    }
    if let Some(conds) = &req.dyn_membership_conds {
        result.dyn_membership_conds = conds.clone();
    }
    if let Some(extensions) = &req.type_extensions {
        result.type_extensions = extensions.clone();
    }

    Ok(result)
}

pub fn patch_any_object(to: &AnyObjectTO, req: &AnyObjectUR) -> Result<AnyObjectTO> {
    check_keys(EntityKind::AnyObject, &to.any, &req.any)?;

    let mut result = to.clone();
    patch_any(&mut result.any, &req.any);

    if let Some(name) = &req.name {
        result.name = name.value.clone();
    }
    apply_memberships(&mut result.memberships, &req.memberships);

    Ok(result)
}

/// Add a `DELETE` attribute patch to `req` for every empty plain attribute
/// of `to`.
pub fn clean_empty_attrs(to: &AnyTO, req: &mut AnyUR) {
    let deletes: Vec<AttrPatch> = to
        .any()
        .plain_attrs
        .iter()
        .filter(|a| a.is_empty())
        .map(|a| AttrPatch::delete(a.schema.clone()))
        .collect();

    let plain_attrs = &mut req.any_mut().plain_attrs;
    for delete in deletes {
        if !plain_attrs.contains(&delete) {
            plain_attrs.push(delete);
        }
    }
}

fn check_keys(kind: EntityKind, to: &AnyFields, req: &AnyPatchFields) -> Result<()> {
    match (&to.key, &req.key) {
        (Some(expected), Some(found)) if expected == found => Ok(()),
        _ => Err(AnyOpsError::KeyMismatch {
            kind,
            expected: to.key.clone(),
            found: req.key.clone(),
        }),
    }
}

fn patch_any(any: &mut AnyFields, req: &AnyPatchFields) {
    if let Some(realm) = &req.realm {
        any.realm = Some(realm.value.clone());
    }

    apply_strings(&mut any.aux_classes, &req.aux_classes);
    apply_attrs(&mut any.plain_attrs, &req.plain_attrs);
    apply_attrs(&mut any.vir_attrs, &req.vir_attrs);
    apply_strings(&mut any.resources, &req.resources);
    apply_relationships(&mut any.relationships, &req.relationships);
}

fn apply_strings(target: &mut Vec<String>, items: &[StringPatchItem]) {
    for item in items {
        item.apply(target);
    }
}

fn apply_attrs(attrs: &mut Vec<Attr>, patches: &[AttrPatch]) {
    for patch in patches {
        let Some(attr) = &patch.attr else {
            warn!(operation = %patch.operation, "invalid attribute patch: no attribute, skipped");
            continue;
        };

        attrs.retain(|a| a.schema != attr.schema);
        if patch.operation == PatchOperation::AddReplace && !attr.is_empty() {
            attrs.push(attr.clone());
        }
    }
}

fn apply_relationships(relationships: &mut Vec<RelationshipTO>, items: &[RelationshipUR]) {
    for item in items {
        let (Some(rel_type), Some(other_end_key)) = (&item.rel_type, &item.other_end_key) else {
            warn!(
                operation = %item.operation,
                rel_type = ?item.rel_type,
                other_end_key = ?item.other_end_key,
                "invalid relationship patch, skipped"
            );
            continue;
        };

        relationships.retain(|r| &r.rel_type != rel_type || &r.other_end_key != other_end_key);
        if item.operation == PatchOperation::AddReplace {
            relationships.push(RelationshipTO {
                rel_type: rel_type.clone(),
                other_end_type: item.other_end_type.clone(),
                other_end_key: other_end_key.clone(),
                plain_attrs: item.plain_attrs.clone(),
            });
        }
    }
}

fn apply_memberships(memberships: &mut Vec<MembershipTO>, items: &[MembershipUR]) {
    for item in items {
        let Some(group) = &item.group else {
            warn!(operation = %item.operation, "invalid membership patch: no group, skipped");
            continue;
        };

        memberships.retain(|m| &m.group_key != group);
        if item.operation == PatchOperation::AddReplace {
            memberships.push(MembershipTO {
                group_key: group.clone(),
                group_name: None,
                plain_attrs: item.plain_attrs.clone(),
            });
        }
    }
}

fn apply_linked_accounts(accounts: &mut Vec<LinkedAccountTO>, items: &[LinkedAccountUR]) {
    for item in items {
        let Some(account) = &item.linked_account else {
            warn!(operation = %item.operation, "invalid linked account patch: no account, skipped");
            continue;
        };

        let key = account.key();
        accounts.retain(|a| a.key() != key);
        if item.operation == PatchOperation::AddReplace {
            accounts.push(account.clone());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────
