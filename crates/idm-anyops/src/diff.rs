//! Diff between two snapshots of the same entity.
//!
//! The result is the smallest update request that turns `original` into
//! `updated`. In incremental mode only additions and replacements are
//! emitted, never deletions.

use std::collections::BTreeSet;

use tracing::debug;

use crate::attr::{Attr, AttrPatch};
use crate::error::{AnyOpsError, Result};
use crate::keys::{
    build_attr_map, build_linked_account_map, build_membership_map, build_relationship_map,
};
use crate::patch_item::{replace_item, PasswordPatch, PatchOperation, ReplacePatchItem, StringPatchItem};
use crate::request::{
    AnyObjectUR, AnyPatchFields, AnyUR, GroupUR, LinkedAccountUR, MembershipUR, RelationshipUR,
    UserUR,
};
use crate::to::{
    AnyFields, AnyObjectTO, AnyTO, EntityKind, GroupTO, LinkedAccountTO, MembershipTO,
    RelationshipTO, UserTO,
};

/// Compute the update request that brings `original` to `updated`.
pub fn diff(updated: &AnyTO, original: &AnyTO, incremental: bool) -> Result<AnyUR> {
    let result = match (updated, original) {
        (AnyTO::User(u), AnyTO::User(o)) => AnyUR::User(diff_user(u, o, incremental)?),
        (AnyTO::Group(u), AnyTO::Group(o)) => AnyUR::Group(diff_group(u, o, incremental)?),
        (AnyTO::AnyObject(u), AnyTO::AnyObject(o)) => {
            AnyUR::AnyObject(diff_any_object(u, o, incremental)?)
        }
        (u, o) => {
            return Err(AnyOpsError::KindMismatch {
                left: u.kind(),
                right: o.kind(),
            })
        }
    };

    debug!(
        kind = %result.kind(),
        key = ?result.key(),
        incremental,
        empty = result.is_empty(),
        "computed diff"
    );
    Ok(result)
}

pub fn diff_user(updated: &UserTO, original: &UserTO, incremental: bool) -> Result<UserUR> {
    check_keys(EntityKind::User, &updated.any, &original.any)?;

    let mut result = UserUR {
        any: diff_any(&updated.any, &original.any, incremental),
        ..Default::default()
    };

    if let Some(password) = &updated.password {
        if original.password.as_ref() != Some(password) {
            result.password = Some(
                PasswordPatch::new(password.clone()).with_resources(updated.any.resources.clone()),
            );
        }
    }

    if let Some(username) = &updated.username {
        if original.username.as_ref() != Some(username) {
            result.username = Some(ReplacePatchItem::new(username.clone()));
        }
    }

    // question and answer travel together; a missing question is no change
    if let Some(question) = &updated.security_question {
        let answer_supplied = updated
            .security_answer
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty());
        if original.security_question.as_ref() != Some(question)
            || (answer_supplied && updated.security_answer != original.security_answer)
        {
            result.security_question = Some(ReplacePatchItem::new(Some(question.clone())));
            result.security_answer = Some(ReplacePatchItem::new(updated.security_answer.clone()));
        }
    }

    result.must_change_password =
        replace_item(&updated.must_change_password, &original.must_change_password);

    result.roles = diff_strings(&updated.roles, &original.roles, incremental);
    result.memberships = diff_memberships(&updated.memberships, &original.memberships, incremental);
    result.linked_accounts =
        diff_linked_accounts(&updated.linked_accounts, &original.linked_accounts, incremental);

    Ok(result)
}

pub fn diff_group(updated: &GroupTO, original: &GroupTO, incremental: bool) -> Result<GroupUR> {
    check_keys(EntityKind::Group, &updated.any, &original.any)?;

    Ok(GroupUR {
        any: diff_any(&updated.any, &original.any, incremental),
        name: replace_item(&updated.name, &original.name),
        user_owner: replace_item(&updated.user_owner, &original.user_owner),
        group_owner: replace_item(&updated.group_owner, &original.group_owner),
        dyn_membership_conds: (updated.dyn_membership_conds != original.dyn_membership_conds)
            .then(|| updated.dyn_membership_conds.clone()),
        type_extensions: (updated.type_extensions != original.type_extensions)
            .then(|| updated.type_extensions.clone()),
    })
}

pub fn diff_any_object(
    updated: &AnyObjectTO,
    original: &AnyObjectTO,
    incremental: bool,
) -> Result<AnyObjectUR> {
    check_keys(EntityKind::AnyObject, &updated.any, &original.any)?;

    Ok(AnyObjectUR {
        any: diff_any(&updated.any, &original.any, incremental),
        name: replace_item(&updated.name, &original.name),
        memberships: diff_memberships(&updated.memberships, &original.memberships, incremental),
    })
}

fn check_keys(kind: EntityKind, updated: &AnyFields, original: &AnyFields) -> Result<()> {
    if updated.key != original.key {
        return Err(AnyOpsError::KeyMismatch {
            kind,
            expected: original.key.clone(),
            found: updated.key.clone(),
        });
    }
    Ok(())
}

fn diff_any(updated: &AnyFields, original: &AnyFields, incremental: bool) -> AnyPatchFields {
    let realm = match &updated.realm {
        Some(realm) if original.realm.as_ref() != Some(realm) => {
            Some(ReplacePatchItem::new(realm.clone()))
        }
        _ => None,
    };

    AnyPatchFields {
        key: updated.key.clone(),
        realm,
        aux_classes: diff_strings(&updated.aux_classes, &original.aux_classes, incremental),
        plain_attrs: diff_attrs(&updated.plain_attrs, &original.plain_attrs, incremental),
        vir_attrs: diff_attrs(&updated.vir_attrs, &original.vir_attrs, incremental),
        resources: diff_strings(&updated.resources, &original.resources, incremental),
        relationships: diff_relationships(
            &updated.relationships,
            &original.relationships,
            incremental,
        ),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Collections
// ─────────────────────────────────────────────────────────────────────────────

fn unique(values: &[String]) -> impl Iterator<Item = &String> + '_ {
    let mut seen = BTreeSet::new();
    values.iter().filter(move |v| seen.insert(v.as_str()))
}

/// Set-like string collections: deletes first, then additions.
fn diff_strings(updated: &[String], original: &[String], incremental: bool) -> Vec<StringPatchItem> {
    let mut items = Vec::new();

    if !incremental {
        for value in unique(original) {
            if !updated.contains(value) {
                items.push(StringPatchItem::delete(value.clone()));
            }
        }
    }

    for value in unique(updated) {
        if !original.contains(value) {
            items.push(StringPatchItem::add_replace(value.clone()));
        }
    }

    items
}

fn diff_attrs(updated: &[Attr], original: &[Attr], incremental: bool) -> Vec<AttrPatch> {
    let updated_map = build_attr_map(updated);
    let original_map = build_attr_map(original);
    let mut patches = Vec::new();

    if !incremental {
        for schema in original_map.keys() {
            if !updated_map.contains_key(schema) {
                patches.push(AttrPatch::delete(schema.clone()));
            }
        }
    }

    let mut seen = BTreeSet::new();
    for schema in updated.iter().map(|a| &a.schema) {
        if !seen.insert(schema) {
            continue;
        }
        let attr = updated_map[schema];
        let previous = original_map.get(schema);
        if attr.is_empty() {
            // an empty attr that was already empty is no change
            if !incremental && !previous.is_some_and(|p| p.is_empty()) {
                patches.push(AttrPatch::delete(schema.clone()));
            }
        } else if !previous.is_some_and(|p| p.same_values(attr)) {
            patches.push(AttrPatch::add_replace(attr.clone()));
        }
    }

    patches
}

fn non_empty(attrs: &[Attr]) -> Vec<Attr> {
    attrs.iter().filter(|a| !a.is_empty()).cloned().collect()
}

fn diff_relationships(
    updated: &[RelationshipTO],
    original: &[RelationshipTO],
    incremental: bool,
) -> Vec<RelationshipUR> {
    let updated_map = build_relationship_map(updated);
    let original_map = build_relationship_map(original);
    let mut items = Vec::new();

    for (key, rel) in &updated_map {
        if original_map.get(key) != Some(rel) {
            items.push(RelationshipUR {
                operation: PatchOperation::AddReplace,
                rel_type: Some(rel.rel_type.clone()),
                other_end_type: rel.other_end_type.clone(),
                other_end_key: Some(rel.other_end_key.clone()),
                plain_attrs: non_empty(&rel.plain_attrs),
            });
        }
    }

    if !incremental {
        for (key, rel) in &original_map {
            if !updated_map.contains_key(key) {
                items.push(RelationshipUR {
                    operation: PatchOperation::Delete,
                    rel_type: Some(rel.rel_type.clone()),
                    other_end_type: rel.other_end_type.clone(),
                    other_end_key: Some(rel.other_end_key.clone()),
                    plain_attrs: Vec::new(),
                });
            }
        }
    }

    items
}

fn diff_memberships(
    updated: &[MembershipTO],
    original: &[MembershipTO],
    incremental: bool,
) -> Vec<MembershipUR> {
    let updated_map = build_membership_map(updated);
    let original_map = build_membership_map(original);
    let mut items = Vec::new();

    for (group, membership) in &updated_map {
        if original_map.get(group) != Some(membership) {
            items.push(MembershipUR {
                plain_attrs: non_empty(&membership.plain_attrs),
                ..MembershipUR::add_replace(group.clone())
            });
        }
    }

    if !incremental {
        for group in original_map.keys() {
            if !updated_map.contains_key(group) {
                items.push(MembershipUR::delete(group.clone()));
            }
        }
    }

    items
}

fn diff_linked_accounts(
    updated: &[LinkedAccountTO],
    original: &[LinkedAccountTO],
    incremental: bool,
) -> Vec<LinkedAccountUR> {
    let updated_map = build_linked_account_map(updated);
    let original_map = build_linked_account_map(original);
    let mut items = Vec::new();

    for (key, account) in &updated_map {
        if original_map.get(key) != Some(account) {
            items.push(LinkedAccountUR {
                operation: PatchOperation::AddReplace,
                linked_account: Some((*account).clone()),
            });
        }
    }

    if !incremental {
        for (key, account) in &original_map {
            if !updated_map.contains_key(key) {
                items.push(LinkedAccountUR {
                    operation: PatchOperation::Delete,
                    linked_account: Some((*account).clone()),
                });
            }
        }
    }

    items
}

// ── Tests ─────────────────────────────────────────────────────────
