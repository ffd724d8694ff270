//! idm-anyops - Entity Diff/Patch Engine
//!
//! Computes the minimal update request that turns one snapshot of a user,
//! group or any-object into another, and applies such requests to snapshots.
//!
//! ```text
//!   original ──┐
//!              ├── diff ──► AnyUR ──┐
//!   updated ───┘                    ├── patch ──► updated'
//!   original ───────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use idm_anyops::{diff, patch, Attr, AnyTO, UserTO};
//!
//! let original = AnyTO::User(UserTO::new("rossini").with_key("u1"));
//! let updated = AnyTO::User(
//!     UserTO::new("rossini").with_key("u1").with_attr(Attr::with_values("mail", ["b@x.com"])),
//! );
//!
//! let req = diff(&updated, &original, false)?;
//! let patched = patch(&original, &req)?;
//! ```

pub mod attr;
pub mod diff;
pub mod error;
pub mod keys;
pub mod patch;
pub mod patch_item;
pub mod request;
pub mod to;

pub use attr::{attrs_equal, Attr, AttrPatch};
pub use diff::{diff, diff_any_object, diff_group, diff_user};
pub use error::{AnyOpsError, Result};
pub use keys::{LinkedAccountKey, RelationshipKey};
pub use patch::{clean_empty_attrs, patch, patch_any_object, patch_group, patch_user};
pub use patch_item::{PasswordPatch, PatchOperation, ReplacePatchItem, StringPatchItem};
pub use request::{
    AnyObjectUR, AnyPatchFields, AnyUR, GroupUR, LinkedAccountUR, MembershipUR, RelationshipUR,
    UserUR,
};
pub use to::{
    AnyFields, AnyObjectTO, AnyTO, EntityKind, GroupTO, LinkedAccountTO, MembershipTO,
    RelationshipTO, TypeExtension, UserTO,
};
