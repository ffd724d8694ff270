//! User entity
//!
//! The persisted form of a user as the adapter sees it. Passwords are kept
//! as digests only; the clear value never leaves the call that received it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use idm_anyops::{
    patch_user, Attr, LinkedAccountTO, MembershipTO, RelationshipTO, UserTO, UserUR,
};

use crate::crypto::{password_digest, random_token};
use crate::propagation::{LinkedAccountRef, PropagationByResource, ResourceOperation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub key: String,
    pub username: Option<String>,
    pub realm: String,
    pub workflow_id: Option<String>,
    pub status: Option<String>,
    pub suspended: bool,
    pub failed_logins: u32,
    /// SHA-256 digest
    pub password: Option<String>,
    pub password_history: Vec<String>,
    pub must_change_password: bool,
    pub security_question: Option<String>,
    pub security_answer: Option<String>,
    pub token: Option<String>,
    pub token_expire_time: Option<DateTime<Utc>>,
    pub aux_classes: Vec<String>,
    pub plain_attrs: Vec<Attr>,
    pub vir_attrs: Vec<Attr>,
    pub resources: Vec<String>,
    pub relationships: Vec<RelationshipTO>,
    pub roles: Vec<String>,
    pub memberships: Vec<MembershipTO>,
    pub linked_accounts: Vec<LinkedAccountTO>,
    pub creation_date: DateTime<Utc>,
    pub last_change_date: DateTime<Utc>,
}

impl User {
    /// Build a new user from its snapshot. A key is generated when missing.
    pub fn from_to(to: &UserTO, store_password: bool) -> Self {
        let now = Utc::now();
        Self {
            key: to
                .any
                .key
                .clone()
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            username: to.username.clone(),
            realm: to.any.realm.clone().unwrap_or_else(|| "/".to_string()),
            workflow_id: None,
            status: None,
            suspended: false,
            failed_logins: 0,
            password: to
                .password
                .as_deref()
                .filter(|_| store_password)
                .map(password_digest),
            password_history: Vec::new(),
            must_change_password: to.must_change_password,
            security_question: to.security_question.clone(),
            security_answer: to.security_answer.clone(),
            token: None,
            token_expire_time: None,
            aux_classes: to.any.aux_classes.clone(),
            plain_attrs: to.any.plain_attrs.clone(),
            vir_attrs: to.any.vir_attrs.clone(),
            resources: to.any.resources.clone(),
            relationships: to.any.relationships.clone(),
            roles: to.roles.clone(),
            memberships: to.memberships.clone(),
            linked_accounts: to.linked_accounts.clone(),
            creation_date: now,
            last_change_date: now,
        }
    }

    /// Snapshot without password.
    pub fn to_user_to(&self) -> UserTO {
        let mut to = UserTO {
            username: self.username.clone(),
            security_question: self.security_question.clone(),
            must_change_password: self.must_change_password,
            roles: self.roles.clone(),
            memberships: self.memberships.clone(),
            linked_accounts: self.linked_accounts.clone(),
            status: self.status.clone(),
            creation_date: Some(self.creation_date),
            last_change_date: Some(self.last_change_date),
            ..Default::default()
        };
        to.any.key = Some(self.key.clone());
        to.any.realm = Some(self.realm.clone());
        to.any.aux_classes = self.aux_classes.clone();
        to.any.plain_attrs = self.plain_attrs.clone();
        to.any.vir_attrs = self.vir_attrs.clone();
        to.any.resources = self.resources.clone();
        to.any.relationships = self.relationships.clone();
        to
    }

    pub fn set_clear_password(&mut self, password: &str) {
        self.password = Some(password_digest(password));
    }

    /// Apply an update request and report the linked accounts that need
    /// propagation: new ones created, removed ones deleted and changed ones
    /// updated. Resource propagation depends on group resources too, so the
    /// caller works it out from the store.
    pub fn apply_update(
        &mut self,
        req: &UserUR,
    ) -> idm_anyops::Result<PropagationByResource<LinkedAccountRef>> {
        let before_accounts = self.linked_accounts.clone();

        let patched = patch_user(&self.to_user_to(), req)?;

        if let Some(username) = patched.username {
            self.username = Some(username);
        }
        if let Some(realm) = patched.any.realm {
            self.realm = realm;
        }
        self.security_question = patched.security_question;
        if req.security_answer.is_some() {
            self.security_answer = patched.security_answer;
        }
        self.must_change_password = patched.must_change_password;
        self.aux_classes = patched.any.aux_classes;
        self.plain_attrs = patched.any.plain_attrs;
        self.vir_attrs = patched.any.vir_attrs;
        self.resources = patched.any.resources;
        self.relationships = patched.any.relationships;
        self.roles = patched.roles;
        self.memberships = patched.memberships;
        self.linked_accounts = patched.linked_accounts;

        if let Some(password) = &req.password {
            if let (Some(value), true) = (&password.value, password.on_identity_store) {
                self.set_clear_password(value);
            }
        }
        self.last_change_date = Utc::now();

        let mut prop_by_linked_account = PropagationByResource::new();
        for account in &self.linked_accounts {
            let key = account.key();
            match before_accounts.iter().find(|a| a.key() == key) {
                None => {
                    prop_by_linked_account.add(ResourceOperation::Create, account_ref(account));
                }
                Some(previous) if previous != account => {
                    prop_by_linked_account.add(ResourceOperation::Update, account_ref(account));
                }
                Some(_) => {}
            }
        }
        for account in &before_accounts {
            let key = account.key();
            if !self.linked_accounts.iter().any(|a| a.key() == key) {
                prop_by_linked_account.add(ResourceOperation::Delete, account_ref(account));
            }
        }

        Ok(prop_by_linked_account)
    }

    pub fn linked_account_refs(&self) -> Vec<LinkedAccountRef> {
        self.linked_accounts.iter().map(account_ref).collect()
    }

    /// Issue a fresh token valid for `ttl`.
    pub fn generate_token(&mut self, ttl: Duration) -> String {
        let token = random_token();
        self.token = Some(token.clone());
        self.token_expire_time = Some(Utc::now() + ttl);
        token
    }

    pub fn check_token(&self, token: &str) -> bool {
        let not_expired = self.token_expire_time.is_none_or(|t| t > Utc::now());
        self.token.as_deref() == Some(token) && not_expired
    }

    pub fn remove_token(&mut self) {
        self.token = None;
        self.token_expire_time = None;
    }
}

pub fn account_ref(account: &LinkedAccountTO) -> LinkedAccountRef {
    (
        account.resource.clone(),
        account.conn_object_key_value.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use idm_anyops::{LinkedAccountUR, PasswordPatch, PatchOperation, StringPatchItem};

    fn make_user() -> User {
        let to = UserTO::new("rossini")
            .with_realm("/even")
            .with_resource("ldap")
            .with_resource("db")
            .with_password("Password123");
        User::from_to(&to, true)
    }

    #[test]
    fn test_from_to_generates_key_and_digest() {
        let user = make_user();
        assert!(Uuid::parse_str(&user.key).is_ok());
        assert_eq!(user.password, Some(password_digest("Password123")));
        assert_eq!(user.realm, "/even");

        let unstored = User::from_to(&UserTO::new("verdi").with_password("Password123"), false);
        assert!(unstored.password.is_none());
    }

    #[test]
    fn test_snapshot_has_no_password() {
        let to = make_user().to_user_to();
        assert!(to.password.is_none());
        assert_eq!(to.username.as_deref(), Some("rossini"));
    }

    #[test]
    fn test_apply_update_propagation() {
        let mut user = make_user();
        user.linked_accounts.push(LinkedAccountTO::new("ldap", "uid=old"));
        let mut req = UserUR::new(user.key.clone());
        req.any.resources.push(StringPatchItem::delete("db"));
        req.any.resources.push(StringPatchItem::add_replace("ws"));
        req.password = Some(PasswordPatch::new("Password321"));
        req.linked_accounts.push(LinkedAccountUR {
            operation: PatchOperation::Delete,
            linked_account: Some(LinkedAccountTO::new("ldap", "uid=old")),
        });
        req.linked_accounts.push(LinkedAccountUR {
            operation: PatchOperation::AddReplace,
            linked_account: Some(LinkedAccountTO::new("ldap", "uid=new")),
        });

        let linked = user.apply_update(&req).unwrap();
        assert_eq!(user.resources, vec!["ldap".to_string(), "ws".to_string()]);
        assert!(linked
            .get(ResourceOperation::Create)
            .contains(&("ldap".to_string(), "uid=new".to_string())));
        assert!(linked
            .get(ResourceOperation::Delete)
            .contains(&("ldap".to_string(), "uid=old".to_string())));
        assert_eq!(user.password, Some(password_digest("Password321")));
    }

    #[test]
    fn test_token_lifecycle() {
        let mut user = make_user();
        assert!(!user.check_token("anything"));

        let token = user.generate_token(Duration::minutes(5));
        assert!(user.check_token(&token));
        assert!(!user.check_token("other"));

        user.token_expire_time = Some(Utc::now() - Duration::minutes(1));
        assert!(!user.check_token(&token));

        user.remove_token();
        assert!(user.token.is_none());
    }
}
