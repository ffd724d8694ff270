//! Account and password policies
//!
//! Enforced on create, update, password reset confirmation and internal
//! suspension. A violation never reaches the process engine.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::verify_digest;
use crate::user::User;

/// Default identifier pattern for usernames when no policy overrides it.
pub const DEFAULT_USERNAME_PATTERN: &str = r"^[\w\-@.+ ]+$";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("password mandatory")]
    PasswordMandatory,

    #[error("password must be at least {0} characters long")]
    PasswordTooShort(usize),

    #[error("password value was used in the past: not allowed")]
    PasswordReused,

    #[error("null username")]
    NullUsername,

    #[error("not allowed: {0}")]
    ReservedUsername(String),

    #[error("character(s) not allowed: {0}")]
    InvalidUsername(String),

    #[error("invalid username pattern: {0}")]
    InvalidPattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountPolicy {
    /// 0 disables internal suspension.
    pub max_authentication_attempts: u32,
    pub propagate_suspension: bool,
    pub username_pattern: String,
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self {
            max_authentication_attempts: 0,
            propagate_suspension: false,
            username_pattern: DEFAULT_USERNAME_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub allow_null_password: bool,
    pub min_length: usize,
    pub history_length: usize,
}

/// Outcome of a successful enforcement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Enforcement {
    /// Failed logins went over the account policy maximum.
    pub suspend: bool,
    pub propagate_suspension: bool,
}

#[derive(Debug, Clone)]
pub struct PolicyEnforcer {
    account: AccountPolicy,
    password: PasswordPolicy,
    admin_user: String,
    anonymous_user: String,
    username_pattern: Regex,
}

impl PolicyEnforcer {
    pub fn new(
        account: AccountPolicy,
        password: PasswordPolicy,
        admin_user: impl Into<String>,
        anonymous_user: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        let username_pattern = Regex::new(&account.username_pattern)
            .map_err(|e| PolicyError::InvalidPattern(e.to_string()))?;
        Ok(Self {
            account,
            password,
            admin_user: admin_user.into(),
            anonymous_user: anonymous_user.into(),
            username_pattern,
        })
    }

    pub fn account(&self) -> &AccountPolicy {
        &self.account
    }

    /// Check `user` (and the clear password being set, if any) against the
    /// policies. Updates the password history on success.
    pub fn enforce(
        &self,
        user: &mut User,
        disable_pwd_policy_check: bool,
        clear_password: Option<&str>,
    ) -> Result<Enforcement, PolicyError> {
        if !disable_pwd_policy_check {
            debug!(user = %user.key, "password policy enforcement");
            self.enforce_password(user, clear_password)?;
        }

        debug!(user = %user.key, "account policy enforcement");
        self.enforce_account(user)?;

        let max = self.account.max_authentication_attempts;
        Ok(Enforcement {
            suspend: max > 0 && user.failed_logins > max && !user.suspended,
            propagate_suspension: self.account.propagate_suspension,
        })
    }

    fn enforce_password(&self, user: &mut User, clear_password: Option<&str>) -> Result<(), PolicyError> {
        let policy = &self.password;

        match clear_password {
            None if !policy.allow_null_password => return Err(PolicyError::PasswordMandatory),
            Some(password) if password.chars().count() < policy.min_length => {
                return Err(PolicyError::PasswordTooShort(policy.min_length))
            }
            _ => {}
        }

        if policy.history_length == 0 {
            user.password_history.clear();
            return Ok(());
        }

        if let Some(password) = clear_password {
            let history = &user.password_history;
            let recent = &history[history.len().saturating_sub(policy.history_length)..];
            if recent.iter().any(|old| verify_digest(password, old)) {
                return Err(PolicyError::PasswordReused);
            }
        }

        if let Some(current) = user.password.clone() {
            if !user.password_history.contains(&current) {
                user.password_history.push(current);
            }
        }
        let excess = user
            .password_history
            .len()
            .saturating_sub(policy.history_length);
        user.password_history.drain(..excess);

        Ok(())
    }

    fn enforce_account(&self, user: &User) -> Result<(), PolicyError> {
        let username = user.username.as_deref().ok_or(PolicyError::NullUsername)?;

        if username == self.admin_user || username == self.anonymous_user {
            return Err(PolicyError::ReservedUsername(username.to_string()));
        }

        let linked_usernames = user
            .linked_accounts
            .iter()
            .filter_map(|a| a.username.as_deref());
        for name in std::iter::once(username).chain(linked_usernames) {
            if !self.username_pattern.is_match(name) {
                return Err(PolicyError::InvalidUsername(name.to_string()));
            }
        }

        Ok(())
    }
}
