//! Workflow adapter configuration
//!
//! Loaded from YAML. The AES key for stashed passwords is never part of the
//! file: `secret_key_env` names the environment variable holding it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::{CryptoError, PasswordCipher};
use crate::policy::{AccountPolicy, PasswordPolicy};

/// Environment variable pointing at the configuration file.
pub const CONFIG_ENV: &str = "IDM_WORKFLOW_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "config/workflow.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Key of the process definition started for every user.
    pub process_key: String,
    pub admin_user: String,
    pub anonymous_user: String,
    /// Environment variable holding the base64 AES-256 key.
    pub secret_key_env: Option<String>,
    /// Validity of activation and password reset tokens.
    pub token_ttl_minutes: i64,
    /// Workflow definition to load instead of the bundled one.
    pub definition_path: Option<PathBuf>,
    pub account_policy: AccountPolicy,
    pub password_policy: PasswordPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            process_key: "userWorkflow".to_string(),
            admin_user: "admin".to_string(),
            anonymous_user: "anonymous".to_string(),
            secret_key_env: None,
            token_ttl_minutes: 60,
            definition_path: None,
            account_policy: AccountPolicy::default(),
            password_policy: PasswordPolicy::default(),
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load from `$IDM_WORKFLOW_CONFIG`, falling back to
    /// `config/workflow.yaml`. A missing default file yields the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)
            }
            Err(_) => {
                tracing::info!("no workflow configuration found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Cipher for stashed passwords. Without `secret_key_env` a random key is
    /// used, valid for this process only.
    pub fn cipher(&self) -> Result<PasswordCipher, ConfigError> {
        match &self.secret_key_env {
            Some(var) => {
                let key =
                    std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.clone()))?;
                Ok(PasswordCipher::from_base64(&key)?)
            }
            None => {
                tracing::warn!("secret_key_env not configured, using an ephemeral key");
                Ok(PasswordCipher::random())
            }
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.token_ttl_minutes)
    }
}
