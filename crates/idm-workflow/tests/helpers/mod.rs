//! Shared fixtures for the workflow integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use tracing_subscriber::EnvFilter;

use idm_anyops::{MembershipTO, UserTO};
use idm_workflow::{
    DefinitionLoader, MemoryContextStore, MemoryProcessEngine, MemoryUserStore, ProcessContext,
    User, UserStore, UserWorkflowAdapter, WorkflowConfig,
};

pub const ADMIN: &str = "admin";
pub const PASSWORD: &str = "password123";

static TRACING: Once = Once::new();

/// Route logs through the test writer; `RUST_LOG` picks the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =========================================================================
// Harness
// =========================================================================

pub struct Harness {
    pub adapter: UserWorkflowAdapter,
    pub engine: Arc<MemoryProcessEngine>,
    pub users: Arc<MemoryUserStore>,
    pub contexts: Arc<MemoryContextStore>,
}

impl Harness {
    /// Adapter over the bundled user workflow.
    pub fn bundled() -> Self {
        Self::build(
            MemoryProcessEngine::bundled().expect("bundled definition"),
            WorkflowConfig::default(),
        )
    }

    /// Adapter over a single custom definition, started for every user.
    pub fn with_definition(yaml: &str) -> Self {
        Self::with_definition_and_config(yaml, WorkflowConfig::default())
    }

    pub fn with_definition_and_config(yaml: &str, mut config: WorkflowConfig) -> Self {
        let definition = DefinitionLoader::load_from_str(yaml).expect("valid definition");
        config.process_key = definition.key.clone();
        Self::build(MemoryProcessEngine::new([definition]), config)
    }

    pub fn with_config(config: WorkflowConfig) -> Self {
        Self::build(
            MemoryProcessEngine::bundled().expect("bundled definition"),
            config,
        )
    }

    fn build(engine: MemoryProcessEngine, config: WorkflowConfig) -> Self {
        init_tracing();
        let engine = Arc::new(engine);
        let users = Arc::new(MemoryUserStore::new());
        let contexts = Arc::new(MemoryContextStore::new());
        let adapter = UserWorkflowAdapter::new(
            engine.clone(),
            users.clone(),
            contexts.clone(),
            config,
        )
        .expect("adapter");
        Self {
            adapter,
            engine,
            users,
            contexts,
        }
    }

    /// Create `username` with the default password and resource `ldap`.
    pub async fn create_user(&self, username: &str) -> User {
        let to = make_user_to(username).with_resource("ldap");
        let created = self
            .adapter
            .create(ADMIN, &to, false, None, true)
            .await
            .expect("create");
        self.user(&created.result.0).await
    }

    pub async fn user(&self, key: &str) -> User {
        self.users
            .find(key)
            .await
            .expect("store")
            .unwrap_or_else(|| panic!("user {key} not stored"))
    }

    pub async fn context(&self, user: &User) -> ProcessContext {
        use idm_workflow::ContextStore;

        let workflow_id = user.workflow_id.as_deref().expect("workflow id");
        self.contexts.load(workflow_id).await.expect("context")
    }

    /// Store a user outside of any workflow, member of `groups`.
    pub async fn add_manager(&self, username: &str, groups: &[&str]) -> User {
        let mut to = UserTO::new(username);
        to.memberships = groups.iter().map(|g| MembershipTO::new(*g)).collect();
        let user = User::from_to(&to, false);
        self.users.save(&user).await.expect("save manager");
        user
    }
}

pub fn make_user_to(username: &str) -> UserTO {
    UserTO::new(username).with_password(PASSWORD)
}
