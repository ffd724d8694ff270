//! Engine failures: a domain cause reaches the caller unwrapped, anything
//! else is wrapped with the operation that hit it.

mod helpers;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use idm_workflow::engine::EngineResult;
use idm_workflow::{
    DomainCause, EngineError, MemoryContextStore, MemoryProcessEngine, MemoryUserStore,
    ProcessEngine, StartContext, StartOutcome, TaskContext, TaskInfo, TaskOutcome, UserStore,
    UserWorkflowAdapter, WorkflowConfig, WorkflowError,
};

use helpers::{init_tracing, make_user_to, ADMIN};

/// Delegates to the in-memory engine but fails every task completion.
struct FailingEngine {
    inner: MemoryProcessEngine,
    cause: Option<DomainCause>,
}

#[async_trait]
impl ProcessEngine for FailingEngine {
    async fn start(&self, process_key: &str, ctx: StartContext) -> EngineResult<StartOutcome> {
        self.inner.start(process_key, ctx).await
    }

    async fn is_active(&self, workflow_id: &str) -> EngineResult<bool> {
        self.inner.is_active(workflow_id).await
    }

    async fn active_tasks(&self, workflow_id: &str) -> EngineResult<Vec<TaskInfo>> {
        self.inner.active_tasks(workflow_id).await
    }

    async fn find_task(&self, task_id: &str) -> EngineResult<Option<TaskInfo>> {
        self.inner.find_task(task_id).await
    }

    async fn complete_task(&self, _task_id: &str, ctx: TaskContext) -> EngineResult<TaskOutcome> {
        let message = format!("delegate of {} failed", ctx.task);
        Err(match &self.cause {
            Some(cause) => EngineError::with_cause(message, cause.clone()),
            None => EngineError::new(message),
        })
    }

    async fn available_tasks(&self, workflow_id: &str) -> EngineResult<Vec<String>> {
        self.inner.available_tasks(workflow_id).await
    }

    async fn form_tasks(&self) -> EngineResult<Vec<TaskInfo>> {
        self.inner.form_tasks().await
    }

    async fn set_owner(&self, task_id: &str, owner: &str) -> EngineResult<()> {
        self.inner.set_owner(task_id, owner).await
    }

    async fn submit_form(
        &self,
        task_id: &str,
        submitter: &str,
        values: BTreeMap<String, String>,
    ) -> EngineResult<TaskOutcome> {
        self.inner.submit_form(task_id, submitter, values).await
    }

    async fn performed_activities(&self, workflow_id: &str) -> EngineResult<Vec<String>> {
        self.inner.performed_activities(workflow_id).await
    }

    async fn delete_history(&self, workflow_id: &str) -> EngineResult<()> {
        self.inner.delete_history(workflow_id).await
    }
}

fn make_adapter(
    cause: Option<DomainCause>,
    config: WorkflowConfig,
) -> (UserWorkflowAdapter, Arc<MemoryUserStore>) {
    init_tracing();
    let engine = FailingEngine {
        inner: MemoryProcessEngine::bundled().unwrap(),
        cause,
    };
    let users = Arc::new(MemoryUserStore::new());
    let adapter = UserWorkflowAdapter::new(
        Arc::new(engine),
        users.clone(),
        Arc::new(MemoryContextStore::new()),
        config,
    )
    .unwrap();
    (adapter, users)
}

async fn create(adapter: &UserWorkflowAdapter) -> String {
    adapter
        .create(ADMIN, &make_user_to("rossini"), false, None, true)
        .await
        .unwrap()
        .result
        .0
}

#[tokio::test]
async fn test_invalid_entity_cause_surfaces() {
    let (adapter, _) = make_adapter(
        Some(DomainCause::InvalidEntity("username taken on ldap".into())),
        WorkflowConfig::default(),
    );
    let key = create(&adapter).await;

    let err = adapter.suspend(ADMIN, &key).await.unwrap_err();
    match err {
        WorkflowError::InvalidEntity(msg) => assert_eq!(msg, "username taken on ldap"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_client_validation_cause_surfaces() {
    let (adapter, _) = make_adapter(
        Some(DomainCause::ClientValidation("missing attribute".into())),
        WorkflowConfig::default(),
    );
    let key = create(&adapter).await;

    let err = adapter.reactivate(ADMIN, &key).await.unwrap_err();
    assert!(matches!(err, WorkflowError::ClientValidation(_)));
}

#[tokio::test]
async fn test_failure_without_cause_is_wrapped() {
    let (adapter, users) = make_adapter(None, WorkflowConfig::default());
    let key = create(&adapter).await;

    let err = adapter.suspend(ADMIN, &key).await.unwrap_err();
    match &err {
        WorkflowError::Engine { context, source } => {
            assert_eq!(context, &format!("While completing task 'active' for {key}"));
            assert_eq!(source.message, "delegate of suspend failed");
        }
        other => panic!("unexpected error: {other}"),
    }

    // the user is left as it was
    let user = users.find(&key).await.unwrap().unwrap();
    assert_eq!(user.status.as_deref(), Some("active"));
    assert!(!user.suspended);
}

#[tokio::test]
async fn test_unknown_process_key() {
    let config = WorkflowConfig {
        process_key: "nope".into(),
        ..Default::default()
    };
    let (adapter, users) = make_adapter(None, config);

    let err = adapter
        .create(ADMIN, &make_user_to("rossini"), false, None, true)
        .await
        .unwrap_err();
    match err {
        WorkflowError::Engine { context, .. } => assert_eq!(context, "While starting nope instance"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(users.is_empty().await);
}
