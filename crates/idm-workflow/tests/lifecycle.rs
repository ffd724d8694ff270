//! User lifecycle through the adapter: create, update, suspend, reactivate,
//! password reset, activation, certification, custom tasks and delete.

mod helpers;

use std::collections::BTreeMap;

use idm_anyops::{
    diff_user, Attr, LinkedAccountTO, MembershipUR, PasswordPatch, UserTO, UserUR,
};
use idm_workflow::{
    AccountPolicy, ProcessEngine, PropagationState, ResourceOperation, UserStore,
    WorkflowConfig, WorkflowError,
};

use helpers::{make_user_to, Harness, ADMIN, PASSWORD};

const ACTIVATION_WORKFLOW: &str = r#"
key: activationWorkflow
start:
  - to: created
states:
  created:
    enabled: false
    generate_token: true
  active:
    enabled: true
    propagate_enable: true
transitions:
  - { from: created, task: activate, to: active }
  - { from: "*", task: delete, to: null }
"#;

const REVIEW_WORKFLOW: &str = r#"
key: reviewWorkflow
start:
  - to: active
states:
  active:
    enabled: true
transitions:
  - { from: active, task: review, when: { field: outcome, equals: close }, to: null }
  - { from: active, task: review, to: active }
"#;

const CERTIFY_WORKFLOW: &str = r#"
key: certifyWorkflow
start:
  - to: active
states:
  active:
    enabled: true
  certification:
    form:
      key: certify
      candidate_users: [bellini]
      properties:
        - { id: certified, type: boolean, required: true }
transitions:
  - { from: active, task: requestCertify, to: certification }
  - { from: certification, task: submit, to: active }
"#;

fn set<const N: usize>(items: [&str; N]) -> std::collections::BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// =========================================================================
// Create / suspend / reactivate
// =========================================================================

#[tokio::test]
async fn test_create_suspend_reactivate() {
    let h = Harness::bundled();

    let to = make_user_to("rossini").with_resource("ldap");
    let created = h.adapter.create(ADMIN, &to, false, None, true).await.unwrap();
    let (key, propagate_enable) = created.result.clone();

    assert_eq!(propagate_enable, None);
    assert_eq!(created.performed_tasks, set(["create", "active"]));
    assert_eq!(created.prop_by_res.get(ResourceOperation::Create), &set(["ldap"]));

    let user = h.user(&key).await;
    assert_eq!(user.status.as_deref(), Some("active"));
    assert!(!user.suspended);
    assert!(user.password.is_some());
    assert!(!h.context(&user).await.propagation.is_pending());

    let suspended = h.adapter.suspend(ADMIN, &key).await.unwrap();
    assert!(suspended.performed_tasks.contains("suspend"));
    assert_eq!(suspended.prop_by_res.get(ResourceOperation::Update), &set(["ldap"]));
    let user = h.user(&key).await;
    assert_eq!(user.status.as_deref(), Some("suspended"));
    assert!(user.suspended);

    let mut failing = user.clone();
    failing.failed_logins = 2;
    h.users.save(&failing).await.unwrap();

    let reactivated = h.adapter.reactivate(ADMIN, &key).await.unwrap();
    assert!(reactivated.performed_tasks.contains("reactivate"));
    let user = h.user(&key).await;
    assert_eq!(user.status.as_deref(), Some("active"));
    assert!(!user.suspended);
    assert_eq!(user.failed_logins, 0);
}

#[tokio::test]
async fn test_create_disabled() {
    let h = Harness::bundled();

    let created = h
        .adapter
        .create(ADMIN, &make_user_to("verdi"), false, Some(false), true)
        .await
        .unwrap();
    assert_eq!(created.result.1, Some(false));

    let user = h.user(&created.result.0).await;
    assert_eq!(user.status.as_deref(), Some("suspended"));
    assert!(user.suspended);
}

#[tokio::test]
async fn test_suspend_twice_fails() {
    let h = Harness::bundled();
    let user = h.create_user("rossini").await;

    h.adapter.suspend(ADMIN, &user.key).await.unwrap();
    let err = h.adapter.suspend(ADMIN, &user.key).await.unwrap_err();
    match err {
        WorkflowError::Engine { context, .. } => {
            assert!(context.starts_with("While completing task 'suspended'"), "{context}")
        }
        other => panic!("unexpected error: {other}"),
    }
}

// =========================================================================
// Update
// =========================================================================

#[tokio::test]
async fn test_update_from_diff() {
    let h = Harness::bundled();
    let user = h.create_user("rossini").await;

    let original = user.to_user_to();
    let mut updated = original.clone();
    updated.username = Some("rossini2".into());
    updated.any.resources.push("db".into());
    updated
        .any
        .plain_attrs
        .push(Attr::with_values("email", ["rossini@example.org"]));
    updated
        .linked_accounts
        .push(LinkedAccountTO::new("ldap", "rossini-admin"));

    let req = diff_user(&updated, &original, false).unwrap();
    let result = h.adapter.update(ADMIN, &req).await.unwrap();

    assert!(result.performed_tasks.contains("update"));
    assert_eq!(result.prop_by_res.get(ResourceOperation::Create), &set(["db"]));
    assert_eq!(result.prop_by_res.get(ResourceOperation::Update), &set(["ldap"]));
    assert!(result
        .prop_by_linked_account
        .get(ResourceOperation::Create)
        .contains(&("ldap".to_string(), "rossini-admin".to_string())));
    assert_eq!(result.result.0, req);

    let stored = h.user(&user.key).await;
    assert_eq!(stored.username.as_deref(), Some("rossini2"));
    assert_eq!(stored.status.as_deref(), Some("active"));
    assert!(stored.plain_attrs.iter().any(|a| a.schema == "email"));

    let context = h.context(&stored).await;
    assert!(context.user_update.is_none());
    assert_eq!(context.propagation, PropagationState::Idle);
}

#[tokio::test]
async fn test_update_propagates_group_resources() {
    let h = Harness::bundled();
    h.users.set_group_resources("g1", ["ad"]).await;
    let user = h.create_user("rossini").await;

    let mut join = UserUR::new(user.key.clone());
    join.memberships.push(MembershipUR::add_replace("g1"));
    let result = h.adapter.update(ADMIN, &join).await.unwrap();

    assert_eq!(result.prop_by_res.get(ResourceOperation::Create), &set(["ad"]));
    assert_eq!(result.prop_by_res.get(ResourceOperation::Update), &set(["ldap"]));
    assert!(result.prop_by_res.get(ResourceOperation::Delete).is_empty());
    assert_eq!(
        h.users.find_all_resource_keys(&user.key).await.unwrap(),
        set(["ad", "ldap"])
    );

    let mut leave = UserUR::new(user.key.clone());
    leave.memberships.push(MembershipUR::delete("g1"));
    let result = h.adapter.update(ADMIN, &leave).await.unwrap();

    assert_eq!(result.prop_by_res.get(ResourceOperation::Delete), &set(["ad"]));
    assert_eq!(result.prop_by_res.get(ResourceOperation::Update), &set(["ldap"]));
    assert!(result.prop_by_res.get(ResourceOperation::Create).is_empty());
}

#[tokio::test]
async fn test_update_without_key() {
    let h = Harness::bundled();
    let err = h.adapter.update(ADMIN, &UserUR::default()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::ClientValidation(_)));
}

#[tokio::test]
async fn test_password_only_update_skips_engine() {
    let h = Harness::bundled();
    let to = make_user_to("rossini")
        .with_resource("ldap")
        .with_resource("db");
    let created = h.adapter.create(ADMIN, &to, false, None, true).await.unwrap();
    let user = h.user(&created.result.0).await;
    let workflow_id = user.workflow_id.clone().unwrap();
    let history = h.engine.performed_activities(&workflow_id).await.unwrap();

    let mut req = UserUR::new(user.key.clone());
    req.password = Some(
        PasswordPatch::new("newpassword1")
            .with_resources(["ldap"])
            .resources_only(),
    );
    let result = h.adapter.update(ADMIN, &req).await.unwrap();

    assert!(result.performed_tasks.is_empty());
    assert_eq!(result.result.1, None);
    assert_eq!(result.prop_by_res.get(ResourceOperation::Update), &set(["ldap"]));
    assert!(result.prop_by_res.get(ResourceOperation::Create).is_empty());
    assert_eq!(
        h.engine.performed_activities(&workflow_id).await.unwrap(),
        history
    );
    assert_eq!(h.user(&user.key).await.password, user.password);
}

// =========================================================================
// Password reset
// =========================================================================

#[tokio::test]
async fn test_password_reset() {
    let h = Harness::bundled();
    let user = h.create_user("rossini").await;

    let requested = h.adapter.request_password_reset(ADMIN, &user.key).await.unwrap();
    assert!(requested.performed_tasks.contains("requestPasswordReset"));
    let token = h.user(&user.key).await.token.expect("token issued");

    let err = h
        .adapter
        .confirm_password_reset(ADMIN, &user.key, "not-the-token", "resetpassword9")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::WrongToken(_)));

    let confirmed = h
        .adapter
        .confirm_password_reset(ADMIN, &user.key, &token, "resetpassword9")
        .await
        .unwrap();
    let password = confirmed.result.0.password.clone().expect("password patch");
    assert_eq!(password.value.as_deref(), Some("resetpassword9"));
    assert!(password.on_identity_store);
    assert_eq!(password.resources, vec!["ldap".to_string()]);
    assert_eq!(confirmed.prop_by_res.get(ResourceOperation::Update), &set(["ldap"]));

    let stored = h.user(&user.key).await;
    assert!(stored.token.is_none());
    assert_ne!(stored.password, user.password);
    assert_eq!(stored.status.as_deref(), Some("active"));
}

// =========================================================================
// Delete
// =========================================================================

#[tokio::test]
async fn test_delete_removes_user_and_history() {
    let h = Harness::bundled();
    let user = h.create_user("rossini").await;
    let workflow_id = user.workflow_id.clone().unwrap();

    let deleted = h.adapter.delete(ADMIN, &user.key).await.unwrap();
    assert!(deleted.performed_tasks.contains("delete"));
    assert_eq!(deleted.prop_by_res.get(ResourceOperation::Delete), &set(["ldap"]));

    assert!(h.users.find(&user.key).await.unwrap().is_none());
    assert!(h
        .engine
        .performed_activities(&workflow_id)
        .await
        .unwrap()
        .is_empty());
    assert!(!h.contexts.contains(&workflow_id).await);
}

#[tokio::test]
async fn test_unknown_user() {
    let h = Harness::bundled();
    let err = h.adapter.suspend(ADMIN, "missing").await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
}

// =========================================================================
// Policies
// =========================================================================

#[tokio::test]
async fn test_reserved_username_never_reaches_engine() {
    let h = Harness::bundled();
    let err = h
        .adapter
        .create(ADMIN, &make_user_to(ADMIN), false, None, true)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidEntity(_)));
    assert!(h.users.is_empty().await);
}

#[tokio::test]
async fn test_missing_password_rejected() {
    let h = Harness::bundled();
    let err = h
        .adapter
        .create(ADMIN, &UserTO::new("rossini"), false, None, true)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidEntity(_)));

    // same request with the password check disabled
    h.adapter
        .create(ADMIN, &UserTO::new("rossini"), true, None, true)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_internal_suspend() {
    let config = WorkflowConfig {
        account_policy: AccountPolicy {
            max_authentication_attempts: 3,
            propagate_suspension: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let h = Harness::with_config(config);
    let user = h.create_user("rossini").await;

    let mut failing = user.clone();
    failing.failed_logins = 2;
    h.users.save(&failing).await.unwrap();
    assert!(h.adapter.internal_suspend(ADMIN, &user.key).await.unwrap().is_none());

    failing.failed_logins = 4;
    h.users.save(&failing).await.unwrap();
    let (result, propagate) = h
        .adapter
        .internal_suspend(ADMIN, &user.key)
        .await
        .unwrap()
        .expect("suspended");
    assert!(propagate);
    assert!(result.performed_tasks.contains("suspend"));

    let stored = h.user(&user.key).await;
    assert!(stored.suspended);
    assert_eq!(stored.status.as_deref(), Some("suspended"));

    // already suspended
    assert!(h.adapter.internal_suspend(ADMIN, &user.key).await.unwrap().is_none());
}

// =========================================================================
// Activation
// =========================================================================

#[tokio::test]
async fn test_activation_with_token() {
    let h = Harness::with_definition(ACTIVATION_WORKFLOW);
    let user = h.create_user("rossini").await;

    assert_eq!(user.status.as_deref(), Some("created"));
    assert!(user.suspended);
    let token = user.token.clone().expect("activation token");

    let err = h.adapter.activate(ADMIN, &user.key, "guess").await.unwrap_err();
    assert!(matches!(err, WorkflowError::WrongToken(_)));

    let activated = h.adapter.activate(ADMIN, &user.key, &token).await.unwrap();
    assert!(activated.performed_tasks.contains("activate"));

    let stored = h.user(&user.key).await;
    assert_eq!(stored.status.as_deref(), Some("active"));
    assert!(!stored.suspended);
    assert!(stored.token.is_none());
}

// =========================================================================
// Tasks
// =========================================================================

#[tokio::test]
async fn test_available_tasks() {
    let h = Harness::bundled();
    let user = h.create_user("rossini").await;

    assert_eq!(
        h.adapter.get_available_tasks(&user.key).await.unwrap(),
        vec![
            "update",
            "suspend",
            "requestPasswordReset",
            "confirmPasswordReset",
            "delete"
        ]
    );

    h.adapter.suspend(ADMIN, &user.key).await.unwrap();
    assert_eq!(
        h.adapter.get_available_tasks(&user.key).await.unwrap(),
        vec!["update", "reactivate", "delete"]
    );
}

#[tokio::test]
async fn test_execute_custom_task() {
    let h = Harness::with_definition(REVIEW_WORKFLOW);
    let user = h.create_user("rossini").await;

    let mut variables = BTreeMap::new();
    variables.insert("outcome".to_string(), "keep".to_string());
    let kept = h
        .adapter
        .execute(ADMIN, &user.key, "review", variables.clone())
        .await
        .unwrap();
    assert!(kept.performed_tasks.contains("review"));
    assert_eq!(h.user(&user.key).await.status.as_deref(), Some("active"));

    variables.insert("outcome".to_string(), "close".to_string());
    h.adapter
        .execute(ADMIN, &user.key, "review", variables)
        .await
        .unwrap();
    assert!(h.users.find(&user.key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_password_kept_as_digest() {
    let h = Harness::bundled();
    let user = h.create_user("rossini").await;
    assert_ne!(user.password.as_deref(), Some(PASSWORD));
}

#[tokio::test]
async fn test_request_certify_records_submitter() {
    let h = Harness::with_definition(CERTIFY_WORKFLOW);
    let user = h.create_user("rossini").await;

    let requested = h.adapter.request_certify("puccini", &user.key).await.unwrap();
    assert!(requested.performed_tasks.contains("requestCertify"));

    let stored = h.user(&user.key).await;
    assert_eq!(stored.status.as_deref(), Some("certification"));
    assert_eq!(
        h.context(&stored).await.form_submitter.as_deref(),
        Some("puccini")
    );

    let form = h
        .adapter
        .get_form(stored.workflow_id.as_deref().unwrap())
        .await
        .unwrap()
        .expect("certification form");
    assert_eq!(form.form_key, "certify");
}
