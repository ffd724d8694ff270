//! User workflow adapter
//!
//! Drives one process instance per user through named transitions. Each
//! transition completes the single active task, recomputes the user status
//! from the next task and reports which resources need propagation. When the
//! process stops on a form task, propagation is stashed in the process
//! context and handed back on form submission.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use idm_anyops::{PasswordPatch, UserTO, UserUR};

use crate::config::WorkflowConfig;
use crate::context::{PendingPropagation, PropagationState};
use crate::crypto::PasswordCipher;
use crate::engine::{ProcessEngine, StartContext, TaskContext, TaskInfo, TaskOutcome, TaskPayload};
use crate::error::{Result, WorkflowError};
use crate::form::WorkflowForm;
use crate::policy::PolicyEnforcer;
use crate::propagation::{LinkedAccountRef, PropagationByResource, ResourceOperation};
use crate::result::WorkflowResult;
use crate::store::{ContextStore, UserStore};
use crate::user::{account_ref, User};

type Propagation = (
    PropagationByResource<String>,
    PropagationByResource<LinkedAccountRef>,
);

pub struct UserWorkflowAdapter {
    engine: Arc<dyn ProcessEngine>,
    users: Arc<dyn UserStore>,
    contexts: Arc<dyn ContextStore>,
    cipher: PasswordCipher,
    policies: PolicyEnforcer,
    config: WorkflowConfig,
}

impl UserWorkflowAdapter {
    pub fn new(
        engine: Arc<dyn ProcessEngine>,
        users: Arc<dyn UserStore>,
        contexts: Arc<dyn ContextStore>,
        config: WorkflowConfig,
    ) -> Result<Self> {
        let cipher = config.cipher()?;
        let policies = PolicyEnforcer::new(
            config.account_policy.clone(),
            config.password_policy.clone(),
            config.admin_user.clone(),
            config.anonymous_user.clone(),
        )?;
        Ok(Self {
            engine,
            users,
            contexts,
            cipher,
            policies,
            config,
        })
    }

    pub fn with_cipher(mut self, cipher: PasswordCipher) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    // ── Lifecycle ──

    /// Start a process for a new user. Returns the user key and whether the
    /// enabled status must be propagated.
    pub async fn create(
        &self,
        executor: &str,
        user_to: &UserTO,
        disable_pwd_policy_check: bool,
        enabled: Option<bool>,
        store_password: bool,
    ) -> Result<WorkflowResult<(String, Option<bool>)>> {
        let mut user = User::from_to(user_to, store_password);
        self.policies.enforce(
            &mut user,
            disable_pwd_policy_check,
            user_to.password.as_deref(),
        )?;

        let process_key = &self.config.process_key;
        let start = StartContext {
            executor: executor.to_string(),
            user: user_to.clone(),
            enabled,
            store_password,
        };
        let outcome = self.engine.start(process_key, start).await.map_err(|e| {
            WorkflowError::from_engine(e, format!("While starting {process_key} instance"))
        })?;

        let workflow_id = outcome.workflow_id.clone();
        user.workflow_id = Some(workflow_id.clone());
        if let Some(enabled) = outcome.enabled {
            user.suspended = !enabled;
        }
        if outcome.generate_token {
            user.generate_token(self.config.token_ttl());
        }
        self.update_status(&mut user).await?;
        self.users.save(&user).await?;
        info!(user = %user.key, workflow_id = %workflow_id, executor, "user created");

        let propagate_enable = outcome.propagate_enable.or(enabled);

        let mut prop_by_res = PropagationByResource::new();
        prop_by_res.set(
            ResourceOperation::Create,
            self.users.find_all_resource_keys(&user.key).await?,
        );
        let mut prop_by_linked_account = PropagationByResource::new();
        prop_by_linked_account.add_all(ResourceOperation::Create, user.linked_account_refs());

        self.save_for_form_submit(
            &user,
            user_to.password.as_deref(),
            enabled,
            &mut prop_by_res,
            &mut prop_by_linked_account,
        )
        .await?;

        let performed = self.performed_activities(&workflow_id).await?;
        Ok(
            WorkflowResult::new((user.key.clone(), propagate_enable), performed.into_iter().collect())
                .with_propagation(prop_by_res, prop_by_linked_account),
        )
    }

    pub async fn activate(
        &self,
        executor: &str,
        key: &str,
        token: &str,
    ) -> Result<WorkflowResult<String>> {
        let mut user = self.load_user(key).await?;
        if !user.check_token(token) {
            return Err(WorkflowError::WrongToken(user.key));
        }

        let payload = TaskPayload::Activate {
            token: token.to_string(),
        };
        let (performed, outcome) = self
            .execute_next_task(executor, &user, "activate", payload)
            .await?;
        self.apply_outcome(&mut user, outcome.as_ref());
        user.remove_token();

        self.update_status(&mut user).await?;
        self.users.save(&user).await?;
        info!(user = %user.key, executor, "user activated");

        Ok(WorkflowResult::new(user.key, performed))
    }

    /// Apply `req`. Returns the request and whether the enabled status must
    /// be propagated.
    pub async fn update(
        &self,
        executor: &str,
        req: &UserUR,
    ) -> Result<WorkflowResult<(UserUR, Option<bool>)>> {
        let key = req
            .key()
            .ok_or_else(|| WorkflowError::ClientValidation("update request without key".into()))?;
        let user = self.load_user(key).await?;

        if let Some(password) = &req.password {
            if !password.on_identity_store && req.is_empty_but_password() {
                return Ok(Self::password_only_update(&user, req, password));
            }
        }

        let workflow_id = Self::workflow_id(&user)?;
        let context = self.contexts.load(&workflow_id).await?;
        let update_before = context.user_update.clone();
        let pending_before = match &context.propagation {
            PropagationState::Pending(pending) => Some(pending.clone()),
            PropagationState::Idle => None,
        };
        let in_form_before = self.form_task(&workflow_id).await?.is_some();

        let resources_before = self.users.find_all_resource_keys(&user.key).await?;
        let mut updated = user.clone();
        let mut prop_by_linked_account = updated.apply_update(req)?;
        let clear_password = req
            .password
            .as_ref()
            .filter(|p| p.on_identity_store)
            .and_then(|p| p.value.as_deref());
        self.policies
            .enforce(&mut updated, clear_password.is_none(), clear_password)?;

        let payload = TaskPayload::Update {
            request: req.clone(),
        };
        let (performed, outcome) = self
            .execute_next_task(executor, &updated, "update", payload)
            .await?;
        self.apply_outcome(&mut updated, outcome.as_ref());
        self.update_status(&mut updated).await?;
        self.users.save(&updated).await?;
        info!(user = %updated.key, executor, "user updated");

        // group memberships may have brought or taken resources
        let resources_after = self.users.find_all_resource_keys(&updated.key).await?;
        let mut prop_by_res =
            PropagationByResource::from_change(&resources_before, &resources_after);

        // pending update shown on forms: the one from before when a form was
        // already waiting, this one when a form has just been reached
        let mut context = self.contexts.load(&workflow_id).await?;
        context.user_update = if in_form_before {
            update_before
        } else {
            Some(req.clone())
        };
        if self.form_task(&workflow_id).await?.is_none() {
            context.user_update = None;
            context.propagation = PropagationState::Idle;
        }
        self.contexts.save(&context).await?;

        let password = req.password.as_ref().and_then(|p| p.value.as_deref());
        match pending_before {
            Some(mut before) => {
                self.save_for_form_submit(
                    &updated,
                    password,
                    None,
                    &mut before.prop_by_res,
                    &mut before.prop_by_linked_account,
                )
                .await?
            }
            None => {
                self.save_for_form_submit(
                    &updated,
                    password,
                    None,
                    &mut prop_by_res,
                    &mut prop_by_linked_account,
                )
                .await?
            }
        }

        let propagate_enable = outcome.and_then(|o| o.propagate_enable);
        Ok(
            WorkflowResult::new((req.clone(), propagate_enable), performed)
                .with_propagation(prop_by_res, prop_by_linked_account),
        )
    }

    /// Password change for resources only: the engine is not involved.
    fn password_only_update(
        user: &User,
        req: &UserUR,
        password: &PasswordPatch,
    ) -> WorkflowResult<(UserUR, Option<bool>)> {
        debug!(user = %user.key, resources = ?password.resources, "password-only update");

        let mut prop_by_res = PropagationByResource::new();
        prop_by_res.add_all(ResourceOperation::Update, password.resources.iter().cloned());

        let mut prop_by_linked_account = PropagationByResource::new();
        prop_by_linked_account.add_all(
            ResourceOperation::Update,
            user.linked_accounts
                .iter()
                .filter(|a| password.resources.contains(&a.resource))
                .map(account_ref),
        );

        WorkflowResult::new((req.clone(), None), BTreeSet::new())
            .with_propagation(prop_by_res, prop_by_linked_account)
    }

    pub async fn suspend(&self, executor: &str, key: &str) -> Result<WorkflowResult<String>> {
        let user = self.load_user(key).await?;
        self.do_suspend(executor, user).await
    }

    /// Suspend the user when failed logins exceed the account policy
    /// maximum. Also reports whether the suspension must be propagated.
    pub async fn internal_suspend(
        &self,
        executor: &str,
        key: &str,
    ) -> Result<Option<(WorkflowResult<String>, bool)>> {
        let mut user = self.load_user(key).await?;
        let enforcement = self.policies.enforce(&mut user, true, None)?;

        if !enforcement.suspend {
            return Ok(None);
        }
        warn!(
            user = %user.key,
            failed_logins = user.failed_logins,
            "suspending after too many failed logins"
        );
        let result = self.do_suspend(executor, user).await?;
        Ok(Some((result, enforcement.propagate_suspension)))
    }

    async fn do_suspend(&self, executor: &str, mut user: User) -> Result<WorkflowResult<String>> {
        let (performed, outcome) = self
            .execute_next_task(executor, &user, "suspend", TaskPayload::None)
            .await?;
        self.apply_outcome(&mut user, outcome.as_ref());
        if outcome.is_some() {
            user.suspended = true;
        }

        self.update_status(&mut user).await?;
        self.users.save(&user).await?;
        info!(user = %user.key, executor, "user suspended");

        let (prop_by_res, prop_by_linked_account) =
            self.propagation_for(&user, ResourceOperation::Update).await?;
        Ok(WorkflowResult::new(user.key, performed)
            .with_propagation(prop_by_res, prop_by_linked_account))
    }

    pub async fn reactivate(&self, executor: &str, key: &str) -> Result<WorkflowResult<String>> {
        let mut user = self.load_user(key).await?;

        let (performed, outcome) = self
            .execute_next_task(executor, &user, "reactivate", TaskPayload::None)
            .await?;
        self.apply_outcome(&mut user, outcome.as_ref());
        if outcome.is_some() {
            user.suspended = false;
            user.failed_logins = 0;
        }

        self.update_status(&mut user).await?;
        self.users.save(&user).await?;
        info!(user = %user.key, executor, "user reactivated");

        let (prop_by_res, prop_by_linked_account) =
            self.propagation_for(&user, ResourceOperation::Update).await?;
        Ok(WorkflowResult::new(user.key, performed)
            .with_propagation(prop_by_res, prop_by_linked_account))
    }

    /// Issue a password reset token, stored on the user.
    pub async fn request_password_reset(
        &self,
        executor: &str,
        key: &str,
    ) -> Result<WorkflowResult<String>> {
        let mut user = self.load_user(key).await?;

        let (performed, outcome) = self
            .execute_next_task(executor, &user, "requestPasswordReset", TaskPayload::PasswordReset)
            .await?;
        self.apply_outcome(&mut user, outcome.as_ref());
        if !outcome.is_some_and(|o| o.generate_token) {
            user.generate_token(self.config.token_ttl());
        }

        self.update_status(&mut user).await?;
        self.users.save(&user).await?;
        info!(user = %user.key, executor, "password reset requested");

        Ok(WorkflowResult::new(user.key, performed))
    }

    /// Set the new password once `token` is verified. The returned request
    /// carries the password for every resource of the user.
    pub async fn confirm_password_reset(
        &self,
        executor: &str,
        key: &str,
        token: &str,
        password: &str,
    ) -> Result<WorkflowResult<(UserUR, Option<bool>)>> {
        let mut user = self.load_user(key).await?;
        if !user.check_token(token) {
            return Err(WorkflowError::WrongToken(user.key));
        }

        user.set_clear_password(password);
        self.policies.enforce(&mut user, false, Some(password))?;
        user.remove_token();

        let payload = TaskPayload::ConfirmPasswordReset {
            token: token.to_string(),
            password: password.to_string(),
        };
        let (performed, outcome) = self
            .execute_next_task(executor, &user, "confirmPasswordReset", payload)
            .await?;
        self.apply_outcome(&mut user, outcome.as_ref());

        self.update_status(&mut user).await?;
        self.users.save(&user).await?;
        info!(user = %user.key, executor, "password reset confirmed");

        let resources = self.users.find_all_resource_keys(&user.key).await?;
        let mut req = UserUR::new(user.key.clone());
        req.password = Some(PasswordPatch::new(password).with_resources(resources.iter().cloned()));

        let mut prop_by_res = PropagationByResource::new();
        prop_by_res.set(ResourceOperation::Update, resources);

        let propagate_enable = outcome.and_then(|o| o.propagate_enable);
        Ok(WorkflowResult::new((req, propagate_enable), performed)
            .with_propagation(prop_by_res, PropagationByResource::new()))
    }

    /// Complete the `delete` task. The user is removed once the process has
    /// ended; otherwise the deletion waits on a form.
    pub async fn delete(&self, executor: &str, key: &str) -> Result<WorkflowResult<String>> {
        let mut user = self.load_user(key).await?;
        let workflow_id = Self::workflow_id(&user)?;

        let (mut prop_by_res, mut prop_by_linked_account) =
            self.propagation_for(&user, ResourceOperation::Delete).await?;

        let (performed, outcome) = self
            .execute_next_task(executor, &user, "delete", TaskPayload::None)
            .await?;

        if self.is_process_active(&workflow_id).await? {
            self.save_for_form_submit(
                &user,
                None,
                None,
                &mut prop_by_res,
                &mut prop_by_linked_account,
            )
            .await?;

            self.apply_outcome(&mut user, outcome.as_ref());
            self.update_status(&mut user).await?;
            self.users.save(&user).await?;
            info!(user = %user.key, executor, status = ?user.status, "user deletion pending");
        } else {
            self.remove_user(&user, &workflow_id).await?;
            info!(user = %user.key, executor, "user deleted");
        }

        Ok(WorkflowResult::new(user.key, performed)
            .with_propagation(prop_by_res, prop_by_linked_account))
    }

    /// Complete the active task through an arbitrary `task`, with extra
    /// process variables.
    pub async fn execute(
        &self,
        executor: &str,
        key: &str,
        task: &str,
        variables: BTreeMap<String, String>,
    ) -> Result<WorkflowResult<String>> {
        let mut user = self.load_user(key).await?;
        let workflow_id = Self::workflow_id(&user)?;

        let (performed, outcome) = self
            .execute_next_task(executor, &user, task, TaskPayload::Custom(variables))
            .await?;
        self.apply_outcome(&mut user, outcome.as_ref());
        self.update_status(&mut user).await?;
        self.users.save(&user).await?;

        if self.is_process_active(&workflow_id).await? {
            self.restash_pending(&user, &workflow_id).await?;
        } else {
            self.remove_user(&user, &workflow_id).await?;
            info!(user = %user.key, executor, task, "process ended, user deleted");
        }

        Ok(WorkflowResult::new(user.key, performed))
    }

    /// Ask for the user's certification; the submitter is recorded so that
    /// the certification form knows who asked.
    pub async fn request_certify(
        &self,
        executor: &str,
        key: &str,
    ) -> Result<WorkflowResult<String>> {
        let mut user = self.load_user(key).await?;
        let workflow_id = Self::workflow_id(&user)?;

        let mut context = self.contexts.load(&workflow_id).await?;
        context.form_submitter = Some(executor.to_string());
        self.contexts.save(&context).await?;

        debug!(user = %user.key, executor, "executing request-certify");
        let (performed, outcome) = self
            .execute_next_task(executor, &user, "requestCertify", TaskPayload::None)
            .await?;
        self.apply_outcome(&mut user, outcome.as_ref());
        self.update_status(&mut user).await?;
        self.users.save(&user).await?;

        self.restash_pending(&user, &workflow_id).await?;

        Ok(WorkflowResult::new(user.key, performed))
    }

    /// Tasks that can be completed from the user's current state.
    pub async fn get_available_tasks(&self, key: &str) -> Result<Vec<String>> {
        let user = self.load_user(key).await?;
        let workflow_id = Self::workflow_id(&user)?;
        self.engine
            .available_tasks(&workflow_id)
            .await
            .map_err(|e| {
                WorkflowError::from_engine(
                    e,
                    format!("While reading available tasks for workflow instance {workflow_id}"),
                )
            })
    }

    // ── Forms ──

    /// Form of the single active task of `workflow_id`, if it has one.
    pub async fn get_form(&self, workflow_id: &str) -> Result<Option<WorkflowForm>> {
        let Some(task) = self.form_task(workflow_id).await? else {
            return Ok(None);
        };
        let user = self
            .users
            .find_by_workflow_id(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("user with workflow id {workflow_id}")))?;
        let context = self.contexts.load(workflow_id).await?;
        Ok(WorkflowForm::from_task(&task, &user, &context))
    }

    /// Forms visible to `executor`: all of them for the admin, otherwise
    /// those where the executor or one of their groups is a candidate.
    pub async fn get_forms(&self, executor: &str) -> Result<Vec<WorkflowForm>> {
        let tasks = self
            .engine
            .form_tasks()
            .await
            .map_err(|e| WorkflowError::from_engine(e, "While reading form tasks"))?;

        let visible: Vec<TaskInfo> = if executor == self.config.admin_user {
            tasks
        } else {
            let (me, groups) = self.executor_with_groups(executor).await?;
            tasks
                .into_iter()
                .filter(|t| t.is_candidate(executor, &groups) || t.is_candidate(&me.key, &groups))
                .collect()
        };

        let mut forms = Vec::with_capacity(visible.len());
        for task in &visible {
            let Some(user) = self
                .users
                .find_by_workflow_id(&task.process_instance_id)
                .await?
            else {
                debug!(task_id = %task.id, "no user for form task");
                continue;
            };
            let context = self.contexts.load(&task.process_instance_id).await?;
            forms.extend(WorkflowForm::from_task(task, &user, &context));
        }
        Ok(forms)
    }

    /// Make `executor` the owner of the form task.
    pub async fn claim_form(&self, executor: &str, task_id: &str) -> Result<WorkflowForm> {
        let task = self.check_task(task_id).await?;

        if executor != self.config.admin_user {
            let (me, groups) = self.executor_with_groups(executor).await?;
            if !(task.is_candidate(executor, &groups) || task.is_candidate(&me.key, &groups)) {
                return Err(WorkflowError::NotCandidate {
                    user: executor.to_string(),
                    task_id: task_id.to_string(),
                });
            }
        }

        self.engine
            .set_owner(task_id, executor)
            .await
            .map_err(|e| WorkflowError::from_engine(e, format!("While reading task {task_id}")))?;
        info!(task_id, executor, "form claimed");

        let task = self.check_task(task_id).await?;
        let user = self
            .users
            .find_by_workflow_id(&task.process_instance_id)
            .await?
            .ok_or_else(|| {
                WorkflowError::NotFound(format!(
                    "user with workflow id {}",
                    task.process_instance_id
                ))
            })?;
        let context = self.contexts.load(&task.process_instance_id).await?;
        WorkflowForm::from_task(&task, &user, &context)
            .ok_or_else(|| WorkflowError::NotFound(format!("form for task {task_id}")))
    }

    /// Submit the form; only its owner may. Returns the update waiting on
    /// the form, or a password-only request for the resources being created.
    pub async fn submit_form(
        &self,
        executor: &str,
        form: &WorkflowForm,
    ) -> Result<WorkflowResult<UserUR>> {
        let task = self.check_task(&form.task_id).await?;
        if task.owner.as_deref() != Some(executor) {
            return Err(WorkflowError::TaskOwnerMismatch {
                task_id: form.task_id.clone(),
                owner: task.owner,
                submitter: executor.to_string(),
            });
        }
        if executor != self.config.admin_user {
            self.executor_with_groups(executor).await?;
        }

        let workflow_id = task.process_instance_id.clone();
        let mut user = self
            .users
            .find_by_workflow_id(&workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("user with workflow id {workflow_id}")))?;

        let pre = self.performed_activities(&workflow_id).await?.len();
        let outcome = self
            .engine
            .submit_form(&form.task_id, executor, form.properties_for_submit())
            .await
            .map_err(|e| {
                WorkflowError::from_engine(
                    e,
                    format!("While submitting form for task {}", form.task_id),
                )
            })?;
        let mut performed: BTreeSet<String> = self
            .performed_activities(&workflow_id)
            .await?
            .into_iter()
            .skip(pre)
            .collect();
        performed.insert(task.definition_key.clone());

        let mut context = self.contexts.load(&workflow_id).await?;
        context.form_submitter = Some(executor.to_string());
        let pending = context.propagation.take();
        let user_update = context.user_update.clone();

        let active = self.is_process_active(&workflow_id).await?;
        if active {
            self.apply_outcome(&mut user, Some(&outcome));
            self.update_status(&mut user).await?;
            self.users.save(&user).await?;
            info!(user = %user.key, task_id = %form.task_id, executor, "form submitted");

            if self.form_task(&workflow_id).await?.is_none() {
                context.user_update = None;
            }
            self.contexts.save(&context).await?;
        } else {
            self.remove_user(&user, &workflow_id).await?;
            info!(user = %user.key, task_id = %form.task_id, executor, "process ended on form submit, user deleted");
        }

        let PendingPropagation {
            mut prop_by_res,
            mut prop_by_linked_account,
            encrypted_password,
            enabled,
        } = pending.unwrap_or_default();
        let clear_password = encrypted_password
            .filter(|e| !e.trim().is_empty())
            .map(|e| self.cipher.decrypt(&e))
            .transpose()?;

        // approval chains: stash again if another form follows
        if active {
            self.save_for_form_submit(
                &user,
                clear_password.as_deref(),
                enabled,
                &mut prop_by_res,
                &mut prop_by_linked_account,
            )
            .await?;
        }

        let request = user_update.unwrap_or_else(|| {
            let mut request = UserUR::new(user.key.clone());
            request.password = Some(PasswordPatch {
                value: clear_password,
                on_identity_store: true,
                resources: prop_by_res
                    .get(ResourceOperation::Create)
                    .iter()
                    .cloned()
                    .collect(),
            });
            request
        });

        Ok(WorkflowResult::new(request, performed)
            .with_propagation(prop_by_res, prop_by_linked_account))
    }

    // ── Internals ──

    async fn load_user(&self, key: &str) -> Result<User> {
        self.users
            .find(key)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("user {key}")))
    }

    fn workflow_id(user: &User) -> Result<String> {
        user.workflow_id
            .clone()
            .ok_or_else(|| WorkflowError::NotFound(format!("workflow instance of user {}", user.key)))
    }

    async fn executor_with_groups(&self, executor: &str) -> Result<(User, Vec<String>)> {
        let me = self
            .users
            .find_by_username(executor)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("user {executor}")))?;
        let groups = self
            .users
            .find_all_group_keys(&me.key)
            .await?
            .into_iter()
            .collect();
        Ok((me, groups))
    }

    async fn check_task(&self, task_id: &str) -> Result<TaskInfo> {
        self.engine
            .find_task(task_id)
            .await
            .map_err(|e| WorkflowError::from_engine(e, format!("While reading task {task_id}")))?
            .ok_or_else(|| WorkflowError::NotFound(format!("task {task_id}")))
    }

    async fn performed_activities(&self, workflow_id: &str) -> Result<Vec<String>> {
        self.engine
            .performed_activities(workflow_id)
            .await
            .map_err(|e| {
                WorkflowError::from_engine(e, format!("While reading history of {workflow_id}"))
            })
    }

    async fn active_tasks(&self, workflow_id: &str) -> Result<Vec<TaskInfo>> {
        self.engine.active_tasks(workflow_id).await.map_err(|e| {
            WorkflowError::from_engine(e, format!("While reading tasks of {workflow_id}"))
        })
    }

    async fn is_process_active(&self, workflow_id: &str) -> Result<bool> {
        self.engine.is_active(workflow_id).await.map_err(|e| {
            WorkflowError::from_engine(e, format!("While checking process {workflow_id}"))
        })
    }

    /// Complete the single active task of the user's process through
    /// `task`. Returns the activities performed since, plus the completed
    /// task's key.
    async fn execute_next_task(
        &self,
        executor: &str,
        user: &User,
        task: &str,
        payload: TaskPayload,
    ) -> Result<(BTreeSet<String>, Option<TaskOutcome>)> {
        let workflow_id = Self::workflow_id(user)?;
        let pre = self.performed_activities(&workflow_id).await?.len();

        let tasks = self.active_tasks(&workflow_id).await?;
        let outcome = match tasks.as_slice() {
            [current] => {
                let ctx = TaskContext {
                    executor: executor.to_string(),
                    task: task.to_string(),
                    user: user.to_user_to(),
                    payload,
                };
                let outcome = self
                    .engine
                    .complete_task(&current.id, ctx)
                    .await
                    .map_err(|e| {
                        WorkflowError::from_engine(
                            e,
                            format!("While completing task '{}' for {}", current.name, user.key),
                        )
                    })?;
                Some(outcome)
            }
            _ => {
                warn!(workflow_id = %workflow_id, count = tasks.len(), "expected a single task");
                None
            }
        };

        let mut performed: BTreeSet<String> = self
            .performed_activities(&workflow_id)
            .await?
            .into_iter()
            .skip(pre)
            .collect();
        if let Some(outcome) = &outcome {
            performed.insert(outcome.task.clone());
        }
        Ok((performed, outcome))
    }

    fn apply_outcome(&self, user: &mut User, outcome: Option<&TaskOutcome>) {
        let Some(outcome) = outcome else { return };
        if let Some(enabled) = outcome.enabled {
            user.suspended = !enabled;
        }
        if outcome.generate_token {
            user.generate_token(self.config.token_ttl());
        }
    }

    /// Status is the key of the single active task.
    async fn update_status(&self, user: &mut User) -> Result<()> {
        let workflow_id = Self::workflow_id(user)?;
        let tasks = self.active_tasks(&workflow_id).await?;
        match tasks.as_slice() {
            [task] => user.status = Some(task.definition_key.clone()),
            _ => warn!(
                workflow_id = %workflow_id,
                count = tasks.len(),
                "could not update user status"
            ),
        }
        Ok(())
    }

    /// The single active task, when it carries a form.
    async fn form_task(&self, workflow_id: &str) -> Result<Option<TaskInfo>> {
        let mut tasks = self.active_tasks(workflow_id).await?;
        if tasks.len() != 1 {
            debug!(workflow_id, count = tasks.len(), "unexpected task number while checking form");
            return Ok(None);
        }
        Ok(Some(tasks.remove(0)).filter(TaskInfo::has_form))
    }

    async fn propagation_for(&self, user: &User, op: ResourceOperation) -> Result<Propagation> {
        let mut prop_by_res = PropagationByResource::new();
        prop_by_res.set(op, self.users.find_all_resource_keys(&user.key).await?);
        let mut prop_by_linked_account = PropagationByResource::new();
        prop_by_linked_account.add_all(op, user.linked_account_refs());
        Ok((prop_by_res, prop_by_linked_account))
    }

    /// Stash propagation and password until the pending form is submitted.
    /// The given propagation is emptied when stashed.
    async fn save_for_form_submit(
        &self,
        user: &User,
        password: Option<&str>,
        enabled: Option<bool>,
        prop_by_res: &mut PropagationByResource<String>,
        prop_by_linked_account: &mut PropagationByResource<LinkedAccountRef>,
    ) -> Result<()> {
        let workflow_id = Self::workflow_id(user)?;
        if self.form_task(&workflow_id).await?.is_none() {
            return Ok(());
        }

        let mut context = self.contexts.load(&workflow_id).await?;
        context.user_snapshot = Some(user.to_user_to());

        let previous_password = match &context.propagation {
            PropagationState::Pending(pending) => pending.encrypted_password.clone(),
            PropagationState::Idle => None,
        };
        let encrypted_password = match password {
            Some(password) => Some(self.cipher.encrypt(password)?),
            None => previous_password,
        };

        context.propagation = PropagationState::Pending(PendingPropagation {
            prop_by_res: prop_by_res.take(),
            prop_by_linked_account: prop_by_linked_account.take(),
            encrypted_password,
            enabled,
        });
        self.contexts.save(&context).await?;
        debug!(user = %user.key, workflow_id = %workflow_id, "propagation stashed for form submit");
        Ok(())
    }

    /// Keep whatever is pending stashed after a generic task.
    async fn restash_pending(&self, user: &User, workflow_id: &str) -> Result<()> {
        let mut context = self.contexts.load(workflow_id).await?;
        let Some(mut pending) = context.propagation.take() else {
            return Ok(());
        };
        self.contexts.save(&context).await?;

        let password = pending
            .encrypted_password
            .as_deref()
            .map(|e| self.cipher.decrypt(e))
            .transpose()?;
        self.save_for_form_submit(
            user,
            password.as_deref(),
            pending.enabled,
            &mut pending.prop_by_res,
            &mut pending.prop_by_linked_account,
        )
        .await
    }

    async fn remove_user(&self, user: &User, workflow_id: &str) -> Result<()> {
        self.users.delete(&user.key).await?;
        self.engine.delete_history(workflow_id).await.map_err(|e| {
            WorkflowError::from_engine(e, format!("While deleting history of {workflow_id}"))
        })?;
        self.contexts.remove(workflow_id).await?;
        Ok(())
    }
}
