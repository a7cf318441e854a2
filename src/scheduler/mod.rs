//! Fixed-interval automation runner.
//!
//! Each tick walks every automate, evaluates its trigger for every user of
//! the owning workspace, runs the paired action when it fires, and appends
//! one batch of log entries per automate.

pub mod registry;

use crate::db::Stores;
use crate::db::models::{Automate, LogEntry, User};
use crate::error::AppError;
use futures::FutureExt;
use registry::{Action, Registry, Trigger};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct Scheduler {
    stores: Stores,
    registry: Arc<Registry>,
    interval: Duration,
}

/// Counters for one tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub automates: usize,
    pub skipped: usize,
    pub entries: usize,
}

/// Running scheduler loop
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel the loop and wait for it; an in-flight tick runs to completion
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
    }
}

impl Scheduler {
    pub fn new(stores: Stores, registry: Arc<Registry>, interval: Duration) -> Self {
        Self {
            stores,
            registry,
            interval,
        }
    }

    /// Spawn the polling loop.
    ///
    /// The next tick starts `interval` after the previous one completed. A
    /// panicking integration only fails the user it ran for; anything else
    /// that panics takes down the current tick and the loop carries on.
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let scheduler = Arc::new(self);
        let interval = scheduler.interval;

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                info!(interval = ?interval, "Automation scheduler started");
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("Automation scheduler stopped");
                            break;
                        }
                        _ = tokio::time::sleep(interval) => {
                            let scheduler = Arc::clone(&scheduler);
                            match tokio::spawn(async move { scheduler.tick().await }).await {
                                Ok(Ok(summary)) => debug!(
                                    automates = summary.automates,
                                    skipped = summary.skipped,
                                    entries = summary.entries,
                                    "Scheduler tick finished"
                                ),
                                Ok(Err(e)) => error!(error = %e, "Scheduler tick failed"),
                                Err(e) => error!(error = %e, "Scheduler tick panicked"),
                            }
                        }
                    }
                }
            })
        };

        SchedulerHandle { cancel, task }
    }

    /// Run every eligible automate once
    ///
    /// # Errors
    /// Only when the automate list itself cannot be loaded; failures scoped
    /// to one automate are logged and skipped.
    pub async fn tick(&self) -> Result<TickSummary, AppError> {
        let automates = self.stores.automates.find_all().await?;
        let mut summary = TickSummary {
            automates: automates.len(),
            ..TickSummary::default()
        };

        for automate in &automates {
            let (Some(trigger), Some(action)) = (
                self.registry.trigger(automate.trigger),
                self.registry.action(automate.action),
            ) else {
                summary.skipped += 1;
                continue;
            };

            if !automate.is_enabled {
                summary.skipped += 1;
                continue;
            }

            let entries = match self.run_automate(automate, &**trigger, &**action).await {
                Ok(Some(entries)) => entries,
                Ok(None) => {
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(automate_id = automate.id, error = %e, "Failed to run automate");
                    continue;
                }
            };

            if entries.is_empty() {
                continue;
            }

            match self.stores.automates.append_logs(automate.id, &entries).await {
                Ok(true) => summary.entries += entries.len(),
                // Deleted while the tick was running
                Ok(false) => debug!(automate_id = automate.id, "Automate vanished before logging"),
                Err(e) => error!(automate_id = automate.id, error = %e, "Failed to append logs"),
            }
        }

        Ok(summary)
    }

    /// Evaluate one automate for every workspace user. `None` when the
    /// workspace is gone.
    async fn run_automate(
        &self,
        automate: &Automate,
        trigger: &dyn Trigger,
        action: &dyn Action,
    ) -> Result<Option<Vec<LogEntry>>, AppError> {
        let Some(workspace) = self.stores.workspaces.find(automate.workspace_id).await? else {
            debug!(
                automate_id = automate.id,
                workspace_id = automate.workspace_id,
                "Workspace missing, skipping automate"
            );
            return Ok(None);
        };

        let mut entries = Vec::new();
        for user_id in workspace.participant_ids() {
            let user = match self.stores.users.find(user_id).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    warn!(automate_id = automate.id, user_id, "Workspace user not found");
                    entries.push(LogEntry::warning(format!("User {} not found", user_id)));
                    continue;
                }
                Err(e) => {
                    entries.push(LogEntry::error(format!(
                        "Failed to load user {}: {}",
                        user_id, e
                    )));
                    continue;
                }
            };

            if user.services.is_empty() {
                entries.push(LogEntry::error(format!(
                    "User {} has no connected services",
                    user.username
                )));
                continue;
            }

            let outcome = AssertUnwindSafe(run_for_user(automate, trigger, action, &user))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(Some(message))) => entries.push(LogEntry::success(message)),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(
                        automate_id = automate.id,
                        user_id,
                        error = %e,
                        "Automation failed for user"
                    );
                    entries.push(LogEntry::error(format!("{}: {}", user.username, e)));
                }
                Err(panic) => {
                    let reason = panic_reason(panic.as_ref());
                    error!(
                        automate_id = automate.id,
                        user_id,
                        reason,
                        "Automation panicked for user"
                    );
                    entries.push(LogEntry::error(format!(
                        "{}: integration panicked: {}",
                        user.username, reason
                    )));
                }
            }
        }

        Ok(Some(entries))
    }
}

/// `Some(message)` when the trigger fired and the action succeeded
async fn run_for_user(
    automate: &Automate,
    trigger: &dyn Trigger,
    action: &dyn Action,
    user: &User,
) -> Result<Option<String>, AppError> {
    if !trigger
        .check(&automate.trigger_option, &user.services, user)
        .await?
    {
        return Ok(None);
    }

    action
        .run(&automate.action_option, &user.services, user)
        .await
        .map(Some)
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        AccountType, LogKind, Member, NewAutomate, NewUser, NewWorkspace, TokenBundle,
    };
    use crate::db::models::Workspace;
    use crate::db::store::{StoreResult, WorkspaceStore};
    use async_trait::async_trait;
    use registry::tests::{EchoAction, FnTrigger};
    use serde_json::json;

    async fn user(stores: &Stores, name: &str, connected: bool) -> i64 {
        let user = stores
            .users
            .create(NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password_hash: None,
                account_type: AccountType::Default,
            })
            .await
            .unwrap();

        if connected {
            let bundle = TokenBundle {
                access_token: "at".to_string(),
                refresh_token: Some("rt".to_string()),
                expires_at: None,
                service_id: None,
            };
            stores
                .users
                .set_service_tokens(user.id, "spotify", &bundle)
                .await
                .unwrap();
        }

        user.id
    }

    async fn automate(stores: &Stores, owner_id: i64, members: Vec<Member>, trigger: i32) -> i64 {
        let workspace = stores
            .workspaces
            .create(NewWorkspace {
                title: "W".to_string(),
                description: String::new(),
                is_private: true,
                owner_id,
                users_id: members,
                variables: json!({}),
            })
            .await
            .unwrap();

        stores
            .automates
            .create(NewAutomate {
                title: "A".to_string(),
                is_private: true,
                workspace_id: workspace.id,
                workflow: json!({}),
                variables: json!({}),
                trigger,
                trigger_option: String::new(),
                action: 0,
                action_option: "ping".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    async fn logs(stores: &Stores, automate_id: i64) -> Vec<LogEntry> {
        stores
            .automates
            .find(automate_id)
            .await
            .unwrap()
            .unwrap()
            .logs
    }

    fn always() -> Arc<Registry> {
        Arc::new(
            Registry::new()
                .with_trigger(FnTrigger(|_| Ok(true)))
                .with_action(EchoAction),
        )
    }

    fn scheduler(stores: &Stores, registry: Arc<Registry>) -> Scheduler {
        Scheduler::new(stores.clone(), registry, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_one_user_failure_does_not_affect_another() {
        let stores = Stores::memory();
        let a = user(&stores, "alice", false).await;
        let b = user(&stores, "bob", true).await;
        let id = automate(&stores, a, vec![Member { id: b, permission: 1 }], 0).await;

        let summary = scheduler(&stores, always()).tick().await.unwrap();
        assert_eq!(summary.entries, 2);

        let logs = logs(&stores, id).await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].kind, LogKind::Error);
        assert!(logs[0].message.contains("alice"));
        assert_eq!(logs[1].kind, LogKind::Success);
        assert_eq!(logs[1].message, format!("ping for user {}", b));
    }

    #[tokio::test]
    async fn test_missing_user_is_a_warning() {
        let stores = Stores::memory();
        let owner = user(&stores, "alice", true).await;
        let id = automate(&stores, owner, vec![Member { id: 999, permission: 0 }], 0).await;

        scheduler(&stores, always()).tick().await.unwrap();

        let logs = logs(&stores, id).await;
        let kinds: Vec<LogKind> = logs.iter().map(|l| l.kind).collect();
        assert_eq!(kinds, vec![LogKind::Success, LogKind::Warning]);
        assert_eq!(logs[1].message, "User 999 not found");
    }

    #[tokio::test]
    async fn test_false_trigger_appends_nothing() {
        let stores = Stores::memory();
        let owner = user(&stores, "alice", true).await;
        let member = user(&stores, "bob", true).await;
        let id = automate(&stores, owner, vec![Member { id: member, permission: 1 }], 0).await;

        let registry = Arc::new(
            Registry::new()
                .with_trigger(FnTrigger(move |user_id| Ok(user_id != member)))
                .with_action(EchoAction),
        );
        scheduler(&stores, registry).tick().await.unwrap();

        let logs = logs(&stores, id).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, format!("ping for user {}", owner));
    }

    #[tokio::test]
    async fn test_trigger_error_becomes_error_entry() {
        let stores = Stores::memory();
        let owner = user(&stores, "alice", true).await;
        let id = automate(&stores, owner, vec![], 0).await;

        let registry = Arc::new(
            Registry::new()
                .with_trigger(FnTrigger(|_| Err(AppError::ProviderApi("boom".to_string()))))
                .with_action(EchoAction),
        );
        scheduler(&stores, registry).tick().await.unwrap();

        let logs = logs(&stores, id).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].kind, LogKind::Error);
        assert!(logs[0].message.contains("boom"));
    }

    #[tokio::test]
    async fn test_out_of_range_and_disabled_are_skipped() {
        let stores = Stores::memory();
        let owner = user(&stores, "alice", true).await;
        let unset = automate(&stores, owner, vec![], -1).await;
        let beyond = automate(&stores, owner, vec![], 7).await;
        let disabled = automate(&stores, owner, vec![], 0).await;

        let mut record = stores.automates.find(disabled).await.unwrap().unwrap();
        record.is_enabled = false;
        stores.automates.update(&record).await.unwrap();

        let summary = scheduler(&stores, always()).tick().await.unwrap();
        assert_eq!(summary.automates, 3);
        assert_eq!(summary.skipped, 3);

        for id in [unset, beyond, disabled] {
            assert!(logs(&stores, id).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let stores = Stores::memory();
        let owner = user(&stores, "alice", true).await;
        let id = automate(&stores, owner, vec![], 0).await;

        let handle = scheduler(&stores, always()).start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        let after_stop = logs(&stores, id).await.len();
        assert!(after_stop >= 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(logs(&stores, id).await.len(), after_stop);
    }

    #[tokio::test]
    async fn test_builtin_not_playing_skips_busy_member() {
        use crate::spotify::tests::{fixture, tokens};

        let fx = fixture(Some(true)).await;
        let stores = fx.stores.clone();
        let owner = user(&stores, "alice", false).await;
        let member = user(&stores, "bob", false).await;
        for (name, bundle) in tokens(fx.service_id, "refresh-1") {
            stores.users.set_service_tokens(member, &name, &bundle).await.unwrap();
        }
        let id = automate(&stores, owner, vec![Member { id: member, permission: 1 }], 0).await;

        let registry = Arc::new(Registry::builtin(fx.spotify.clone()));
        scheduler(&stores, registry).tick().await.unwrap();

        // Owner has nothing connected; the member is already listening
        let logs = logs(&stores, id).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].kind, LogKind::Error);
        assert!(fx.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_integration_is_contained_to_one_user() {
        let stores = Stores::memory();
        let a = user(&stores, "alice", true).await;
        let b = user(&stores, "bob", true).await;
        let first = automate(&stores, a, vec![Member { id: b, permission: 1 }], 0).await;
        let second = automate(&stores, b, vec![], 0).await;

        let registry = Arc::new(
            Registry::new()
                .with_trigger(FnTrigger(move |user_id: i64| -> Result<bool, AppError> {
                    if user_id == a {
                        panic!("player exploded");
                    }
                    Ok(true)
                }))
                .with_action(EchoAction),
        );
        let summary = scheduler(&stores, registry).tick().await.unwrap();
        assert_eq!(summary.entries, 3);

        let logs_first = logs(&stores, first).await;
        assert_eq!(logs_first.len(), 2);
        assert_eq!(logs_first[0].kind, LogKind::Error);
        assert_eq!(logs_first[0].message, "alice: integration panicked: player exploded");
        assert_eq!(logs_first[1].message, format!("ping for user {}", b));

        let logs_second = logs(&stores, second).await;
        assert_eq!(logs_second.len(), 1);
        assert_eq!(logs_second[0].kind, LogKind::Success);
    }

    /// Workspace store that has lost every record
    struct NoWorkspaces;

    #[async_trait]
    impl WorkspaceStore for NoWorkspaces {
        async fn find(&self, _id: i64) -> StoreResult<Option<Workspace>> {
            Ok(None)
        }

        async fn list_for_user(&self, _user_id: i64) -> StoreResult<Vec<Workspace>> {
            Ok(vec![])
        }

        async fn search_public(&self, _input: &str) -> StoreResult<Vec<Workspace>> {
            Ok(vec![])
        }

        async fn create(&self, _new: NewWorkspace) -> StoreResult<Workspace> {
            Err(AppError::NotFound("Workspace"))
        }

        async fn update(&self, _workspace: &Workspace) -> StoreResult<Option<Workspace>> {
            Ok(None)
        }

        async fn delete(&self, _id: i64) -> StoreResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_missing_workspace_is_skipped_silently() {
        let stores = Stores::memory();
        let owner = user(&stores, "alice", true).await;
        let id = automate(&stores, owner, vec![], 0).await;

        let orphaned = Stores {
            workspaces: Arc::new(NoWorkspaces),
            ..stores.clone()
        };
        let summary = scheduler(&orphaned, always()).tick().await.unwrap();

        assert_eq!(summary.automates, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.entries, 0);
        assert!(logs(&stores, id).await.is_empty());
    }
}
