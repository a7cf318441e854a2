//! Narrow CRUD contracts over the persisted entities.
//!
//! Handlers and the scheduler only see these traits; `postgres` and `memory`
//! provide the implementations.

use crate::db::models::{
    Automate, Event, EventKind, LogEntry, NewAutomate, NewEvent, NewService, NewUser,
    NewWorkspace, Service, TokenBundle, User, Workspace,
};
use crate::error::AppError;
use async_trait::async_trait;

pub type StoreResult<T> = Result<T, AppError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, id: i64) -> StoreResult<Option<User>>;

    /// Look up by username first, then by email
    async fn find_by_login(&self, login: &str) -> StoreResult<Option<User>>;

    async fn exists(&self, username: &str, email: &str) -> StoreResult<bool>;

    async fn search(&self, input: &str) -> StoreResult<Vec<User>>;

    async fn create(&self, new: NewUser) -> StoreResult<User>;

    /// Writes username, email, password hash and friends
    async fn update(&self, user: &User) -> StoreResult<Option<User>>;

    async fn delete(&self, id: i64) -> StoreResult<bool>;

    /// Insert or replace one entry of the user's connected-service map
    async fn set_service_tokens(
        &self,
        id: i64,
        service_name: &str,
        bundle: &TokenBundle,
    ) -> StoreResult<bool>;

    async fn remove_service_tokens(&self, id: i64, service_name: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn find(&self, id: i64) -> StoreResult<Option<Workspace>>;

    /// Workspaces the user owns or is a member of
    async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Workspace>>;

    async fn search_public(&self, input: &str) -> StoreResult<Vec<Workspace>>;

    async fn create(&self, new: NewWorkspace) -> StoreResult<Workspace>;

    /// Writes every mutable column; `owner_id` is never written
    async fn update(&self, workspace: &Workspace) -> StoreResult<Option<Workspace>>;

    async fn delete(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait AutomateStore: Send + Sync {
    async fn find(&self, id: i64) -> StoreResult<Option<Automate>>;

    async fn find_all(&self) -> StoreResult<Vec<Automate>>;

    async fn list_by_workspace(&self, workspace_id: i64) -> StoreResult<Vec<Automate>>;

    async fn search_public(&self, input: &str) -> StoreResult<Vec<Automate>>;

    async fn create(&self, new: NewAutomate) -> StoreResult<Automate>;

    /// Writes every mutable column; `workspace_id` and `logs` are never written
    async fn update(&self, automate: &Automate) -> StoreResult<Option<Automate>>;

    async fn delete(&self, id: i64) -> StoreResult<bool>;

    /// Atomic append; concurrent appends and clears never lose entries
    async fn append_logs(&self, id: i64, entries: &[LogEntry]) -> StoreResult<bool>;

    async fn clear_logs(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn find(&self, id: i64) -> StoreResult<Option<Service>>;

    async fn list_by_owner(&self, owner_id: i64) -> StoreResult<Vec<Service>>;

    async fn search_public(&self, input: &str) -> StoreResult<Vec<Service>>;

    async fn create(&self, new: NewService) -> StoreResult<Service>;

    /// Writes every mutable column; `owner_id` is never written
    async fn update(&self, service: &Service) -> StoreResult<Option<Service>>;

    async fn delete(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn find(&self, id: i64) -> StoreResult<Option<Event>>;

    async fn list_by_service(&self, service_id: i64, kind: EventKind) -> StoreResult<Vec<Event>>;

    async fn create(&self, new: NewEvent) -> StoreResult<Event>;

    /// Writes name and workflow
    async fn update(&self, event: &Event) -> StoreResult<Option<Event>>;

    async fn delete(&self, id: i64) -> StoreResult<bool>;
}
