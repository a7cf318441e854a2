//! In-memory store used when no database is configured, and by tests.

use crate::db::models::{
    Automate, Event, EventKind, LogEntry, NewAutomate, NewEvent, NewService, NewUser,
    NewWorkspace, Service, ServiceTokenMap, TokenBundle, User, Workspace,
};
use crate::db::store::{
    AutomateStore, EventStore, ServiceStore, StoreResult, UserStore, WorkspaceStore,
};
use crate::error::AppError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    workspaces: BTreeMap<i64, Workspace>,
    automates: BTreeMap<i64, Automate>,
    services: BTreeMap<i64, Service>,
    events: BTreeMap<i64, Event>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("memory store lock poisoned")))
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_by_login(&self, login: &str) -> StoreResult<Option<User>> {
        let tables = self.lock()?;
        let by_username = tables.users.values().find(|u| u.username == login);
        let user = by_username.or_else(|| tables.users.values().find(|u| u.email == login));
        Ok(user.cloned())
    }

    async fn exists(&self, username: &str, email: &str) -> StoreResult<bool> {
        Ok(self
            .lock()?
            .users
            .values()
            .any(|u| u.username == username || u.email == email))
    }

    async fn search(&self, input: &str) -> StoreResult<Vec<User>> {
        Ok(self
            .lock()?
            .users
            .values()
            .filter(|u| {
                contains_ignore_case(&u.username, input) || contains_ignore_case(&u.email, input)
            })
            .cloned()
            .collect())
    }

    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let mut tables = self.lock()?;
        if tables
            .users
            .values()
            .any(|u| u.username == new.username || u.email == new.email)
        {
            return Err(AppError::Conflict(
                "Username or email already registered".to_string(),
            ));
        }
        let user = User {
            id: tables.next_id(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            services: ServiceTokenMap::new(),
            friends: Vec::new(),
            account_type: new.account_type,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> StoreResult<Option<User>> {
        let mut tables = self.lock()?;
        Ok(tables.users.get_mut(&user.id).map(|existing| {
            existing.username = user.username.clone();
            existing.email = user.email.clone();
            existing.password_hash = user.password_hash.clone();
            existing.friends = user.friends.clone();
            existing.clone()
        }))
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        Ok(self.lock()?.users.remove(&id).is_some())
    }

    async fn set_service_tokens(
        &self,
        id: i64,
        service_name: &str,
        bundle: &TokenBundle,
    ) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        match tables.users.get_mut(&id) {
            Some(user) => {
                user.services
                    .insert(service_name.to_string(), bundle.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_service_tokens(&self, id: i64, service_name: &str) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        Ok(tables
            .users
            .get_mut(&id)
            .is_some_and(|user| user.services.remove(service_name).is_some()))
    }
}

#[async_trait]
impl WorkspaceStore for MemoryStore {
    async fn find(&self, id: i64) -> StoreResult<Option<Workspace>> {
        Ok(self.lock()?.workspaces.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Workspace>> {
        Ok(self
            .lock()?
            .workspaces
            .values()
            .filter(|w| w.owner_id == user_id || w.users_id.iter().any(|m| m.id == user_id))
            .cloned()
            .collect())
    }

    async fn search_public(&self, input: &str) -> StoreResult<Vec<Workspace>> {
        Ok(self
            .lock()?
            .workspaces
            .values()
            .filter(|w| !w.is_private && contains_ignore_case(&w.title, input))
            .cloned()
            .collect())
    }

    async fn create(&self, new: NewWorkspace) -> StoreResult<Workspace> {
        let mut tables = self.lock()?;
        let workspace = Workspace {
            id: tables.next_id(),
            title: new.title,
            description: new.description,
            is_private: new.is_private,
            owner_id: new.owner_id,
            users_id: new.users_id,
            variables: new.variables,
            views: 0,
            is_enabled: true,
        };
        tables.workspaces.insert(workspace.id, workspace.clone());
        Ok(workspace)
    }

    async fn update(&self, workspace: &Workspace) -> StoreResult<Option<Workspace>> {
        let mut tables = self.lock()?;
        Ok(tables.workspaces.get_mut(&workspace.id).map(|existing| {
            *existing = Workspace {
                owner_id: existing.owner_id,
                ..workspace.clone()
            };
            existing.clone()
        }))
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        let removed = tables.workspaces.remove(&id).is_some();
        if removed {
            tables.automates.retain(|_, a| a.workspace_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl AutomateStore for MemoryStore {
    async fn find(&self, id: i64) -> StoreResult<Option<Automate>> {
        Ok(self.lock()?.automates.get(&id).cloned())
    }

    async fn find_all(&self) -> StoreResult<Vec<Automate>> {
        Ok(self.lock()?.automates.values().cloned().collect())
    }

    async fn list_by_workspace(&self, workspace_id: i64) -> StoreResult<Vec<Automate>> {
        Ok(self
            .lock()?
            .automates
            .values()
            .filter(|a| a.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn search_public(&self, input: &str) -> StoreResult<Vec<Automate>> {
        Ok(self
            .lock()?
            .automates
            .values()
            .filter(|a| !a.is_private && contains_ignore_case(&a.title, input))
            .cloned()
            .collect())
    }

    async fn create(&self, new: NewAutomate) -> StoreResult<Automate> {
        let mut tables = self.lock()?;
        let automate = Automate {
            id: tables.next_id(),
            title: new.title,
            is_private: new.is_private,
            workspace_id: new.workspace_id,
            workflow: new.workflow,
            variables: new.variables,
            trigger: new.trigger,
            trigger_option: new.trigger_option,
            action: new.action,
            action_option: new.action_option,
            logs: Vec::new(),
            is_enabled: true,
            views: 0,
        };
        tables.automates.insert(automate.id, automate.clone());
        Ok(automate)
    }

    async fn update(&self, automate: &Automate) -> StoreResult<Option<Automate>> {
        let mut tables = self.lock()?;
        Ok(tables.automates.get_mut(&automate.id).map(|existing| {
            *existing = Automate {
                workspace_id: existing.workspace_id,
                logs: std::mem::take(&mut existing.logs),
                ..automate.clone()
            };
            existing.clone()
        }))
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        Ok(self.lock()?.automates.remove(&id).is_some())
    }

    async fn append_logs(&self, id: i64, entries: &[LogEntry]) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        match tables.automates.get_mut(&id) {
            Some(automate) => {
                automate.logs.extend_from_slice(entries);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_logs(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        match tables.automates.get_mut(&id) {
            Some(automate) => {
                automate.logs.clear();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ServiceStore for MemoryStore {
    async fn find(&self, id: i64) -> StoreResult<Option<Service>> {
        Ok(self.lock()?.services.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_id: i64) -> StoreResult<Vec<Service>> {
        Ok(self
            .lock()?
            .services
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn search_public(&self, input: &str) -> StoreResult<Vec<Service>> {
        Ok(self
            .lock()?
            .services
            .values()
            .filter(|s| !s.is_private && contains_ignore_case(&s.name, input))
            .cloned()
            .collect())
    }

    async fn create(&self, new: NewService) -> StoreResult<Service> {
        let mut tables = self.lock()?;
        let service = Service {
            id: tables.next_id(),
            name: new.name,
            client_id: new.client_id,
            client_secret: new.client_secret,
            scope: new.scope,
            auth_url: new.auth_url,
            token_url: new.token_url,
            owner_id: new.owner_id,
            users_id: Vec::new(),
            is_private: new.is_private,
        };
        tables.services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn update(&self, service: &Service) -> StoreResult<Option<Service>> {
        let mut tables = self.lock()?;
        Ok(tables.services.get_mut(&service.id).map(|existing| {
            *existing = Service {
                owner_id: existing.owner_id,
                ..service.clone()
            };
            existing.clone()
        }))
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        let removed = tables.services.remove(&id).is_some();
        if removed {
            tables.events.retain(|_, e| e.service_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn find(&self, id: i64) -> StoreResult<Option<Event>> {
        Ok(self.lock()?.events.get(&id).cloned())
    }

    async fn list_by_service(&self, service_id: i64, kind: EventKind) -> StoreResult<Vec<Event>> {
        Ok(self
            .lock()?
            .events
            .values()
            .filter(|e| e.service_id == service_id && e.kind == kind)
            .cloned()
            .collect())
    }

    async fn create(&self, new: NewEvent) -> StoreResult<Event> {
        let mut tables = self.lock()?;
        let event = Event {
            id: tables.next_id(),
            name: new.name,
            service_id: new.service_id,
            workflow: new.workflow,
            kind: new.kind,
        };
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn update(&self, event: &Event) -> StoreResult<Option<Event>> {
        let mut tables = self.lock()?;
        Ok(tables.events.get_mut(&event.id).map(|existing| {
            existing.name = event.name.clone();
            existing.workflow = event.workflow.clone();
            existing.clone()
        }))
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        Ok(self.lock()?.events.remove(&id).is_some())
    }
}
