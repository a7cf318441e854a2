use crate::db::models::{
    Automate, Event, EventKind, LogEntry, NewAutomate, NewEvent, NewService, NewUser,
    NewWorkspace, Service, TokenBundle, User, Workspace,
};
use crate::db::store::{
    AutomateStore, EventStore, ServiceStore, StoreResult, UserStore, WorkspaceStore,
};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

/// PostgreSQL-backed implementation of every store trait
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgRepository {
    async fn find(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_login(&self, login: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE username = $1 OR email = $1
            ORDER BY (username = $1) DESC
            LIMIT 1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn exists(&self, username: &str, email: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn search(&self, input: &str) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE username ILIKE '%' || $1 || '%' OR email ILIKE '%' || $1 || '%'
            ORDER BY id
            "#,
        )
        .bind(input)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, account_type)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.account_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update(&self, user: &User) -> StoreResult<Option<User>> {
        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET
                username = $2,
                email = $3,
                password_hash = $4,
                friends = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.friends)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_service_tokens(
        &self,
        id: i64,
        service_name: &str,
        bundle: &TokenBundle,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET services = services || jsonb_build_object($2::text, $3::jsonb)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(service_name)
        .bind(Json(bundle))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_service_tokens(&self, id: i64, service_name: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET services = services - $2::text
            WHERE id = $1 AND services ? $2::text
            "#,
        )
        .bind(id)
        .bind(service_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl WorkspaceStore for PgRepository {
    async fn find(&self, id: i64) -> StoreResult<Option<Workspace>> {
        let workspace = sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(workspace)
    }

    async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Workspace>> {
        let workspaces = sqlx::query_as::<_, Workspace>(
            r#"
            SELECT * FROM workspaces
            WHERE owner_id = $1
                OR users_id @> jsonb_build_array(jsonb_build_object('id', $1::bigint))
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(workspaces)
    }

    async fn search_public(&self, input: &str) -> StoreResult<Vec<Workspace>> {
        let workspaces = sqlx::query_as::<_, Workspace>(
            r#"
            SELECT * FROM workspaces
            WHERE is_private = FALSE AND title ILIKE '%' || $1 || '%'
            ORDER BY views DESC, id
            "#,
        )
        .bind(input)
        .fetch_all(&self.pool)
        .await?;
        Ok(workspaces)
    }

    async fn create(&self, new: NewWorkspace) -> StoreResult<Workspace> {
        let workspace = sqlx::query_as::<_, Workspace>(
            r#"
            INSERT INTO workspaces (title, description, is_private, owner_id, users_id, variables)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.is_private)
        .bind(new.owner_id)
        .bind(Json(&new.users_id))
        .bind(Json(&new.variables))
        .fetch_one(&self.pool)
        .await?;
        Ok(workspace)
    }

    async fn update(&self, workspace: &Workspace) -> StoreResult<Option<Workspace>> {
        let updated = sqlx::query_as::<_, Workspace>(
            r#"
            UPDATE workspaces
            SET
                title = $2,
                description = $3,
                is_private = $4,
                users_id = $5,
                variables = $6,
                views = $7,
                is_enabled = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(workspace.id)
        .bind(&workspace.title)
        .bind(&workspace.description)
        .bind(workspace.is_private)
        .bind(Json(&workspace.users_id))
        .bind(Json(&workspace.variables))
        .bind(workspace.views)
        .bind(workspace.is_enabled)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AutomateStore for PgRepository {
    async fn find(&self, id: i64) -> StoreResult<Option<Automate>> {
        let automate = sqlx::query_as::<_, Automate>("SELECT * FROM automates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(automate)
    }

    async fn find_all(&self) -> StoreResult<Vec<Automate>> {
        let automates = sqlx::query_as::<_, Automate>("SELECT * FROM automates ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(automates)
    }

    async fn list_by_workspace(&self, workspace_id: i64) -> StoreResult<Vec<Automate>> {
        let automates = sqlx::query_as::<_, Automate>(
            "SELECT * FROM automates WHERE workspace_id = $1 ORDER BY id",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(automates)
    }

    async fn search_public(&self, input: &str) -> StoreResult<Vec<Automate>> {
        let automates = sqlx::query_as::<_, Automate>(
            r#"
            SELECT * FROM automates
            WHERE is_private = FALSE AND title ILIKE '%' || $1 || '%'
            ORDER BY views DESC, id
            "#,
        )
        .bind(input)
        .fetch_all(&self.pool)
        .await?;
        Ok(automates)
    }

    async fn create(&self, new: NewAutomate) -> StoreResult<Automate> {
        let automate = sqlx::query_as::<_, Automate>(
            r#"
            INSERT INTO automates (
                title,
                is_private,
                workspace_id,
                workflow,
                variables,
                trigger,
                trigger_option,
                action,
                action_option
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(new.is_private)
        .bind(new.workspace_id)
        .bind(Json(&new.workflow))
        .bind(Json(&new.variables))
        .bind(new.trigger)
        .bind(&new.trigger_option)
        .bind(new.action)
        .bind(&new.action_option)
        .fetch_one(&self.pool)
        .await?;
        Ok(automate)
    }

    async fn update(&self, automate: &Automate) -> StoreResult<Option<Automate>> {
        let updated = sqlx::query_as::<_, Automate>(
            r#"
            UPDATE automates
            SET
                title = $2,
                is_private = $3,
                workflow = $4,
                variables = $5,
                trigger = $6,
                trigger_option = $7,
                action = $8,
                action_option = $9,
                is_enabled = $10,
                views = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(automate.id)
        .bind(&automate.title)
        .bind(automate.is_private)
        .bind(Json(&automate.workflow))
        .bind(Json(&automate.variables))
        .bind(automate.trigger)
        .bind(&automate.trigger_option)
        .bind(automate.action)
        .bind(&automate.action_option)
        .bind(automate.is_enabled)
        .bind(automate.views)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM automates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_logs(&self, id: i64, entries: &[LogEntry]) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE automates SET logs = logs || $2::jsonb WHERE id = $1")
            .bind(id)
            .bind(Json(entries))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_logs(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE automates SET logs = '[]'::jsonb WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ServiceStore for PgRepository {
    async fn find(&self, id: i64) -> StoreResult<Option<Service>> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(service)
    }

    async fn list_by_owner(&self, owner_id: i64) -> StoreResult<Vec<Service>> {
        let services =
            sqlx::query_as::<_, Service>("SELECT * FROM services WHERE owner_id = $1 ORDER BY id")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(services)
    }

    async fn search_public(&self, input: &str) -> StoreResult<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>(
            r#"
            SELECT * FROM services
            WHERE is_private = FALSE AND name ILIKE '%' || $1 || '%'
            ORDER BY id
            "#,
        )
        .bind(input)
        .fetch_all(&self.pool)
        .await?;
        Ok(services)
    }

    async fn create(&self, new: NewService) -> StoreResult<Service> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (
                name,
                client_id,
                client_secret,
                scope,
                auth_url,
                token_url,
                owner_id,
                is_private
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&new.name)
        .bind(&new.client_id)
        .bind(&new.client_secret)
        .bind(&new.scope)
        .bind(&new.auth_url)
        .bind(&new.token_url)
        .bind(new.owner_id)
        .bind(new.is_private)
        .fetch_one(&self.pool)
        .await?;
        Ok(service)
    }

    async fn update(&self, service: &Service) -> StoreResult<Option<Service>> {
        let updated = sqlx::query_as::<_, Service>(
            r#"
            UPDATE services
            SET
                name = $2,
                client_id = $3,
                client_secret = $4,
                scope = $5,
                auth_url = $6,
                token_url = $7,
                users_id = $8,
                is_private = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(service.id)
        .bind(&service.name)
        .bind(&service.client_id)
        .bind(&service.client_secret)
        .bind(&service.scope)
        .bind(&service.auth_url)
        .bind(&service.token_url)
        .bind(&service.users_id)
        .bind(service.is_private)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EventStore for PgRepository {
    async fn find(&self, id: i64) -> StoreResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn list_by_service(&self, service_id: i64, kind: EventKind) -> StoreResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE service_id = $1 AND type = $2 ORDER BY id",
        )
        .bind(service_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn create(&self, new: NewEvent) -> StoreResult<Event> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (name, service_id, workflow, type)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&new.name)
        .bind(new.service_id)
        .bind(Json(&new.workflow))
        .bind(new.kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(event)
    }

    async fn update(&self, event: &Event) -> StoreResult<Option<Event>> {
        let updated = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET name = $2, workflow = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(event.id)
        .bind(&event.name)
        .bind(Json(&event.workflow))
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
