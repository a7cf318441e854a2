pub mod memory;
pub mod models;
pub mod repository;
pub mod store;

use memory::MemoryStore;
use repository::PgRepository;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use store::{AutomateStore, EventStore, ServiceStore, UserStore, WorkspaceStore};

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    tracing::info!("Initializing database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Database connection pool initialized successfully");

    Ok(pool)
}

/// One handle per entity store, shared by handlers and the scheduler
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub workspaces: Arc<dyn WorkspaceStore>,
    pub automates: Arc<dyn AutomateStore>,
    pub services: Arc<dyn ServiceStore>,
    pub events: Arc<dyn EventStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        let repo = Arc::new(PgRepository::new(pool));
        Self {
            users: repo.clone(),
            workspaces: repo.clone(),
            automates: repo.clone(),
            services: repo.clone(),
            events: repo,
        }
    }

    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            workspaces: store.clone(),
            automates: store.clone(),
            services: store.clone(),
            events: store,
        }
    }
}
