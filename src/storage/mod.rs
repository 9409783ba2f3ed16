pub mod backend;
pub mod database;
pub mod memory;
pub mod models;
pub mod resilient;

pub use backend::{DurableBackend, EntityStore, SharedDurable};
pub use database::{PoolConfig, SqliteStore};
pub use memory::MemoryStore;
pub use models::{
    NewProject, NewUser, Notification, Project, ProjectFile, ProjectFilter, ProjectPatch, User,
    WorkflowRun,
};
pub use resilient::{HealthState, ResilientStore, StoreHealth};
