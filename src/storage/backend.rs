//! Store Contract
//!
//! One trait over every entity operation, implemented by the in-memory store,
//! the SQLite store and the resilient router. "Not found" is a normal
//! `None` / `false` / empty result; errors are reserved for failures.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::models::{
    NewProject, NewUser, Notification, Project, ProjectFile, ProjectFilter, ProjectPatch, User,
    WorkflowRun,
};
use crate::types::StoreResult;

#[async_trait]
pub trait EntityStore: Send + Sync {
    // Users
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    /// Fails with `Conflict` when the username is taken
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    // Projects
    async fn create_project(&self, project: NewProject) -> StoreResult<Project>;
    /// Newest first
    async fn list_projects(&self, filter: &ProjectFilter) -> StoreResult<Vec<Project>>;
    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>>;
    async fn update_project(&self, id: &str, patch: ProjectPatch) -> StoreResult<Option<Project>>;
    /// Also removes the project's files
    async fn delete_project(&self, id: &str) -> StoreResult<bool>;

    // Project files
    /// Upsert by (project, path); fails with `NotFound` for an unknown project
    async fn save_project_file(
        &self,
        project_id: &str,
        path: &str,
        content: &str,
        metadata: Value,
    ) -> StoreResult<ProjectFile>;
    /// Ordered by path
    async fn list_project_files(&self, project_id: &str) -> StoreResult<Vec<ProjectFile>>;
    async fn get_project_file(&self, project_id: &str, path: &str)
    -> StoreResult<Option<ProjectFile>>;
    async fn delete_project_file(&self, project_id: &str, path: &str) -> StoreResult<bool>;

    // Notifications
    /// `user_id = None` creates a broadcast
    async fn create_notification(
        &self,
        user_id: Option<&str>,
        kind: &str,
        payload: Value,
    ) -> StoreResult<Notification>;
    /// The user's notifications plus broadcasts, newest first
    async fn get_notifications_for_user(&self, user_id: &str) -> StoreResult<Vec<Notification>>;

    // CI history
    /// Upsert by run id within (owner, repo); returns the number of runs written
    async fn save_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        runs: &[WorkflowRun],
    ) -> StoreResult<usize>;
    /// Newest first, at most `limit`
    async fn get_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> StoreResult<Vec<WorkflowRun>>;
}

/// A store that may be unreachable and can be probed for liveness
#[async_trait]
pub trait DurableBackend: EntityStore {
    /// Trivial round-trip; any error means unreachable
    async fn probe(&self) -> StoreResult<()>;

    fn name(&self) -> &str;
}

pub type SharedDurable = Arc<dyn DurableBackend>;
