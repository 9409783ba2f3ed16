//! Resilient Store Router
//!
//! Serves every entity operation from the durable backend while it is
//! healthy and from the in-memory store otherwise.
//!
//! ## Routing
//!
//! 1. Records written to memory during an outage stay in memory
//! 2. Health is probed once, before the first durable call; concurrent first
//!    callers share that single probe
//! 3. `Unreachable`: memory only, the durable backend is never touched again
//! 4. `Healthy`: durable call; a connectivity error serves this call from
//!    memory without changing health. Reads also fall back on the operation
//!    timeout. Writes are awaited to completion and rely on the backend's own
//!    lock and connection timeouts, so a dispatched write never lands in both
//!    stores
//!
//! Collection reads served by the durable backend are overlaid with the
//! records memory holds from an outage. Business errors (conflict, not
//! found, invalid input) are returned as-is and never cause a fallback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::backend::{DurableBackend, EntityStore, SharedDurable};
use super::database::{PoolConfig, SqliteStore};
use super::memory::MemoryStore;
use super::models::{
    NewProject, NewUser, Notification, Project, ProjectFile, ProjectFilter, ProjectPatch, User,
    WorkflowRun, sort_runs,
};
use crate::config::Config;
use crate::timeout::{TimeoutConfig, with_store_timeout};
use crate::types::{StoreError, StoreResult};

type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

fn boxed<'a, T, F>(future: F) -> StoreFuture<'a, T>
where
    F: Future<Output = StoreResult<T>> + Send + 'a,
{
    Box::pin(future)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Healthy,
    Unreachable,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Unknown => write!(f, "unknown"),
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Cached durable backend health, resolved at most once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreHealth {
    pub state: HealthState,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl StoreHealth {
    fn unknown() -> Self {
        Self {
            state: HealthState::Unknown,
            last_checked_at: None,
        }
    }

    fn checked(state: HealthState) -> Self {
        Self {
            state,
            last_checked_at: Some(Utc::now()),
        }
    }
}

// =============================================================================
// Routing Keys
// =============================================================================

/// Single record owned by memory once written there during an outage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RecordKey {
    User(String),
    Username(String),
    Project(String),
    ProjectFile(String, String),
    Run(String, String, i64),
}

impl RecordKey {
    fn project(project: &Project) -> Self {
        Self::Project(project.id.clone())
    }

    fn file(file: &ProjectFile) -> Self {
        Self::ProjectFile(file.project_id.clone(), file.path.clone())
    }

    fn run(owner: &str, repo: &str, run: &WorkflowRun) -> Self {
        Self::Run(owner.to_string(), repo.to_string(), run.run_id)
    }
}

/// Which store served a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Durable,
    /// Health is not `Healthy`
    Memory,
    /// Durable call failed on connectivity
    Fallback,
    /// A key was already pinned to memory
    Pinned,
}

impl Route {
    fn wrote_outage_copy(self) -> bool {
        matches!(self, Route::Fallback | Route::Pinned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// A mutation memory cannot apply because only the durable store has the record
fn held_durably(entity: &str, key: &str) -> StoreError {
    StoreError::Unreachable(format!(
        "{} '{}' is held by the durable store, which is unreachable",
        entity, key
    ))
}

// =============================================================================
// Resilient Store
// =============================================================================

pub struct ResilientStore {
    durable: Option<SharedDurable>,
    memory: MemoryStore,
    health: OnceCell<StoreHealth>,
    pins: DashSet<RecordKey>,
    probe_timeout: Duration,
    operation_timeout: Duration,
}

impl std::fmt::Debug for ResilientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientStore")
            .field("durable", &self.durable.as_ref().map(|d| d.name().to_string()))
            .field("health", &self.health())
            .field("pinned_keys", &self.pins.len())
            .finish()
    }
}

impl ResilientStore {
    /// Router over an optional durable backend
    ///
    /// Without a durable backend, health is `Unreachable` from the start and
    /// no probe ever runs. `timeouts.store_operation` bounds reads only; the
    /// backend must fail its own writes within it.
    pub fn new(durable: Option<SharedDurable>, timeouts: &TimeoutConfig) -> Self {
        let health = match durable {
            Some(_) => OnceCell::new(),
            None => OnceCell::new_with(Some(StoreHealth::checked(HealthState::Unreachable))),
        };

        Self {
            durable,
            memory: MemoryStore::new(),
            health,
            pins: DashSet::new(),
            probe_timeout: timeouts.probe,
            operation_timeout: timeouts.store_operation,
        }
    }

    pub fn memory_only() -> Self {
        Self::new(None, &TimeoutConfig::default())
    }

    /// SQLite-backed router when `storage.database_url` is set, memory only otherwise
    pub fn from_config(config: &Config) -> StoreResult<Self> {
        let storage = &config.storage;
        let durable: Option<SharedDurable> = match &storage.database_url {
            Some(url) => {
                let pool = PoolConfig {
                    max_size: storage.pool_size,
                    connection_timeout: Duration::from_secs(storage.connection_timeout_secs),
                    busy_timeout: Duration::from_millis(storage.busy_timeout_ms),
                };
                Some(Arc::new(SqliteStore::from_url(url, pool)?))
            }
            None => {
                info!("No database_url configured, using in-memory store");
                None
            }
        };

        Ok(Self::new(durable, &config.timeouts()))
    }

    /// Cached health snapshot; never probes
    pub fn health(&self) -> StoreHealth {
        self.health.get().copied().unwrap_or_else(StoreHealth::unknown)
    }

    /// Resolve health now, probing if it is still unknown
    pub async fn check_health(&self) -> StoreHealth {
        match &self.durable {
            Some(durable) => *self.health.get_or_init(|| self.run_probe(durable)).await,
            None => self.health(),
        }
    }

    pub fn pinned_keys(&self) -> usize {
        self.pins.len()
    }

    async fn run_probe(&self, durable: &SharedDurable) -> StoreHealth {
        debug!(backend = durable.name(), "Probing durable store");
        match with_store_timeout(self.probe_timeout, durable.probe(), "Durable store probe").await
        {
            Ok(()) => {
                info!(backend = durable.name(), "Durable store reachable");
                StoreHealth::checked(HealthState::Healthy)
            }
            Err(e) => {
                warn!(
                    backend = durable.name(),
                    "Durable store unreachable, serving from memory: {}", e
                );
                StoreHealth::checked(HealthState::Unreachable)
            }
        }
    }

    async fn healthy_durable(&self) -> Option<&SharedDurable> {
        let durable = self.durable.as_ref()?;
        let health = self.health.get_or_init(|| self.run_probe(durable)).await;
        (health.state == HealthState::Healthy).then_some(durable)
    }

    async fn route<'a, T, D, M>(
        &'a self,
        operation: &'static str,
        access: Access,
        keys: &[RecordKey],
        durable_call: D,
        memory_call: M,
    ) -> StoreResult<(T, Route)>
    where
        D: FnOnce(&'a dyn DurableBackend) -> StoreFuture<'a, T>,
        M: FnOnce(&'a MemoryStore, Route) -> StoreFuture<'a, T>,
    {
        if keys.iter().any(|key| self.pins.contains(key)) {
            debug!(operation, "Record pinned to memory");
            return Self::serve(&self.memory, Route::Pinned, memory_call).await;
        }

        let Some(durable) = self.healthy_durable().await else {
            return Self::serve(&self.memory, Route::Memory, memory_call).await;
        };

        let call = durable_call(durable.as_ref());
        let result = match access {
            Access::Read => with_store_timeout(self.operation_timeout, call, operation).await,
            // Never abandoned once dispatched
            Access::Write => call.await,
        };

        match result {
            Ok(value) => Ok((value, Route::Durable)),
            Err(e) if e.is_connectivity() => {
                warn!(operation, "Durable store call failed, serving from memory: {}", e);
                Self::serve(&self.memory, Route::Fallback, memory_call).await
            }
            Err(e) => Err(e),
        }
    }

    async fn serve<'a, T, M>(
        memory: &'a MemoryStore,
        route: Route,
        call: M,
    ) -> StoreResult<(T, Route)>
    where
        M: FnOnce(&'a MemoryStore, Route) -> StoreFuture<'a, T>,
    {
        call(memory, route).await.map(|value| (value, route))
    }

    fn pin_written<I>(&self, route: Route, keys: I)
    where
        I: IntoIterator<Item = RecordKey>,
    {
        if route.wrote_outage_copy() {
            for key in keys {
                self.pins.insert(key);
            }
        }
    }

    /// Durable records not owned by memory, followed by memory's copies
    fn overlay<T, K>(&self, durable: Vec<T>, outage: Vec<T>, key: K) -> Vec<T>
    where
        K: Fn(&T) -> RecordKey,
    {
        durable
            .into_iter()
            .filter(|record| !self.pins.contains(&key(record)))
            .chain(outage)
            .collect()
    }
}

#[async_trait]
impl EntityStore for ResilientStore {
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let keys = [RecordKey::User(id.to_string())];
        self.route(
            "get_user",
            Access::Read,
            &keys,
            |d| d.get_user(id),
            |m, _| m.get_user(id),
        )
        .await
        .map(|(user, _)| user)
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let keys = [RecordKey::Username(username.to_string())];
        self.route(
            "get_user_by_username",
            Access::Read,
            &keys,
            |d| d.get_user_by_username(username),
            |m, _| m.get_user_by_username(username),
        )
        .await
        .map(|(user, _)| user)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let keys = [RecordKey::Username(user.username.clone())];
        let fallback = user.clone();
        let (created, route) = self
            .route(
                "create_user",
                Access::Write,
                &keys,
                |d| d.create_user(user),
                |m, _| m.create_user(fallback),
            )
            .await?;

        self.pin_written(
            route,
            [
                RecordKey::User(created.id.clone()),
                RecordKey::Username(created.username.clone()),
            ],
        );
        Ok(created)
    }

    async fn create_project(&self, project: NewProject) -> StoreResult<Project> {
        let fallback = project.clone();
        let (created, route) = self
            .route(
                "create_project",
                Access::Write,
                &[],
                |d| d.create_project(project),
                |m, _| m.create_project(fallback),
            )
            .await?;

        self.pin_written(route, [RecordKey::project(&created)]);
        Ok(created)
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> StoreResult<Vec<Project>> {
        let (listed, route) = self
            .route(
                "list_projects",
                Access::Read,
                &[],
                |d| d.list_projects(filter),
                |m, _| m.list_projects(filter),
            )
            .await?;
        if route != Route::Durable {
            return Ok(listed);
        }

        let outage = self.memory.list_projects(filter).await?;
        let mut merged = self.overlay(listed, outage, RecordKey::project);
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(merged)
    }

    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
        let keys = [RecordKey::Project(id.to_string())];
        self.route(
            "get_project",
            Access::Read,
            &keys,
            |d| d.get_project(id),
            |m, _| m.get_project(id),
        )
        .await
        .map(|(project, _)| project)
    }

    async fn update_project(&self, id: &str, patch: ProjectPatch) -> StoreResult<Option<Project>> {
        let keys = [RecordKey::Project(id.to_string())];
        let fallback = patch.clone();
        let (updated, route) = self
            .route(
                "update_project",
                Access::Write,
                &keys,
                |d| d.update_project(id, patch),
                |m, route| {
                    boxed(async move {
                        match m.update_project(id, fallback).await? {
                            None if route == Route::Fallback => Err(held_durably("project", id)),
                            updated => Ok(updated),
                        }
                    })
                },
            )
            .await?;

        if let Some(project) = &updated {
            self.pin_written(route, [RecordKey::project(project)]);
        }
        Ok(updated)
    }

    async fn delete_project(&self, id: &str) -> StoreResult<bool> {
        let keys = [RecordKey::Project(id.to_string())];
        let (deleted, route) = self
            .route(
                "delete_project",
                Access::Write,
                &keys,
                |d| d.delete_project(id),
                |m, route| {
                    boxed(async move {
                        match m.delete_project(id).await? {
                            false if route == Route::Fallback => Err(held_durably("project", id)),
                            deleted => Ok(deleted),
                        }
                    })
                },
            )
            .await?;

        if deleted && route == Route::Durable {
            let dropped = self.memory.drop_project_files(id);
            if dropped > 0 {
                debug!(project = id, dropped, "Dropped outage files of deleted project");
            }
        }
        Ok(deleted)
    }

    async fn save_project_file(
        &self,
        project_id: &str,
        path: &str,
        content: &str,
        metadata: Value,
    ) -> StoreResult<ProjectFile> {
        let keys = [
            RecordKey::Project(project_id.to_string()),
            RecordKey::ProjectFile(project_id.to_string(), path.to_string()),
        ];
        let memory_owns_project = self.pins.contains(&keys[0]);
        let fallback = metadata.clone();
        let (file, route) = self
            .route(
                "save_project_file",
                Access::Write,
                &keys,
                |d| d.save_project_file(project_id, path, content, metadata),
                |m, route| {
                    // After a failed durable call the project may exist only there
                    let require_project = route == Route::Memory || memory_owns_project;
                    boxed(async move {
                        m.upsert_project_file(project_id, path, content, fallback, require_project)
                    })
                },
            )
            .await?;

        self.pin_written(route, [RecordKey::file(&file)]);
        Ok(file)
    }

    async fn list_project_files(&self, project_id: &str) -> StoreResult<Vec<ProjectFile>> {
        let keys = [RecordKey::Project(project_id.to_string())];
        let (listed, route) = self
            .route(
                "list_project_files",
                Access::Read,
                &keys,
                |d| d.list_project_files(project_id),
                |m, _| m.list_project_files(project_id),
            )
            .await?;
        if route != Route::Durable {
            return Ok(listed);
        }

        let outage = self.memory.list_project_files(project_id).await?;
        let mut merged = self.overlay(listed, outage, RecordKey::file);
        merged.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(merged)
    }

    async fn get_project_file(
        &self,
        project_id: &str,
        path: &str,
    ) -> StoreResult<Option<ProjectFile>> {
        let keys = [
            RecordKey::Project(project_id.to_string()),
            RecordKey::ProjectFile(project_id.to_string(), path.to_string()),
        ];
        self.route(
            "get_project_file",
            Access::Read,
            &keys,
            |d| d.get_project_file(project_id, path),
            |m, _| m.get_project_file(project_id, path),
        )
        .await
        .map(|(file, _)| file)
    }

    async fn delete_project_file(&self, project_id: &str, path: &str) -> StoreResult<bool> {
        let keys = [
            RecordKey::Project(project_id.to_string()),
            RecordKey::ProjectFile(project_id.to_string(), path.to_string()),
        ];
        let (deleted, _) = self
            .route(
                "delete_project_file",
                Access::Write,
                &keys,
                |d| d.delete_project_file(project_id, path),
                |m, route| {
                    boxed(async move {
                        match m.delete_project_file(project_id, path).await? {
                            false if route == Route::Fallback => Err(held_durably("file", path)),
                            deleted => Ok(deleted),
                        }
                    })
                },
            )
            .await?;
        Ok(deleted)
    }

    async fn create_notification(
        &self,
        user_id: Option<&str>,
        kind: &str,
        payload: Value,
    ) -> StoreResult<Notification> {
        let fallback = payload.clone();
        self.route(
            "create_notification",
            Access::Write,
            &[],
            |d| d.create_notification(user_id, kind, payload),
            |m, _| m.create_notification(user_id, kind, fallback),
        )
        .await
        .map(|(notification, _)| notification)
    }

    async fn get_notifications_for_user(&self, user_id: &str) -> StoreResult<Vec<Notification>> {
        let (listed, route) = self
            .route(
                "get_notifications_for_user",
                Access::Read,
                &[],
                |d| d.get_notifications_for_user(user_id),
                |m, _| m.get_notifications_for_user(user_id),
            )
            .await?;
        if route != Route::Durable {
            return Ok(listed);
        }

        // Outage notifications carry fresh ids, so nothing overlaps
        let mut merged = listed;
        merged.extend(self.memory.get_notifications_for_user(user_id).await?);
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(merged)
    }

    async fn save_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        runs: &[WorkflowRun],
    ) -> StoreResult<usize> {
        let keys: Vec<RecordKey> = runs.iter().map(|run| RecordKey::run(owner, repo, run)).collect();
        let (saved, route) = self
            .route(
                "save_workflow_runs",
                Access::Write,
                &keys,
                |d| d.save_workflow_runs(owner, repo, runs),
                |m, _| m.save_workflow_runs(owner, repo, runs),
            )
            .await?;

        self.pin_written(route, keys);
        Ok(saved)
    }

    async fn get_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> StoreResult<Vec<WorkflowRun>> {
        // Every run memory holds is pinned, so durable must return that many extra
        let outage = self.memory.get_workflow_runs(owner, repo, usize::MAX).await?;
        let durable_limit = limit.saturating_add(outage.len());
        let (listed, route) = self
            .route(
                "get_workflow_runs",
                Access::Read,
                &[],
                |d| d.get_workflow_runs(owner, repo, durable_limit),
                |m, _| m.get_workflow_runs(owner, repo, limit),
            )
            .await?;
        if route != Route::Durable {
            return Ok(listed);
        }

        let mut merged = self.overlay(listed, outage, |run| RecordKey::run(owner, repo, run));
        sort_runs(&mut merged);
        merged.truncate(limit);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorKind, StoreError};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Durable backend double: an in-memory store behind a connectivity switch
    #[derive(Default)]
    struct StubDurable {
        inner: MemoryStore,
        down: AtomicBool,
        slow: AtomicBool,
        probe_delay: Duration,
        probes: AtomicUsize,
        calls: AtomicUsize,
    }

    impl StubDurable {
        fn up() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn down() -> Arc<Self> {
            let stub = Self::default();
            stub.down.store(true, Ordering::SeqCst);
            Arc::new(stub)
        }

        fn with_probe_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                probe_delay: delay,
                ..Self::default()
            })
        }

        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn probes(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn check(&self) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.slow.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(StoreError::Unreachable("connection refused".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl EntityStore for StubDurable {
        async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
            self.check().await?;
            self.inner.get_user(id).await
        }

        async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
            self.check().await?;
            self.inner.get_user_by_username(username).await
        }

        async fn create_user(&self, user: NewUser) -> StoreResult<User> {
            self.check().await?;
            self.inner.create_user(user).await
        }

        async fn create_project(&self, project: NewProject) -> StoreResult<Project> {
            self.check().await?;
            self.inner.create_project(project).await
        }

        async fn list_projects(&self, filter: &ProjectFilter) -> StoreResult<Vec<Project>> {
            self.check().await?;
            self.inner.list_projects(filter).await
        }

        async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
            self.check().await?;
            self.inner.get_project(id).await
        }

        async fn update_project(
            &self,
            id: &str,
            patch: ProjectPatch,
        ) -> StoreResult<Option<Project>> {
            self.check().await?;
            self.inner.update_project(id, patch).await
        }

        async fn delete_project(&self, id: &str) -> StoreResult<bool> {
            self.check().await?;
            self.inner.delete_project(id).await
        }

        async fn save_project_file(
            &self,
            project_id: &str,
            path: &str,
            content: &str,
            metadata: Value,
        ) -> StoreResult<ProjectFile> {
            self.check().await?;
            self.inner
                .save_project_file(project_id, path, content, metadata)
                .await
        }

        async fn list_project_files(&self, project_id: &str) -> StoreResult<Vec<ProjectFile>> {
            self.check().await?;
            self.inner.list_project_files(project_id).await
        }

        async fn get_project_file(
            &self,
            project_id: &str,
            path: &str,
        ) -> StoreResult<Option<ProjectFile>> {
            self.check().await?;
            self.inner.get_project_file(project_id, path).await
        }

        async fn delete_project_file(&self, project_id: &str, path: &str) -> StoreResult<bool> {
            self.check().await?;
            self.inner.delete_project_file(project_id, path).await
        }

        async fn create_notification(
            &self,
            user_id: Option<&str>,
            kind: &str,
            payload: Value,
        ) -> StoreResult<Notification> {
            self.check().await?;
            self.inner.create_notification(user_id, kind, payload).await
        }

        async fn get_notifications_for_user(
            &self,
            user_id: &str,
        ) -> StoreResult<Vec<Notification>> {
            self.check().await?;
            self.inner.get_notifications_for_user(user_id).await
        }

        async fn save_workflow_runs(
            &self,
            owner: &str,
            repo: &str,
            runs: &[WorkflowRun],
        ) -> StoreResult<usize> {
            self.check().await?;
            self.inner.save_workflow_runs(owner, repo, runs).await
        }

        async fn get_workflow_runs(
            &self,
            owner: &str,
            repo: &str,
            limit: usize,
        ) -> StoreResult<Vec<WorkflowRun>> {
            self.check().await?;
            self.inner.get_workflow_runs(owner, repo, limit).await
        }
    }

    #[async_trait]
    impl DurableBackend for StubDurable {
        async fn probe(&self) -> StoreResult<()> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if !self.probe_delay.is_zero() {
                tokio::time::sleep(self.probe_delay).await;
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(StoreError::Unreachable("connection refused".to_string()));
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn timeouts() -> TimeoutConfig {
        TimeoutConfig {
            attempt: Duration::from_secs(1),
            probe: Duration::from_secs(1),
            store_operation: Duration::from_millis(100),
        }
    }

    fn router(stub: &Arc<StubDurable>) -> ResilientStore {
        ResilientStore::new(Some(Arc::clone(stub) as SharedDurable), &timeouts())
    }

    #[tokio::test]
    async fn test_healthy_store_serves_from_durable() {
        let stub = StubDurable::up();
        let store = router(&stub);
        assert_eq!(store.health().state, HealthState::Unknown);

        let created = store.create_project(NewProject::new("u1", "demo")).await.unwrap();
        let loaded = store.get_project(&created.id).await.unwrap();

        assert_eq!(loaded, Some(created));
        assert_eq!(stub.inner.project_count(), 1);
        assert_eq!(store.memory.project_count(), 0);

        let health = store.health();
        assert_eq!(health.state, HealthState::Healthy);
        assert!(health.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_probe_never_retries_durable() {
        let stub = StubDurable::down();
        let store = router(&stub);

        for i in 0..100 {
            let project = store
                .create_project(NewProject::new("u1", format!("p{}", i)))
                .await
                .unwrap();
            assert!(store.get_project(&project.id).await.unwrap().is_some());
        }

        assert_eq!(stub.probes(), 1);
        assert_eq!(stub.calls(), 0);
        assert_eq!(store.health().state, HealthState::Unreachable);
        assert_eq!(store.pinned_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_one_probe() {
        let stub = StubDurable::with_probe_delay(Duration::from_millis(50));
        let store = Arc::new(router(&stub));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.get_user(&format!("user-{}", i)).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().unwrap().is_none());
        }
        assert_eq!(stub.probes(), 1);
        assert_eq!(stub.calls(), 16);
    }

    #[tokio::test]
    async fn test_create_user_while_durable_down() {
        let stub = StubDurable::down();
        let store = router(&stub);

        let alice = store.create_user(NewUser::new("alice")).await.unwrap();
        assert!(!alice.id.is_empty());
        assert_eq!(
            store.get_user_by_username("alice").await.unwrap(),
            Some(alice.clone())
        );
        assert_eq!(store.get_user(&alice.id).await.unwrap(), Some(alice));
    }

    #[tokio::test]
    async fn test_outage_write_stays_visible_after_recovery() {
        let stub = StubDurable::up();
        let store = router(&stub);
        store.check_health().await;

        stub.set_down(true);
        let bob = store.create_user(NewUser::new("bob")).await.unwrap();
        assert_eq!(store.health().state, HealthState::Healthy);

        stub.set_down(false);
        let calls_before = stub.calls();
        assert_eq!(
            store.get_user_by_username("bob").await.unwrap(),
            Some(bob.clone())
        );
        assert_eq!(store.get_user(&bob.id).await.unwrap(), Some(bob));
        assert_eq!(stub.calls(), calls_before);

        // Unrelated keys go back to the durable store
        assert!(store.get_user_by_username("carol").await.unwrap().is_none());
        assert_eq!(stub.calls(), calls_before + 1);
    }

    #[tokio::test]
    async fn test_read_fallback_does_not_pin() {
        let stub = StubDurable::up();
        let store = router(&stub);
        store.check_health().await;

        stub.set_down(true);
        assert!(store.get_user("u1").await.unwrap().is_none());
        assert_eq!(store.pinned_keys(), 0);
    }

    #[tokio::test]
    async fn test_business_errors_do_not_fall_back() {
        let stub = StubDurable::up();
        let store = router(&stub);

        let err = store
            .save_project_file("missing", "a.rs", "", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        store.create_user(NewUser::new("alice")).await.unwrap();
        let err = store.create_user(NewUser::new("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert_eq!(store.memory.user_count(), 0);
        assert_eq!(store.pinned_keys(), 0);
    }

    #[tokio::test]
    async fn test_slow_durable_read_falls_back() {
        let stub = StubDurable::up();
        let store = router(&stub);
        let project = store.create_project(NewProject::new("u1", "demo")).await.unwrap();

        stub.slow.store(true, Ordering::SeqCst);
        assert!(store.get_project(&project.id).await.unwrap().is_none());
        assert_eq!(store.health().state, HealthState::Healthy);
        assert_eq!(store.pinned_keys(), 0);

        stub.slow.store(false, Ordering::SeqCst);
        assert_eq!(store.get_project(&project.id).await.unwrap(), Some(project));
    }

    #[tokio::test]
    async fn test_slow_durable_write_lands_only_in_durable() {
        let stub = StubDurable::up();
        let store = router(&stub);
        store.check_health().await;

        stub.slow.store(true, Ordering::SeqCst);
        let project = store.create_project(NewProject::new("u1", "demo")).await.unwrap();
        assert_eq!(stub.inner.project_count(), 1);
        assert_eq!(store.memory.project_count(), 0);
        assert_eq!(store.pinned_keys(), 0);

        stub.slow.store(false, Ordering::SeqCst);
        assert_eq!(store.get_project(&project.id).await.unwrap(), Some(project));
    }

    #[tokio::test]
    async fn test_locked_database_write_lands_in_one_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("forge.db");
        let sqlite = Arc::new(SqliteStore::open(
            &path,
            PoolConfig {
                max_size: 2,
                connection_timeout: Duration::from_millis(200),
                busy_timeout: Duration::from_millis(100),
            },
        ));
        let limits = TimeoutConfig {
            store_operation: Duration::from_millis(500),
            ..timeouts()
        };
        let store = ResilientStore::new(Some(Arc::clone(&sqlite) as SharedDurable), &limits);
        assert_eq!(store.check_health().await.state, HealthState::Healthy);

        let locker = rusqlite::Connection::open(&path).unwrap();
        locker.execute_batch("BEGIN EXCLUSIVE").unwrap();
        let alice = store.create_user(NewUser::new("alice")).await.unwrap();
        locker.execute_batch("COMMIT").unwrap();
        drop(locker);

        // A write abandoned mid-flight would commit here once the lock is gone
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(sqlite.get_user_by_username("alice").await.unwrap().is_none());
        assert_eq!(store.memory.user_count(), 1);
        assert_eq!(store.get_user_by_username("alice").await.unwrap(), Some(alice));
    }

    #[tokio::test]
    async fn test_outage_file_for_durable_project_is_accepted() {
        let stub = StubDurable::up();
        let store = router(&stub);
        let project = store.create_project(NewProject::new("u1", "demo")).await.unwrap();

        stub.set_down(true);
        let saved = store
            .save_project_file(&project.id, "main.py", "print(1)", Value::Null)
            .await
            .unwrap();
        stub.set_down(false);

        store
            .save_project_file(&project.id, "lib.py", "", Value::Null)
            .await
            .unwrap();
        assert_eq!(
            store.get_project_file(&project.id, "main.py").await.unwrap(),
            Some(saved)
        );
        let paths: Vec<String> = store
            .list_project_files(&project.id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(paths, vec!["lib.py", "main.py"]);
        assert!(
            stub.inner
                .get_project_file(&project.id, "main.py")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_outage_mutation_of_durable_record_is_unreachable() {
        let stub = StubDurable::up();
        let store = router(&stub);
        let project = store.create_project(NewProject::new("u1", "demo")).await.unwrap();
        store
            .save_project_file(&project.id, "a.rs", "", Value::Null)
            .await
            .unwrap();

        stub.set_down(true);
        let patch = ProjectPatch {
            status: Some("archived".into()),
            ..ProjectPatch::default()
        };
        let err = store.update_project(&project.id, patch).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network, "{:?}", err);
        let err = store.delete_project(&project.id).await.unwrap_err();
        assert!(err.is_connectivity(), "{:?}", err);
        let err = store.delete_project_file(&project.id, "a.rs").await.unwrap_err();
        assert!(err.is_connectivity(), "{:?}", err);
        stub.set_down(false);

        assert_eq!(store.get_project(&project.id).await.unwrap(), Some(project.clone()));
        assert_eq!(store.list_project_files(&project.id).await.unwrap().len(), 1);
        assert_eq!(store.pinned_keys(), 0);
    }

    #[tokio::test]
    async fn test_durable_delete_drops_outage_files() {
        let stub = StubDurable::up();
        let store = router(&stub);
        let project = store.create_project(NewProject::new("u1", "demo")).await.unwrap();

        stub.set_down(true);
        store
            .save_project_file(&project.id, "main.py", "", Value::Null)
            .await
            .unwrap();
        stub.set_down(false);

        assert!(store.delete_project(&project.id).await.unwrap());
        assert!(store.list_project_files(&project.id).await.unwrap().is_empty());
        assert!(
            store
                .get_project_file(&project.id, "main.py")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_outage_files_follow_pinned_project() {
        let stub = StubDurable::up();
        let store = router(&stub);
        store.check_health().await;

        stub.set_down(true);
        let project = store.create_project(NewProject::new("u1", "demo")).await.unwrap();
        stub.set_down(false);

        store
            .save_project_file(&project.id, "main.py", "print(1)", Value::Null)
            .await
            .unwrap();
        let files = store.list_project_files(&project.id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(stub.inner.project_count(), 0);
    }

    #[tokio::test]
    async fn test_outage_broadcast_keeps_durable_notifications_visible() {
        let stub = StubDurable::up();
        let store = router(&stub);
        let welcome = store
            .create_notification(Some("u7"), "welcome", Value::Null)
            .await
            .unwrap();
        let other = store
            .create_notification(Some("u8"), "welcome", Value::Null)
            .await
            .unwrap();

        stub.set_down(true);
        let broadcast = store
            .create_notification(None, "maintenance", Value::Null)
            .await
            .unwrap();
        // While down only the outage copy is reachable
        assert_eq!(
            store.get_notifications_for_user("u7").await.unwrap(),
            vec![broadcast.clone()]
        );
        stub.set_down(false);

        let seen = store.get_notifications_for_user("u7").await.unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&welcome) && seen.contains(&broadcast));

        let seen = store.get_notifications_for_user("u8").await.unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&other) && seen.contains(&broadcast));
        assert_eq!(store.pinned_keys(), 0);
    }

    #[tokio::test]
    async fn test_outage_project_joins_durable_listing() {
        let stub = StubDurable::up();
        let store = router(&stub);
        let kept = store.create_project(NewProject::new("u1", "kept")).await.unwrap();
        let foreign = store.create_project(NewProject::new("u2", "foreign")).await.unwrap();

        stub.set_down(true);
        let added = store.create_project(NewProject::new("u1", "added")).await.unwrap();
        assert_eq!(
            store.list_projects(&ProjectFilter::owner("u1")).await.unwrap(),
            vec![added.clone()]
        );
        stub.set_down(false);

        let owned = store.list_projects(&ProjectFilter::owner("u1")).await.unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.contains(&kept) && owned.contains(&added));

        let all = store.list_projects(&ProjectFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&foreign) && all.contains(&added));
        assert_eq!(stub.inner.project_count(), 2);
    }

    fn run(run_id: i64, minutes_ago: i64, status: &str) -> WorkflowRun {
        let at = Utc::now() - chrono::Duration::minutes(minutes_ago);
        WorkflowRun {
            run_id,
            name: "ci".into(),
            status: status.into(),
            conclusion: None,
            branch: Some("main".into()),
            commit_sha: None,
            html_url: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_outage_runs_overlay_durable_history() {
        let stub = StubDurable::up();
        let store = router(&stub);
        store
            .save_workflow_runs("acme", "api", &[run(1, 30, "completed"), run(2, 20, "queued")])
            .await
            .unwrap();

        stub.set_down(true);
        store
            .save_workflow_runs("acme", "api", &[run(2, 20, "completed"), run(3, 10, "queued")])
            .await
            .unwrap();
        stub.set_down(false);

        let runs = store.get_workflow_runs("acme", "api", 10).await.unwrap();
        let ids: Vec<i64> = runs.iter().map(|r| r.run_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(runs[1].status, "completed");

        let top = store.get_workflow_runs("acme", "api", 2).await.unwrap();
        assert_eq!(top.iter().map(|r| r.run_id).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[tokio::test]
    async fn test_memory_only_store_is_unreachable_without_probe() {
        let store = ResilientStore::memory_only();
        assert_eq!(store.health().state, HealthState::Unreachable);

        let user = store.create_user(NewUser::new("dana")).await.unwrap();
        assert_eq!(store.get_user(&user.id).await.unwrap(), Some(user));
        assert_eq!(store.check_health().await.state, HealthState::Unreachable);

        // Memory holds everything here, so a missing record is simply missing
        let patch = ProjectPatch::default();
        assert!(store.update_project("missing", patch).await.unwrap().is_none());
        assert!(!store.delete_project("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_from_config_uses_sqlite_when_configured() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.database_url = Some(dir.path().join("forge.db").display().to_string());

        let store = ResilientStore::from_config(&config).unwrap();
        let project = store.create_project(NewProject::new("u1", "demo")).await.unwrap();
        assert_eq!(store.health().state, HealthState::Healthy);
        assert_eq!(store.get_project(&project.id).await.unwrap(), Some(project));

        let memory_only = ResilientStore::from_config(&Config::default()).unwrap();
        assert_eq!(memory_only.health().state, HealthState::Unreachable);
    }
}
