//! SQLite Durable Store with Connection Pooling
//!
//! - Connection pooling via r2d2; the pool is built unchecked so an
//!   unreachable database is detected by the probe, not at construction
//! - Schema created during the probe
//! - WAL mode and foreign keys on every connection
//! - Lock waits bounded by the configured busy timeout, so a write always
//!   finishes or fails on its own
//! - Every call runs on the blocking thread pool

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::backend::{DurableBackend, EntityStore};
use super::models::{
    NewProject, NewUser, Notification, Project, ProjectFile, ProjectFilter, ProjectPatch, User,
    WorkflowRun, now, validate_file_path,
};
use crate::constants::storage as store_constants;
use crate::types::{ResultExt, StoreError, StoreResult};

const SCHEMA: &str = include_str!("schema.sql");

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at";
const PROJECT_COLUMNS: &str =
    "id, owner_id, name, description, language, status, created_at, updated_at";
const FILE_COLUMNS: &str = "project_id, path, content, metadata, created_at, updated_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, payload, created_at";
const RUN_COLUMNS: &str =
    "run_id, name, status, conclusion, branch, commit_sha, html_url, created_at, updated_at";

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,
    /// Timeout for acquiring a connection
    pub connection_timeout: Duration,
    /// How long a statement waits on a locked database
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: store_constants::POOL_SIZE,
            connection_timeout: Duration::from_secs(store_constants::CONNECTION_TIMEOUT_SECS),
            busy_timeout: Duration::from_millis(store_constants::BUSY_TIMEOUT_MS),
        }
    }
}

/// Durable store backed by a SQLite file
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteStore {
    /// Create a store for `path`; nothing is opened until first use
    pub fn open<P: AsRef<Path>>(path: P, config: PoolConfig) -> Self {
        let path = path.as_ref().to_path_buf();
        let busy_timeout = config.busy_timeout;
        let manager = SqliteConnectionManager::file(&path)
            .with_init(move |conn| Self::configure_connection(conn, busy_timeout));

        let pool = Pool::builder()
            .max_size(config.max_size.max(1))
            .min_idle(Some(0))
            .connection_timeout(config.connection_timeout)
            .build_unchecked(manager);

        Self { pool, path }
    }

    /// Create a store from a connection string (`path`, `sqlite:path`, `sqlite://path`)
    pub fn from_url(url: &str, config: PoolConfig) -> StoreResult<Self> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url)
            .trim();

        if path.is_empty() {
            return Err(StoreError::Invalid(format!(
                "database_url '{}' does not name a file",
                url
            )));
        }

        Ok(Self::open(path, config))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn configure_connection(
        conn: &mut Connection,
        busy_timeout: Duration,
    ) -> std::result::Result<(), rusqlite::Error> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(())
    }

    /// Run `f` with a pooled connection on the blocking thread pool
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("Database task failed: {}", e)))?
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: parse_ts(row, 4)?,
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        language: row.get(4)?,
        status: row.get(5)?,
        created_at: parse_ts(row, 6)?,
        updated_at: parse_ts(row, 7)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectFile> {
    Ok(ProjectFile {
        project_id: row.get(0)?,
        path: row.get(1)?,
        content: row.get(2)?,
        metadata: parse_json(row, 3)?,
        created_at: parse_ts(row, 4)?,
        updated_at: parse_ts(row, 5)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        payload: parse_json(row, 3)?,
        created_at: parse_ts(row, 4)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<WorkflowRun> {
    Ok(WorkflowRun {
        run_id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        conclusion: row.get(3)?,
        branch: row.get(4)?,
        commit_sha: row.get(5)?,
        html_url: row.get(6)?,
        created_at: parse_ts(row, 7)?,
        updated_at: parse_ts(row, 8)?,
    })
}

fn select_project(conn: &Connection, id: &str) -> StoreResult<Option<Project>> {
    conn.query_row(
        &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
        params![id],
        project_from_row,
    )
    .optional()
    .with_context("Failed to load project")
}

fn select_file(conn: &Connection, project_id: &str, path: &str) -> StoreResult<Option<ProjectFile>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM project_files WHERE project_id = ?1 AND path = ?2",
            FILE_COLUMNS
        ),
        params![project_id, path],
        file_from_row,
    )
    .optional()
    .with_context("Failed to load project file")
}

// =============================================================================
// Store Implementation
// =============================================================================

#[async_trait]
impl EntityStore for SqliteStore {
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                user_from_row,
            )
            .optional()
            .with_context("Failed to load user")
        })
        .await
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let username = username.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                params![username],
                user_from_row,
            )
            .optional()
            .with_context("Failed to load user by username")
        })
        .await
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        user.validate()?;
        let user = user.into_user();
        self.with_conn(move |conn| {
            conn.execute(
                &format!("INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5)", USER_COLUMNS),
                params![
                    user.id,
                    user.username,
                    user.email,
                    user.password_hash,
                    ts(&user.created_at)
                ],
            )
            .map_err(|e| match StoreError::from(e) {
                StoreError::Conflict(_) => StoreError::Conflict(format!(
                    "username '{}' is already taken",
                    user.username
                )),
                other => other,
            })?;
            Ok(user)
        })
        .await
    }

    async fn create_project(&self, project: NewProject) -> StoreResult<Project> {
        project.validate()?;
        let project = project.into_project();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO projects ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    PROJECT_COLUMNS
                ),
                params![
                    project.id,
                    project.owner_id,
                    project.name,
                    project.description,
                    project.language,
                    project.status,
                    ts(&project.created_at),
                    ts(&project.updated_at)
                ],
            )
            .with_context("Failed to create project")?;
            Ok(project)
        })
        .await
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> StoreResult<Vec<Project>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut clauses = Vec::new();
            let mut values: Vec<String> = Vec::new();
            if let Some(owner) = filter.owner_id {
                values.push(owner);
                clauses.push(format!("owner_id = ?{}", values.len()));
            }
            if let Some(status) = filter.status {
                values.push(status);
                clauses.push(format!("status = ?{}", values.len()));
            }

            let mut sql = format!("SELECT {} FROM projects", PROJECT_COLUMNS);
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY created_at DESC, rowid DESC");

            let mut stmt = conn.prepare(&sql).with_context("Failed to list projects")?;
            let projects = stmt
                .query_map(rusqlite::params_from_iter(values.iter()), project_from_row)
                .with_context("Failed to list projects")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .with_context("Failed to read project row")?;
            Ok(projects)
        })
        .await
    }

    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
        let id = id.to_string();
        self.with_conn(move |conn| select_project(conn, &id)).await
    }

    async fn update_project(&self, id: &str, patch: ProjectPatch) -> StoreResult<Option<Project>> {
        patch.validate()?;
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction().with_context("Failed to start transaction")?;
            let Some(mut project) = select_project(&tx, &id)? else {
                return Ok(None);
            };
            patch.apply(&mut project);
            tx.execute(
                "UPDATE projects SET name = ?2, description = ?3, language = ?4, status = ?5,
                 updated_at = ?6 WHERE id = ?1",
                params![
                    project.id,
                    project.name,
                    project.description,
                    project.language,
                    project.status,
                    ts(&project.updated_at)
                ],
            )
            .with_context("Failed to update project")?;
            tx.commit().with_context("Failed to commit project update")?;
            Ok(Some(project))
        })
        .await
    }

    async fn delete_project(&self, id: &str) -> StoreResult<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let removed = conn
                .execute("DELETE FROM projects WHERE id = ?1", params![id])
                .with_context("Failed to delete project")?;
            Ok(removed > 0)
        })
        .await
    }

    async fn save_project_file(
        &self,
        project_id: &str,
        path: &str,
        content: &str,
        metadata: Value,
    ) -> StoreResult<ProjectFile> {
        validate_file_path(path)?;
        let project_id = project_id.to_string();
        let path = path.to_string();
        let content = content.to_string();
        let metadata = serde_json::to_string(&metadata)?;

        self.with_conn(move |conn| {
            let tx = conn.transaction().with_context("Failed to start transaction")?;
            let exists = tx
                .query_row(
                    "SELECT 1 FROM projects WHERE id = ?1",
                    params![project_id],
                    |_| Ok(()),
                )
                .optional()
                .with_context("Failed to check project")?
                .is_some();
            if !exists {
                return Err(StoreError::not_found("project", project_id));
            }

            let saved_at = ts(&now());
            tx.execute(
                "INSERT INTO project_files (project_id, path, content, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT (project_id, path) DO UPDATE SET
                     content = excluded.content,
                     metadata = excluded.metadata,
                     updated_at = excluded.updated_at",
                params![project_id, path, content, metadata, saved_at],
            )
            .with_context("Failed to save project file")?;

            let file = select_file(&tx, &project_id, &path)?.ok_or_else(|| {
                StoreError::Backend("Saved project file could not be read back".to_string())
            })?;
            tx.commit().with_context("Failed to commit project file")?;
            Ok(file)
        })
        .await
    }

    async fn list_project_files(&self, project_id: &str) -> StoreResult<Vec<ProjectFile>> {
        let project_id = project_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM project_files WHERE project_id = ?1 ORDER BY path ASC",
                    FILE_COLUMNS
                ))
                .with_context("Failed to list project files")?;
            let files = stmt
                .query_map(params![project_id], file_from_row)
                .with_context("Failed to list project files")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .with_context("Failed to read project file row")?;
            Ok(files)
        })
        .await
    }

    async fn get_project_file(
        &self,
        project_id: &str,
        path: &str,
    ) -> StoreResult<Option<ProjectFile>> {
        let project_id = project_id.to_string();
        let path = path.to_string();
        self.with_conn(move |conn| select_file(conn, &project_id, &path))
            .await
    }

    async fn delete_project_file(&self, project_id: &str, path: &str) -> StoreResult<bool> {
        let project_id = project_id.to_string();
        let path = path.to_string();
        self.with_conn(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM project_files WHERE project_id = ?1 AND path = ?2",
                    params![project_id, path],
                )
                .with_context("Failed to delete project file")?;
            Ok(removed > 0)
        })
        .await
    }

    async fn create_notification(
        &self,
        user_id: Option<&str>,
        kind: &str,
        payload: Value,
    ) -> StoreResult<Notification> {
        let notification = Notification::new(user_id, kind, payload)?;
        let payload = serde_json::to_string(&notification.payload)?;
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO notifications ({}) VALUES (?1, ?2, ?3, ?4, ?5)",
                    NOTIFICATION_COLUMNS
                ),
                params![
                    notification.id,
                    notification.user_id,
                    notification.kind,
                    payload,
                    ts(&notification.created_at)
                ],
            )
            .with_context("Failed to create notification")?;
            Ok(notification)
        })
        .await
    }

    async fn get_notifications_for_user(&self, user_id: &str) -> StoreResult<Vec<Notification>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM notifications WHERE user_id = ?1 OR user_id IS NULL
                     ORDER BY created_at DESC, rowid DESC",
                    NOTIFICATION_COLUMNS
                ))
                .with_context("Failed to list notifications")?;
            let notifications = stmt
                .query_map(params![user_id], notification_from_row)
                .with_context("Failed to list notifications")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .with_context("Failed to read notification row")?;
            Ok(notifications)
        })
        .await
    }

    async fn save_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        runs: &[WorkflowRun],
    ) -> StoreResult<usize> {
        let owner = owner.to_string();
        let repo = repo.to_string();
        let runs: Vec<WorkflowRun> = runs.iter().map(WorkflowRun::normalized).collect();

        self.with_conn(move |conn| {
            let tx = conn.transaction().with_context("Failed to start transaction")?;
            {
                let mut stmt = tx
                    .prepare(&format!(
                        "INSERT INTO workflow_runs (owner, repo, {})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                         ON CONFLICT (owner, repo, run_id) DO UPDATE SET
                             name = excluded.name,
                             status = excluded.status,
                             conclusion = excluded.conclusion,
                             branch = excluded.branch,
                             commit_sha = excluded.commit_sha,
                             html_url = excluded.html_url,
                             created_at = excluded.created_at,
                             updated_at = excluded.updated_at",
                        RUN_COLUMNS
                    ))
                    .with_context("Failed to prepare workflow run upsert")?;

                for run in &runs {
                    stmt.execute(params![
                        owner,
                        repo,
                        run.run_id,
                        run.name,
                        run.status,
                        run.conclusion,
                        run.branch,
                        run.commit_sha,
                        run.html_url,
                        ts(&run.created_at),
                        ts(&run.updated_at)
                    ])
                    .with_context_fn(|| format!("Failed to save workflow run {}", run.run_id))?;
                }
            }
            tx.commit().with_context("Failed to commit workflow runs")?;
            debug!(owner = %owner, repo = %repo, count = runs.len(), "Saved workflow runs");
            Ok(runs.len())
        })
        .await
    }

    async fn get_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> StoreResult<Vec<WorkflowRun>> {
        let owner = owner.to_string();
        let repo = repo.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM workflow_runs WHERE owner = ?1 AND repo = ?2
                     ORDER BY created_at DESC, run_id DESC LIMIT ?3",
                    RUN_COLUMNS
                ))
                .with_context("Failed to list workflow runs")?;
            let runs = stmt
                .query_map(params![owner, repo, limit], run_from_row)
                .with_context("Failed to list workflow runs")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .with_context("Failed to read workflow run row")?;
            Ok(runs)
        })
        .await
    }
}

#[async_trait]
impl DurableBackend for SqliteStore {
    async fn probe(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)
                .with_context("Failed to initialize database schema")?;
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .with_context("Liveness query failed")?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
