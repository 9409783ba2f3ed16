//! In-Memory Store
//!
//! Complete store implementation held in process memory. Each collection is
//! guarded by its own mutex; a poisoned mutex is recovered since every
//! mutation leaves the collection consistent.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::backend::EntityStore;
use super::models::{
    NewProject, NewUser, Notification, Project, ProjectFile, ProjectFilter, ProjectPatch, User,
    WorkflowRun, now, sort_runs, validate_file_path,
};
use crate::types::{StoreError, StoreResult};

type RepoKey = (String, String);

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, User>>,
    /// Insertion order
    projects: Mutex<Vec<Project>>,
    /// Keyed by (project_id, path), which keeps paths sorted per project
    files: Mutex<BTreeMap<(String, String), ProjectFile>>,
    /// Insertion order
    notifications: Mutex<Vec<Notification>>,
    runs: Mutex<HashMap<RepoKey, HashMap<i64, WorkflowRun>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        lock(&self.users).len()
    }

    pub fn project_count(&self) -> usize {
        lock(&self.projects).len()
    }

    /// Upsert a file; `require_project` off accepts files for projects this
    /// store does not hold
    pub(crate) fn upsert_project_file(
        &self,
        project_id: &str,
        path: &str,
        content: &str,
        metadata: Value,
        require_project: bool,
    ) -> StoreResult<ProjectFile> {
        validate_file_path(path)?;

        // Held across the insert so a concurrent delete cannot orphan the file
        let projects = lock(&self.projects);
        if require_project && !projects.iter().any(|p| p.id == project_id) {
            return Err(StoreError::not_found("project", project_id));
        }

        let mut files = lock(&self.files);
        let saved_at = now();
        let file = files
            .entry((project_id.to_string(), path.to_string()))
            .and_modify(|f| {
                f.content = content.to_string();
                f.metadata = metadata.clone();
                f.updated_at = saved_at;
            })
            .or_insert_with(|| ProjectFile {
                project_id: project_id.to_string(),
                path: path.to_string(),
                content: content.to_string(),
                metadata: metadata.clone(),
                created_at: saved_at,
                updated_at: saved_at,
            });
        Ok(file.clone())
    }

    /// Remove every file held for `project_id`, returning how many went
    pub(crate) fn drop_project_files(&self, project_id: &str) -> usize {
        let mut files = lock(&self.files);
        let before = files.len();
        files.retain(|(pid, _), _| pid != project_id);
        before - files.len()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(lock(&self.users).get(id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(lock(&self.users)
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        user.validate()?;
        let mut users = lock(&self.users);
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        let user = user.into_user();
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn create_project(&self, project: NewProject) -> StoreResult<Project> {
        project.validate()?;
        let project = project.into_project();
        lock(&self.projects).push(project.clone());
        Ok(project)
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> StoreResult<Vec<Project>> {
        let mut listed: Vec<Project> = lock(&self.projects)
            .iter()
            .rev()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        // Stable sort keeps later insertions first among equal timestamps
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
        Ok(lock(&self.projects).iter().find(|p| p.id == id).cloned())
    }

    async fn update_project(&self, id: &str, patch: ProjectPatch) -> StoreResult<Option<Project>> {
        patch.validate()?;
        let mut projects = lock(&self.projects);
        let Some(project) = projects.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        patch.apply(project);
        Ok(Some(project.clone()))
    }

    async fn delete_project(&self, id: &str) -> StoreResult<bool> {
        let mut projects = lock(&self.projects);
        let before = projects.len();
        projects.retain(|p| p.id != id);
        if projects.len() == before {
            return Ok(false);
        }
        lock(&self.files).retain(|(project_id, _), _| project_id != id);
        Ok(true)
    }

    async fn save_project_file(
        &self,
        project_id: &str,
        path: &str,
        content: &str,
        metadata: Value,
    ) -> StoreResult<ProjectFile> {
        self.upsert_project_file(project_id, path, content, metadata, true)
    }

    async fn list_project_files(&self, project_id: &str) -> StoreResult<Vec<ProjectFile>> {
        Ok(lock(&self.files)
            .iter()
            .filter(|((pid, _), _)| pid == project_id)
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn get_project_file(
        &self,
        project_id: &str,
        path: &str,
    ) -> StoreResult<Option<ProjectFile>> {
        Ok(lock(&self.files)
            .get(&(project_id.to_string(), path.to_string()))
            .cloned())
    }

    async fn delete_project_file(&self, project_id: &str, path: &str) -> StoreResult<bool> {
        Ok(lock(&self.files)
            .remove(&(project_id.to_string(), path.to_string()))
            .is_some())
    }

    async fn create_notification(
        &self,
        user_id: Option<&str>,
        kind: &str,
        payload: Value,
    ) -> StoreResult<Notification> {
        let notification = Notification::new(user_id, kind, payload)?;
        lock(&self.notifications).push(notification.clone());
        Ok(notification)
    }

    async fn get_notifications_for_user(&self, user_id: &str) -> StoreResult<Vec<Notification>> {
        let mut listed: Vec<Notification> = lock(&self.notifications)
            .iter()
            .rev()
            .filter(|n| n.is_visible_to(user_id))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn save_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        runs: &[WorkflowRun],
    ) -> StoreResult<usize> {
        let mut all = lock(&self.runs);
        let stored = all
            .entry((owner.to_string(), repo.to_string()))
            .or_default();
        for run in runs {
            stored.insert(run.run_id, run.normalized());
        }
        Ok(runs.len())
    }

    async fn get_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> StoreResult<Vec<WorkflowRun>> {
        let all = lock(&self.runs);
        let Some(stored) = all.get(&(owner.to_string(), repo.to_string())) else {
            return Ok(Vec::new());
        };
        let mut listed: Vec<WorkflowRun> = stored.values().cloned().collect();
        sort_runs(&mut listed);
        listed.truncate(limit);
        Ok(listed)
    }
}
