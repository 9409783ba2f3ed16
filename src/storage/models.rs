//! Entity Records
//!
//! Shapes shared by every store implementation. Timestamps are truncated to
//! microseconds so a record read back from SQLite equals the one returned
//! on write.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{StoreError, StoreResult};

/// Current time at storage precision
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl NewUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.username.trim().is_empty() {
            return Err(StoreError::Invalid("username must not be empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn into_user(self) -> User {
        User {
            id: new_id(),
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            created_at: now(),
        }
    }
}

// =============================================================================
// Projects
// =============================================================================

pub const DEFAULT_PROJECT_STATUS: &str = "active";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
}

impl NewProject {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Invalid("project name must not be empty".to_string()));
        }
        if self.owner_id.trim().is_empty() {
            return Err(StoreError::Invalid("project owner must not be empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn into_project(self) -> Project {
        let created = now();
        Project {
            id: new_id(),
            owner_id: self.owner_id,
            name: self.name,
            description: self.description,
            language: self.language,
            status: DEFAULT_PROJECT_STATUS.to_string(),
            created_at: created,
            updated_at: created,
        }
    }
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub status: Option<String>,
}

impl ProjectPatch {
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(StoreError::Invalid("project name must not be empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn apply(self, project: &mut Project) {
        if let Some(name) = self.name {
            project.name = name;
        }
        if let Some(description) = self.description {
            project.description = Some(description);
        }
        if let Some(language) = self.language {
            project.language = Some(language);
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        project.updated_at = now().max(project.created_at);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub owner_id: Option<String>,
    pub status: Option<String>,
}

impl ProjectFilter {
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            status: None,
        }
    }

    pub fn matches(&self, project: &Project) -> bool {
        self.owner_id.as_ref().is_none_or(|o| *o == project.owner_id)
            && self.status.as_ref().is_none_or(|s| *s == project.status)
    }
}

// =============================================================================
// Project Files
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub project_id: String,
    pub path: String,
    pub content: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn validate_file_path(path: &str) -> StoreResult<()> {
    if path.trim().is_empty() {
        return Err(StoreError::Invalid("file path must not be empty".to_string()));
    }
    Ok(())
}

// =============================================================================
// Notifications
// =============================================================================

/// Notification for one user, or a broadcast when `user_id` is `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub(crate) fn new(user_id: Option<&str>, kind: &str, payload: Value) -> StoreResult<Self> {
        if kind.trim().is_empty() {
            return Err(StoreError::Invalid(
                "notification type must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id: new_id(),
            user_id: user_id.map(String::from),
            kind: kind.to_string(),
            payload,
            created_at: now(),
        })
    }

    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.user_id.as_deref().is_none_or(|u| u == user_id)
    }
}

// =============================================================================
// CI Workflow Runs
// =============================================================================

/// One CI run of a repository, keyed by `run_id` within (owner, repo)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub run_id: i64,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    pub html_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Normalize timestamps to storage precision
    pub(crate) fn normalized(&self) -> Self {
        Self {
            created_at: self.created_at.trunc_subsecs(6),
            updated_at: self.updated_at.trunc_subsecs(6),
            ..self.clone()
        }
    }
}

/// Newest first, then highest run id
pub(crate) fn sort_runs(runs: &mut [WorkflowRun]) {
    runs.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.run_id.cmp(&a.run_id))
    });
}
