use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An entry of the issue status taxonomy (e.g. New, Assigned, Resolved, Closed).
///
/// Statuses are ordered by `position`. Exactly one status at most is the
/// default given to new issues; `is_closed` decides whether an issue in that
/// status counts as done.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueStatus {
    pub id: Uuid,
    pub name: String,
    pub is_closed: bool,
    pub is_default: bool,
    pub position: i64,
}

/// Maximum length of an issue status name.
pub const STATUS_NAME_MAX_LENGTH: usize = 30;

/// Input for creating an issue status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIssueStatusInput {
    pub name: String,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default)]
    pub is_default: bool,
}

/// Input for updating an issue status. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateIssueStatusInput {
    pub name: Option<String>,
    pub is_closed: Option<bool>,
    pub is_default: Option<bool>,
}

/// A tracked issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: Uuid,
    /// Sequential, human-facing number (`#42`).
    pub number: i64,
    pub project_id: Uuid,
    pub subject: String,
    pub description: Option<String>,
    pub status_id: Uuid,
    /// The version this issue is planned for. Always a version of the same project.
    pub fixed_version_id: Option<Uuid>,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIssueInput {
    pub subject: String,
    pub description: Option<String>,
    /// Initial status. Defaults to the default status.
    pub status_id: Option<Uuid>,
    pub fixed_version_id: Option<Uuid>,
    pub author_id: Uuid,
    /// Creation time. Defaults to now; set when importing existing records.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for editing an issue. Every edit is recorded as a [`Journal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateIssueInput {
    /// Who performs the edit.
    pub author_id: Uuid,
    pub subject: Option<String>,
    pub status_id: Option<Uuid>,
    pub fixed_version_id: Option<Uuid>,
    pub notes: Option<String>,
    /// Edit time. Defaults to now; set when importing existing records.
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
}

/// One recorded edit of an issue.
///
/// Journals are the source of "issue-edit" activity. A journal carries the
/// status transition when the edit changed the status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Journal {
    pub id: Uuid,
    pub issue_id: Uuid,
    pub author_id: Uuid,
    pub notes: Option<String>,
    pub old_status_id: Option<Uuid>,
    pub new_status_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A journal joined with the issue it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueJournal {
    pub journal: Journal,
    pub issue: Issue,
}
