//! The query interface the core consumes from persistence.
//!
//! Everything in [`tree`](crate::tree), [`visibility`](crate::visibility),
//! [`activity`](crate::activity), [`roadmap`](crate::roadmap) and the other
//! services goes through this trait. [`Database`](crate::db::Database) is the
//! SQLite implementation.
//!
//! Lookups return `Ok(None)` for unknown ids; services decide whether that is
//! an error. Lists come back already ordered as documented on each method.

use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

/// Criteria shared by the activity stream queries.
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Projects whose events are wanted. Only visible projects belong here.
    pub project_ids: Vec<Uuid>,
    /// Restrict to events caused by this user.
    pub author_id: Option<Uuid>,
    pub window: ActivityWindow,
}

pub trait EntityStore: Send + Sync {
    // ============================================================
    // Projects
    // ============================================================

    fn find_project(&self, key: &ProjectRef) -> Result<Option<Project>>;

    /// Every project, ordered by `(position, name)`.
    fn all_projects(&self) -> Result<Vec<Project>>;

    /// Direct children, ordered by `(position, name)`.
    fn children_of(&self, project_id: Uuid) -> Result<Vec<Project>>;

    /// Insert a project. Fails with `Validation` on a duplicate identifier,
    /// `NotFound` for an unknown parent and `InvalidState` for an archived one.
    fn create_project(&self, input: CreateProjectInput) -> Result<Project>;

    /// Reparent a project atomically.
    ///
    /// Fails with `Conflict` when `expected_lock_version` is stale and with
    /// `Cycle` when `new_parent` lies in the project's subtree.
    fn move_project(
        &self,
        id: Uuid,
        new_parent: Option<Uuid>,
        expected_lock_version: i64,
    ) -> Result<Project>;

    /// Archive a project and all its descendants. Returns how many projects changed.
    fn archive_subtree(&self, id: Uuid) -> Result<usize>;

    /// Reactivate a single project. Fails with `InvalidState` if an ancestor is archived.
    fn unarchive_project(&self, id: Uuid) -> Result<()>;

    /// Delete a project; descendants and owned records go with it.
    fn delete_project(&self, id: Uuid) -> Result<bool>;

    // ============================================================
    // People
    // ============================================================

    fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    fn memberships_of_user(&self, user_id: Uuid) -> Result<Vec<Membership>>;

    /// Add a member, or change the role of an existing one.
    fn add_member(&self, project_id: Uuid, user_id: Uuid, role: Role) -> Result<Membership>;

    // ============================================================
    // Versions
    // ============================================================

    /// Insert a version. Fails with `Validation` when the project already
    /// has a version of that name.
    fn create_version(&self, project_id: Uuid, input: CreateVersionInput) -> Result<Version>;

    /// Versions of a project, dated ones first by due date, then by name.
    fn versions_of(&self, project_id: Uuid) -> Result<Vec<Version>>;

    fn find_version(&self, id: Uuid) -> Result<Option<Version>>;

    fn version_progress(&self, version_id: Uuid) -> Result<VersionProgress>;

    // ============================================================
    // Issues
    // ============================================================

    /// The status taxonomy, ordered by position.
    fn issue_statuses(&self) -> Result<Vec<IssueStatus>>;

    fn create_issue_status(&self, input: CreateIssueStatusInput) -> Result<IssueStatus>;

    fn update_issue_status(
        &self,
        id: Uuid,
        input: UpdateIssueStatusInput,
    ) -> Result<Option<IssueStatus>>;

    fn delete_issue_status(&self, id: Uuid) -> Result<bool>;

    fn issue_status_in_use(&self, id: Uuid) -> Result<bool>;

    /// Rewrite positions so that `ordered[i]` gets position `i + 1`.
    fn reorder_issue_statuses(&self, ordered: &[Uuid]) -> Result<()>;

    /// Issues created in the window, newest first (ties by id).
    fn issues_created_in(&self, filter: &EventFilter) -> Result<Vec<Issue>>;

    /// Journals written in the window, newest first (ties by journal id).
    fn journals_in(&self, filter: &EventFilter) -> Result<Vec<IssueJournal>>;

    // ============================================================
    // News
    // ============================================================

    /// News of the given projects, newest first.
    fn news_of(&self, project_ids: &[Uuid], limit: u32, offset: u64) -> Result<Vec<News>>;

    fn count_news(&self, project_ids: &[Uuid]) -> Result<u64>;

    /// News posted in the window, newest first (ties by id).
    fn news_in(&self, filter: &EventFilter) -> Result<Vec<News>>;

    fn find_news(&self, id: Uuid) -> Result<Option<News>>;

    fn create_news(&self, project_id: Uuid, author_id: Uuid, input: CreateNewsInput)
        -> Result<News>;

    /// Apply a partial edit. `Ok(None)` for an unknown news item.
    fn update_news(&self, id: Uuid, input: UpdateNewsInput) -> Result<Option<News>>;

    /// Delete a news item and its comments.
    fn delete_news(&self, id: Uuid) -> Result<bool>;

    /// Comments of a news item, oldest first.
    fn comments_of(&self, news_id: Uuid) -> Result<Vec<Comment>>;

    fn create_comment(&self, news_id: Uuid, author_id: Uuid, content: &str) -> Result<Comment>;

    /// Delete a comment of the given news item. Returns false if no such comment.
    fn delete_comment(&self, news_id: Uuid, comment_id: Uuid) -> Result<bool>;

    // ============================================================
    // Attachments
    // ============================================================

    /// Attachments of one container, newest first.
    fn attachments_of(&self, container: &AttachmentContainer) -> Result<Vec<Attachment>>;

    /// Attachments of the given containers uploaded in the window, newest first (ties by id).
    fn attachments_in(
        &self,
        containers: &[AttachmentContainer],
        author_id: Option<Uuid>,
        window: &ActivityWindow,
    ) -> Result<Vec<Attachment>>;

    fn create_attachment(
        &self,
        container: AttachmentContainer,
        input: CreateAttachmentInput,
    ) -> Result<Attachment>;
}
