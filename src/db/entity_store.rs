use chrono::Utc;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use super::*;
use crate::store::{EntityStore, EventFilter};

/// Every project id in the subtree rooted at `?1`, the root included.
const SUBTREE_CTE: &str = "WITH RECURSIVE subtree(id) AS (
        SELECT id FROM projects WHERE id = ?1
        UNION ALL
        SELECT p.id FROM projects p JOIN subtree s ON p.parent_id = s.id
    )";

pub(super) fn query_project(conn: &Connection, id: Uuid) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            &format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS),
            [id.to_string()],
            project_from_row,
        )
        .optional()?;
    Ok(project)
}

fn query_list<T>(
    conn: &Connection,
    sql: &str,
    params: &[String],
    map: impl FnMut(&Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let items = stmt
        .query_map(params_from_iter(params.iter()), map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

/// `WHERE` fragment and parameters shared by the activity stream queries.
///
/// `project_column`, `time_column` and `author_column` are fully qualified
/// column names. The caller checks that `filter.project_ids` is not empty.
fn event_conditions(
    filter: &EventFilter,
    project_column: &str,
    time_column: &str,
    author_column: &str,
) -> (String, Vec<String>) {
    let mut clause = format!(
        "{} IN ({}) AND {} >= ? AND {} <= ?",
        project_column,
        placeholders(filter.project_ids.len()),
        time_column,
        time_column
    );
    let mut params: Vec<String> = filter.project_ids.iter().map(|id| id.to_string()).collect();
    params.push(ts(&filter.window.from));
    params.push(ts(&filter.window.to));

    if let Some(author_id) = filter.author_id {
        clause.push_str(&format!(" AND {} = ?", author_column));
        params.push(author_id.to_string());
    }

    (clause, params)
}

fn next_sibling_position(conn: &Connection, parent_id: Option<Uuid>) -> Result<i64> {
    let position = conn.query_row(
        "SELECT COALESCE(MAX(position), 0) + 1 FROM projects WHERE parent_id IS ?",
        [parent_id.map(|u| u.to_string())],
        |row| row.get(0),
    )?;
    Ok(position)
}

impl EntityStore for Database {
    // ============================================================
    // Projects
    // ============================================================

    fn find_project(&self, key: &ProjectRef) -> Result<Option<Project>> {
        let conn = self.lock();
        match key {
            ProjectRef::Id(id) => query_project(&conn, *id),
            ProjectRef::Identifier(identifier) => {
                let project = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM projects WHERE identifier = ?",
                            PROJECT_COLUMNS
                        ),
                        [identifier],
                        project_from_row,
                    )
                    .optional()?;
                Ok(project)
            }
        }
    }

    fn all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {} FROM projects ORDER BY position, name, id",
                PROJECT_COLUMNS
            ),
            &[],
            project_from_row,
        )
    }

    fn children_of(&self, project_id: Uuid) -> Result<Vec<Project>> {
        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {} FROM projects WHERE parent_id = ? ORDER BY position, name, id",
                PROJECT_COLUMNS
            ),
            &[project_id.to_string()],
            project_from_row,
        )
    }

    fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        validate_identifier(&input.identifier).map_err(Error::Validation)?;
        if input.name.trim().is_empty() {
            return Err(Error::Validation("project name cannot be empty".to_string()));
        }

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let taken: i64 = tx.query_row(
            "SELECT COUNT(*) FROM projects WHERE identifier = ?",
            [&input.identifier],
            |row| row.get(0),
        )?;
        if taken > 0 {
            return Err(Error::Validation(format!(
                "identifier '{}' is already taken",
                input.identifier
            )));
        }

        if let Some(parent_id) = input.parent_id {
            let parent = query_project(&tx, parent_id)?
                .ok_or_else(|| Error::not_found("project", parent_id))?;
            if !parent.is_active() {
                return Err(Error::InvalidState(format!(
                    "cannot create a subproject of archived project '{}'",
                    parent.identifier
                )));
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let position = match input.position {
            Some(position) => position,
            None => next_sibling_position(&tx, input.parent_id)?,
        };

        tx.execute(
            "INSERT INTO projects (id, identifier, name, description, is_public, status, parent_id, position, lock_version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
            (
                id.to_string(),
                &input.identifier,
                &input.name,
                &input.description,
                input.is_public,
                ProjectStatus::Active.as_str(),
                input.parent_id.map(|u| u.to_string()),
                position,
                ts(&now),
                ts(&now),
            ),
        )?;
        tx.commit()?;

        Ok(Project {
            id,
            identifier: input.identifier,
            name: input.name,
            description: input.description,
            is_public: input.is_public,
            status: ProjectStatus::Active,
            parent_id: input.parent_id,
            position,
            lock_version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    fn move_project(
        &self,
        id: Uuid,
        new_parent: Option<Uuid>,
        expected_lock_version: i64,
    ) -> Result<Project> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let project = query_project(&tx, id)?.ok_or_else(|| Error::not_found("project", id))?;
        if project.lock_version != expected_lock_version {
            return Err(Error::Conflict(id));
        }

        if let Some(parent_id) = new_parent {
            let parent = query_project(&tx, parent_id)?
                .ok_or_else(|| Error::not_found("project", parent_id))?;

            let in_subtree: i64 = tx.query_row(
                &format!("{} SELECT COUNT(*) FROM subtree WHERE id = ?2", SUBTREE_CTE),
                (id.to_string(), parent_id.to_string()),
                |row| row.get(0),
            )?;
            if in_subtree > 0 {
                return Err(Error::Cycle {
                    project: id,
                    parent: parent_id,
                });
            }

            if project.is_active() && !parent.is_active() {
                return Err(Error::InvalidState(format!(
                    "cannot move active project '{}' under archived project '{}'",
                    project.identifier, parent.identifier
                )));
            }
        }

        let position = next_sibling_position(&tx, new_parent)?;
        tx.execute(
            "UPDATE projects SET parent_id = ?, position = ?, lock_version = lock_version + 1, updated_at = ?
             WHERE id = ?",
            (
                new_parent.map(|u| u.to_string()),
                position,
                ts(&Utc::now()),
                id.to_string(),
            ),
        )?;

        let moved = query_project(&tx, id)?.ok_or_else(|| Error::not_found("project", id))?;
        tx.commit()?;
        Ok(moved)
    }

    fn archive_subtree(&self, id: Uuid) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        query_project(&tx, id)?.ok_or_else(|| Error::not_found("project", id))?;

        let changed = tx.execute(
            &format!(
                "{} UPDATE projects SET status = 'archived', lock_version = lock_version + 1, updated_at = ?2
                 WHERE status = 'active' AND id IN (SELECT id FROM subtree)",
                SUBTREE_CTE
            ),
            (id.to_string(), ts(&Utc::now())),
        )?;
        tx.commit()?;
        Ok(changed)
    }

    fn unarchive_project(&self, id: Uuid) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let project = query_project(&tx, id)?.ok_or_else(|| Error::not_found("project", id))?;
        if project.is_active() {
            return Ok(());
        }

        let archived_ancestors: i64 = tx.query_row(
            "WITH RECURSIVE chain(id, parent_id, status) AS (
                SELECT p.id, p.parent_id, p.status FROM projects p
                WHERE p.id = (SELECT parent_id FROM projects WHERE id = ?1)
                UNION ALL
                SELECT p.id, p.parent_id, p.status FROM projects p JOIN chain c ON p.id = c.parent_id
            )
            SELECT COUNT(*) FROM chain WHERE status = 'archived'",
            [id.to_string()],
            |row| row.get(0),
        )?;
        if archived_ancestors > 0 {
            return Err(Error::InvalidState(format!(
                "project '{}' has an archived ancestor",
                project.identifier
            )));
        }

        tx.execute(
            "UPDATE projects SET status = 'active', lock_version = lock_version + 1, updated_at = ? WHERE id = ?",
            (ts(&Utc::now()), id.to_string()),
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_project(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Attachments carry no foreign key, so the cascade below cannot reach them.
        tx.execute(
            &format!(
                "{} DELETE FROM attachments
                 WHERE (container_type = 'project' AND container_id IN (SELECT id FROM subtree))
                    OR (container_type = 'version' AND container_id IN (
                        SELECT v.id FROM versions v WHERE v.project_id IN (SELECT id FROM subtree)))",
                SUBTREE_CTE
            ),
            [id.to_string()],
        )?;

        let rows = tx.execute("DELETE FROM projects WHERE id = ?", [id.to_string()])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    // ============================================================
    // People
    // ============================================================

    fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.lock();
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                [id.to_string()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn memberships_of_user(&self, user_id: Uuid) -> Result<Vec<Membership>> {
        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {} FROM members WHERE user_id = ? ORDER BY created_at, id",
                MEMBER_COLUMNS
            ),
            &[user_id.to_string()],
            membership_from_row,
        )
    }

    fn add_member(&self, project_id: Uuid, user_id: Uuid, role: Role) -> Result<Membership> {
        let conn = self.lock();

        query_project(&conn, project_id)?.ok_or_else(|| Error::not_found("project", project_id))?;
        let user_exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        if user_exists == 0 {
            return Err(Error::not_found("user", user_id));
        }

        conn.execute(
            "INSERT INTO members (id, project_id, user_id, role, created_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (project_id, user_id) DO UPDATE SET role = excluded.role",
            (
                Uuid::new_v4().to_string(),
                project_id.to_string(),
                user_id.to_string(),
                role.as_str(),
                ts(&Utc::now()),
            ),
        )?;

        let membership = conn.query_row(
            &format!(
                "SELECT {} FROM members WHERE project_id = ? AND user_id = ?",
                MEMBER_COLUMNS
            ),
            (project_id.to_string(), user_id.to_string()),
            membership_from_row,
        )?;
        Ok(membership)
    }

    // ============================================================
    // Versions
    // ============================================================

    fn create_version(&self, project_id: Uuid, input: CreateVersionInput) -> Result<Version> {
        let conn = self.lock();

        query_project(&conn, project_id)?
            .ok_or_else(|| Error::not_found("project", project_id))?;

        let taken: i64 = conn.query_row(
            "SELECT COUNT(*) FROM versions WHERE project_id = ? AND name = ?",
            (project_id.to_string(), &input.name),
            |row| row.get(0),
        )?;
        if taken > 0 {
            return Err(Error::Validation(format!(
                "version '{}' already exists in this project",
                input.name
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO versions (id, project_id, name, description, due_date, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                project_id.to_string(),
                &input.name,
                &input.description,
                input.due_date.map(|d| d.to_string()),
                ts(&now),
                ts(&now),
            ),
        )?;

        Ok(Version {
            id,
            project_id,
            name: input.name,
            description: input.description,
            due_date: input.due_date,
            created_at: now,
            updated_at: now,
        })
    }

    fn versions_of(&self, project_id: Uuid) -> Result<Vec<Version>> {
        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {} FROM versions WHERE project_id = ?
                 ORDER BY due_date IS NULL, due_date, name, id",
                VERSION_COLUMNS
            ),
            &[project_id.to_string()],
            version_from_row,
        )
    }

    fn find_version(&self, id: Uuid) -> Result<Option<Version>> {
        let conn = self.lock();
        let version = conn
            .query_row(
                &format!("SELECT {} FROM versions WHERE id = ?", VERSION_COLUMNS),
                [id.to_string()],
                version_from_row,
            )
            .optional()?;
        Ok(version)
    }

    fn version_progress(&self, version_id: Uuid) -> Result<VersionProgress> {
        let conn = self.lock();
        let progress = conn.query_row(
            "SELECT COALESCE(SUM(CASE WHEN s.is_closed THEN 0 ELSE 1 END), 0),
                    COALESCE(SUM(CASE WHEN s.is_closed THEN 1 ELSE 0 END), 0)
             FROM issues i JOIN issue_statuses s ON s.id = i.status_id
             WHERE i.fixed_version_id = ?",
            [version_id.to_string()],
            |row| {
                Ok(VersionProgress {
                    open_issues: row.get(0)?,
                    closed_issues: row.get(1)?,
                })
            },
        )?;
        Ok(progress)
    }

    // ============================================================
    // Issues
    // ============================================================

    fn issue_statuses(&self) -> Result<Vec<IssueStatus>> {
        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {} FROM issue_statuses ORDER BY position, name",
                STATUS_COLUMNS
            ),
            &[],
            status_from_row,
        )
    }

    fn create_issue_status(&self, input: CreateIssueStatusInput) -> Result<IssueStatus> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let taken: i64 = tx.query_row(
            "SELECT COUNT(*) FROM issue_statuses WHERE name = ?",
            [&input.name],
            |row| row.get(0),
        )?;
        if taken > 0 {
            return Err(Error::Validation(format!(
                "status '{}' already exists",
                input.name
            )));
        }

        if input.is_default {
            tx.execute("UPDATE issue_statuses SET is_default = 0", [])?;
        }

        let id = Uuid::new_v4();
        let position: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM issue_statuses",
            [],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO issue_statuses (id, name, is_closed, is_default, position) VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                input.is_closed,
                input.is_default,
                position,
            ),
        )?;
        tx.commit()?;

        Ok(IssueStatus {
            id,
            name: input.name,
            is_closed: input.is_closed,
            is_default: input.is_default,
            position,
        })
    }

    fn update_issue_status(
        &self,
        id: Uuid,
        input: UpdateIssueStatusInput,
    ) -> Result<Option<IssueStatus>> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                &format!("SELECT {} FROM issue_statuses WHERE id = ?", STATUS_COLUMNS),
                [id.to_string()],
                status_from_row,
            )
            .optional()?;
        let Some(existing) = existing else {
            return Ok(None);
        };

        let name = input.name.unwrap_or_else(|| existing.name.clone());
        if name != existing.name {
            let taken: i64 = tx.query_row(
                "SELECT COUNT(*) FROM issue_statuses WHERE name = ? AND id != ?",
                (&name, id.to_string()),
                |row| row.get(0),
            )?;
            if taken > 0 {
                return Err(Error::Validation(format!("status '{}' already exists", name)));
            }
        }

        let is_closed = input.is_closed.unwrap_or(existing.is_closed);
        let is_default = input.is_default.unwrap_or(existing.is_default);
        if is_default && !existing.is_default {
            tx.execute("UPDATE issue_statuses SET is_default = 0", [])?;
        }

        tx.execute(
            "UPDATE issue_statuses SET name = ?, is_closed = ?, is_default = ? WHERE id = ?",
            (&name, is_closed, is_default, id.to_string()),
        )?;
        tx.commit()?;

        Ok(Some(IssueStatus {
            name,
            is_closed,
            is_default,
            ..existing
        }))
    }

    fn delete_issue_status(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM issue_statuses WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    fn issue_status_in_use(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock();
        let uses: i64 = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM issues WHERE status_id = ?1)
                  + (SELECT COUNT(*) FROM journals WHERE old_status_id = ?1 OR new_status_id = ?1)",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(uses > 0)
    }

    fn reorder_issue_statuses(&self, ordered: &[Uuid]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for (index, id) in ordered.iter().enumerate() {
            tx.execute(
                "UPDATE issue_statuses SET position = ? WHERE id = ?",
                (index as i64 + 1, id.to_string()),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn issues_created_in(&self, filter: &EventFilter) -> Result<Vec<Issue>> {
        if filter.project_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (conditions, params) =
            event_conditions(filter, "i.project_id", "i.created_at", "i.author_id");

        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {} FROM issues i WHERE {} ORDER BY i.created_at DESC, i.id",
                ISSUE_COLUMNS, conditions
            ),
            &params,
            |row| issue_from_row(row, 0),
        )
    }

    fn journals_in(&self, filter: &EventFilter) -> Result<Vec<IssueJournal>> {
        if filter.project_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (conditions, params) =
            event_conditions(filter, "i.project_id", "j.created_at", "j.author_id");

        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {}, {} FROM journals j JOIN issues i ON i.id = j.issue_id
                 WHERE {} ORDER BY j.created_at DESC, j.id",
                JOURNAL_COLUMNS, ISSUE_COLUMNS, conditions
            ),
            &params,
            |row| {
                Ok(IssueJournal {
                    journal: journal_from_row(row)?,
                    issue: issue_from_row(row, 7)?,
                })
            },
        )
    }

    // ============================================================
    // News
    // ============================================================

    fn news_of(&self, project_ids: &[Uuid], limit: u32, offset: u64) -> Result<Vec<News>> {
        if project_ids.is_empty() {
            return Ok(Vec::new());
        }
        let params: Vec<String> = project_ids.iter().map(|id| id.to_string()).collect();

        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {} FROM news n WHERE n.project_id IN ({})
                 ORDER BY n.created_at DESC, n.id LIMIT {} OFFSET {}",
                NEWS_COLUMNS,
                placeholders(params.len()),
                limit,
                offset
            ),
            &params,
            news_from_row,
        )
    }

    fn count_news(&self, project_ids: &[Uuid]) -> Result<u64> {
        if project_ids.is_empty() {
            return Ok(0);
        }
        let params: Vec<String> = project_ids.iter().map(|id| id.to_string()).collect();

        let conn = self.lock();
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM news WHERE project_id IN ({})",
                placeholders(params.len())
            ),
            params_from_iter(params.iter()),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn news_in(&self, filter: &EventFilter) -> Result<Vec<News>> {
        if filter.project_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (conditions, params) =
            event_conditions(filter, "n.project_id", "n.created_at", "n.author_id");

        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {} FROM news n WHERE {} ORDER BY n.created_at DESC, n.id",
                NEWS_COLUMNS, conditions
            ),
            &params,
            news_from_row,
        )
    }

    fn find_news(&self, id: Uuid) -> Result<Option<News>> {
        let conn = self.lock();
        let news = conn
            .query_row(
                &format!("SELECT {} FROM news n WHERE n.id = ?", NEWS_COLUMNS),
                [id.to_string()],
                news_from_row,
            )
            .optional()?;
        Ok(news)
    }

    fn create_news(
        &self,
        project_id: Uuid,
        author_id: Uuid,
        input: CreateNewsInput,
    ) -> Result<News> {
        let conn = self.lock();
        query_project(&conn, project_id)?.ok_or_else(|| Error::not_found("project", project_id))?;

        let id = Uuid::new_v4();
        let created_at = input.created_at.unwrap_or_else(Utc::now);

        conn.execute(
            "INSERT INTO news (id, project_id, title, summary, description, author_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                project_id.to_string(),
                &input.title,
                &input.summary,
                &input.description,
                author_id.to_string(),
                ts(&created_at),
            ),
        )?;

        Ok(News {
            id,
            project_id,
            title: input.title,
            summary: input.summary,
            description: input.description,
            author_id,
            comments_count: 0,
            created_at,
        })
    }

    fn update_news(&self, id: Uuid, input: UpdateNewsInput) -> Result<Option<News>> {
        let conn = self.lock();
        let existing = conn
            .query_row(
                &format!("SELECT {} FROM news n WHERE n.id = ?", NEWS_COLUMNS),
                [id.to_string()],
                news_from_row,
            )
            .optional()?;
        let Some(existing) = existing else {
            return Ok(None);
        };

        let news = News {
            title: input.title.unwrap_or(existing.title),
            summary: input.summary.or(existing.summary),
            description: input.description.unwrap_or(existing.description),
            ..existing
        };
        conn.execute(
            "UPDATE news SET title = ?, summary = ?, description = ? WHERE id = ?",
            (&news.title, &news.summary, &news.description, id.to_string()),
        )?;
        Ok(Some(news))
    }

    fn delete_news(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM news WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    fn comments_of(&self, news_id: Uuid) -> Result<Vec<Comment>> {
        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {} FROM comments WHERE news_id = ? ORDER BY created_at, id",
                COMMENT_COLUMNS
            ),
            &[news_id.to_string()],
            comment_from_row,
        )
    }

    fn create_comment(&self, news_id: Uuid, author_id: Uuid, content: &str) -> Result<Comment> {
        let conn = self.lock();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM news WHERE id = ?",
            [news_id.to_string()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(Error::not_found("news", news_id));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO comments (id, news_id, author_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                news_id.to_string(),
                author_id.to_string(),
                content,
                ts(&now),
            ),
        )?;

        Ok(Comment {
            id,
            news_id,
            author_id,
            content: content.to_string(),
            created_at: now,
        })
    }

    fn delete_comment(&self, news_id: Uuid, comment_id: Uuid) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute(
            "DELETE FROM comments WHERE id = ? AND news_id = ?",
            (comment_id.to_string(), news_id.to_string()),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Attachments
    // ============================================================

    fn attachments_of(&self, container: &AttachmentContainer) -> Result<Vec<Attachment>> {
        let conn = self.lock();
        query_list(
            &conn,
            &format!(
                "SELECT {} FROM attachments WHERE container_type = ? AND container_id = ?
                 ORDER BY created_at DESC, id",
                ATTACHMENT_COLUMNS
            ),
            &[
                container.kind.as_str().to_string(),
                container.id.to_string(),
            ],
            attachment_from_row,
        )
    }

    fn attachments_in(
        &self,
        containers: &[AttachmentContainer],
        author_id: Option<Uuid>,
        window: &ActivityWindow,
    ) -> Result<Vec<Attachment>> {
        let mut by_kind: Vec<String> = Vec::new();
        let mut params: Vec<String> = Vec::new();
        for kind in [ContainerKind::Project, ContainerKind::Version] {
            let ids: Vec<String> = containers
                .iter()
                .filter(|c| c.kind == kind)
                .map(|c| c.id.to_string())
                .collect();
            if ids.is_empty() {
                continue;
            }
            by_kind.push(format!(
                "(container_type = ? AND container_id IN ({}))",
                placeholders(ids.len())
            ));
            params.push(kind.as_str().to_string());
            params.extend(ids);
        }
        if by_kind.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {} FROM attachments WHERE ({}) AND created_at >= ? AND created_at <= ?",
            ATTACHMENT_COLUMNS,
            by_kind.join(" OR ")
        );
        params.push(ts(&window.from));
        params.push(ts(&window.to));
        if let Some(author_id) = author_id {
            sql.push_str(" AND author_id = ?");
            params.push(author_id.to_string());
        }
        sql.push_str(" ORDER BY created_at DESC, id");

        let conn = self.lock();
        query_list(&conn, &sql, &params, attachment_from_row)
    }

    fn create_attachment(
        &self,
        container: AttachmentContainer,
        input: CreateAttachmentInput,
    ) -> Result<Attachment> {
        let conn = self.lock();

        let table = match container.kind {
            ContainerKind::Project => "projects",
            ContainerKind::Version => "versions",
        };
        let exists: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE id = ?", table),
            [container.id.to_string()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(Error::not_found(container.kind.as_str(), container.id));
        }

        let id = Uuid::new_v4();
        let created_at = input.created_at.unwrap_or_else(Utc::now);
        conn.execute(
            "INSERT INTO attachments (id, container_type, container_id, filename, filesize, content_type, author_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                container.kind.as_str(),
                container.id.to_string(),
                &input.filename,
                input.filesize,
                &input.content_type,
                input.author_id.to_string(),
                ts(&created_at),
            ),
        )?;

        Ok(Attachment {
            id,
            container,
            filename: input.filename,
            filesize: input.filesize,
            content_type: input.content_type,
            author_id: input.author_id,
            created_at,
        })
    }
}
