mod entity_store;
mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::*;

/// Busy timeout used when no configuration is given.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed entity store.
///
/// Cloning is cheap: clones share the same connection.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(default_path()?)
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open the database named by the configuration, or the default one.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = match &config.database_path {
            Some(path) => Self::open(path.clone())?,
            None => Self::open_default()?,
        };
        db.set_busy_timeout(config.store_timeout)?;
        Ok(db)
    }

    /// How long a statement waits on a locked database before failing with
    /// [`Error::StoreTimeout`].
    pub fn set_busy_timeout(&self, timeout: Duration) -> anyhow::Result<()> {
        self.lock().busy_timeout(timeout)?;
        Ok(())
    }

    pub fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.lock();
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    // ============================================================
    // User operations
    // ============================================================

    pub fn create_user(&self, input: CreateUserInput) -> Result<User> {
        let conn = self.lock();

        let taken: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE login = ?",
            [&input.login],
            |row| row.get(0),
        )?;
        if taken > 0 {
            return Err(Error::Validation(format!(
                "login '{}' is already taken",
                input.login
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (id, login, name, admin, comments_in_reverse_order, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.login,
                &input.name,
                input.admin,
                input.comments_in_reverse_order,
                ts(&now),
            ),
        )?;

        Ok(User {
            id,
            login: input.login,
            name: input.name,
            admin: input.admin,
            comments_in_reverse_order: input.comments_in_reverse_order,
            created_at: now,
        })
    }

    pub fn find_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let conn = self.lock();
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE login = ?", USER_COLUMNS),
                [login],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    // ============================================================
    // Issue operations
    // ============================================================

    pub fn get_issue(&self, id: Uuid) -> Result<Option<Issue>> {
        let conn = self.lock();
        query_issue(&conn, id)
    }

    pub fn create_issue(&self, project_id: Uuid, input: CreateIssueInput) -> Result<Issue> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        entity_store::query_project(&tx, project_id)?
            .ok_or_else(|| Error::not_found("project", project_id))?;

        let status_id = match input.status_id {
            Some(status_id) => {
                let exists: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM issue_statuses WHERE id = ?",
                    [status_id.to_string()],
                    |row| row.get(0),
                )?;
                if exists == 0 {
                    return Err(Error::not_found("issue status", status_id));
                }
                status_id
            }
            None => tx
                .query_row(
                    "SELECT id FROM issue_statuses ORDER BY is_default DESC, position LIMIT 1",
                    [],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .map(parse_uuid)
                .ok_or_else(|| Error::Validation("no issue status is configured".to_string()))?,
        };

        if let Some(version_id) = input.fixed_version_id {
            check_version_of_project(&tx, version_id, project_id)?;
        }

        let id = Uuid::new_v4();
        let created_at = input.created_at.unwrap_or_else(Utc::now);
        let number: i64 = tx.query_row(
            "SELECT COALESCE(MAX(number), 0) + 1 FROM issues",
            [],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO issues (id, number, project_id, subject, description, status_id, fixed_version_id, author_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                number,
                project_id.to_string(),
                &input.subject,
                &input.description,
                status_id.to_string(),
                input.fixed_version_id.map(|u| u.to_string()),
                input.author_id.to_string(),
                ts(&created_at),
                ts(&created_at),
            ),
        )?;
        tx.commit()?;

        Ok(Issue {
            id,
            number,
            project_id,
            subject: input.subject,
            description: input.description,
            status_id,
            fixed_version_id: input.fixed_version_id,
            author_id: input.author_id,
            created_at,
            updated_at: created_at,
        })
    }

    /// Apply an edit to an issue and record it in a journal.
    ///
    /// An edit that changes nothing and carries no notes leaves no journal.
    pub fn update_issue(&self, id: Uuid, input: UpdateIssueInput) -> Result<Option<Issue>> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(existing) = query_issue(&tx, id)? else {
            return Ok(None);
        };

        if let Some(version_id) = input.fixed_version_id {
            check_version_of_project(&tx, version_id, existing.project_id)?;
        }

        let status_id = input.status_id.unwrap_or(existing.status_id);
        let subject = input.subject.unwrap_or_else(|| existing.subject.clone());
        let fixed_version_id = input.fixed_version_id.or(existing.fixed_version_id);
        let status_changed = status_id != existing.status_id;
        let changed = status_changed
            || subject != existing.subject
            || fixed_version_id != existing.fixed_version_id;

        if !changed && input.notes.is_none() {
            return Ok(Some(existing));
        }

        let edited_at = input.edited_at.unwrap_or_else(Utc::now);

        tx.execute(
            "UPDATE issues SET subject = ?, status_id = ?, fixed_version_id = ?, updated_at = ? WHERE id = ?",
            (
                &subject,
                status_id.to_string(),
                fixed_version_id.map(|u| u.to_string()),
                ts(&edited_at),
                id.to_string(),
            ),
        )?;

        let (old_status_id, new_status_id) = if status_changed {
            (Some(existing.status_id), Some(status_id))
        } else {
            (None, None)
        };

        tx.execute(
            "INSERT INTO journals (id, issue_id, author_id, notes, old_status_id, new_status_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                id.to_string(),
                input.author_id.to_string(),
                &input.notes,
                old_status_id.map(|u| u.to_string()),
                new_status_id.map(|u| u.to_string()),
                ts(&edited_at),
            ),
        )?;
        tx.commit()?;

        Ok(Some(Issue {
            subject,
            status_id,
            fixed_version_id,
            updated_at: edited_at,
            ..existing
        }))
    }

    /// Journals of an issue, oldest first.
    pub fn get_journals(&self, issue_id: Uuid) -> Result<Vec<Journal>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM journals j WHERE j.issue_id = ? ORDER BY j.created_at, j.id",
            JOURNAL_COLUMNS
        ))?;

        let journals = stmt
            .query_map([issue_id.to_string()], journal_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(journals)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn default_path() -> anyhow::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "trellis")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("trellis.db"))
}

fn query_issue(conn: &Connection, id: Uuid) -> Result<Option<Issue>> {
    let issue = conn
        .query_row(
            &format!("SELECT {} FROM issues i WHERE i.id = ?", ISSUE_COLUMNS),
            [id.to_string()],
            |row| issue_from_row(row, 0),
        )
        .optional()?;
    Ok(issue)
}

fn check_version_of_project(conn: &Connection, version_id: Uuid, project_id: Uuid) -> Result<()> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT project_id FROM versions WHERE id = ?",
            [version_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    match owner.map(parse_uuid) {
        None => Err(Error::not_found("version", version_id)),
        Some(owner) if owner != project_id => Err(Error::Validation(
            "target version belongs to another project".to_string(),
        )),
        Some(_) => Ok(()),
    }
}

// ============================================================
// Row mapping
// ============================================================

const PROJECT_COLUMNS: &str = "id, identifier, name, description, is_public, status, parent_id, position, lock_version, created_at, updated_at";

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        identifier: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        is_public: row.get(4)?,
        status: ProjectStatus::from_str(&row.get::<_, String>(5)?)
            .unwrap_or(ProjectStatus::Active),
        parent_id: row.get::<_, Option<String>>(6)?.map(parse_uuid),
        position: row.get(7)?,
        lock_version: row.get(8)?,
        created_at: parse_datetime(row.get::<_, String>(9)?),
        updated_at: parse_datetime(row.get::<_, String>(10)?),
    })
}

const USER_COLUMNS: &str = "id, login, name, admin, comments_in_reverse_order, created_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(row.get::<_, String>(0)?),
        login: row.get(1)?,
        name: row.get(2)?,
        admin: row.get(3)?,
        comments_in_reverse_order: row.get(4)?,
        created_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

const MEMBER_COLUMNS: &str = "id, project_id, user_id, role, created_at";

fn membership_from_row(row: &Row) -> rusqlite::Result<Membership> {
    Ok(Membership {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        user_id: parse_uuid(row.get::<_, String>(2)?),
        role: Role::from_str(&row.get::<_, String>(3)?).unwrap_or(Role::Reporter),
        created_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

const VERSION_COLUMNS: &str = "id, project_id, name, description, due_date, created_at, updated_at";

fn version_from_row(row: &Row) -> rusqlite::Result<Version> {
    Ok(Version {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        due_date: row.get::<_, Option<String>>(4)?.and_then(parse_date),
        created_at: parse_datetime(row.get::<_, String>(5)?),
        updated_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

const STATUS_COLUMNS: &str = "id, name, is_closed, is_default, position";

fn status_from_row(row: &Row) -> rusqlite::Result<IssueStatus> {
    Ok(IssueStatus {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        is_closed: row.get(2)?,
        is_default: row.get(3)?,
        position: row.get(4)?,
    })
}

/// Issue columns, qualified with the `i` alias so they can be joined.
const ISSUE_COLUMNS: &str = "i.id, i.number, i.project_id, i.subject, i.description, i.status_id, i.fixed_version_id, i.author_id, i.created_at, i.updated_at";

fn issue_from_row(row: &Row, at: usize) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: parse_uuid(row.get::<_, String>(at)?),
        number: row.get(at + 1)?,
        project_id: parse_uuid(row.get::<_, String>(at + 2)?),
        subject: row.get(at + 3)?,
        description: row.get(at + 4)?,
        status_id: parse_uuid(row.get::<_, String>(at + 5)?),
        fixed_version_id: row.get::<_, Option<String>>(at + 6)?.map(parse_uuid),
        author_id: parse_uuid(row.get::<_, String>(at + 7)?),
        created_at: parse_datetime(row.get::<_, String>(at + 8)?),
        updated_at: parse_datetime(row.get::<_, String>(at + 9)?),
    })
}

/// Journal columns, qualified with the `j` alias. Seven columns.
const JOURNAL_COLUMNS: &str =
    "j.id, j.issue_id, j.author_id, j.notes, j.old_status_id, j.new_status_id, j.created_at";

fn journal_from_row(row: &Row) -> rusqlite::Result<Journal> {
    Ok(Journal {
        id: parse_uuid(row.get::<_, String>(0)?),
        issue_id: parse_uuid(row.get::<_, String>(1)?),
        author_id: parse_uuid(row.get::<_, String>(2)?),
        notes: row.get(3)?,
        old_status_id: row.get::<_, Option<String>>(4)?.map(parse_uuid),
        new_status_id: row.get::<_, Option<String>>(5)?.map(parse_uuid),
        created_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

const NEWS_COLUMNS: &str = "n.id, n.project_id, n.title, n.summary, n.description, n.author_id, \
     (SELECT COUNT(*) FROM comments c WHERE c.news_id = n.id), n.created_at";

fn news_from_row(row: &Row) -> rusqlite::Result<News> {
    Ok(News {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        title: row.get(2)?,
        summary: row.get(3)?,
        description: row.get(4)?,
        author_id: parse_uuid(row.get::<_, String>(5)?),
        comments_count: row.get(6)?,
        created_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

const COMMENT_COLUMNS: &str = "id, news_id, author_id, content, created_at";

fn comment_from_row(row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: parse_uuid(row.get::<_, String>(0)?),
        news_id: parse_uuid(row.get::<_, String>(1)?),
        author_id: parse_uuid(row.get::<_, String>(2)?),
        content: row.get(3)?,
        created_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

const ATTACHMENT_COLUMNS: &str =
    "id, container_type, container_id, filename, filesize, content_type, author_id, created_at";

fn attachment_from_row(row: &Row) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: parse_uuid(row.get::<_, String>(0)?),
        container: AttachmentContainer {
            kind: ContainerKind::from_str(&row.get::<_, String>(1)?)
                .unwrap_or(ContainerKind::Project),
            id: parse_uuid(row.get::<_, String>(2)?),
        },
        filename: row.get(3)?,
        filesize: row.get(4)?,
        content_type: row.get(5)?,
        author_id: parse_uuid(row.get::<_, String>(6)?),
        created_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

// ============================================================
// Value helpers
// ============================================================

/// Stored timestamp format: UTC, fixed width, so text order is time order.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `?, ?, ?` for an `IN (...)` list of `n` values.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_date(s: String) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_as_text() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 9, 59, 59).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1500);
        assert!(ts(&earlier) < ts(&later));
        assert_eq!(ts(&earlier).len(), ts(&later).len());
        assert_eq!(parse_datetime(ts(&later)), later);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
