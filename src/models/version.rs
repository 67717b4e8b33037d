use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A release milestone of a project.
///
/// Whether a version is completed is not stored: it is derived from the due
/// date and the state of the issues targeting it (see [`VersionProgress`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Version {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maximum length of a version name.
pub const VERSION_NAME_MAX_LENGTH: usize = 60;

/// Input for creating a new version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVersionInput {
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

/// Issue counts of a version, as of a reference day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionProgress {
    pub open_issues: u32,
    pub closed_issues: u32,
}

impl VersionProgress {
    pub fn total(&self) -> u32 {
        self.open_issues + self.closed_issues
    }

    /// Share of closed issues, in percent. A version without issues is 0% done.
    pub fn closed_percent(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => f64::from(self.closed_issues) * 100.0 / f64::from(total),
        }
    }

    /// A version is completed once its due date has passed (or is today) and
    /// no open issue targets it. Undated versions are never completed.
    pub fn is_completed(&self, due_date: Option<NaiveDate>, as_of: NaiveDate) -> bool {
        due_date.is_some_and(|due| due <= as_of) && self.open_issues == 0
    }
}
