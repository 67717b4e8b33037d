use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A project in the project forest.
///
/// Projects nest through `parent_id`. Siblings are displayed by `position`,
/// then by name. The `identifier` is a unique, URL-friendly slug that can be
/// used anywhere an id is accepted (see [`ProjectRef`]).
///
/// # Invariants
/// - The parent/child graph never contains a cycle.
/// - An active project never sits below an archived one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub identifier: String,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub status: ProjectStatus,
    pub parent_id: Option<Uuid>,
    pub position: i64,
    /// Bumped by every structural write; used for optimistic locking.
    pub lock_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn is_active(&self) -> bool {
        self.status == ProjectStatus::Active
    }
}

/// The lifecycle status of a project.
///
/// - `Active`: Visible and writable
/// - `Archived`: Frozen; hidden from every listing and feed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// A project lookup key: either the UUID or the identifier slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectRef {
    Id(Uuid),
    Identifier(String),
}

impl FromStr for ProjectRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match Uuid::parse_str(s) {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Identifier(s.to_string()),
        })
    }
}

impl From<Uuid> for ProjectRef {
    fn from(id: Uuid) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ProjectRef {
    fn from(identifier: &str) -> Self {
        Self::Identifier(identifier.to_string())
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Identifier(identifier) => f.write_str(identifier),
        }
    }
}

/// Maximum length of a project identifier.
pub const IDENTIFIER_MAX_LENGTH: usize = 100;

/// Check a project identifier against the slug rules.
///
/// Identifiers are lowercase letters, digits, dashes and underscores. They
/// cannot be purely numeric (that would be ambiguous with numeric ids in
/// URLs) and `new` is reserved.
pub fn validate_identifier(identifier: &str) -> Result<(), String> {
    if identifier.is_empty() || identifier.len() > IDENTIFIER_MAX_LENGTH {
        return Err(format!(
            "identifier must be between 1 and {} characters",
            IDENTIFIER_MAX_LENGTH
        ));
    }
    if !identifier
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(format!(
            "identifier '{}' may only contain a-z, 0-9, '-' and '_'",
            identifier
        ));
    }
    if identifier.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("identifier '{}' cannot be only digits", identifier));
    }
    if identifier == "new" {
        return Err("identifier 'new' is reserved".to_string());
    }
    Ok(())
}

/// Input for creating a new project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub identifier: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    /// Parent project. `None` creates a root project.
    pub parent_id: Option<Uuid>,
    /// Display position among siblings. Appended last if not specified.
    pub position: Option<i64>,
}

fn default_true() -> bool {
    true
}

/// A project with its nested children, used for tree responses.
///
/// The `project` fields are flattened into the JSON output, with an additional
/// `children` array containing nested `ProjectTreeNode` objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTreeNode {
    #[serde(flatten)]
    pub project: Project,
    pub children: Vec<ProjectTreeNode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_ref_parses_uuid_or_identifier() {
        let id = Uuid::new_v4();
        assert_eq!(
            id.to_string().parse::<ProjectRef>().unwrap(),
            ProjectRef::Id(id)
        );
        assert_eq!(
            "ecookbook".parse::<ProjectRef>().unwrap(),
            ProjectRef::Identifier("ecookbook".to_string())
        );
    }

    #[test]
    fn test_identifier_rules() {
        assert!(validate_identifier("ecookbook").is_ok());
        assert!(validate_identifier("sub-project_2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("Upper").is_err());
        assert!(validate_identifier("with space").is_err());
        assert!(validate_identifier("1234").is_err());
        assert!(validate_identifier("new").is_err());
        assert!(validate_identifier(&"a".repeat(101)).is_err());
    }
}
