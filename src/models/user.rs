use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub name: String,
    /// Administrators see every active project and may archive projects.
    pub admin: bool,
    /// Display news comments newest first.
    pub comments_in_reverse_order: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserInput {
    pub login: String,
    pub name: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub comments_in_reverse_order: bool,
}

/// A user's membership in a project.
///
/// Memberships are inherited: a member of a project is treated as a member
/// of all its descendants with the same role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Membership {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The role a member holds in a project.
///
/// - `Manager`: Full control (subprojects, versions, news, files)
/// - `Developer`: Works on issues
/// - `Reporter`: Reports issues and comments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    Developer,
    Reporter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Developer => "developer",
            Self::Reporter => "reporter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manager" => Some(Self::Manager),
            "developer" => Some(Self::Developer),
            "reporter" => Some(Self::Reporter),
            _ => None,
        }
    }

    pub fn can_manage(&self) -> bool {
        matches!(self, Self::Manager)
    }
}

/// The user on whose behalf a query runs.
///
/// There is no ambient "current user": every operation that depends on who
/// is asking takes an `&Actor`.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    user: Option<User>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn user(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn as_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_logged(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.admin)
    }

    pub fn wants_comments_in_reverse_order(&self) -> bool {
        self.user
            .as_ref()
            .is_some_and(|u| u.comments_in_reverse_order)
    }

    /// Short label for log lines.
    pub fn label(&self) -> &str {
        self.user.as_ref().map_or("anonymous", |u| u.login.as_str())
    }
}
