//! Administration of the issue status taxonomy.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;
use crate::store::EntityStore;

/// Where to move a status in the ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMove {
    Higher,
    Lower,
    Highest,
    Lowest,
}

impl StatusMove {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Higher => "higher",
            Self::Lower => "lower",
            Self::Highest => "highest",
            Self::Lowest => "lowest",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "higher" => Some(Self::Higher),
            "lower" => Some(Self::Lower),
            "highest" => Some(Self::Highest),
            "lowest" => Some(Self::Lowest),
            _ => None,
        }
    }

    /// Target index for an item at `index` in a list of `len` items.
    fn target(&self, index: usize, len: usize) -> usize {
        match self {
            Self::Higher => index.saturating_sub(1),
            Self::Lower => (index + 1).min(len.saturating_sub(1)),
            Self::Highest => 0,
            Self::Lowest => len.saturating_sub(1),
        }
    }
}

pub struct StatusService<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> StatusService<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    pub fn list(&self, actor: &Actor) -> Result<Vec<IssueStatus>> {
        require_admin(actor)?;
        self.store.issue_statuses()
    }

    pub fn create(&self, actor: &Actor, input: CreateIssueStatusInput) -> Result<IssueStatus> {
        require_admin(actor)?;
        let input = CreateIssueStatusInput {
            name: validate_name(&input.name)?,
            ..input
        };

        let status = self.store.create_issue_status(input)?;
        tracing::info!("{} created issue status '{}'", actor.label(), status.name);
        Ok(status)
    }

    pub fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateIssueStatusInput,
    ) -> Result<IssueStatus> {
        require_admin(actor)?;
        let input = UpdateIssueStatusInput {
            name: input.name.as_deref().map(validate_name).transpose()?,
            ..input
        };

        self.store
            .update_issue_status(id, input)?
            .ok_or_else(|| Error::not_found("issue status", id))
    }

    /// Delete a status no issue uses.
    pub fn delete(&self, actor: &Actor, id: Uuid) -> Result<()> {
        require_admin(actor)?;
        if self.store.issue_status_in_use(id)? {
            return Err(Error::InvalidState(
                "issue status is in use and cannot be deleted".to_string(),
            ));
        }
        if !self.store.delete_issue_status(id)? {
            return Err(Error::not_found("issue status", id));
        }
        tracing::info!("{} deleted issue status {}", actor.label(), id);
        Ok(())
    }

    /// Move a status within the ordering and renumber positions from 1.
    pub fn reorder(&self, actor: &Actor, id: Uuid, to: StatusMove) -> Result<Vec<IssueStatus>> {
        require_admin(actor)?;
        let mut ids: Vec<Uuid> = self
            .store
            .issue_statuses()?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let index = ids
            .iter()
            .position(|s| *s == id)
            .ok_or_else(|| Error::not_found("issue status", id))?;
        let target = to.target(index, ids.len());
        let moved = ids.remove(index);
        ids.insert(target, moved);

        self.store.reorder_issue_statuses(&ids)?;
        self.store.issue_statuses()
    }
}

fn require_admin(actor: &Actor) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(Error::Permission(
            "only administrators can manage issue statuses".to_string(),
        ))
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > STATUS_NAME_MAX_LENGTH {
        return Err(Error::Validation(format!(
            "status name must be between 1 and {} characters",
            STATUS_NAME_MAX_LENGTH
        )));
    }
    Ok(name.to_string())
}
