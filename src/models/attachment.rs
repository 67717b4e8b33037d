use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata of an uploaded file. The file content itself lives outside the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: Uuid,
    pub container: AttachmentContainer,
    pub filename: String,
    pub filesize: i64,
    pub content_type: Option<String>,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// What an attachment is attached to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AttachmentContainer {
    pub kind: ContainerKind,
    pub id: Uuid,
}

impl AttachmentContainer {
    pub fn project(id: Uuid) -> Self {
        Self {
            kind: ContainerKind::Project,
            id,
        }
    }

    pub fn version(id: Uuid) -> Self {
        Self {
            kind: ContainerKind::Version,
            id,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Project,
    Version,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Version => "version",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "project" => Some(Self::Project),
            "version" => Some(Self::Version),
            _ => None,
        }
    }
}

/// Resolves attachment containers to the project that owns them.
///
/// Projects own themselves; versions are looked up in a table keyed by
/// version id.
#[derive(Debug, Clone, Default)]
pub struct ContainerIndex {
    projects: HashSet<Uuid>,
    versions: HashMap<Uuid, Uuid>,
}

impl ContainerIndex {
    pub fn add_project(&mut self, project_id: Uuid) {
        self.projects.insert(project_id);
    }

    pub fn add_version(&mut self, version_id: Uuid, project_id: Uuid) {
        self.versions.insert(version_id, project_id);
    }

    pub fn owner(&self, container: &AttachmentContainer) -> Option<Uuid> {
        match container.kind {
            ContainerKind::Project => self.projects.get(&container.id).copied(),
            ContainerKind::Version => self.versions.get(&container.id).copied(),
        }
    }

    /// Every container known to the index, projects first.
    pub fn containers(&self) -> Vec<AttachmentContainer> {
        let mut projects: Vec<_> = self.projects.iter().copied().collect();
        projects.sort();
        let mut versions: Vec<_> = self.versions.keys().copied().collect();
        versions.sort();

        projects
            .into_iter()
            .map(AttachmentContainer::project)
            .chain(versions.into_iter().map(AttachmentContainer::version))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.versions.is_empty()
    }
}

/// Input for registering an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAttachmentInput {
    pub filename: String,
    pub filesize: i64,
    pub content_type: Option<String>,
    pub author_id: Uuid,
    /// Upload time. Defaults to now; set when importing existing records.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Attachments grouped under one container, for file listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContainer {
    pub container: AttachmentContainer,
    /// Project or version name.
    pub label: String,
    pub attachments: Vec<Attachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_resolves_by_kind() {
        let project = Uuid::new_v4();
        let version = Uuid::new_v4();
        let mut index = ContainerIndex::default();
        index.add_project(project);
        index.add_version(version, project);

        assert_eq!(index.owner(&AttachmentContainer::project(project)), Some(project));
        assert_eq!(index.owner(&AttachmentContainer::version(version)), Some(project));
        // A version id is not a project id, even if the uuid were reused.
        assert_eq!(index.owner(&AttachmentContainer::project(version)), None);
        assert_eq!(index.owner(&AttachmentContainer::version(Uuid::new_v4())), None);
    }

    #[test]
    fn test_containers_lists_projects_first() {
        let project = Uuid::new_v4();
        let version = Uuid::new_v4();
        let mut index = ContainerIndex::default();
        index.add_version(version, project);
        index.add_project(project);

        let containers = index.containers();
        assert_eq!(containers[0], AttachmentContainer::project(project));
        assert_eq!(containers[1], AttachmentContainer::version(version));
    }
}
