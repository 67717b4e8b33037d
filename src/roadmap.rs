//! Release planning: the ordered versions of a project.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;
use crate::visibility::Visibility;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadmapQuery {
    /// Also list versions of visible subprojects.
    pub include_subprojects: bool,
    /// Keep versions that are already completed.
    pub include_completed: bool,
    /// Reference day for deciding completion.
    pub as_of: NaiveDate,
}

impl Default for RoadmapQuery {
    fn default() -> Self {
        Self {
            include_subprojects: false,
            include_completed: false,
            as_of: Utc::now().date_naive(),
        }
    }
}

/// A version on the roadmap with its progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadmapEntry {
    pub version: Version,
    pub project_id: Uuid,
    pub project_name: String,
    pub completed: bool,
    pub progress: VersionProgress,
}

pub struct Roadmap<'a> {
    visibility: &'a Visibility<'a>,
}

impl<'a> Roadmap<'a> {
    pub fn new(visibility: &'a Visibility<'a>) -> Self {
        Self { visibility }
    }

    /// Plan a new version of a project. Requires manage rights.
    pub fn create_version(
        &self,
        actor: &Actor,
        project: &ProjectRef,
        input: CreateVersionInput,
    ) -> Result<Version> {
        let project = self.visibility.find_visible(actor, project)?;
        if !actor.is_logged() || !self.visibility.authorizer().can_manage(actor, &project)? {
            return Err(Error::Permission(format!(
                "{} cannot add versions to '{}'",
                actor.label(),
                project.identifier
            )));
        }

        let name = input.name.trim();
        if name.is_empty() || name.chars().count() > VERSION_NAME_MAX_LENGTH {
            return Err(Error::Validation(format!(
                "version name must be between 1 and {} characters",
                VERSION_NAME_MAX_LENGTH
            )));
        }
        let input = CreateVersionInput {
            name: name.to_string(),
            ..input
        };

        let version = self
            .visibility
            .tree()
            .store()
            .create_version(project.id, input)?;
        tracing::info!(
            "{} added version '{}' to '{}'",
            actor.label(),
            version.name,
            project.identifier
        );
        Ok(version)
    }

    /// Versions of a project, dated ones first by due date, then undated
    /// ones. Ties are broken by name, then id.
    pub fn roadmap(
        &self,
        actor: &Actor,
        project: &ProjectRef,
        query: &RoadmapQuery,
    ) -> Result<Vec<RoadmapEntry>> {
        let project = self.visibility.find_visible(actor, project)?;
        let projects = if query.include_subprojects {
            self.visibility
                .visible_descendants(actor, project.id, true)?
        } else {
            vec![project]
        };

        let store = self.visibility.tree().store();
        let mut entries = Vec::new();
        for project in &projects {
            for version in store.versions_of(project.id)? {
                let progress = store.version_progress(version.id)?;
                let completed = progress.is_completed(version.due_date, query.as_of);
                if completed && !query.include_completed {
                    continue;
                }
                entries.push(RoadmapEntry {
                    version,
                    project_id: project.id,
                    project_name: project.name.clone(),
                    completed,
                    progress,
                });
            }
        }

        entries.sort_by(|a, b| {
            let (a, b) = (&a.version, &b.version);
            a.due_date
                .is_none()
                .cmp(&b.due_date.is_none())
                .then_with(|| a.due_date.cmp(&b.due_date))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });

        tracing::debug!(
            "Roadmap of {} projects for {}: {} versions",
            projects.len(),
            actor.label(),
            entries.len()
        );
        Ok(entries)
    }
}
