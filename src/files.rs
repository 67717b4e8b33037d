//! Files attached to projects and their versions.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;
use crate::visibility::Visibility;

pub struct FilesService<'a> {
    visibility: &'a Visibility<'a>,
}

impl<'a> FilesService<'a> {
    pub fn new(visibility: &'a Visibility<'a>) -> Self {
        Self { visibility }
    }

    /// Containers holding files: the project first, then its versions in
    /// roadmap order. Attachments are newest first. Empty containers are left out.
    pub fn list(&self, actor: &Actor, project: &ProjectRef) -> Result<Vec<FileContainer>> {
        let project = self.visibility.find_visible(actor, project)?;
        let store = self.visibility.tree().store();

        let mut containers = vec![(AttachmentContainer::project(project.id), project.name.clone())];
        containers.extend(
            store
                .versions_of(project.id)?
                .into_iter()
                .map(|v| (AttachmentContainer::version(v.id), v.name)),
        );

        let mut listing = Vec::new();
        for (container, label) in containers {
            let attachments = store.attachments_of(&container)?;
            if !attachments.is_empty() {
                listing.push(FileContainer {
                    container,
                    label,
                    attachments,
                });
            }
        }
        Ok(listing)
    }

    /// Register an uploaded file on the project, or on one of its versions.
    /// The actor becomes the author.
    pub fn add(
        &self,
        actor: &Actor,
        project: &ProjectRef,
        version_id: Option<Uuid>,
        input: CreateAttachmentInput,
    ) -> Result<Attachment> {
        let project = self.visibility.find_visible(actor, project)?;
        let author_id = match actor.id() {
            Some(id) if self.visibility.authorizer().can_manage(actor, &project)? => id,
            _ => {
                return Err(Error::Permission(format!(
                    "{} cannot add files to '{}'",
                    actor.label(),
                    project.identifier
                )))
            }
        };

        if input.filename.trim().is_empty() {
            return Err(Error::Validation("filename cannot be empty".to_string()));
        }
        if input.filesize < 0 {
            return Err(Error::Validation("filesize cannot be negative".to_string()));
        }

        let store = self.visibility.tree().store();
        let container = match version_id {
            None => AttachmentContainer::project(project.id),
            Some(version_id) => {
                let version = store
                    .find_version(version_id)?
                    .ok_or_else(|| Error::not_found("version", version_id))?;
                if version.project_id != project.id {
                    return Err(Error::Validation(format!(
                        "version '{}' does not belong to '{}'",
                        version.name, project.identifier
                    )));
                }
                AttachmentContainer::version(version.id)
            }
        };

        let attachment = store.create_attachment(
            container,
            CreateAttachmentInput {
                author_id,
                ..input
            },
        )?;
        tracing::info!(
            "{} added file '{}' to '{}'",
            actor.label(),
            attachment.filename,
            project.identifier
        );
        Ok(attachment)
    }
}
