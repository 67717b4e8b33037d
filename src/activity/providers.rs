use std::collections::HashMap;

use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::store::{EntityStore, EventFilter};

/// A source of activity events of one kind.
///
/// `produce_events` returns the events of the filter's projects and window,
/// already in feed order (see [`ActivityEvent::feed_order`]).
pub trait ActivityProvider {
    fn kind(&self) -> EventKind;

    fn produce_events(
        &self,
        store: &dyn EntityStore,
        filter: &EventFilter,
    ) -> Result<Vec<ActivityEvent>>;
}

/// The providers behind every feed, one per [`EventKind`].
pub const PROVIDERS: &[&dyn ActivityProvider] =
    &[&IssueProvider, &IssueEditProvider, &NewsProvider, &FileProvider];

fn status_names(store: &dyn EntityStore) -> Result<HashMap<Uuid, String>> {
    Ok(store
        .issue_statuses()?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect())
}

fn issue_summary(issue: &Issue, status: &str) -> String {
    format!("Issue #{} ({}): {}", issue.number, status, issue.subject)
}

/// Issue creations.
pub struct IssueProvider;

impl ActivityProvider for IssueProvider {
    fn kind(&self) -> EventKind {
        EventKind::Issue
    }

    fn produce_events(
        &self,
        store: &dyn EntityStore,
        filter: &EventFilter,
    ) -> Result<Vec<ActivityEvent>> {
        let issues = store.issues_created_in(filter)?;
        if issues.is_empty() {
            return Ok(Vec::new());
        }
        let statuses = status_names(store)?;

        Ok(issues
            .into_iter()
            .map(|issue| {
                let status = statuses.get(&issue.status_id).map_or("?", String::as_str);
                ActivityEvent {
                    timestamp: issue.created_at,
                    kind: EventKind::Issue,
                    project_id: issue.project_id,
                    author_id: issue.author_id,
                    entity_id: issue.id,
                    summary: issue_summary(&issue, status),
                }
            })
            .collect())
    }
}

/// Issue edits, one event per journal.
pub struct IssueEditProvider;

impl ActivityProvider for IssueEditProvider {
    fn kind(&self) -> EventKind {
        EventKind::IssueEdit
    }

    fn produce_events(
        &self,
        store: &dyn EntityStore,
        filter: &EventFilter,
    ) -> Result<Vec<ActivityEvent>> {
        let journals = store.journals_in(filter)?;
        if journals.is_empty() {
            return Ok(Vec::new());
        }
        let statuses = status_names(store)?;

        Ok(journals
            .into_iter()
            .map(|IssueJournal { journal, issue }| {
                // The status the edit left the issue in, if it changed one.
                let status_id = journal.new_status_id.unwrap_or(issue.status_id);
                let status = statuses.get(&status_id).map_or("?", String::as_str);
                ActivityEvent {
                    timestamp: journal.created_at,
                    kind: EventKind::IssueEdit,
                    project_id: issue.project_id,
                    author_id: journal.author_id,
                    entity_id: journal.id,
                    summary: issue_summary(&issue, status),
                }
            })
            .collect())
    }
}

pub struct NewsProvider;

impl ActivityProvider for NewsProvider {
    fn kind(&self) -> EventKind {
        EventKind::News
    }

    fn produce_events(
        &self,
        store: &dyn EntityStore,
        filter: &EventFilter,
    ) -> Result<Vec<ActivityEvent>> {
        Ok(store
            .news_in(filter)?
            .into_iter()
            .map(|news| ActivityEvent {
                timestamp: news.created_at,
                kind: EventKind::News,
                project_id: news.project_id,
                author_id: news.author_id,
                entity_id: news.id,
                summary: format!("News: {}", news.title),
            })
            .collect())
    }
}

/// Files attached to the scope projects or to their versions.
pub struct FileProvider;

impl ActivityProvider for FileProvider {
    fn kind(&self) -> EventKind {
        EventKind::File
    }

    fn produce_events(
        &self,
        store: &dyn EntityStore,
        filter: &EventFilter,
    ) -> Result<Vec<ActivityEvent>> {
        let mut index = ContainerIndex::default();
        for &project_id in &filter.project_ids {
            index.add_project(project_id);
            for version in store.versions_of(project_id)? {
                index.add_version(version.id, project_id);
            }
        }
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let attachments =
            store.attachments_in(&index.containers(), filter.author_id, &filter.window)?;

        Ok(attachments
            .into_iter()
            .filter_map(|attachment| {
                let project_id = index.owner(&attachment.container)?;
                Some(ActivityEvent {
                    timestamp: attachment.created_at,
                    kind: EventKind::File,
                    project_id,
                    author_id: attachment.author_id,
                    entity_id: attachment.id,
                    summary: format!("File: {}", attachment.filename),
                })
            })
            .collect())
    }
}
