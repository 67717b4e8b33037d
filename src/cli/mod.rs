//! Plain-text rendering for the command-line binary.

pub mod tree_render;

use std::fmt::Write;

use chrono::FixedOffset;

use crate::models::*;
use crate::roadmap::RoadmapEntry;
use crate::visibility::Breadcrumb;

/// One header line per day, then one line per event.
///
/// ```text
/// 2024-05-10
///   14:03 issue       Issue #12 (New): Crash on save
///   09:41 news        News: Release 1.2
/// ```
pub fn render_activity(activity: &Activity, time_zone: FixedOffset) -> String {
    if activity.is_empty() {
        return "No activity.\n".to_string();
    }

    let mut output = String::new();
    for day in &activity.days {
        let _ = writeln!(output, "{}", day.date);
        for event in &day.events {
            let _ = writeln!(
                output,
                "  {} {:<11} {}",
                event.timestamp.with_timezone(&time_zone).format("%H:%M"),
                event.kind.as_str(),
                event.summary
            );
        }
    }
    output
}

pub fn render_roadmap(entries: &[RoadmapEntry]) -> String {
    if entries.is_empty() {
        return "No versions.\n".to_string();
    }

    let mut output = String::new();
    for entry in entries {
        let due = entry
            .version
            .due_date
            .map_or_else(|| "no due date".to_string(), |d| format!("due {}", d));
        let _ = writeln!(
            output,
            "{} [{}] {}: {}/{} closed ({:.0}%){}",
            entry.version.name,
            entry.project_name,
            due,
            entry.progress.closed_issues,
            entry.progress.total(),
            entry.progress.closed_percent(),
            if entry.completed { ", completed" } else { "" }
        );
    }
    output
}

/// `root » … » parent » project`
pub fn render_breadcrumbs(trail: &[Breadcrumb], project: &Project) -> String {
    let mut parts: Vec<&str> = trail
        .iter()
        .map(|crumb| match crumb {
            Breadcrumb::Project { name, .. } => name.as_str(),
            Breadcrumb::Elided => "…",
        })
        .collect();
    parts.push(&project.name);
    format!("{}\n", parts.join(" » "))
}

pub fn render_news(page: &Page<News>) -> String {
    if page.items.is_empty() {
        return "No news.\n".to_string();
    }

    let mut output = String::new();
    for news in &page.items {
        let _ = writeln!(
            output,
            "{} {} ({} comments)",
            news.created_at.format("%Y-%m-%d"),
            news.title,
            news.comments_count
        );
        if let Some(summary) = &news.summary {
            let _ = writeln!(output, "    {}", summary);
        }
    }
    let _ = writeln!(output, "page {}/{}", page.page, page.page_count().max(1));
    output
}

pub fn render_files(containers: &[FileContainer]) -> String {
    if containers.is_empty() {
        return "No files.\n".to_string();
    }

    let mut output = String::new();
    for container in containers {
        let _ = writeln!(output, "{}", container.label);
        for attachment in &container.attachments {
            let _ = writeln!(
                output,
                "  {} ({} bytes, {})",
                attachment.filename,
                attachment.filesize,
                attachment.created_at.format("%Y-%m-%d")
            );
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn test_render_activity_groups_by_day() {
        let event = ActivityEvent {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 10, 14, 3, 0).unwrap(),
            kind: EventKind::Issue,
            project_id: Uuid::nil(),
            author_id: Uuid::nil(),
            entity_id: Uuid::nil(),
            summary: "Issue #12 (New): Crash on save".to_string(),
        };
        let activity = Activity {
            window: ActivityWindow {
                from: event.timestamp,
                to: event.timestamp,
            },
            days: vec![ActivityDay {
                date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
                events: vec![event],
            }],
        };

        assert_eq!(
            render_activity(&activity, utc_offset()),
            "2024-05-10\n  14:03 issue       Issue #12 (New): Crash on save\n"
        );
    }

    #[test]
    fn test_render_breadcrumbs_with_elision() {
        let crumb = |name: &str| Breadcrumb::Project {
            id: Uuid::new_v4(),
            identifier: name.to_string(),
            name: name.to_string(),
        };
        let project = Project {
            id: Uuid::new_v4(),
            identifier: "leaf".to_string(),
            name: "Leaf".to_string(),
            description: None,
            is_public: true,
            status: ProjectStatus::Active,
            parent_id: None,
            position: 1,
            lock_version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let trail = vec![crumb("Root"), Breadcrumb::Elided, crumb("B"), crumb("C")];
        assert_eq!(render_breadcrumbs(&trail, &project), "Root » … » B » C » Leaf\n");
    }
}
