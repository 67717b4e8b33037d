use std::cmp::Ordering;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The kinds of facts that contribute to the activity feed.
///
/// The declaration order is the tie-break order of events sharing a timestamp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Issue,
    IssueEdit,
    News,
    File,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [Self::Issue, Self::IssueEdit, Self::News, Self::File];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::IssueEdit => "issue-edit",
            Self::News => "news",
            Self::File => "file",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "issue" => Some(Self::Issue),
            "issue-edit" => Some(Self::IssueEdit),
            "news" => Some(Self::News),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// A normalized, timestamped fact for the activity feed.
///
/// Events are computed per request from issues, journals, news and
/// attachments; they are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub project_id: Uuid,
    /// The user who caused the event.
    pub author_id: Uuid,
    /// Id of the issue, journal, news item or attachment behind the event.
    pub entity_id: Uuid,
    pub summary: String,
}

impl ActivityEvent {
    /// Feed order: most recent first, then by kind, then by entity id.
    ///
    /// `Ordering::Less` means `self` is listed before `other`.
    pub fn feed_order(&self, other: &Self) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.entity_id.cmp(&other.entity_id))
    }
}

/// Which part of the forest the feed covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ActivityScope {
    /// A project, and its visible descendants when `with_subprojects` is set.
    Project {
        project: super::ProjectRef,
        with_subprojects: bool,
    },
    /// Everything a given user authored, across the visible projects.
    User { user_id: Uuid },
    /// Every visible project.
    Global,
}

/// Requested time range. Missing bounds are filled in by [`DateRange::resolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// `to` defaults to `now`; `from` defaults to `lookback_days` before `to`.
    ///
    /// Fails with `Validation` when the range is inverted or the lookback
    /// reaches past the earliest representable date.
    pub fn resolve(&self, now: DateTime<Utc>, lookback_days: u32) -> Result<ActivityWindow> {
        let to = self.to.unwrap_or(now);
        let from = match self.from {
            Some(from) => from,
            None => Duration::try_days(i64::from(lookback_days))
                .and_then(|lookback| to.checked_sub_signed(lookback))
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "cannot look back {} days from {}",
                        lookback_days, to
                    ))
                })?,
        };
        if from > to {
            return Err(Error::Validation(format!(
                "activity range starts ({}) after it ends ({})",
                from, to
            )));
        }
        Ok(ActivityWindow { from, to })
    }
}

/// A resolved, inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// A full activity request.
#[derive(Debug, Clone)]
pub struct ActivityQuery {
    pub scope: ActivityScope,
    pub range: DateRange,
    /// Kinds to include. Empty means every kind.
    pub kinds: Vec<EventKind>,
    /// Offset used to cut the feed into calendar days.
    pub time_zone: FixedOffset,
}

impl ActivityQuery {
    pub fn new(scope: ActivityScope) -> Self {
        Self {
            scope,
            range: DateRange::default(),
            kinds: Vec::new(),
            time_zone: utc_offset(),
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_time_zone(mut self, time_zone: FixedOffset) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn includes(&self, kind: EventKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

pub(crate) fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Events of one calendar day, in feed order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityDay {
    pub date: NaiveDate,
    pub events: Vec<ActivityEvent>,
}

/// The result of an activity request: the resolved window and the day buckets,
/// most recent day first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub window: ActivityWindow,
    pub days: Vec<ActivityDay>,
}

impl Activity {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// All events, flattened, in feed order.
    pub fn events(&self) -> impl Iterator<Item = &ActivityEvent> {
        self.days.iter().flat_map(|d| d.events.iter())
    }
}
