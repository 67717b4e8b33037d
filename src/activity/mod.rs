//! The unified activity feed.
//!
//! Each [`ActivityProvider`] turns one kind of record into events for the
//! projects the actor can see. The feed merges the provider streams into a
//! single newest-first sequence and cuts it into calendar days.

mod providers;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{FixedOffset, Utc};
use uuid::Uuid;

pub use providers::*;

use crate::config::DEFAULT_ACTIVITY_DAYS;
use crate::error::{Error, Result};
use crate::models::*;
use crate::store::EventFilter;
use crate::visibility::Visibility;

pub struct ActivityFeed<'a> {
    visibility: &'a Visibility<'a>,
    providers: Vec<&'a dyn ActivityProvider>,
    lookback_days: u32,
}

impl<'a> ActivityFeed<'a> {
    pub fn new(visibility: &'a Visibility<'a>) -> Self {
        Self {
            visibility,
            providers: PROVIDERS.to_vec(),
            lookback_days: DEFAULT_ACTIVITY_DAYS,
        }
    }

    /// Days covered when the query gives no start.
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    /// Replace the provider registry.
    pub fn with_providers(mut self, providers: Vec<&'a dyn ActivityProvider>) -> Self {
        self.providers = providers;
        self
    }

    /// Collect the feed for `query`, as seen by `actor`.
    pub fn collect(&self, actor: &Actor, query: &ActivityQuery) -> Result<Activity> {
        let window = query.range.resolve(Utc::now(), self.lookback_days)?;
        let (project_ids, author_id) = self.resolve_scope(actor, &query.scope)?;

        let filter = EventFilter {
            project_ids,
            author_id,
            window,
        };
        if filter.project_ids.is_empty() {
            return Ok(Activity {
                window,
                days: Vec::new(),
            });
        }

        let store = self.visibility.tree().store();
        let mut streams = Vec::new();
        for provider in &self.providers {
            let kind = provider.kind();
            if !query.includes(kind) {
                continue;
            }

            match provider.produce_events(store, &filter) {
                Ok(events) => {
                    tracing::debug!("{} provider produced {} events", kind.as_str(), events.len());
                    streams.push(events);
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!("Skipping {} activity: {}", kind.as_str(), e);
                }
                Err(e) => return Err(e),
            }
        }

        let events = merge(streams);
        tracing::debug!(
            "Activity for {} over {} projects: {} events",
            actor.label(),
            filter.project_ids.len(),
            events.len()
        );

        Ok(Activity {
            window,
            days: bucket_by_day(events, query.time_zone),
        })
    }

    /// Project ids and author restriction for a scope.
    fn resolve_scope(
        &self,
        actor: &Actor,
        scope: &ActivityScope,
    ) -> Result<(Vec<Uuid>, Option<Uuid>)> {
        match scope {
            ActivityScope::Project {
                project,
                with_subprojects,
            } => {
                let project = self.visibility.find_visible(actor, project)?;
                let ids = if *with_subprojects {
                    self.visibility
                        .visible_descendants(actor, project.id, true)?
                        .into_iter()
                        .map(|p| p.id)
                        .collect()
                } else {
                    vec![project.id]
                };
                Ok((ids, None))
            }
            ActivityScope::User { user_id } => {
                self.visibility
                    .tree()
                    .store()
                    .find_user(*user_id)?
                    .ok_or_else(|| Error::not_found("user", user_id))?;
                Ok((self.visible_ids(actor)?, Some(*user_id)))
            }
            ActivityScope::Global => Ok((self.visible_ids(actor)?, None)),
        }
    }

    fn visible_ids(&self, actor: &Actor) -> Result<Vec<Uuid>> {
        Ok(self
            .visibility
            .visible_projects(actor)?
            .into_iter()
            .map(|p| p.id)
            .collect())
    }
}

/// Head of one provider stream inside the merge heap.
struct Head {
    event: ActivityEvent,
    stream: usize,
}

impl Ord for Head {
    // Reversed so that the max-heap yields the event listed first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .event
            .feed_order(&self.event)
            .then_with(|| other.stream.cmp(&self.stream))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

/// K-way merge of streams that are each in feed order.
fn merge(streams: Vec<Vec<ActivityEvent>>) -> Vec<ActivityEvent> {
    let total = streams.iter().map(Vec::len).sum();
    let mut sources: Vec<_> = streams
        .into_iter()
        .map(|mut stream| {
            if !stream
                .windows(2)
                .all(|w| w[0].feed_order(&w[1]) != Ordering::Greater)
            {
                tracing::warn!("Activity stream out of order, sorting it");
                stream.sort_by(|a, b| a.feed_order(b));
            }
            stream.into_iter()
        })
        .collect();

    let mut heap = BinaryHeap::with_capacity(sources.len());
    for (stream, source) in sources.iter_mut().enumerate() {
        if let Some(event) = source.next() {
            heap.push(Head { event, stream });
        }
    }

    let mut merged = Vec::with_capacity(total);
    while let Some(Head { event, stream }) = heap.pop() {
        merged.push(event);
        if let Some(next) = sources[stream].next() {
            heap.push(Head {
                event: next,
                stream,
            });
        }
    }
    merged
}

/// Group a feed-ordered sequence into days of the given offset, newest day first.
fn bucket_by_day(events: Vec<ActivityEvent>, time_zone: FixedOffset) -> Vec<ActivityDay> {
    let mut days: Vec<ActivityDay> = Vec::new();
    for event in events {
        let date = event.timestamp.with_timezone(&time_zone).date_naive();
        match days.last_mut() {
            Some(day) if day.date == date => day.events.push(event),
            _ => days.push(ActivityDay {
                date,
                events: vec![event],
            }),
        }
    }
    days
}
