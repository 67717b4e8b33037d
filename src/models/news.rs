use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A news item posted on a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct News {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub description: String,
    pub author_id: Uuid,
    pub comments_count: u32,
    pub created_at: DateTime<Utc>,
}

pub const NEWS_TITLE_MAX_LENGTH: usize = 60;
pub const NEWS_SUMMARY_MAX_LENGTH: usize = 255;

/// Input for posting a news item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNewsInput {
    pub title: String,
    pub summary: Option<String>,
    pub description: String,
    /// Publication time. Defaults to now; set when importing existing records.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for editing a news item. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNewsInput {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
}

/// A comment on a news item. Comments are append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: Uuid,
    pub news_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A news item with its comments, in the order the viewer asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsWithComments {
    #[serde(flatten)]
    pub news: News,
    pub comments: Vec<Comment>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn page_count(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.per_page))
    }
}
