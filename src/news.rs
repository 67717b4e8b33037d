//! Project news and their comments.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;
use crate::visibility::Visibility;

pub const NEWS_PER_PAGE: u32 = 10;

pub struct NewsService<'a> {
    visibility: &'a Visibility<'a>,
}

impl<'a> NewsService<'a> {
    pub fn new(visibility: &'a Visibility<'a>) -> Self {
        Self { visibility }
    }

    /// News of one project, or of every visible project when `project` is
    /// `None`. Newest first; `page` is 1-based.
    pub fn list(
        &self,
        actor: &Actor,
        project: Option<&ProjectRef>,
        page: u32,
    ) -> Result<Page<News>> {
        let project_ids: Vec<Uuid> = match project {
            Some(key) => vec![self.visibility.find_visible(actor, key)?.id],
            None => self
                .visibility
                .visible_projects(actor)?
                .into_iter()
                .map(|p| p.id)
                .collect(),
        };

        let page = page.max(1);
        let offset = u64::from(page - 1) * u64::from(NEWS_PER_PAGE);
        let store = self.visibility.tree().store();

        Ok(Page {
            items: store.news_of(&project_ids, NEWS_PER_PAGE, offset)?,
            total: store.count_news(&project_ids)?,
            page,
            per_page: NEWS_PER_PAGE,
        })
    }

    /// A news item with its comments, oldest first unless the actor prefers
    /// the reverse.
    pub fn show(&self, actor: &Actor, news_id: Uuid) -> Result<NewsWithComments> {
        let news = self.visible_news(actor, news_id)?;
        let mut comments = self.visibility.tree().store().comments_of(news.id)?;
        if actor.wants_comments_in_reverse_order() {
            comments.reverse();
        }
        Ok(NewsWithComments { news, comments })
    }

    pub fn create(
        &self,
        actor: &Actor,
        project: &ProjectRef,
        input: CreateNewsInput,
    ) -> Result<News> {
        let project = self.visibility.find_visible(actor, project)?;
        let author_id = match actor.id() {
            Some(id) if self.visibility.authorizer().can_manage(actor, &project)? => id,
            _ => {
                return Err(Error::Permission(format!(
                    "{} cannot post news in '{}'",
                    actor.label(),
                    project.identifier
                )))
            }
        };

        validate_news(&input)?;

        let news = self
            .visibility
            .tree()
            .store()
            .create_news(project.id, author_id, input)?;
        tracing::info!("{} posted news '{}' in '{}'", actor.label(), news.title, project.identifier);
        Ok(news)
    }

    /// Edit a news item. The edited item must still pass creation rules.
    pub fn update(&self, actor: &Actor, news_id: Uuid, input: UpdateNewsInput) -> Result<News> {
        let news = self.visible_news(actor, news_id)?;
        self.require_manage(actor, &news, "edit news")?;

        validate_news(&CreateNewsInput {
            title: input.title.clone().unwrap_or_else(|| news.title.clone()),
            summary: input.summary.clone().or_else(|| news.summary.clone()),
            description: input
                .description
                .clone()
                .unwrap_or_else(|| news.description.clone()),
            created_at: None,
        })?;

        let updated = self
            .visibility
            .tree()
            .store()
            .update_news(news.id, input)?
            .ok_or_else(|| Error::not_found("news", news_id))?;
        tracing::info!("{} edited news '{}'", actor.label(), updated.title);
        Ok(updated)
    }

    /// Delete a news item with its comments.
    pub fn destroy(&self, actor: &Actor, news_id: Uuid) -> Result<()> {
        let news = self.visible_news(actor, news_id)?;
        self.require_manage(actor, &news, "delete news")?;

        if !self.visibility.tree().store().delete_news(news.id)? {
            return Err(Error::not_found("news", news_id));
        }
        tracing::info!("{} deleted news '{}'", actor.label(), news.title);
        Ok(())
    }

    pub fn add_comment(&self, actor: &Actor, news_id: Uuid, content: &str) -> Result<Comment> {
        let news = self.visible_news(actor, news_id)?;
        let Some(author_id) = actor.id() else {
            return Err(Error::Permission(
                "anonymous users cannot comment".to_string(),
            ));
        };

        let content = content.trim();
        if content.is_empty() {
            return Err(Error::Validation("comment cannot be empty".to_string()));
        }

        self.visibility
            .tree()
            .store()
            .create_comment(news.id, author_id, content)
    }

    pub fn remove_comment(&self, actor: &Actor, news_id: Uuid, comment_id: Uuid) -> Result<()> {
        let news = self.visible_news(actor, news_id)?;
        self.require_manage(actor, &news, "moderate comments")?;

        if !self
            .visibility
            .tree()
            .store()
            .delete_comment(news.id, comment_id)?
        {
            return Err(Error::not_found("comment", comment_id));
        }
        tracing::info!("{} removed comment {} on news {}", actor.label(), comment_id, news.id);
        Ok(())
    }

    fn require_manage(&self, actor: &Actor, news: &News, action: &str) -> Result<()> {
        let project = self.visibility.tree().find(&ProjectRef::Id(news.project_id))?;
        if actor.is_logged() && self.visibility.authorizer().can_manage(actor, &project)? {
            return Ok(());
        }
        Err(Error::Permission(format!(
            "{} cannot {} in '{}'",
            actor.label(),
            action,
            project.identifier
        )))
    }

    /// Hidden news fail like missing ones.
    fn visible_news(&self, actor: &Actor, news_id: Uuid) -> Result<News> {
        let news = self
            .visibility
            .tree()
            .store()
            .find_news(news_id)?
            .ok_or_else(|| Error::not_found("news", news_id))?;

        match self.visibility.find_visible(actor, &ProjectRef::Id(news.project_id)) {
            Ok(_) => Ok(news),
            Err(e) if e.is_not_found() => Err(Error::not_found("news", news_id)),
            Err(e) => Err(e),
        }
    }
}

fn validate_news(input: &CreateNewsInput) -> Result<()> {
    let title = input.title.trim();
    if title.is_empty() || title.chars().count() > NEWS_TITLE_MAX_LENGTH {
        return Err(Error::Validation(format!(
            "title must be between 1 and {} characters",
            NEWS_TITLE_MAX_LENGTH
        )));
    }
    if input
        .summary
        .as_ref()
        .is_some_and(|s| s.chars().count() > NEWS_SUMMARY_MAX_LENGTH)
    {
        return Err(Error::Validation(format!(
            "summary cannot exceed {} characters",
            NEWS_SUMMARY_MAX_LENGTH
        )));
    }
    if input.description.trim().is_empty() {
        return Err(Error::Validation("description cannot be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str, summary: Option<&str>, description: &str) -> CreateNewsInput {
        CreateNewsInput {
            title: title.to_string(),
            summary: summary.map(str::to_string),
            description: description.to_string(),
            created_at: None,
        }
    }

    #[test]
    fn test_validate_news() {
        assert!(validate_news(&input("Release", None, "Out now")).is_ok());
        assert!(validate_news(&input("", None, "Out now")).is_err());
        assert!(validate_news(&input(&"t".repeat(61), None, "Out now")).is_err());
        assert!(validate_news(&input(&"t".repeat(60), None, "Out now")).is_ok());
        assert!(validate_news(&input("Release", Some(&"s".repeat(256)), "Out now")).is_err());
        assert!(validate_news(&input("Release", None, "  ")).is_err());
    }
}
