use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::error::EndpointError;
use crate::application::frame::Frame;
use crate::application::pipeline::CacheInvalidation;
use crate::application::posts::input::{Patch, PostInput};
use crate::application::posts::serializer::preview_path;
use crate::application::repos::{
    PostLookup, PostPage, PostPageQuery, PostWrite, PostsRepo, RepoError, UserLookup, UsersRepo,
};
use crate::domain::entities::PostRecord;
use crate::domain::posts::{DEFAULT_EMAIL_SEGMENT, DEFAULT_TITLE, html_to_plaintext};
use crate::domain::slug::{SlugAsyncError, generate_unique_slug_async};
use crate::domain::types::{PostStatus, PostVisibility};

pub const POST_NOT_FOUND: &str = "Post not found.";
const COLLISION: &str = "Saving failed! Someone else is editing this post.";

/// Result of an edit, carrying what cache invalidation needs.
#[derive(Debug, Clone)]
pub struct PostEdit {
    pub post: PostRecord,
    pub previous_status: PostStatus,
    pub changed: bool,
}

#[derive(Clone)]
pub struct PostsService {
    posts: Arc<dyn PostsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl PostsService {
    pub fn new(posts: Arc<dyn PostsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { posts, users }
    }

    pub async fn browse(&self, query: &PostPageQuery) -> Result<PostPage, EndpointError> {
        Ok(self.posts.find_page(query).await?)
    }

    pub async fn read(&self, lookup: &PostLookup) -> Result<PostRecord, EndpointError> {
        self.posts
            .find_one(lookup)
            .await?
            .ok_or_else(|| EndpointError::not_found(POST_NOT_FOUND))
    }

    pub async fn add_post(&self, frame: &Frame) -> Result<PostRecord, EndpointError> {
        let input = PostInput::from_value(frame.first_entry("posts"))?;
        let source_html = frame.option("source") == Some("html");

        let title = input
            .title
            .clone()
            .value()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let slug_source = input.slug.clone().value().unwrap_or_else(|| title.clone());
        let slug = self.unique_slug(&slug_source, None).await?;

        let status = input.status.clone().apply(PostStatus::Draft);
        let mut published_at = input.published_at.clone().value();
        ensure_schedule(status, published_at)?;
        if status.is_live() && published_at.is_none() {
            published_at = Some(OffsetDateTime::now_utc());
        }

        let html = input.html.clone().value().map(|html| prepare_html(html, source_html));
        let plaintext = html.as_deref().map(html_to_plaintext);

        let tag_ids = match &input.tags {
            Some(tags) => self.posts.resolve_tags(tags).await?,
            None => Vec::new(),
        }
        .into_iter()
        .map(|tag| tag.id)
        .collect();

        let author_ids = match &input.authors {
            Some(authors) => self.resolve_authors(authors).await?,
            None => frame.context.user.into_iter().collect(),
        };
        if author_ids.is_empty() {
            return Err(EndpointError::validation_with(
                "At least one author is required",
                "authors",
            ));
        }

        let write = PostWrite {
            slug,
            title,
            html,
            plaintext,
            lexical: input.lexical.value(),
            mobiledoc: input.mobiledoc.value(),
            status,
            visibility: input.visibility.apply(PostVisibility::Public),
            featured: input.featured.apply(false),
            custom_excerpt: input.custom_excerpt.value(),
            feature_image: input.feature_image.value(),
            newsletter: None,
            email_segment: None,
            published_at,
            tag_ids,
            author_ids,
        };

        let post = self.posts.insert(write).await.map_err(duplicate_slug)?;
        info!(
            target = "quire::application::posts",
            post_id = %post.id,
            slug = %post.slug,
            status = %post.status,
            "post created"
        );
        Ok(post)
    }

    pub async fn edit_post(&self, frame: &Frame) -> Result<PostEdit, EndpointError> {
        let id = parse_id(frame.option("id"))?;
        let current = self.read(&PostLookup::Id(id)).await?;
        let input = PostInput::from_value(frame.first_entry("posts"))?;

        if let Some(updated_at) = input.updated_at
            && millis(updated_at) != millis(current.updated_at)
        {
            return Err(EndpointError::UpdateCollision(COLLISION.to_string()));
        }

        let source_html = frame.option("source") == Some("html");
        let force_rerender = frame.option_flag("force_rerender");

        let slug = match input.slug.clone().value() {
            Some(requested) if requested != current.slug => {
                self.unique_slug(&requested, Some(current.id)).await?
            }
            _ => current.slug.clone(),
        };

        let status = input.status.clone().apply(current.status);
        let mut published_at = input
            .published_at
            .clone()
            .apply_nullable(current.published_at);
        ensure_schedule(status, published_at)?;
        if status.is_live() && published_at.is_none() {
            published_at = Some(OffsetDateTime::now_utc());
        }

        let html = match input.html.clone() {
            Patch::Value(html) => Some(prepare_html(html, source_html)),
            Patch::Null => None,
            Patch::Absent => current.html.clone(),
        };
        let plaintext = html.as_deref().map(html_to_plaintext);

        let tag_ids = match &input.tags {
            Some(tags) => self
                .posts
                .resolve_tags(tags)
                .await?
                .into_iter()
                .map(|tag| tag.id)
                .collect(),
            None => current.tags.iter().map(|tag| tag.id).collect(),
        };

        let author_ids = match &input.authors {
            Some(authors) => {
                let ids = self.resolve_authors(authors).await?;
                if ids.is_empty() {
                    return Err(EndpointError::validation_with(
                        "At least one author is required",
                        "authors",
                    ));
                }
                ids
            }
            None => current.authors.iter().map(|author| author.id).collect(),
        };

        let publishing = status.is_live() && !current.status.is_live();
        let (newsletter, email_segment) = match frame.option("newsletter") {
            Some(newsletter) if publishing => (
                Some(newsletter.to_string()),
                Some(
                    frame
                        .option("email_segment")
                        .unwrap_or(DEFAULT_EMAIL_SEGMENT)
                        .to_string(),
                ),
            ),
            _ => (current.newsletter.clone(), current.email_segment.clone()),
        };

        let write = PostWrite {
            slug,
            title: input.title.apply(current.title.clone()),
            html,
            plaintext,
            lexical: input.lexical.apply_nullable(current.lexical.clone()),
            mobiledoc: input.mobiledoc.apply_nullable(current.mobiledoc.clone()),
            status,
            visibility: input.visibility.apply(current.visibility),
            featured: input.featured.apply(current.featured),
            custom_excerpt: input
                .custom_excerpt
                .apply_nullable(current.custom_excerpt.clone()),
            feature_image: input
                .feature_image
                .apply_nullable(current.feature_image.clone()),
            newsletter,
            email_segment,
            published_at,
            tag_ids,
            author_ids,
        };

        let changed = force_rerender || differs(&current, &write);
        if !changed {
            debug!(
                target = "quire::application::posts",
                post_id = %current.id,
                "edit produced no changes"
            );
            return Ok(PostEdit {
                previous_status: current.status,
                post: current,
                changed: false,
            });
        }

        let post = self
            .posts
            .update(current.id, write)
            .await
            .map_err(|err| match err {
                RepoError::NotFound => EndpointError::not_found(POST_NOT_FOUND),
                other => duplicate_slug(other),
            })?;
        info!(
            target = "quire::application::posts",
            post_id = %post.id,
            from = %current.status,
            to = %post.status,
            "post updated"
        );

        Ok(PostEdit {
            post,
            previous_status: current.status,
            changed: true,
        })
    }

    pub async fn destroy(&self, id: Uuid) -> Result<(), EndpointError> {
        if !self.posts.delete(id).await? {
            return Err(EndpointError::not_found(POST_NOT_FOUND));
        }
        info!(
            target = "quire::application::posts",
            post_id = %id,
            "post deleted"
        );
        Ok(())
    }

    /// Decide which cached paths an edit invalidates.
    pub fn handle_cache_invalidation(edit: &PostEdit) -> CacheInvalidation {
        let status = edit.post.status;
        let was_published = edit.previous_status == PostStatus::Published;

        if (status == PostStatus::Published && edit.changed)
            || (status == PostStatus::Draft && was_published)
        {
            return CacheInvalidation::All;
        }
        if (status == PostStatus::Draft && !was_published)
            || (status == PostStatus::Scheduled && edit.changed)
        {
            return CacheInvalidation::Paths(vec![preview_path(&edit.post)]);
        }
        CacheInvalidation::None
    }

    async fn unique_slug(
        &self,
        source: &str,
        exclude: Option<Uuid>,
    ) -> Result<String, EndpointError> {
        let posts = self.posts.clone();
        generate_unique_slug_async(source, |candidate| {
            let posts = posts.clone();
            let candidate = candidate.to_string();
            async move { posts.slug_exists(&candidate, exclude).await.map(|exists| !exists) }
        })
        .await
        .map_err(|err| match err {
            SlugAsyncError::Predicate(repo) => EndpointError::Repo(repo),
            SlugAsyncError::Slug(slug) => EndpointError::validation_with(slug.to_string(), "slug"),
        })
    }

    async fn resolve_authors(&self, authors: &[UserLookup]) -> Result<Vec<Uuid>, EndpointError> {
        let mut ids = Vec::with_capacity(authors.len());
        for lookup in authors {
            let user = self.users.find_user(lookup).await?.ok_or_else(|| {
                EndpointError::validation_with("Author not found", "authors")
            })?;
            if !ids.contains(&user.id) {
                ids.push(user.id);
            }
        }
        Ok(ids)
    }
}

pub fn parse_id(raw: Option<&str>) -> Result<Uuid, EndpointError> {
    let raw = raw.ok_or_else(|| EndpointError::validation_with("Missing post id", "id"))?;
    Uuid::parse_str(raw).map_err(|_| EndpointError::not_found(POST_NOT_FOUND))
}

fn prepare_html(html: String, sanitize: bool) -> String {
    if sanitize {
        ammonia::clean(&html)
    } else {
        html
    }
}

fn ensure_schedule(
    status: PostStatus,
    published_at: Option<OffsetDateTime>,
) -> Result<(), EndpointError> {
    let now = OffsetDateTime::now_utc();
    if status == PostStatus::Scheduled && published_at.is_none_or(|at| at <= now) {
        return Err(EndpointError::validation_with(
            "Scheduled posts need a published_at date in the future",
            "published_at",
        ));
    }
    Ok(())
}

fn millis(value: OffsetDateTime) -> i128 {
    value.unix_timestamp_nanos() / 1_000_000
}

fn duplicate_slug(err: RepoError) -> EndpointError {
    match err {
        RepoError::Duplicate { .. } => {
            EndpointError::validation_with("Another post already uses this slug", "slug")
        }
        other => EndpointError::Repo(other),
    }
}

fn differs(current: &PostRecord, write: &PostWrite) -> bool {
    current.slug != write.slug
        || current.title != write.title
        || current.html != write.html
        || current.lexical != write.lexical
        || current.mobiledoc != write.mobiledoc
        || current.status != write.status
        || current.visibility != write.visibility
        || current.featured != write.featured
        || current.custom_excerpt != write.custom_excerpt
        || current.feature_image != write.feature_image
        || current.newsletter != write.newsletter
        || current.email_segment != write.email_segment
        || current.published_at != write.published_at
        || !current.tags.iter().map(|tag| tag.id).eq(write.tag_ids.iter().copied())
        || !current
            .authors
            .iter()
            .map(|author| author.id)
            .eq(write.author_ids.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(previous: PostStatus, status: PostStatus, changed: bool) -> PostEdit {
        let now = OffsetDateTime::now_utc();
        PostEdit {
            post: PostRecord {
                id: Uuid::new_v4(),
                uuid: Uuid::new_v4(),
                slug: "p".into(),
                title: "P".into(),
                html: None,
                plaintext: None,
                lexical: None,
                mobiledoc: None,
                status,
                visibility: PostVisibility::Public,
                featured: false,
                custom_excerpt: None,
                feature_image: None,
                newsletter: None,
                email_segment: None,
                published_at: None,
                created_at: now,
                updated_at: now,
                tags: Vec::new(),
                authors: Vec::new(),
            },
            previous_status: previous,
            changed,
        }
    }

    #[test]
    fn published_changes_purge_everything() {
        let result = PostsService::handle_cache_invalidation(&edit(
            PostStatus::Published,
            PostStatus::Published,
            true,
        ));
        assert_eq!(result, CacheInvalidation::All);

        let result = PostsService::handle_cache_invalidation(&edit(
            PostStatus::Published,
            PostStatus::Published,
            false,
        ));
        assert_eq!(result, CacheInvalidation::None);
    }

    #[test]
    fn unpublishing_purges_everything() {
        let result = PostsService::handle_cache_invalidation(&edit(
            PostStatus::Published,
            PostStatus::Draft,
            true,
        ));
        assert_eq!(result, CacheInvalidation::All);
    }

    #[test]
    fn drafts_and_scheduled_purge_preview_only() {
        let draft = edit(PostStatus::Draft, PostStatus::Draft, false);
        assert_eq!(
            PostsService::handle_cache_invalidation(&draft),
            CacheInvalidation::Paths(vec![format!("/p/{}/", draft.post.uuid)])
        );

        let scheduled = edit(PostStatus::Draft, PostStatus::Scheduled, true);
        assert!(matches!(
            PostsService::handle_cache_invalidation(&scheduled),
            CacheInvalidation::Paths(_)
        ));

        let untouched = edit(PostStatus::Scheduled, PostStatus::Scheduled, false);
        assert_eq!(
            PostsService::handle_cache_invalidation(&untouched),
            CacheInvalidation::None
        );
    }

    #[test]
    fn source_html_is_sanitized() {
        let cleaned = prepare_html("<p onclick=\"x()\">Hi<script>bad()</script></p>".into(), true);
        assert_eq!(cleaned, "<p>Hi</p>");
    }
}
