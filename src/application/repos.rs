//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageRequest;
use crate::domain::api_keys::ApiKeyRecord;
use crate::domain::entities::{PostRecord, SettingRecord, TagRef, UserRecord};
use crate::domain::posts::{PostFilter, PostOrder};
use crate::domain::types::{PostStatus, PostVisibility};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostLookup {
    Id(Uuid),
    Slug(String),
    Uuid(Uuid),
}

#[derive(Debug, Clone, Default)]
pub struct PostPageQuery {
    pub filter: PostFilter,
    pub order: PostOrder,
    pub page: PageRequest,
}

#[derive(Debug, Clone)]
pub struct PostPage {
    pub posts: Vec<PostRecord>,
    pub total: u64,
}

/// Full post state to persist. Relations are given by id, in order.
#[derive(Debug, Clone)]
pub struct PostWrite {
    pub slug: String,
    pub title: String,
    pub html: Option<String>,
    pub plaintext: Option<String>,
    pub lexical: Option<String>,
    pub mobiledoc: Option<String>,
    pub status: PostStatus,
    pub visibility: PostVisibility,
    pub featured: bool,
    pub custom_excerpt: Option<String>,
    pub feature_image: Option<String>,
    pub newsletter: Option<String>,
    pub email_segment: Option<String>,
    pub published_at: Option<OffsetDateTime>,
    pub tag_ids: Vec<Uuid>,
    pub author_ids: Vec<Uuid>,
}

/// Tag reference as it arrives in a post payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagInput {
    Id(Uuid),
    Slug(String),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Id(Uuid),
    Email(String),
    Slug(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingUpdate {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct CreateApiKeyParams {
    pub integration_id: Uuid,
    pub name: String,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub expires_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn find_page(&self, query: &PostPageQuery) -> Result<PostPage, RepoError>;

    async fn find_one(&self, lookup: &PostLookup) -> Result<Option<PostRecord>, RepoError>;

    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool, RepoError>;

    async fn insert(&self, post: PostWrite) -> Result<PostRecord, RepoError>;

    /// Replace the stored state of `id`, tags and authors included, in one
    /// transaction.
    async fn update(&self, id: Uuid, post: PostWrite) -> Result<PostRecord, RepoError>;

    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, RepoError>;

    /// Resolve payload tags to stored tags, creating missing ones.
    async fn resolve_tags(&self, tags: &[TagInput]) -> Result<Vec<TagRef>, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user(&self, lookup: &UserLookup) -> Result<Option<UserRecord>, RepoError>;
}

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn list(&self) -> Result<Vec<SettingRecord>, RepoError>;

    async fn find(&self, key: &str) -> Result<Option<SettingRecord>, RepoError>;

    /// Apply all updates in one transaction and return the settings whose
    /// value actually changed.
    async fn edit_batch(&self, updates: &[SettingUpdate]) -> Result<Vec<SettingRecord>, RepoError>;
}

#[async_trait]
pub trait MembersRepo: Send + Sync {
    async fn count_paid(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait ApiKeysRepo: Send + Sync {
    async fn create_key(&self, params: CreateApiKeyParams) -> Result<ApiKeyRecord, RepoError>;

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError>;

    async fn update_last_used(&self, id: Uuid, when: OffsetDateTime) -> Result<(), RepoError>;
}
