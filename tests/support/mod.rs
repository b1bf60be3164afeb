#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;

use quire::application::api_keys::{ApiKeyService, IssueApiKeyCommand};
use quire::application::endpoints::{AdminApi, AdminDeps};
use quire::application::frame::{Frame, RequestContext};
use quire::application::members::{StripeError, StripeGateway};
use quire::application::repos::{
    ApiKeysRepo, CreateApiKeyParams, MembersRepo, PostLookup, PostPage, PostPageQuery, PostWrite,
    PostsRepo, RepoError, SettingUpdate, SettingsRepo, TagInput, UserLookup, UsersRepo,
};
use quire::application::route_settings::RouteSettings;
use quire::application::settings::key_updates::{
    KeyUpdateTokens, KeyVerificationMailer, MailError,
};
use quire::cache::{CacheConfig, CacheConsumer, CacheTrigger, EventQueue};
use quire::domain::api_keys::{ApiKeyRecord, ApiKeyStatus};
use quire::domain::entities::{AuthorRef, PostRecord, SettingRecord, TagRef, UserRecord};
use quire::domain::slug::derive_slug;
use quire::domain::types::{PostStatus, RoleName, SettingGroup, SettingType};
use quire::infra::http::{ApiRateLimiter, ApiState, HealthProbe, RouterState};
use quire::infra::uploads::UploadStaging;

/// Header the test router trusts for staff identity.
pub const STAFF_HEADER: &str = "x-staff-user";

#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<Vec<UserRecord>>,
}

impl MemoryUsers {
    pub async fn add(&self, name: &str, role: RoleName) -> UserRecord {
        let slug = derive_slug(name);
        let user = UserRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{slug}@example.com"),
            slug,
            roles: vec![role],
        };
        self.users.lock().await.push(user.clone());
        user
    }

    async fn get(&self, id: Uuid) -> Option<UserRecord> {
        self.users
            .lock()
            .await
            .iter()
            .find(|user| user.id == id)
            .cloned()
    }
}

#[async_trait]
impl UsersRepo for MemoryUsers {
    async fn find_user(&self, lookup: &UserLookup) -> Result<Option<UserRecord>, RepoError> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|user| match lookup {
                UserLookup::Id(id) => user.id == *id,
                UserLookup::Email(email) => user.email.eq_ignore_ascii_case(email),
                UserLookup::Slug(slug) => &user.slug == slug,
            })
            .cloned())
    }
}

pub struct MemoryPosts {
    posts: Mutex<Vec<PostRecord>>,
    tags: Mutex<Vec<TagRef>>,
    users: Arc<MemoryUsers>,
    pub updates: Mutex<u32>,
}

impl MemoryPosts {
    pub fn new(users: Arc<MemoryUsers>) -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            tags: Mutex::new(Vec::new()),
            users,
            updates: Mutex::new(0),
        }
    }

    pub async fn all(&self) -> Vec<PostRecord> {
        self.posts.lock().await.clone()
    }

    pub async fn update_count(&self) -> u32 {
        *self.updates.lock().await
    }

    async fn authors(&self, ids: &[Uuid]) -> Result<Vec<AuthorRef>, RepoError> {
        let mut authors = Vec::with_capacity(ids.len());
        for id in ids {
            let user = self
                .users
                .get(*id)
                .await
                .ok_or_else(|| RepoError::Integrity {
                    message: format!("unknown author {id}"),
                })?;
            authors.push(AuthorRef {
                id: user.id,
                slug: user.slug,
                name: user.name,
                email: user.email,
                roles: user.roles,
            });
        }
        Ok(authors)
    }

    async fn tag_refs(&self, ids: &[Uuid]) -> Vec<TagRef> {
        let tags = self.tags.lock().await;
        ids.iter()
            .filter_map(|id| tags.iter().find(|tag| tag.id == *id).cloned())
            .collect()
    }

    async fn upsert_tag(&self, slug: String, name: &str) -> TagRef {
        let mut tags = self.tags.lock().await;
        if let Some(tag) = tags.iter().find(|tag| tag.slug == slug) {
            return tag.clone();
        }
        let tag = TagRef {
            id: Uuid::new_v4(),
            slug,
            name: name.to_string(),
        };
        tags.push(tag.clone());
        tag
    }
}

#[async_trait]
impl PostsRepo for MemoryPosts {
    async fn find_page(&self, query: &PostPageQuery) -> Result<PostPage, RepoError> {
        let mut matching: Vec<PostRecord> = self
            .posts
            .lock()
            .await
            .iter()
            .filter(|post| query.filter.matches(post))
            .cloned()
            .collect();
        matching.sort_by(|a, b| query.order.compare(a, b));
        Ok(PostPage {
            total: matching.len() as u64,
            posts: query.page.slice(&matching),
        })
    }

    async fn find_one(&self, lookup: &PostLookup) -> Result<Option<PostRecord>, RepoError> {
        let posts = self.posts.lock().await;
        Ok(posts
            .iter()
            .find(|post| match lookup {
                PostLookup::Id(id) => post.id == *id,
                PostLookup::Uuid(uuid) => post.uuid == *uuid,
                PostLookup::Slug(slug) => &post.slug == slug,
            })
            .cloned())
    }

    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool, RepoError> {
        let posts = self.posts.lock().await;
        Ok(posts
            .iter()
            .any(|post| post.slug == slug && Some(post.id) != exclude))
    }

    async fn insert(&self, write: PostWrite) -> Result<PostRecord, RepoError> {
        if self.slug_exists(&write.slug, None).await? {
            return Err(RepoError::Duplicate {
                constraint: "posts_slug_key".into(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = PostRecord {
            id: Uuid::new_v4(),
            uuid: Uuid::new_v4(),
            tags: self.tag_refs(&write.tag_ids).await,
            authors: self.authors(&write.author_ids).await?,
            slug: write.slug,
            title: write.title,
            html: write.html,
            plaintext: write.plaintext,
            lexical: write.lexical,
            mobiledoc: write.mobiledoc,
            status: write.status,
            visibility: write.visibility,
            featured: write.featured,
            custom_excerpt: write.custom_excerpt,
            feature_image: write.feature_image,
            newsletter: write.newsletter,
            email_segment: write.email_segment,
            published_at: write.published_at,
            created_at: now,
            updated_at: now,
        };
        self.posts.lock().await.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: Uuid, write: PostWrite) -> Result<PostRecord, RepoError> {
        if self.slug_exists(&write.slug, Some(id)).await? {
            return Err(RepoError::Duplicate {
                constraint: "posts_slug_key".into(),
            });
        }
        let tags = self.tag_refs(&write.tag_ids).await;
        let authors = self.authors(&write.author_ids).await?;

        let mut posts = self.posts.lock().await;
        let post = posts
            .iter_mut()
            .find(|post| post.id == id)
            .ok_or(RepoError::NotFound)?;
        post.slug = write.slug;
        post.title = write.title;
        post.html = write.html;
        post.plaintext = write.plaintext;
        post.lexical = write.lexical;
        post.mobiledoc = write.mobiledoc;
        post.status = write.status;
        post.visibility = write.visibility;
        post.featured = write.featured;
        post.custom_excerpt = write.custom_excerpt;
        post.feature_image = write.feature_image;
        post.newsletter = write.newsletter;
        post.email_segment = write.email_segment;
        post.published_at = write.published_at;
        post.tags = tags;
        post.authors = authors;
        post.updated_at = OffsetDateTime::now_utc();
        *self.updates.lock().await += 1;
        Ok(post.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut posts = self.posts.lock().await;
        let before = posts.len();
        posts.retain(|post| post.id != id);
        Ok(posts.len() != before)
    }

    async fn resolve_tags(&self, inputs: &[TagInput]) -> Result<Vec<TagRef>, RepoError> {
        let mut resolved: Vec<TagRef> = Vec::new();
        for input in inputs {
            let tag = match input {
                TagInput::Id(id) => self
                    .tags
                    .lock()
                    .await
                    .iter()
                    .find(|tag| tag.id == *id)
                    .cloned()
                    .ok_or_else(|| RepoError::InvalidInput {
                        message: format!("tag {id} does not exist"),
                    })?,
                TagInput::Slug(slug) => self.upsert_tag(slug.clone(), slug).await,
                TagInput::Name(name) => self.upsert_tag(derive_slug(name), name).await,
            };
            if !resolved.iter().any(|existing| existing.id == tag.id) {
                resolved.push(tag);
            }
        }
        Ok(resolved)
    }
}

#[derive(Default)]
pub struct MemorySettings {
    settings: Mutex<Vec<SettingRecord>>,
}

impl MemorySettings {
    /// A representative subset of the stored defaults.
    pub fn seeded() -> Self {
        let rows = [
            (SettingGroup::Core, "routes_hash", Value::Null, SettingType::String),
            (SettingGroup::Site, "title", json!("Quire"), SettingType::String),
            (SettingGroup::Site, "description", json!("Thoughts"), SettingType::String),
            (SettingGroup::Private, "is_private", json!(false), SettingType::Boolean),
            (SettingGroup::Members, "members_signup_access", json!("all"), SettingType::String),
            (SettingGroup::Members, "members_support_address", json!("noreply"), SettingType::String),
            (SettingGroup::Members, "stripe_secret_key", Value::Null, SettingType::String),
            (SettingGroup::Members, "stripe_publishable_key", Value::Null, SettingType::String),
            (SettingGroup::Members, "stripe_connect_publishable_key", json!("pk_live"), SettingType::String),
            (SettingGroup::Members, "stripe_connect_secret_key", json!("sk_live"), SettingType::String),
            (SettingGroup::Members, "stripe_connect_livemode", json!(true), SettingType::Boolean),
            (SettingGroup::Members, "stripe_connect_display_name", json!("Shop"), SettingType::String),
            (SettingGroup::Members, "stripe_connect_account_id", json!("acct_1"), SettingType::String),
            (SettingGroup::Members, "members_stripe_webhook_id", json!("we_1"), SettingType::String),
            (SettingGroup::Members, "members_stripe_webhook_secret", json!("whsec_1"), SettingType::String),
            (SettingGroup::Email, "mailgun_api_key", json!("key-123"), SettingType::String),
            (SettingGroup::Labs, "labs", json!({}), SettingType::Object),
        ];
        let now = OffsetDateTime::now_utc();
        let settings = rows
            .into_iter()
            .map(|(group, key, value, value_type)| SettingRecord {
                id: Uuid::new_v4(),
                group,
                key: key.to_string(),
                value,
                value_type,
                created_at: now,
                updated_at: now,
            })
            .collect();
        Self {
            settings: Mutex::new(settings),
        }
    }

    pub async fn value(&self, key: &str) -> Option<Value> {
        self.settings
            .lock()
            .await
            .iter()
            .find(|setting| setting.key == key)
            .map(|setting| setting.value.clone())
    }
}

#[async_trait]
impl SettingsRepo for MemorySettings {
    async fn list(&self) -> Result<Vec<SettingRecord>, RepoError> {
        let mut settings = self.settings.lock().await.clone();
        settings.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(settings)
    }

    async fn find(&self, key: &str) -> Result<Option<SettingRecord>, RepoError> {
        Ok(self
            .settings
            .lock()
            .await
            .iter()
            .find(|setting| setting.key == key)
            .cloned())
    }

    async fn edit_batch(&self, updates: &[SettingUpdate]) -> Result<Vec<SettingRecord>, RepoError> {
        let mut settings = self.settings.lock().await;
        if updates
            .iter()
            .any(|update| !settings.iter().any(|setting| setting.key == update.key))
        {
            return Err(RepoError::NotFound);
        }

        let mut changed: Vec<SettingRecord> = Vec::new();
        for update in updates {
            if let Some(setting) = settings.iter_mut().find(|setting| setting.key == update.key)
                && setting.value != update.value
            {
                setting.value = update.value.clone();
                setting.updated_at = OffsetDateTime::now_utc();
                changed.retain(|existing| existing.key != setting.key);
                changed.push(setting.clone());
            }
        }
        Ok(changed)
    }
}

#[derive(Default)]
pub struct MemoryMembers {
    pub paid: Mutex<u64>,
}

#[async_trait]
impl MembersRepo for MemoryMembers {
    async fn count_paid(&self) -> Result<u64, RepoError> {
        Ok(*self.paid.lock().await)
    }
}

#[derive(Default)]
pub struct MemoryApiKeys {
    keys: Mutex<Vec<ApiKeyRecord>>,
}

#[async_trait]
impl ApiKeysRepo for MemoryApiKeys {
    async fn create_key(&self, params: CreateApiKeyParams) -> Result<ApiKeyRecord, RepoError> {
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            integration_id: params.integration_id,
            name: params.name,
            prefix: params.prefix,
            hashed_secret: params.hashed_secret,
            status: ApiKeyStatus::Active,
            expires_at: params.expires_at,
            last_used_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.keys.lock().await.push(record.clone());
        Ok(record)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError> {
        Ok(self
            .keys
            .lock()
            .await
            .iter()
            .find(|key| key.prefix == prefix)
            .cloned())
    }

    async fn update_last_used(&self, id: Uuid, when: OffsetDateTime) -> Result<(), RepoError> {
        if let Some(key) = self.keys.lock().await.iter_mut().find(|key| key.id == id) {
            key.last_used_at = Some(when);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingStripe {
    pub deleted: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl StripeGateway for RecordingStripe {
    async fn delete_webhook(&self, secret_key: &str, webhook_id: &str) -> Result<(), StripeError> {
        self.deleted
            .lock()
            .await
            .push((secret_key.to_string(), webhook_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl KeyVerificationMailer for RecordingMailer {
    async fn send_verification(
        &self,
        key: &str,
        address: &str,
        token: &str,
    ) -> Result<(), MailError> {
        self.sent
            .lock()
            .await
            .push((key.to_string(), address.to_string(), token.to_string()));
        Ok(())
    }
}

/// Store probe whose answer is fixed up front.
pub struct FixedHealth(pub bool);

#[async_trait]
impl HealthProbe for FixedHealth {
    async fn ping(&self) -> Result<(), RepoError> {
        if self.0 {
            Ok(())
        } else {
            Err(RepoError::Timeout)
        }
    }
}

/// Admin API wired to in-memory collaborators.
pub struct Harness {
    pub api: AdminApi,
    pub api_keys: Arc<MemoryApiKeys>,
    pub users: Arc<MemoryUsers>,
    pub posts: Arc<MemoryPosts>,
    pub settings: Arc<MemorySettings>,
    pub members: Arc<MemoryMembers>,
    pub stripe: Arc<RecordingStripe>,
    pub mailer: Arc<RecordingMailer>,
    pub routes: RouteSettings,
}

impl Harness {
    pub fn new(routes_dir: &Path) -> Self {
        let users = Arc::new(MemoryUsers::default());
        let posts = Arc::new(MemoryPosts::new(users.clone()));
        let settings = Arc::new(MemorySettings::seeded());
        let members = Arc::new(MemoryMembers::default());
        let stripe = Arc::new(RecordingStripe::default());
        let mailer = Arc::new(RecordingMailer::default());
        let routes = RouteSettings::new(routes_dir);

        let api = AdminApi::new(AdminDeps {
            posts: posts.clone(),
            users: users.clone(),
            settings: settings.clone(),
            members: members.clone(),
            stripe: stripe.clone(),
            mailer: mailer.clone(),
            key_tokens: Arc::new(KeyUpdateTokens::new(time::Duration::hours(24))),
            routes: routes.clone(),
            site_url: Url::parse("https://example.com/").expect("site url"),
        });

        Self {
            api,
            api_keys: Arc::new(MemoryApiKeys::default()),
            users,
            posts,
            settings,
            members,
            stripe,
            mailer,
            routes,
        }
    }

    /// Transport state around this harness. Purges are queued, never sent.
    pub fn api_state(&self, max_requests: u32, max_request_bytes: usize) -> ApiState {
        let config = CacheConfig::default();
        let queue = Arc::new(EventQueue::new());
        let consumer = CacheConsumer::new(config.clone(), queue.clone()).expect("cache consumer");

        ApiState {
            admin: self.api.clone(),
            api_keys: Arc::new(ApiKeyService::new(self.api_keys.clone())),
            rate_limiter: Arc::new(ApiRateLimiter::new(
                std::time::Duration::from_secs(60),
                max_requests,
            )),
            uploads: UploadStaging::new(None, max_request_bytes as u64),
            cache: CacheTrigger::new(config, queue, Arc::new(consumer)),
            trusted_user_header: Some(STAFF_HEADER.to_string()),
            max_request_bytes,
        }
    }

    pub fn router_state(&self, api: ApiState, healthy: bool) -> RouterState {
        RouterState {
            api,
            health: Arc::new(FixedHealth(healthy)),
        }
    }

    /// Issue an integration key and return its bearer token.
    pub async fn issue_token(&self, expires_at: Option<OffsetDateTime>) -> String {
        ApiKeyService::new(self.api_keys.clone())
            .issue(IssueApiKeyCommand {
                name: "Zapier".into(),
                integration_id: Uuid::new_v4(),
                expires_at,
            })
            .await
            .expect("api key issued")
            .token
    }

    pub async fn user(&self, role: RoleName) -> UserRecord {
        self.users.add(role.as_str(), role).await
    }

    pub fn frame_for(user: &UserRecord) -> Frame {
        Frame::new(RequestContext::user(user.id))
    }

    /// Create a post through the API as `user` and return its JSON.
    pub async fn create_post(&self, user: &UserRecord, post: Value) -> Value {
        let response = self
            .api
            .posts
            .add(Self::frame_for(user).with_data(json!({ "posts": [post] })))
            .await
            .expect("post created");
        response.json().expect("json body")["posts"][0].clone()
    }

    pub async fn status_of(&self, id: &str) -> PostStatus {
        let id = Uuid::parse_str(id).expect("uuid");
        self.posts
            .all()
            .await
            .into_iter()
            .find(|post| post.id == id)
            .map(|post| post.status)
            .expect("post exists")
    }
}
