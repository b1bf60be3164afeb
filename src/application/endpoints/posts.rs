use serde_json::{Map, Value, json};
use url::Url;

use crate::application::error::EndpointError;
use crate::application::frame::Frame;
use crate::application::pagination::{PageRequest, PaginationMeta};
use crate::application::permissions::{PermissionsService, Subject, unsafe_attrs};
use crate::application::pipeline::{
    CacheInvalidation, EndpointResponse, EndpointSpec, OptionRule, Outcome, validate,
};
use crate::application::posts::serializer::{ShapeOptions, serialize_post};
use crate::application::posts::{POST_NOT_FOUND, PostsService, parse_id};
use crate::application::repos::{PostLookup, PostPageQuery};
use crate::domain::posts::{ALLOWED_FORMATS, ALLOWED_INCLUDES, PostFilter, PostOrder, UNSAFE_ATTRS};
use crate::domain::types::PostStatus;

const SOURCES: &[&str] = &["html"];

pub const BROWSE: EndpointSpec = EndpointSpec {
    options: &[
        "include",
        "filter",
        "fields",
        "formats",
        "limit",
        "order",
        "page",
        "debug",
        "absolute_urls",
    ],
    validation: &[
        OptionRule::values("include", ALLOWED_INCLUDES),
        OptionRule::values("formats", ALLOWED_FORMATS),
    ],
    unsafe_attrs: UNSAFE_ATTRS,
    ..EndpointSpec::new("posts", "browse")
};

pub const READ: EndpointSpec = EndpointSpec {
    options: &[
        "include",
        "fields",
        "formats",
        "debug",
        "absolute_urls",
        "forUpdate",
        "transacting",
    ],
    data: &["id", "slug", "uuid"],
    validation: &[
        OptionRule::values("include", ALLOWED_INCLUDES),
        OptionRule::values("formats", ALLOWED_FORMATS),
    ],
    unsafe_attrs: UNSAFE_ATTRS,
    ..EndpointSpec::new("posts", "read")
};

pub const ADD: EndpointSpec = EndpointSpec {
    options: &["include", "formats", "source"],
    validation: &[
        OptionRule::values("include", ALLOWED_INCLUDES),
        OptionRule::values("source", SOURCES),
    ],
    unsafe_attrs: UNSAFE_ATTRS,
    status: 201,
    ..EndpointSpec::new("posts", "add")
};

pub const EDIT: EndpointSpec = EndpointSpec {
    options: &[
        "include",
        "id",
        "formats",
        "source",
        "email_segment",
        "newsletter",
        "force_rerender",
        "forUpdate",
        "transacting",
    ],
    validation: &[
        OptionRule::values("include", ALLOWED_INCLUDES),
        OptionRule::required("id"),
        OptionRule::values("source", SOURCES),
    ],
    unsafe_attrs: UNSAFE_ATTRS,
    ..EndpointSpec::new("posts", "edit")
};

pub const DESTROY: EndpointSpec = EndpointSpec {
    options: &["include", "id"],
    validation: &[
        OptionRule::values("include", ALLOWED_INCLUDES),
        OptionRule::required("id"),
    ],
    unsafe_attrs: UNSAFE_ATTRS,
    status: 204,
    cache_invalidate: true,
    ..EndpointSpec::new("posts", "destroy")
};

/// Options that only email-capable callers may pass to `edit`.
const EMAIL_OPTIONS: &[&str] = &["newsletter", "email_segment"];

#[derive(Clone)]
pub struct PostsEndpoints {
    service: PostsService,
    permissions: PermissionsService,
    site_url: Url,
}

impl PostsEndpoints {
    pub fn new(service: PostsService, permissions: PermissionsService, site_url: Url) -> Self {
        Self {
            service,
            permissions,
            site_url,
        }
    }

    pub async fn browse(&self, frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&BROWSE, &frame)?;
        self.permissions
            .ensure(&frame.context, &BROWSE, Subject::None)
            .await?;

        let filter = match frame.option("filter") {
            Some(raw) => PostFilter::parse(raw)?,
            None => PostFilter::default(),
        };
        let order = match frame.option("order") {
            Some(raw) => PostOrder::parse(raw)?,
            None => PostOrder::default(),
        };
        let page = PageRequest::parse(frame.option("page"), frame.option("limit"))
            .map_err(|err| EndpointError::validation(err.to_string()))?;

        let result = self
            .service
            .browse(&PostPageQuery {
                filter,
                order,
                page,
            })
            .await?;

        let shape = ShapeOptions::from_frame(&frame);
        let posts: Vec<Value> = result
            .posts
            .iter()
            .map(|post| serialize_post(post, &shape, &self.site_url))
            .collect();
        let meta = PaginationMeta::new(&page, result.total);

        let outcome = Outcome::json(json!({
            "posts": posts,
            "meta": {"pagination": meta},
        }))?;
        Ok(EndpointResponse::from_outcome(&BROWSE, outcome))
    }

    pub async fn read(&self, frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&READ, &frame)?;
        self.permissions
            .ensure(&frame.context, &READ, Subject::None)
            .await?;

        let lookup = read_lookup(&frame.data)?;
        let post = self.service.read(&lookup).await?;
        let shape = ShapeOptions::from_frame(&frame);
        let outcome = Outcome::json(json!({
            "posts": [serialize_post(&post, &shape, &self.site_url)],
        }))?;
        Ok(EndpointResponse::from_outcome(&READ, outcome))
    }

    pub async fn add(&self, frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&ADD, &frame)?;
        let attrs = unsafe_attrs(frame.first_entry("posts"), ADD.unsafe_attrs);
        self.permissions
            .ensure(
                &frame.context,
                &ADD,
                Subject::Post {
                    existing: None,
                    attrs: &attrs,
                },
            )
            .await?;

        let post = self.service.add_post(&frame).await?;
        let cache = if post.status == PostStatus::Published {
            CacheInvalidation::All
        } else {
            CacheInvalidation::None
        };

        let shape = ShapeOptions::from_frame(&frame);
        let outcome = Outcome::json(json!({
            "posts": [serialize_post(&post, &shape, &self.site_url)],
        }))?
        .with_cache(cache);
        Ok(EndpointResponse::from_outcome(&ADD, outcome))
    }

    pub async fn edit(&self, mut frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&EDIT, &frame)?;
        let id = parse_id(frame.option("id"))?;
        let existing = self.service.read(&PostLookup::Id(id)).await?;
        let attrs = unsafe_attrs(frame.first_entry("posts"), EDIT.unsafe_attrs);
        let actor = self
            .permissions
            .ensure(
                &frame.context,
                &EDIT,
                Subject::Post {
                    existing: Some(&existing),
                    attrs: &attrs,
                },
            )
            .await?;

        if !actor.can_send_email() {
            for option in EMAIL_OPTIONS {
                frame.options.remove(*option);
            }
        }

        let edit = self.service.edit_post(&frame).await?;
        let cache = PostsService::handle_cache_invalidation(&edit);

        let shape = ShapeOptions::from_frame(&frame);
        let outcome = Outcome::json(json!({
            "posts": [serialize_post(&edit.post, &shape, &self.site_url)],
        }))?
        .with_cache(cache);
        Ok(EndpointResponse::from_outcome(&EDIT, outcome))
    }

    pub async fn destroy(&self, frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&DESTROY, &frame)?;
        let id = parse_id(frame.option("id"))?;
        let existing = self.service.read(&PostLookup::Id(id)).await?;
        let attrs = Map::new();
        self.permissions
            .ensure(
                &frame.context,
                &DESTROY,
                Subject::Post {
                    existing: Some(&existing),
                    attrs: &attrs,
                },
            )
            .await?;

        self.service.destroy(existing.id).await?;
        Ok(EndpointResponse::from_outcome(&DESTROY, Outcome::empty()))
    }
}

fn read_lookup(data: &Value) -> Result<PostLookup, EndpointError> {
    let field = |key: &str| data.get(key).and_then(Value::as_str);
    if let Some(id) = field("id") {
        return uuid::Uuid::parse_str(id)
            .map(PostLookup::Id)
            .map_err(|_| EndpointError::not_found(POST_NOT_FOUND));
    }
    if let Some(uuid) = field("uuid") {
        return uuid::Uuid::parse_str(uuid)
            .map(PostLookup::Uuid)
            .map_err(|_| EndpointError::not_found(POST_NOT_FOUND));
    }
    field("slug")
        .map(|slug| PostLookup::Slug(slug.to_string()))
        .ok_or_else(|| EndpointError::not_found(POST_NOT_FOUND))
}
