//! Response shaping for posts: formats, includes, fields and urls.

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::application::frame::Frame;
use crate::domain::entities::{AuthorRef, PostRecord, TagRef};

#[derive(Debug, Clone, Default)]
pub struct ShapeOptions {
    pub fields: Vec<String>,
    pub formats: Vec<String>,
    pub include: Vec<String>,
    pub absolute_urls: bool,
}

impl ShapeOptions {
    pub fn from_frame(frame: &Frame) -> Self {
        let owned = |key| {
            frame
                .option_list(key)
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        Self {
            fields: owned("fields"),
            formats: owned("formats"),
            include: owned("include"),
            absolute_urls: frame.option_flag("absolute_urls"),
        }
    }

    fn includes(&self, relation: &str) -> bool {
        self.include.iter().any(|item| item == relation)
    }

    fn wants_format(&self, format: &str) -> bool {
        if self.formats.is_empty() {
            return format == "html";
        }
        self.formats.iter().any(|item| item == format)
    }
}

pub fn timestamp(value: OffsetDateTime) -> Value {
    value
        .format(&Rfc3339)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

fn optional_timestamp(value: Option<OffsetDateTime>) -> Value {
    value.map(timestamp).unwrap_or(Value::Null)
}

/// Public path of a post; unpublished posts resolve to their preview path.
pub fn post_path(post: &PostRecord) -> String {
    if post.status.is_live() {
        format!("/{}/", post.slug)
    } else {
        preview_path(post)
    }
}

pub fn preview_path(post: &PostRecord) -> String {
    format!("/p/{}/", post.uuid)
}

fn tag_json(tag: &TagRef) -> Value {
    json!({"id": tag.id.to_string(), "slug": tag.slug, "name": tag.name})
}

fn author_json(author: &AuthorRef, with_roles: bool) -> Value {
    let mut value = json!({
        "id": author.id.to_string(),
        "slug": author.slug,
        "name": author.name,
        "email": author.email,
    });
    if with_roles && let Some(object) = value.as_object_mut() {
        let roles = author
            .roles
            .iter()
            .map(|role| json!({"name": role.as_str()}))
            .collect();
        object.insert("roles".into(), Value::Array(roles));
    }
    value
}

pub fn serialize_post(post: &PostRecord, options: &ShapeOptions, site_url: &Url) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), Value::String(post.id.to_string()));
    out.insert("uuid".into(), Value::String(post.uuid.to_string()));
    out.insert("title".into(), Value::String(post.title.clone()));
    out.insert("slug".into(), Value::String(post.slug.clone()));

    for (format, value) in [
        ("html", &post.html),
        ("lexical", &post.lexical),
        ("mobiledoc", &post.mobiledoc),
        ("plaintext", &post.plaintext),
    ] {
        if options.wants_format(format) {
            out.insert(format.into(), json!(value));
        }
    }

    out.insert("status".into(), json!(post.status.as_str()));
    out.insert("visibility".into(), json!(post.visibility.as_str()));
    out.insert("featured".into(), json!(post.featured));
    out.insert("custom_excerpt".into(), json!(post.custom_excerpt));
    out.insert("excerpt".into(), json!(excerpt(post)));
    out.insert("feature_image".into(), json!(post.feature_image));
    out.insert("email_segment".into(), json!(post.email_segment));
    out.insert("created_at".into(), timestamp(post.created_at));
    out.insert("updated_at".into(), timestamp(post.updated_at));
    out.insert("published_at".into(), optional_timestamp(post.published_at));

    let path = post_path(post);
    let url = if options.absolute_urls {
        site_url
            .join(path.trim_start_matches('/'))
            .map(String::from)
            .unwrap_or(path)
    } else {
        path
    };
    out.insert("url".into(), Value::String(url));

    if options.includes("tags") {
        let tags: Vec<Value> = post.tags.iter().map(tag_json).collect();
        out.insert(
            "primary_tag".into(),
            tags.first().cloned().unwrap_or(Value::Null),
        );
        out.insert("tags".into(), Value::Array(tags));
    }

    let with_roles = options.includes("authors.roles");
    if options.includes("authors") || with_roles {
        let authors: Vec<Value> = post
            .authors
            .iter()
            .map(|author| author_json(author, with_roles))
            .collect();
        out.insert(
            "primary_author".into(),
            authors.first().cloned().unwrap_or(Value::Null),
        );
        out.insert("authors".into(), Value::Array(authors));
    }

    if options.includes("newsletter") {
        let newsletter = post
            .newsletter
            .as_ref()
            .map(|slug| json!({"slug": slug}))
            .unwrap_or(Value::Null);
        out.insert("newsletter".into(), newsletter);
    }

    if !options.fields.is_empty() {
        out.retain(|key, _| key == "id" || options.fields.iter().any(|field| field == key));
    }

    Value::Object(out)
}

fn excerpt(post: &PostRecord) -> Option<String> {
    if let Some(custom) = post.custom_excerpt.as_ref().filter(|value| !value.is_empty()) {
        return Some(custom.clone());
    }
    post.plaintext
        .as_ref()
        .map(|text| text.chars().take(500).collect())
}
