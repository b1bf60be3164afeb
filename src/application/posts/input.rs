//! Decoding of the `posts[0]` write payload.

use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::application::error::EndpointError;
use crate::application::repos::{TagInput, UserLookup};
use crate::domain::types::{PostStatus, PostVisibility};

/// Field state in a partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    /// Apply to a nullable field.
    pub fn apply_nullable(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Absent => current,
            Patch::Null => None,
            Patch::Value(value) => Some(value),
        }
    }

    /// Apply to a required field; `null` keeps the current value.
    pub fn apply(self, current: T) -> T {
        match self {
            Patch::Value(value) => value,
            Patch::Absent | Patch::Null => current,
        }
    }

    pub fn value(self) -> Option<T> {
        match self {
            Patch::Value(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub title: Patch<String>,
    pub slug: Patch<String>,
    pub html: Patch<String>,
    pub lexical: Patch<String>,
    pub mobiledoc: Patch<String>,
    pub status: Patch<PostStatus>,
    pub visibility: Patch<PostVisibility>,
    pub featured: Patch<bool>,
    pub custom_excerpt: Patch<String>,
    pub feature_image: Patch<String>,
    pub published_at: Patch<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
    pub tags: Option<Vec<TagInput>>,
    pub authors: Option<Vec<UserLookup>>,
}

impl PostInput {
    pub fn from_value(entry: Option<&Value>) -> Result<Self, EndpointError> {
        let object = match entry {
            Some(Value::Object(object)) => object,
            Some(_) => return Err(EndpointError::validation("Post payload must be an object")),
            None => {
                return Err(EndpointError::validation(
                    "No root key ('posts') provided.",
                ));
            }
        };

        Ok(Self {
            title: string_field(object, "title")?,
            slug: string_field(object, "slug")?,
            html: string_field(object, "html")?,
            lexical: string_field(object, "lexical")?,
            mobiledoc: string_field(object, "mobiledoc")?,
            status: parsed_field(object, "status", |raw| raw.parse().ok())?,
            visibility: parsed_field(object, "visibility", |raw| raw.parse().ok())?,
            featured: match object.get("featured") {
                None => Patch::Absent,
                Some(Value::Null) => Patch::Null,
                Some(Value::Bool(flag)) => Patch::Value(*flag),
                Some(_) => return Err(invalid("featured")),
            },
            custom_excerpt: string_field(object, "custom_excerpt")?,
            feature_image: string_field(object, "feature_image")?,
            published_at: parsed_field(object, "published_at", parse_timestamp)?,
            updated_at: parsed_field(object, "updated_at", parse_timestamp)?.value(),
            tags: relation_list(object, "tags", tag_input)?,
            authors: relation_list(object, "authors", author_input)?,
        })
    }
}

fn invalid(field: &str) -> EndpointError {
    EndpointError::validation_with(format!("Validation failed for {field}"), field)
}

fn string_field(object: &Map<String, Value>, field: &str) -> Result<Patch<String>, EndpointError> {
    match object.get(field) {
        None => Ok(Patch::Absent),
        Some(Value::Null) => Ok(Patch::Null),
        Some(Value::String(value)) => Ok(Patch::Value(value.clone())),
        Some(_) => Err(invalid(field)),
    }
}

fn parsed_field<T>(
    object: &Map<String, Value>,
    field: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Patch<T>, EndpointError> {
    match string_field(object, field)? {
        Patch::Absent => Ok(Patch::Absent),
        Patch::Null => Ok(Patch::Null),
        Patch::Value(raw) => parse(&raw).map(Patch::Value).ok_or_else(|| invalid(field)),
    }
}

fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).ok()
}

fn relation_list<T>(
    object: &Map<String, Value>,
    field: &str,
    parse: impl Fn(&Value) -> Option<T>,
) -> Result<Option<Vec<T>>, EndpointError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| parse(item).ok_or_else(|| invalid(field)))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(invalid(field)),
    }
}

/// Tags may be given as a bare name or as `{id}`, `{slug}` or `{name}`.
fn tag_input(value: &Value) -> Option<TagInput> {
    if let Some(name) = value.as_str() {
        return Some(TagInput::Name(name.to_string()));
    }
    let object = value.as_object()?;
    if let Some(id) = object.get("id").and_then(Value::as_str) {
        return Uuid::parse_str(id).ok().map(TagInput::Id);
    }
    if let Some(slug) = object.get("slug").and_then(Value::as_str) {
        return Some(TagInput::Slug(slug.to_string()));
    }
    object
        .get("name")
        .and_then(Value::as_str)
        .map(|name| TagInput::Name(name.to_string()))
}

/// Authors are referenced by `{id}`, `{email}` or `{slug}`.
fn author_input(value: &Value) -> Option<UserLookup> {
    let object = value.as_object()?;
    if let Some(id) = object.get("id").and_then(Value::as_str) {
        return Uuid::parse_str(id).ok().map(UserLookup::Id);
    }
    if let Some(email) = object.get("email").and_then(Value::as_str) {
        return Some(UserLookup::Email(email.to_string()));
    }
    object
        .get("slug")
        .and_then(Value::as_str)
        .map(|slug| UserLookup::Slug(slug.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn distinguishes_absent_null_and_values() {
        let payload = json!({
            "title": "Hello",
            "custom_excerpt": null,
            "status": "published",
            "tags": ["news", {"slug": "rust"}],
            "published_at": "2024-05-01T10:00:00Z"
        });
        let input = PostInput::from_value(Some(&payload)).expect("input");
        assert_eq!(input.title, Patch::Value("Hello".into()));
        assert_eq!(input.custom_excerpt, Patch::Null);
        assert!(input.feature_image.is_absent());
        assert_eq!(input.status, Patch::Value(PostStatus::Published));
        assert_eq!(
            input.tags,
            Some(vec![
                TagInput::Name("news".into()),
                TagInput::Slug("rust".into())
            ])
        );
        assert!(matches!(input.published_at, Patch::Value(_)));
    }

    #[test]
    fn rejects_bad_types_and_enum_values() {
        assert!(PostInput::from_value(Some(&json!({"status": "archived"}))).is_err());
        assert!(PostInput::from_value(Some(&json!({"featured": "yes"}))).is_err());
        assert!(PostInput::from_value(Some(&json!({"authors": [{"id": "nope"}]}))).is_err());
        assert!(PostInput::from_value(None).is_err());
    }
}
