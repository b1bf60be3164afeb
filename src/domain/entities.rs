//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{PostStatus, PostVisibility, RoleName, SettingGroup, SettingType};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRef {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorRef {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub email: String,
    pub roles: Vec<RoleName>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub uuid: Uuid,
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
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub tags: Vec<TagRef>,
    pub authors: Vec<AuthorRef>,
}

impl PostRecord {
    pub fn primary_author(&self) -> Option<&AuthorRef> {
        self.authors.first()
    }

    pub fn is_authored_by(&self, user_id: Uuid) -> bool {
        self.authors.iter().any(|author| author.id == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub email: String,
    pub roles: Vec<RoleName>,
}

impl UserRecord {
    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingRecord {
    pub id: Uuid,
    pub group: SettingGroup,
    pub key: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: SettingType,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl SettingRecord {
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// A setting "has a value" when it is neither null nor an empty string.
    pub fn is_set(&self) -> bool {
        match &self.value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}
