//! Shared domain enumerations aligned with persisted database enums.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "post_status", rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Published,
    Scheduled,
    Sent,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Sent => "sent",
        }
    }

    /// Statuses that make the post visible on the public site.
    pub fn is_live(self) -> bool {
        matches!(self, PostStatus::Published | PostStatus::Sent)
    }
}

impl FromStr for PostStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "scheduled" => Ok(Self::Scheduled),
            "sent" => Ok(Self::Sent),
            _ => Err(()),
        }
    }
}

impl Display for PostStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "post_visibility", rename_all = "snake_case")]
pub enum PostVisibility {
    Public,
    Members,
    Paid,
    Tiers,
}

impl PostVisibility {
    pub fn as_str(self) -> &'static str {
        match self {
            PostVisibility::Public => "public",
            PostVisibility::Members => "members",
            PostVisibility::Paid => "paid",
            PostVisibility::Tiers => "tiers",
        }
    }
}

impl FromStr for PostVisibility {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "members" => Ok(Self::Members),
            "paid" => Ok(Self::Paid),
            "tiers" => Ok(Self::Tiers),
            _ => Err(()),
        }
    }
}

/// Staff and integration roles. Names match the persisted `roles.name` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleName {
    Owner,
    Administrator,
    Editor,
    Author,
    Contributor,
    AdminIntegration,
}

impl RoleName {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleName::Owner => "Owner",
            RoleName::Administrator => "Administrator",
            RoleName::Editor => "Editor",
            RoleName::Author => "Author",
            RoleName::Contributor => "Contributor",
            RoleName::AdminIntegration => "Admin Integration",
        }
    }

    /// Roles allowed to send newsletters and see mail-provider credentials.
    pub fn can_send_email(self) -> bool {
        matches!(
            self,
            RoleName::Owner | RoleName::Administrator | RoleName::Editor
        )
    }

    /// Roles allowed to touch unsafe site-wide attributes such as `labs`.
    pub fn is_elevated(self) -> bool {
        matches!(self, RoleName::Owner | RoleName::Administrator)
    }
}

impl FromStr for RoleName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Owner" => Ok(Self::Owner),
            "Administrator" => Ok(Self::Administrator),
            "Editor" => Ok(Self::Editor),
            "Author" => Ok(Self::Author),
            "Contributor" => Ok(Self::Contributor),
            "Admin Integration" => Ok(Self::AdminIntegration),
            _ => Err(()),
        }
    }
}

impl Display for RoleName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RoleName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "setting_group", rename_all = "snake_case")]
pub enum SettingGroup {
    Core,
    Site,
    Theme,
    Private,
    Members,
    Portal,
    Email,
    Labs,
    Slack,
    Unsplash,
    Views,
    Editor,
    Comments,
    Analytics,
}

impl SettingGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingGroup::Core => "core",
            SettingGroup::Site => "site",
            SettingGroup::Theme => "theme",
            SettingGroup::Private => "private",
            SettingGroup::Members => "members",
            SettingGroup::Portal => "portal",
            SettingGroup::Email => "email",
            SettingGroup::Labs => "labs",
            SettingGroup::Slack => "slack",
            SettingGroup::Unsplash => "unsplash",
            SettingGroup::Views => "views",
            SettingGroup::Editor => "editor",
            SettingGroup::Comments => "comments",
            SettingGroup::Analytics => "analytics",
        }
    }
}

impl FromStr for SettingGroup {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(Self::Core),
            "site" => Ok(Self::Site),
            "theme" => Ok(Self::Theme),
            "private" => Ok(Self::Private),
            "members" => Ok(Self::Members),
            "portal" => Ok(Self::Portal),
            "email" => Ok(Self::Email),
            "labs" => Ok(Self::Labs),
            "slack" => Ok(Self::Slack),
            "unsplash" => Ok(Self::Unsplash),
            "views" => Ok(Self::Views),
            "editor" => Ok(Self::Editor),
            "comments" => Ok(Self::Comments),
            "analytics" => Ok(Self::Analytics),
            _ => Err(()),
        }
    }
}

/// Declared value type of a setting; stored values must conform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "setting_type", rename_all = "snake_case")]
pub enum SettingType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl SettingType {
    /// `null` is accepted for every type; it clears the setting.
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        use serde_json::Value;

        match (self, value) {
            (_, Value::Null) => true,
            (SettingType::String, Value::String(_)) => true,
            (SettingType::Number, Value::Number(_)) => true,
            (SettingType::Boolean, Value::Bool(_)) => true,
            (SettingType::Object, Value::Object(_)) => true,
            (SettingType::Array, Value::Array(_)) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SettingType::String => "string",
            SettingType::Number => "number",
            SettingType::Boolean => "boolean",
            SettingType::Object => "object",
            SettingType::Array => "array",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn email_privilege_limited_to_owner_admin_editor() {
        assert!(RoleName::Owner.can_send_email());
        assert!(RoleName::Administrator.can_send_email());
        assert!(RoleName::Editor.can_send_email());
        assert!(!RoleName::Author.can_send_email());
        assert!(!RoleName::Contributor.can_send_email());
        assert!(!RoleName::AdminIntegration.can_send_email());
    }

    #[test]
    fn role_names_round_trip_through_display() {
        for role in [
            RoleName::Owner,
            RoleName::Administrator,
            RoleName::Editor,
            RoleName::Author,
            RoleName::Contributor,
            RoleName::AdminIntegration,
        ] {
            assert_eq!(role.to_string().parse::<RoleName>(), Ok(role));
        }
    }

    #[test]
    fn setting_type_accepts_null_and_matching_values() {
        assert!(SettingType::Boolean.accepts(&json!(null)));
        assert!(SettingType::Boolean.accepts(&json!(true)));
        assert!(!SettingType::Boolean.accepts(&json!("true")));
        assert!(SettingType::Object.accepts(&json!({"a": 1})));
        assert!(!SettingType::Number.accepts(&json!([1])));
    }
}
