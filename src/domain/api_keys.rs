//! Domain types for integration API keys.

use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Status of an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "api_key_status", rename_all = "snake_case")]
pub enum ApiKeyStatus {
    Active,
    Revoked,
}

impl ApiKeyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }
}

impl Display for ApiKeyStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiKeyStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            _ => Err(()),
        }
    }
}

/// Admin API key owned by an integration. Keys act with the
/// `Admin Integration` role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub name: String,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub status: ApiKeyStatus,
    pub expires_at: Option<OffsetDateTime>,
    pub last_used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl ApiKeyRecord {
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        if self.status != ApiKeyStatus::Active {
            return false;
        }
        if let Some(expires_at) = self.expires_at {
            return expires_at > now;
        }
        true
    }
}
