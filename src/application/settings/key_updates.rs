//! Single-use tokens guarding settings that need ownership verification.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("verification mail could not be sent: {0}")]
pub struct MailError(pub String);

/// Delivers the mail that lets an address owner confirm a settings change.
#[async_trait]
pub trait KeyVerificationMailer: Send + Sync {
    async fn send_verification(&self, key: &str, address: &str, token: &str)
    -> Result<(), MailError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingKeyUpdate {
    pub key: String,
    pub value: Value,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct KeyUpdateTokens {
    pending: DashMap<String, PendingKeyUpdate>,
    validity: Duration,
}

impl KeyUpdateTokens {
    pub fn new(validity: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            validity,
        }
    }

    pub fn issue(&self, key: &str, value: Value) -> String {
        self.issue_at(key, value, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, key: &str, value: Value, now: OffsetDateTime) -> String {
        self.sweep(now);
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.pending.insert(
            token.clone(),
            PendingKeyUpdate {
                key: key.to_string(),
                value,
                expires_at: now + self.validity,
            },
        );
        token
    }

    /// Consume a token. Expired and unknown tokens yield `None`.
    pub fn redeem(&self, token: &str) -> Option<PendingKeyUpdate> {
        self.redeem_at(token, OffsetDateTime::now_utc())
    }

    fn redeem_at(&self, token: &str, now: OffsetDateTime) -> Option<PendingKeyUpdate> {
        let (_, pending) = self.pending.remove(token)?;
        (pending.expires_at > now).then_some(pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn sweep(&self, now: OffsetDateTime) {
        self.pending.retain(|_, pending| pending.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tokens_are_single_use() {
        let tokens = KeyUpdateTokens::new(Duration::hours(24));
        let token = tokens.issue("members_support_address", json!("help@example.com"));

        let pending = tokens.redeem(&token).expect("pending update");
        assert_eq!(pending.key, "members_support_address");
        assert!(tokens.redeem(&token).is_none());
    }

    #[test]
    fn expired_tokens_are_rejected_and_swept() {
        let tokens = KeyUpdateTokens::new(Duration::minutes(10));
        let issued_at = OffsetDateTime::now_utc() - Duration::hours(1);
        let stale = tokens.issue_at("members_support_address", json!("a@b.c"), issued_at);
        let later = tokens.issue_at("members_support_address", json!("a@b.c"), issued_at);
        assert!(tokens.redeem(&stale).is_none());

        tokens.issue("members_support_address", json!("x@y.z"));
        assert_eq!(tokens.len(), 1);
        assert!(tokens.redeem(&later).is_none());
    }
}
