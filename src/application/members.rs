//! Member counts and the Stripe account behind paid memberships.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::application::error::EndpointError;
use crate::application::repos::{MembersRepo, SettingsRepo};
use crate::domain::settings::{MEMBERS_STRIPE_WEBHOOK_ID, STRIPE_CONNECT_SECRET_KEY};

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("stripe request failed: {0}")]
    Request(String),
    #[error("stripe responded with status {status}: {message}")]
    Api { status: u16, message: String },
}

/// Outbound calls to the Stripe HTTP API.
#[async_trait]
pub trait StripeGateway: Send + Sync {
    /// Delete a webhook endpoint. A missing webhook is not an error.
    async fn delete_webhook(&self, secret_key: &str, webhook_id: &str) -> Result<(), StripeError>;
}

#[derive(Clone)]
pub struct MembersService {
    members: Arc<dyn MembersRepo>,
}

impl MembersService {
    pub fn new(members: Arc<dyn MembersRepo>) -> Self {
        Self { members }
    }

    pub async fn paid_member_count(&self) -> Result<u64, EndpointError> {
        Ok(self.members.count_paid().await?)
    }
}

#[derive(Clone)]
pub struct StripeService {
    settings: Arc<dyn SettingsRepo>,
    gateway: Arc<dyn StripeGateway>,
}

impl StripeService {
    pub fn new(settings: Arc<dyn SettingsRepo>, gateway: Arc<dyn StripeGateway>) -> Self {
        Self { settings, gateway }
    }

    /// Tear down the webhook registered for the connected account, if any.
    pub async fn disconnect(&self) -> Result<(), EndpointError> {
        let webhook_id = self.string_setting(MEMBERS_STRIPE_WEBHOOK_ID).await?;
        let secret_key = self.string_setting(STRIPE_CONNECT_SECRET_KEY).await?;

        let (Some(webhook_id), Some(secret_key)) = (webhook_id, secret_key) else {
            return Ok(());
        };

        self.gateway
            .delete_webhook(&secret_key, &webhook_id)
            .await
            .map_err(|err| EndpointError::internal(err.to_string()))?;
        info!(
            target = "quire::application::members",
            webhook_id = %webhook_id,
            "stripe webhook removed"
        );
        Ok(())
    }

    async fn string_setting(&self, key: &str) -> Result<Option<String>, EndpointError> {
        Ok(self
            .settings
            .find(key)
            .await?
            .and_then(|setting| setting.as_str().map(str::to_string))
            .filter(|value| !value.is_empty()))
    }
}
