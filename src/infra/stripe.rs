//! Stripe API client used when a connected account is torn down.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::application::members::{StripeError, StripeGateway};
use crate::config::StripeSettings;

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpStripeGateway {
    client: Client,
    api_base: Url,
}

impl HttpStripeGateway {
    pub fn new(api_base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("quire/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, api_base })
    }

    pub fn from_settings(settings: &StripeSettings) -> Result<Self, reqwest::Error> {
        Self::new(settings.api_base.clone(), settings.timeout)
    }

    fn webhook_url(&self, webhook_id: &str) -> Result<Url, StripeError> {
        self.api_base
            .join(&format!("v1/webhook_endpoints/{webhook_id}"))
            .map_err(|err| StripeError::Request(format!("invalid webhook url: {err}")))
    }
}

#[async_trait]
impl StripeGateway for HttpStripeGateway {
    async fn delete_webhook(&self, secret_key: &str, webhook_id: &str) -> Result<(), StripeError> {
        let url = self.webhook_url(webhook_id)?;
        let response = self
            .client
            .delete(url)
            .bearer_auth(secret_key)
            .send()
            .await
            .map_err(|err| StripeError::Request(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(
                target = "quire::infra::stripe",
                webhook_id = webhook_id,
                "webhook endpoint deleted"
            );
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            warn!(
                target = "quire::infra::stripe",
                webhook_id = webhook_id,
                "webhook endpoint already gone"
            );
            return Ok(());
        }

        let message = response
            .json::<StripeErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| status.to_string());
        Err(StripeError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
