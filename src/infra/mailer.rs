//! Verification mail delivery.
//!
//! There is no outbound mail transport; the confirmation link is written to
//! the log so an operator can forward it.

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::application::settings::key_updates::{KeyVerificationMailer, MailError};

#[derive(Debug, Clone)]
pub struct LoggingMailer {
    site_url: Url,
}

impl LoggingMailer {
    pub fn new(site_url: Url) -> Self {
        Self { site_url }
    }

    fn verification_link(&self, token: &str) -> Result<Url, MailError> {
        let mut link = self
            .site_url
            .join("ghost/")
            .map_err(|err| MailError(err.to_string()))?;
        link.set_fragment(Some(&format!("/settings/verify?token={token}")));
        Ok(link)
    }
}

#[async_trait]
impl KeyVerificationMailer for LoggingMailer {
    async fn send_verification(
        &self,
        key: &str,
        address: &str,
        token: &str,
    ) -> Result<(), MailError> {
        let link = self.verification_link(token)?;
        info!(
            target = "quire::infra::mailer",
            key = key,
            to = address,
            link = %link,
            "verification mail queued"
        );
        Ok(())
    }
}
