use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::application::error::EndpointError;
use crate::application::frame::RequestContext;
use crate::application::repos::{SettingUpdate, SettingsRepo};
use crate::application::settings::key_updates::{KeyUpdateTokens, KeyVerificationMailer};
use crate::application::settings::stripe_connect::{
    STATE_SESSION_PROP, StripeConnectData, decode_token,
};
use crate::domain::entities::SettingRecord;
use crate::domain::settings::{
    MEMBERS_SUPPORT_ADDRESS, NOREPLY_ADDRESS, OBFUSCATED_VALUE, ROUTES_HASH,
    STRIPE_CONNECT_ACCOUNT_ID, STRIPE_CONNECT_DISPLAY_NAME, STRIPE_CONNECT_INTEGRATION_TOKEN,
    STRIPE_CONNECT_LIVEMODE, STRIPE_CONNECT_PUBLISHABLE_KEY, STRIPE_CONNECT_SECRET_KEY,
    calculated_values, is_calculated, is_secret,
};
use crate::domain::types::SettingGroup;

const CORE_FROM_EXTERNAL: &str = "Attempted to access core setting from external request";
const INVALID_TOKEN: &str = "Invalid token provided";

/// A setting as exposed by the admin API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: Value,
    #[serde(skip)]
    pub group: SettingGroup,
}

/// Outcome of a settings edit: only the settings whose value changed.
#[derive(Debug, Clone, Default)]
pub struct SettingsEditResult {
    pub changed: Vec<SettingRecord>,
    pub meta: Map<String, Value>,
}

impl SettingsEditResult {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

#[derive(Clone)]
pub struct SettingsBreadService {
    repo: Arc<dyn SettingsRepo>,
    tokens: Arc<KeyUpdateTokens>,
    mailer: Arc<dyn KeyVerificationMailer>,
}

impl SettingsBreadService {
    pub fn new(
        repo: Arc<dyn SettingsRepo>,
        tokens: Arc<KeyUpdateTokens>,
        mailer: Arc<dyn KeyVerificationMailer>,
    ) -> Self {
        Self {
            repo,
            tokens,
            mailer,
        }
    }

    /// All settings visible to `context`, calculated ones included.
    pub async fn browse(
        &self,
        context: &RequestContext,
        groups: &[&str],
    ) -> Result<Vec<SettingEntry>, EndpointError> {
        let stored = self.repo.list().await?;
        let calculated = calculated_values(&stored);

        let mut entries: Vec<SettingEntry> = stored
            .into_iter()
            .filter(|setting| context.internal || setting.group != SettingGroup::Core)
            .map(|setting| present(setting, context))
            .collect();
        entries.extend(calculated.into_iter().map(|(key, value)| SettingEntry {
            key: key.to_string(),
            value,
            group: SettingGroup::Members,
        }));

        if !groups.is_empty() {
            entries.retain(|entry| groups.contains(&entry.group.as_str()));
        }
        Ok(entries)
    }

    pub async fn read(
        &self,
        key: &str,
        context: &RequestContext,
    ) -> Result<SettingEntry, EndpointError> {
        if is_calculated(key) {
            let stored = self.repo.list().await?;
            return calculated_values(&stored)
                .into_iter()
                .find(|(calculated, _)| *calculated == key)
                .map(|(key, value)| SettingEntry {
                    key: key.to_string(),
                    value,
                    group: SettingGroup::Members,
                })
                .ok_or_else(|| not_found(key));
        }

        let setting = self.repo.find(key).await?.ok_or_else(|| not_found(key))?;
        if setting.group == SettingGroup::Core && context.is_external() {
            return Err(EndpointError::no_permission(CORE_FROM_EXTERNAL));
        }
        Ok(present(setting, context))
    }

    pub async fn edit(
        &self,
        settings: Vec<(String, Value)>,
        context: &RequestContext,
        stripe_connect: Option<StripeConnectData>,
    ) -> Result<SettingsEditResult, EndpointError> {
        let stored = self.repo.list().await?;
        let mut updates = Vec::with_capacity(settings.len());
        let mut verification = Vec::new();
        let mut meta = Map::new();

        for (key, value) in settings {
            if key == STRIPE_CONNECT_INTEGRATION_TOKEN {
                continue;
            }
            if is_secret(&key) && value.as_str() == Some(OBFUSCATED_VALUE) {
                continue;
            }
            if is_calculated(&key) {
                return Err(not_found(&key));
            }
            let setting = stored
                .iter()
                .find(|setting| setting.key == key)
                .ok_or_else(|| not_found(&key))?;
            if setting.group == SettingGroup::Core && context.is_external() {
                return Err(EndpointError::no_permission(CORE_FROM_EXTERNAL));
            }
            if !setting.value_type.accepts(&value) {
                return Err(EndpointError::validation_with(
                    format!(
                        "Value for `{key}` must be of type {}",
                        setting.value_type.as_str()
                    ),
                    key,
                ));
            }

            if key == MEMBERS_SUPPORT_ADDRESS
                && value != setting.value
                && value.as_str().is_some_and(|address| address != NOREPLY_ADDRESS)
            {
                verification.push(value);
                continue;
            }

            updates.push(SettingUpdate { key, value });
        }

        if let Some(data) = stripe_connect {
            updates.extend(stripe_connect_updates(data));
        }

        for value in verification {
            self.request_verification(MEMBERS_SUPPORT_ADDRESS, value)
                .await?;
            meta.insert(
                "sent_email_verification".into(),
                json!([MEMBERS_SUPPORT_ADDRESS]),
            );
        }

        let changed = if updates.is_empty() {
            Vec::new()
        } else {
            self.repo.edit_batch(&updates).await?
        };

        info!(
            target = "quire::application::settings",
            requested = updates.len(),
            changed = changed.len(),
            "settings edited"
        );
        Ok(SettingsEditResult { changed, meta })
    }

    /// Redeem a key-update token and apply the pending value.
    pub async fn verify_key_update(&self, token: &str) -> Result<(), EndpointError> {
        let pending = self
            .tokens
            .redeem(token)
            .ok_or_else(|| EndpointError::validation_with(INVALID_TOKEN, "token"))?;

        self.repo
            .edit_batch(&[SettingUpdate {
                key: pending.key.clone(),
                value: pending.value,
            }])
            .await?;
        info!(
            target = "quire::application::settings",
            key = %pending.key,
            "verified settings update applied"
        );
        Ok(())
    }

    /// Resolve Stripe Connect data when the payload carries an integration
    /// token with a value.
    pub fn get_stripe_connect_data(
        &self,
        token_setting: Option<&Value>,
        session_prop: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<StripeConnectData>, EndpointError> {
        let Some(token) = token_setting
            .and_then(|setting| setting.get("value"))
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
        else {
            return Ok(None);
        };
        let state = session_prop(STATE_SESSION_PROP);
        decode_token(token, state.as_deref()).map(Some)
    }

    /// Store `hash` as `routes_hash` when it differs from the stored value.
    pub async fn sync_routes_hash(&self, hash: &str) -> Result<bool, EndpointError> {
        let current = self.repo.find(ROUTES_HASH).await?;
        if current.as_ref().and_then(SettingRecord::as_str) == Some(hash) {
            return Ok(false);
        }
        let changed = self
            .repo
            .edit_batch(&[SettingUpdate {
                key: ROUTES_HASH.to_string(),
                value: Value::String(hash.to_string()),
            }])
            .await?;
        Ok(!changed.is_empty())
    }

    async fn request_verification(&self, key: &str, value: Value) -> Result<(), EndpointError> {
        let address = value
            .as_str()
            .filter(|address| address.contains('@'))
            .ok_or_else(|| EndpointError::validation_with("Invalid email address", key))?
            .to_string();
        let token = self.tokens.issue(key, value);
        if let Err(err) = self.mailer.send_verification(key, &address, &token).await {
            warn!(
                target = "quire::application::settings",
                key,
                error = %err,
                "verification mail failed"
            );
            return Err(EndpointError::internal(err.to_string()));
        }
        Ok(())
    }
}

fn not_found(key: &str) -> EndpointError {
    EndpointError::not_found(format!("Problem finding setting: {key}"))
}

fn present(setting: SettingRecord, context: &RequestContext) -> SettingEntry {
    let value = if context.is_external() && is_secret(&setting.key) && setting.is_set() {
        Value::String(OBFUSCATED_VALUE.to_string())
    } else {
        setting.value
    };
    SettingEntry {
        key: setting.key,
        value,
        group: setting.group,
    }
}

fn stripe_connect_updates(data: StripeConnectData) -> [SettingUpdate; 5] {
    [
        SettingUpdate {
            key: STRIPE_CONNECT_PUBLISHABLE_KEY.into(),
            value: Value::String(data.public_key),
        },
        SettingUpdate {
            key: STRIPE_CONNECT_SECRET_KEY.into(),
            value: Value::String(data.secret_key),
        },
        SettingUpdate {
            key: STRIPE_CONNECT_LIVEMODE.into(),
            value: Value::Bool(data.livemode),
        },
        SettingUpdate {
            key: STRIPE_CONNECT_DISPLAY_NAME.into(),
            value: data.display_name.map(Value::String).unwrap_or(Value::Null),
        },
        SettingUpdate {
            key: STRIPE_CONNECT_ACCOUNT_ID.into(),
            value: Value::String(data.account_id),
        },
    ]
}
