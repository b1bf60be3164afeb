use std::sync::Arc;

use serde_json::{Value, json};
use tracing::info;

use crate::application::error::EndpointError;
use crate::application::frame::Frame;
use crate::application::members::{MembersService, StripeService};
use crate::application::permissions::{PermissionsService, Subject, labs_entry};
use crate::application::pipeline::{
    CacheInvalidation, Disposition, EndpointResponse, EndpointSpec, OptionRule, Outcome,
    PermissionRule, ResponseFormat, validate,
};
use crate::application::repos::{SettingUpdate, SettingsRepo};
use crate::application::route_settings::RouteSettings;
use crate::application::settings::SettingsBreadService;
use crate::domain::settings::{
    MAILGUN_API_KEY, STRIPE_CONNECT_INTEGRATION_TOKEN, STRIPE_CONNECT_RESET_KEYS,
};

const ACTIVE_SUBSCRIPTIONS: &str = "Cannot disconnect Stripe whilst you have active subscriptions.";

pub const BROWSE: EndpointSpec = EndpointSpec {
    options: &["group"],
    ..EndpointSpec::new("settings", "browse")
};

pub const READ: EndpointSpec = EndpointSpec {
    options: &["key"],
    validation: &[OptionRule::required("key")],
    ..EndpointSpec::new("settings", "read")
};

pub const VERIFY_KEY_UPDATE: EndpointSpec = EndpointSpec {
    data: &["token"],
    permissions: PermissionRule::Alias("edit"),
    cache_invalidate: true,
    ..EndpointSpec::new("settings", "verifyKeyUpdate")
};

pub const DISCONNECT_STRIPE_CONNECT: EndpointSpec = EndpointSpec {
    permissions: PermissionRule::Alias("edit"),
    status: 204,
    ..EndpointSpec::new("settings", "disconnectStripeConnectIntegration")
};

pub const EDIT: EndpointSpec = EndpointSpec {
    cache_invalidate: true,
    ..EndpointSpec::new("settings", "edit")
};

pub const UPLOAD: EndpointSpec = EndpointSpec {
    permissions: PermissionRule::Alias("edit"),
    cache_invalidate: true,
    ..EndpointSpec::new("settings", "upload")
};

pub const DOWNLOAD: EndpointSpec = EndpointSpec {
    permissions: PermissionRule::Alias("browse"),
    response: ResponseFormat::Plain,
    disposition: Some(Disposition {
        kind: "yaml",
        filename: "routes.yaml",
    }),
    ..EndpointSpec::new("settings", "download")
};

#[derive(Clone)]
pub struct SettingsEndpoints {
    bread: SettingsBreadService,
    repo: Arc<dyn SettingsRepo>,
    members: MembersService,
    stripe: StripeService,
    routes: RouteSettings,
    permissions: PermissionsService,
}

impl SettingsEndpoints {
    pub fn new(
        bread: SettingsBreadService,
        repo: Arc<dyn SettingsRepo>,
        members: MembersService,
        stripe: StripeService,
        routes: RouteSettings,
        permissions: PermissionsService,
    ) -> Self {
        Self {
            bread,
            repo,
            members,
            stripe,
            routes,
            permissions,
        }
    }

    pub async fn browse(&self, frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&BROWSE, &frame)?;
        let actor = self
            .permissions
            .ensure(&frame.context, &BROWSE, Subject::None)
            .await?;

        let mut settings = self
            .bread
            .browse(&frame.context, &frame.option_list("group"))
            .await?;

        // Callers that cannot send email never see the mail provider key.
        if !actor.can_send_email() {
            settings.retain(|setting| setting.key != MAILGUN_API_KEY);
        }

        let outcome = Outcome::json(json!({"settings": settings, "meta": {}}))?;
        Ok(EndpointResponse::from_outcome(&BROWSE, outcome))
    }

    pub async fn read(&self, frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&READ, &frame)?;
        let key = frame.option("key").unwrap_or_default().to_string();
        self.permissions
            .ensure(&frame.context, &READ, Subject::Setting { key: &key })
            .await?;

        let setting = self.bread.read(&key, &frame.context).await?;
        let outcome = Outcome::json(json!({"settings": [setting]}))?;
        Ok(EndpointResponse::from_outcome(&READ, outcome))
    }

    pub async fn verify_key_update(&self, frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&VERIFY_KEY_UPDATE, &frame)?;
        self.permissions
            .ensure(&frame.context, &VERIFY_KEY_UPDATE, Subject::None)
            .await?;

        let token = frame
            .data
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| EndpointError::validation_with("Invalid token provided", "token"))?;
        self.bread.verify_key_update(token).await?;

        // Calculated settings may have changed, so the full set is returned.
        let settings = self.bread.browse(&frame.context, &[]).await?;
        let outcome = Outcome::json(json!({"settings": settings, "meta": {}}))?;
        Ok(EndpointResponse::from_outcome(&VERIFY_KEY_UPDATE, outcome))
    }

    pub async fn disconnect_stripe_connect_integration(
        &self,
        frame: Frame,
    ) -> Result<EndpointResponse, EndpointError> {
        validate(&DISCONNECT_STRIPE_CONNECT, &frame)?;
        self.permissions
            .ensure(&frame.context, &DISCONNECT_STRIPE_CONNECT, Subject::None)
            .await?;

        let paid = self.members.paid_member_count().await?;
        if paid != 0 {
            return Err(EndpointError::bad_request(ACTIVE_SUBSCRIPTIONS));
        }

        self.stripe.disconnect().await?;

        let updates: Vec<SettingUpdate> = STRIPE_CONNECT_RESET_KEYS
            .iter()
            .map(|key| SettingUpdate {
                key: (*key).to_string(),
                value: Value::Null,
            })
            .collect();
        self.repo.edit_batch(&updates).await?;
        info!(
            target = "quire::application::endpoints::settings",
            "stripe connect integration disconnected"
        );

        Ok(EndpointResponse::from_outcome(
            &DISCONNECT_STRIPE_CONNECT,
            Outcome::empty(),
        ))
    }

    pub async fn edit(&self, frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&EDIT, &frame)?;
        let payload = frame
            .data
            .get("settings")
            .filter(|settings| settings.is_array())
            .ok_or_else(|| EndpointError::validation("No root key ('settings') provided."))?;

        self.permissions
            .ensure(
                &frame.context,
                &EDIT,
                Subject::SettingsEdit {
                    labs: labs_entry(payload),
                },
            )
            .await?;

        let entries = setting_pairs(payload)?;
        let token_entry = payload.as_array().and_then(|settings| {
            settings.iter().find(|entry| {
                entry.get("key").and_then(Value::as_str) == Some(STRIPE_CONNECT_INTEGRATION_TOKEN)
            })
        });
        let stripe_connect = self
            .bread
            .get_stripe_connect_data(token_entry, |prop| {
                frame.session_prop(prop).map(str::to_string)
            })?;

        let result = self
            .bread
            .edit(entries, &frame.context, stripe_connect)
            .await?;
        let cache = if result.is_empty() {
            CacheInvalidation::None
        } else {
            CacheInvalidation::All
        };

        // Calculated settings may have changed, so the full set is returned.
        let settings = self.bread.browse(&frame.context, &[]).await?;
        let outcome = Outcome::json(json!({"settings": settings, "meta": result.meta}))?
            .with_cache(cache);
        Ok(EndpointResponse::from_outcome(&EDIT, outcome))
    }

    pub async fn upload(&self, frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&UPLOAD, &frame)?;
        self.permissions
            .ensure(&frame.context, &UPLOAD, Subject::None)
            .await?;

        let file = frame
            .file
            .as_ref()
            .ok_or_else(|| EndpointError::validation("Please select a routes file to upload."))?;
        self.routes.set_from_file_path(&file.path).await?;

        let hash = self.routes.get_current_hash().await?;
        self.bread.sync_routes_hash(&hash).await?;

        Ok(EndpointResponse::from_outcome(&UPLOAD, Outcome::empty()))
    }

    pub async fn download(&self, frame: Frame) -> Result<EndpointResponse, EndpointError> {
        validate(&DOWNLOAD, &frame)?;
        self.permissions
            .ensure(&frame.context, &DOWNLOAD, Subject::None)
            .await?;

        let routes = self.routes.get().await?;
        Ok(EndpointResponse::from_outcome(&DOWNLOAD, Outcome::text(routes)))
    }
}

fn setting_pairs(payload: &Value) -> Result<Vec<(String, Value)>, EndpointError> {
    payload
        .as_array()
        .into_iter()
        .flatten()
        .map(|entry| {
            let key = entry
                .get("key")
                .and_then(Value::as_str)
                .ok_or_else(|| EndpointError::validation("Each setting needs a `key`"))?;
            let value = entry.get("value").cloned().unwrap_or(Value::Null);
            Ok((key.to_string(), value))
        })
        .collect()
}
