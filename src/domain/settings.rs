//! Setting keys with special handling and the values derived from them.

use serde_json::Value;

use crate::domain::entities::SettingRecord;

pub const MAILGUN_API_KEY: &str = "mailgun_api_key";
pub const LABS: &str = "labs";
pub const ROUTES_HASH: &str = "routes_hash";
pub const MEMBERS_SUPPORT_ADDRESS: &str = "members_support_address";
pub const MEMBERS_SIGNUP_ACCESS: &str = "members_signup_access";
pub const STRIPE_CONNECT_INTEGRATION_TOKEN: &str = "stripe_connect_integration_token";

pub const STRIPE_CONNECT_PUBLISHABLE_KEY: &str = "stripe_connect_publishable_key";
pub const STRIPE_CONNECT_SECRET_KEY: &str = "stripe_connect_secret_key";
pub const STRIPE_CONNECT_LIVEMODE: &str = "stripe_connect_livemode";
pub const STRIPE_CONNECT_DISPLAY_NAME: &str = "stripe_connect_display_name";
pub const STRIPE_CONNECT_ACCOUNT_ID: &str = "stripe_connect_account_id";
pub const MEMBERS_STRIPE_WEBHOOK_ID: &str = "members_stripe_webhook_id";
pub const MEMBERS_STRIPE_WEBHOOK_SECRET: &str = "members_stripe_webhook_secret";
pub const STRIPE_SECRET_KEY: &str = "stripe_secret_key";
pub const STRIPE_PUBLISHABLE_KEY: &str = "stripe_publishable_key";

/// Keys nulled when the Stripe Connect integration is disconnected.
pub const STRIPE_CONNECT_RESET_KEYS: [&str; 7] = [
    STRIPE_CONNECT_PUBLISHABLE_KEY,
    STRIPE_CONNECT_SECRET_KEY,
    STRIPE_CONNECT_LIVEMODE,
    STRIPE_CONNECT_DISPLAY_NAME,
    STRIPE_CONNECT_ACCOUNT_ID,
    MEMBERS_STRIPE_WEBHOOK_ID,
    MEMBERS_STRIPE_WEBHOOK_SECRET,
];

pub const MEMBERS_ENABLED: &str = "members_enabled";
pub const MEMBERS_INVITE_ONLY: &str = "members_invite_only";
pub const PAID_MEMBERS_ENABLED: &str = "paid_members_enabled";

/// Keys computed from other settings. They are never stored.
pub const CALCULATED_KEYS: [&str; 3] = [MEMBERS_ENABLED, MEMBERS_INVITE_ONLY, PAID_MEMBERS_ENABLED];

/// Placeholder shown to external callers instead of secret values.
pub const OBFUSCATED_VALUE: &str = "••••••••";

/// Support address value that needs no ownership verification.
pub const NOREPLY_ADDRESS: &str = "noreply";

pub fn is_secret(key: &str) -> bool {
    key.contains("secret")
}

pub fn is_calculated(key: &str) -> bool {
    CALCULATED_KEYS.contains(&key)
}

/// Compute the derived member settings from the stored ones.
pub fn calculated_values(settings: &[SettingRecord]) -> Vec<(&'static str, Value)> {
    let lookup = |key: &str| settings.iter().find(|setting| setting.key == key);
    let is_set = |key: &str| lookup(key).is_some_and(SettingRecord::is_set);

    let signup_access = lookup(MEMBERS_SIGNUP_ACCESS)
        .and_then(SettingRecord::as_str)
        .unwrap_or("all");
    let members_enabled = signup_access != "none";
    let invite_only = signup_access == "invite";

    let stripe_connected = (is_set(STRIPE_CONNECT_SECRET_KEY)
        && is_set(STRIPE_CONNECT_PUBLISHABLE_KEY))
        || (is_set(STRIPE_SECRET_KEY) && is_set(STRIPE_PUBLISHABLE_KEY));

    vec![
        (MEMBERS_ENABLED, Value::Bool(members_enabled)),
        (MEMBERS_INVITE_ONLY, Value::Bool(invite_only)),
        (
            PAID_MEMBERS_ENABLED,
            Value::Bool(members_enabled && stripe_connected),
        ),
    ]
}
