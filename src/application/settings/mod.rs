//! Site settings: browse/read/edit with calculated values, secret
//! obfuscation, verified key updates and Stripe Connect data.

mod bread;
pub mod key_updates;
pub mod stripe_connect;

pub use bread::{SettingEntry, SettingsBreadService, SettingsEditResult};
