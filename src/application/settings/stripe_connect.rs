//! Decoding of the Stripe Connect integration token handed back by the
//! connect flow.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::Deserialize;

use crate::application::error::EndpointError;

/// Session property holding the state nonce issued when the flow started.
pub const STATE_SESSION_PROP: &str = "stripe-connect-state";

const UNPARSABLE: &str = "The Stripe Connect token could not be parsed.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeConnectData {
    pub public_key: String,
    pub secret_key: String,
    pub livemode: bool,
    pub display_name: Option<String>,
    pub account_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    s: String,
    p: String,
    a: String,
    l: bool,
    #[serde(default)]
    n: Option<String>,
    i: String,
}

/// Decode `token` and check its state against the one stored in the session.
pub fn decode_token(
    token: &str,
    session_state: Option<&str>,
) -> Result<StripeConnectData, EndpointError> {
    let unparsable = || EndpointError::bad_request(UNPARSABLE);

    let token = token.trim();
    let bytes = STANDARD
        .decode(token)
        .or_else(|_| URL_SAFE_NO_PAD.decode(token))
        .map_err(|_| unparsable())?;
    let payload: TokenPayload = serde_json::from_slice(&bytes).map_err(|_| unparsable())?;

    match session_state {
        Some(state) if state == payload.s => {}
        _ => return Err(unparsable()),
    }

    Ok(StripeConnectData {
        public_key: payload.p,
        secret_key: payload.a,
        livemode: payload.l,
        display_name: payload.n,
        account_id: payload.i,
    })
}
