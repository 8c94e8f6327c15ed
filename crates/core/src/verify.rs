use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::WebhookError;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Query parameters of the subscription handshake (`GET /webhook`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Echoes the challenge back when `mode == "subscribe"` and the token matches.
pub fn verify_subscription(query: &VerifyQuery, expected_token: &str) -> Result<String, WebhookError> {
    let mode = query.mode.as_deref().unwrap_or_default();
    let provided = query.verify_token.as_deref().unwrap_or_default();

    if mode != "subscribe" {
        warn!(mode = %mode, "webhook verification failed: unexpected mode");
        return Err(WebhookError::VerificationFailed);
    }
    if expected_token.is_empty() || provided != expected_token {
        warn!("webhook verification failed: verify token mismatch");
        return Err(WebhookError::VerificationFailed);
    }

    info!("webhook verification succeeded");
    Ok(query.challenge.clone().unwrap_or_default())
}

/// Checks `sha256=<hex>` against an HMAC-SHA256 of the raw body keyed by the app secret.
pub fn verify_signature(signature_header: Option<&str>, body: &[u8], app_secret: &str) -> bool {
    let Some(sig_hex) = signature_header.and_then(|s| s.trim().strip_prefix("sha256=")) else {
        return false;
    };
    let Some(sig_bytes) = decode_hex(sig_hex) else {
        return false;
    };

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&sig_bytes).is_ok()
}

/// `sha256=<hex>` header value for `body`; the platform computes the same thing.
pub fn sign_body(body: &[u8], app_secret: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(body);
    let hex = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    format!("sha256={}", hex)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}
