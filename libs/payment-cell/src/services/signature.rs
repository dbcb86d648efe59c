// libs/payment-cell/src/services/signature.rs
//
// Stripe webhook signatures: `Stripe-Signature: t=<unix>,v1=<hex hmac>`, where
// the HMAC-SHA256 is taken over `"{t}.{raw body}"` with the endpoint secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::models::PaymentError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_TOLERANCE_SECONDS: u64 = 300;

fn signing_mac(secret: &str, timestamp: i64, payload: &str) -> Result<HmacSha256, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Lowercase hex `v1` signature for `payload` sent at `timestamp`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &str) -> Result<String, PaymentError> {
    let mac = signing_mac(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks `header` against `payload` and returns the signed timestamp.
/// Any one matching `v1` entry is enough, which lets Stripe roll secrets.
pub fn verify_signature(header: &str, payload: &str, secret: &str, now: i64) -> Result<i64, PaymentError> {
    if secret.is_empty() {
        return Err(PaymentError::NotConfigured);
    }

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("no v1 signature".to_string()));
    }

    let matched = signatures
        .iter()
        .filter_map(|signature| hex::decode(signature).ok())
        .map(|expected| signing_mac(secret, timestamp, payload).map(|mac| mac.verify_slice(&expected).is_ok()))
        .collect::<Result<Vec<bool>, PaymentError>>()?
        .into_iter()
        .any(|ok| ok);

    if !matched {
        debug!("No webhook signature matched for timestamp {}", timestamp);
        return Err(PaymentError::InvalidSignature("signature mismatch".to_string()));
    }

    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECONDS {
        return Err(PaymentError::StaleTimestamp(timestamp));
    }

    Ok(timestamp)
}
