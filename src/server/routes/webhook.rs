//! The build service's completion callback (§4.L). HMAC-signed when
//! `build_service.webhook_secret` is configured, mirroring the teacher's
//! signature-verification convention for inbound webhooks.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tracing::warn;

use crate::domain::application::JobReport;
use crate::error::{Result, TriggerError};
use crate::server::AppState;

type HmacSha256 = Hmac<Sha256>;

pub async fn completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<StatusCode> {
    if let Some(secret) = &state.config.auth.webhook_secret {
        verify_signature(secret, &headers, &body)?;
    }

    let report: JobReport = serde_json::from_slice(&body).map_err(|e| TriggerError::Config(format!("malformed completion report: {e}")))?;

    state.trigger.notify_of_completion(report, chrono::Utc::now()).await?;
    Ok(StatusCode::ACCEPTED)
}

fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<()> {
    let provided = headers
        .get("X-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| TriggerError::Config("missing X-Signature header".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        warn!(target: "audit", "Rejected completion report with invalid signature");
        return Err(TriggerError::Config("invalid webhook signature".to_string()));
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let secret = "shh";
        let body = br#"{"hello":"world"}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("X-Signature", signature.parse().unwrap());
        assert!(verify_signature(secret, &headers, body).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let secret = "shh";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(b"original");
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("X-Signature", signature.parse().unwrap());
        assert!(verify_signature(secret, &headers, b"tampered").is_err());
    }
}
