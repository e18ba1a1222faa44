use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha384;
use std::time::{SystemTime, UNIX_EPOCH};
use xf_types::{Credentials, Error, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Auth {
    api_key: String,
    auth_sig: String,
    auth_nonce: String,
    auth_payload: String,
}

impl Auth {
    pub(crate) fn new(credentials: &Credentials, nonce: u64) -> Result<Auth> {
        let payload = format!("AUTH{nonce}");
        Ok(Auth {
            api_key: credentials.api_key.clone(),
            auth_sig: sign(&credentials.api_secret, &payload)?,
            auth_nonce: nonce.to_string(),
            auth_payload: payload,
        })
    }
}

/// Microseconds since the epoch, so nonces keep increasing across reconnects.
pub(crate) fn nonce() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .map_err(|e| Error::Config(format!("system clock before epoch: {e}")))
}

fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut hmac: Hmac<Sha384> = Hmac::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Config(format!("invalid api secret: {e}")))?;
    hmac.update(payload.as_bytes());
    Ok(hex::encode(hmac.finalize().into_bytes()))
}
