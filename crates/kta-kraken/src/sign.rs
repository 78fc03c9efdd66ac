//! Private-endpoint request signing.
//!
//! Kraken authenticates private calls with an `API-Sign` header:
//! `base64(HMAC-SHA512(base64decode(secret), path || SHA256(nonce || postdata)))`.
//! The nonce must also appear as the first field of the POST body, strictly
//! increasing per key.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;

/// Compute the `API-Sign` header value for one private request.
pub(crate) fn sign_request(path: &str, nonce: &str, postdata: &str, secret_b64: &str) -> Result<String> {
    let secret = BASE64
        .decode(secret_b64)
        .context("API secret is not valid base64")?;

    let mut inner = Sha256::new();
    inner.update(nonce.as_bytes());
    inner.update(postdata.as_bytes());
    let digest = inner.finalize();

    let mut mac =
        HmacSha512::new_from_slice(&secret).map_err(|e| anyhow!("HMAC key error: {e}"))?;
    mac.update(path.as_bytes());
    mac.update(&digest);

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
