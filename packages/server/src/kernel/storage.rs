//! Object storage gateway: HMAC-signed URLs plus HEAD over HTTP.
//!
//! The gateway in front of the bucket verifies
//! `HMAC-SHA256(key, canonical request)` before serving a PUT/GET/HEAD.
//! The canonical request is
//!
//! ```text
//! METHOD\n/bucket/key\nexpires-unix\nheader:value\n...
//! ```
//!
//! with header names lowercased and sorted.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use sha2::Sha256;
use std::collections::BTreeMap;
use url::Url;

use super::{BaseObjectStorage, HttpMethod, ObjectHead, SignRequest, SignedUrl};

type HmacSha256 = Hmac<Sha256>;

const HEAD_URL_TTL_SECS: i64 = 60;

/// User metadata carrying the client's hex SHA-256. Storage keeps headers of
/// this form on PUT and returns them on HEAD.
pub const SHA256_METADATA_HEADER: &str = "x-amz-meta-sha256";

pub struct SignedUrlStorage {
    base_url: Url,
    bucket: String,
    signing_key: Vec<u8>,
    http: reqwest::Client,
}

impl SignedUrlStorage {
    pub fn new(base_url: &str, bucket: &str, signing_key: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("STORAGE_BASE_URL must be a valid URL")?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("STORAGE_BASE_URL cannot be used as a base URL"));
        }
        Ok(Self {
            base_url,
            bucket: bucket.to_string(),
            signing_key: signing_key.as_bytes().to_vec(),
            http: reqwest::Client::new(),
        })
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("storage base URL has no path"))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(key.split('/'));
        Ok(url)
    }

    fn canonical_request(&self, request: &SignRequest, headers: &BTreeMap<String, String>) -> String {
        let mut canonical = format!(
            "{}\n/{}/{}\n{}",
            request.method.as_str(),
            self.bucket,
            request.key,
            request.expires_at.timestamp()
        );
        for (name, value) in headers {
            canonical.push('\n');
            canonical.push_str(name);
            canonical.push(':');
            canonical.push_str(value.trim());
        }
        canonical
    }

    fn signature(&self, canonical: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| anyhow!("invalid signing key: {}", e))?;
        mac.update(canonical.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Stored SHA-256 as lowercase hex, from either metadata convention.
fn stored_sha256(headers: &HeaderMap) -> Option<String> {
    if let Some(hex_digest) = headers
        .get(SHA256_METADATA_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(hex_digest.trim().to_ascii_lowercase());
    }
    let b64 = headers.get("x-amz-checksum-sha256")?.to_str().ok()?;
    STANDARD.decode(b64.trim()).ok().map(hex::encode)
}

#[async_trait]
impl BaseObjectStorage for SignedUrlStorage {
    fn sign(&self, request: &SignRequest) -> Result<SignedUrl> {
        let headers: BTreeMap<String, String> = request
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();
        let canonical = self.canonical_request(request, &headers);
        let signature = self.signature(&canonical)?;
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let mut url = self.object_url(&request.key)?;
        url.query_pairs_mut()
            .append_pair("X-Toq-Expires", &request.expires_at.timestamp().to_string())
            .append_pair("X-Toq-SignedHeaders", &signed_headers)
            .append_pair("X-Toq-Signature", &signature);

        Ok(SignedUrl {
            method: request.method,
            url: url.to_string(),
            expires_at: request.expires_at,
            headers,
        })
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        let signed = self.sign(&SignRequest {
            method: HttpMethod::Head,
            key: key.to_string(),
            expires_at: Utc::now() + Duration::seconds(HEAD_URL_TTL_SECS),
            headers: BTreeMap::new(),
        })?;

        let response = self.http.head(&signed.url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!("HEAD {} returned {}", key, response.status()));
        }

        let headers = response.headers();
        let size = headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| anyhow!("HEAD {} returned no content length", key))?;
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Some(ObjectHead {
            size,
            content_type,
            sha256: stored_sha256(headers),
        }))
    }
}
