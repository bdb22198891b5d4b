//! Image hosting client used to remove book cover assets.
//!
//! The catalog only ever deletes assets; uploads happen client-side and the
//! resulting `publicId` is stored on the book.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use async_trait::async_trait;
use bookstore_kernel::settings::{MediaSettings, SignatureAlgorithm};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Outcome reported by the media service for a deletion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeletion {
    /// `"ok"` when the asset was removed, `"not found"` when it was already gone.
    pub result: String,
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("media request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("media service rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("media service is not configured")]
    Disabled,
}

/// Deletes stored images by their asset id.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn delete_asset(&self, public_id: &str) -> Result<MediaDeletion, MediaError>;
}

/// Cloudinary destroy API client.
#[derive(Clone)]
pub struct CloudinaryClient {
    http: reqwest::Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    signature_algorithm: SignatureAlgorithm,
}

impl std::fmt::Debug for CloudinaryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryClient")
            .field("base_url", &self.base_url)
            .field("cloud_name", &self.cloud_name)
            .field("signature_algorithm", &self.signature_algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

impl CloudinaryClient {
    pub fn new(
        base_url: impl Into<String>,
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build media HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            signature_algorithm: SignatureAlgorithm::default(),
        })
    }

    pub fn with_signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    fn destroy_url(&self) -> String {
        format!("{}/v1_1/{}/image/destroy", self.base_url, self.cloud_name)
    }
}

fn hex_digest<D: Digest>(to_sign: &str, api_secret: &str) -> String {
    let mut hasher = D::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Sign request parameters: sorted `key=value` pairs joined by `&`, secret
/// appended, hex digest with the given algorithm.
pub fn sign_params(
    params: &[(&str, &str)],
    api_secret: &str,
    algorithm: SignatureAlgorithm,
) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    match algorithm {
        SignatureAlgorithm::Sha1 => hex_digest::<Sha1>(&to_sign, api_secret),
        SignatureAlgorithm::Sha256 => hex_digest::<Sha256>(&to_sign, api_secret),
    }
}

#[async_trait]
impl MediaStore for CloudinaryClient {
    async fn delete_asset(&self, public_id: &str) -> Result<MediaDeletion, MediaError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
            .to_string();
        let signature = sign_params(
            &[("public_id", public_id), ("timestamp", &timestamp)],
            &self.api_secret,
            self.signature_algorithm,
        );

        let mut form = vec![
            ("public_id", public_id),
            ("timestamp", timestamp.as_str()),
            ("api_key", self.api_key.as_str()),
            ("signature", signature.as_str()),
        ];
        // SHA-1 is the service default and is not announced.
        if self.signature_algorithm == SignatureAlgorithm::Sha256 {
            form.push(("signature_algorithm", "sha256"));
        }

        let response = self.http.post(self.destroy_url()).form(&form).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(MediaError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<MediaDeletion>().await?)
    }
}

/// Used when no media credentials are configured: every deletion fails with
/// [`MediaError::Disabled`] so callers log the orphaned asset.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMedia;

#[async_trait]
impl MediaStore for DisabledMedia {
    async fn delete_asset(&self, _public_id: &str) -> Result<MediaDeletion, MediaError> {
        Err(MediaError::Disabled)
    }
}

/// Build the media client described by the settings.
pub fn from_settings(settings: &MediaSettings) -> anyhow::Result<Arc<dyn MediaStore>> {
    match settings.credentials() {
        Some((cloud_name, api_key, api_secret)) => {
            tracing::info!(
                target: "bookstore-media",
                cloud = cloud_name,
                algorithm = ?settings.signature_algorithm,
                "media cleanup enabled"
            );
            let client = CloudinaryClient::new(
                settings.base_url.clone(),
                cloud_name,
                api_key,
                api_secret,
                Duration::from_millis(settings.timeout_ms),
            )?
            .with_signature_algorithm(settings.signature_algorithm);
            Ok(Arc::new(client))
        }
        None => {
            tracing::warn!(
                target: "bookstore-media",
                "media credentials missing; cover images will not be deleted"
            );
            Ok(Arc::new(DisabledMedia))
        }
    }
}
