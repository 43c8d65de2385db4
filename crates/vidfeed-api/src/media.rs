//! Media provider client.
//!
//! The provider hosts uploads and transcoding. We ask it for a direct upload
//! slot when a video is created and tell it to drop the asset when the video
//! is removed; everything else arrives through the media webhook.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A direct-upload URL and the provider's id for it.
#[derive(Debug, Clone)]
pub struct UploadSlot {
    pub upload_id: String,
    pub url: String,
}

#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// `passthrough` comes back on every asset callback for this upload.
    async fn create_upload(&self, passthrough: &str) -> Result<UploadSlot>;
    /// Deleting an asset the provider no longer has succeeds.
    async fn delete_asset(&self, asset_id: &str) -> Result<()>;
}

/// Mux video API over HTTP basic auth.
pub struct MuxClient {
    http_client: reqwest::Client,
    base_url: String,
    token_id: String,
    token_secret: String,
    cors_origin: String,
}

#[derive(Serialize)]
struct CreateUploadBody<'a> {
    cors_origin: &'a str,
    new_asset_settings: NewAssetSettings<'a>,
}

#[derive(Serialize)]
struct NewAssetSettings<'a> {
    playback_policy: [&'a str; 1],
    passthrough: &'a str,
}

#[derive(Deserialize)]
struct MuxEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct MuxUpload {
    id: String,
    url: String,
}

impl MuxClient {
    pub fn new(base_url: String, token_id: String, token_secret: String, cors_origin: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token_id,
            token_secret,
            cors_origin,
        }
    }
}

#[async_trait]
impl MediaProvider for MuxClient {
    async fn create_upload(&self, passthrough: &str) -> Result<UploadSlot> {
        let body = CreateUploadBody {
            cors_origin: &self.cors_origin,
            new_asset_settings: NewAssetSettings {
                playback_policy: ["public"],
                passthrough,
            },
        };

        let response = self
            .http_client
            .post(format!("{}/video/v1/uploads", self.base_url))
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("upload creation failed: {} {}", status, text);
        }

        let upload: MuxEnvelope<MuxUpload> = response.json().await?;
        Ok(UploadSlot {
            upload_id: upload.data.id,
            url: upload.data.url,
        })
    }

    async fn delete_asset(&self, asset_id: &str) -> Result<()> {
        let response = self
            .http_client
            .delete(format!("{}/video/v1/assets/{}", self.base_url, asset_id))
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            status => bail!("asset deletion failed: {}", status),
        }
    }
}
