//! Cloudinary implementation of [`MediaService`].
//!
//! Uploads and destroys go to the REST API
//! (`<api_base>/<cloud>/<resource_type>/{upload,destroy}`); transformation
//! URLs point at the delivery CDN (`<delivery_base>/<cloud>/<resource_type>/upload/...`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MediaService, MediaServiceError, OverlayTransformation, UploadRequest, UploadedAsset};
use crate::config::{MediaConfig, MediaCredentials};

pub struct CloudinaryClient {
    client: Client,
    api_base_url: String,
    delivery_base_url: String,
    cloud_name: String,
    resource_type: String,
    credentials: Option<MediaCredentials>,
}

#[derive(Serialize)]
struct DestroyRequest<'a> {
    public_id: &'a str,
    resource_type: &'a str,
    api_key: &'a str,
    api_secret: &'a str,
}

#[derive(Deserialize)]
struct DestroyResponse {
    #[serde(default)]
    result: Option<String>,
}

impl CloudinaryClient {
    pub fn new(config: &MediaConfig) -> Result<Self, MediaServiceError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| MediaServiceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            delivery_base_url: config.delivery_base_url.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone(),
            resource_type: config.resource_type.clone(),
            credentials: config.credentials(),
        })
    }

    fn api_url(&self, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.api_base_url, self.cloud_name, self.resource_type, action
        )
    }
}

#[async_trait]
impl MediaService for CloudinaryClient {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadedAsset, MediaServiceError> {
        let url = self.api_url("upload");
        debug!(url = %url, public_id = %request.public_id, "Uploading asset");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| MediaServiceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaServiceError::Rejected { status, body });
        }

        response
            .json::<UploadedAsset>()
            .await
            .map_err(|e| MediaServiceError::InvalidResponse(e.to_string()))
    }

    fn transformation_url(&self, transformation: &OverlayTransformation) -> String {
        format!(
            "{}/{}/{}/upload/{}",
            self.delivery_base_url,
            self.cloud_name,
            self.resource_type,
            transformation.to_path()
        )
    }

    async fn destroy(&self, public_id: &str) -> Result<(), MediaServiceError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(MediaServiceError::MissingCredentials)?;

        let body = DestroyRequest {
            public_id,
            resource_type: &self.resource_type,
            api_key: &credentials.api_key,
            api_secret: &credentials.api_secret,
        };

        let response = self
            .client
            .post(self.api_url("destroy"))
            .json(&body)
            .send()
            .await
            .map_err(|e| MediaServiceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaServiceError::Rejected { status, body });
        }

        let outcome: DestroyResponse = response
            .json()
            .await
            .map_err(|e| MediaServiceError::InvalidResponse(e.to_string()))?;

        match outcome.result.as_deref() {
            Some("ok") | None => Ok(()),
            Some(other) => Err(MediaServiceError::InvalidResponse(format!(
                "destroy returned '{}'",
                other
            ))),
        }
    }
}
