//! # Greeting Merge Flow
//!
//! Turns a prospect's greeting clip into a finished voice note by layering it
//! over the base script track on the media service:
//!
//! 1. upload the greeting from the caller's URL
//! 2. describe the overlay as a transformation URL
//! 3. ask the service to materialize that URL as a stored asset
//! 4. destroy the greeting upload when credentials allow it
//!
//! If step 3 is refused, the transformation URL is still a playable answer
//! (the service renders it lazily on first fetch), so it is returned instead
//! of an error. Every step runs strictly after the previous one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{MediaConfig, MergeConfig};
use crate::error::{AppError, AppResult};
use crate::media::{
    trim_end_secs, MediaService, MediaServiceError, OverlayTransformation, UploadRequest,
};

pub const MISSING_FIELDS_MESSAGE: &str = "Missing required fields";

/// Raw inbound body. Fields stay loosely typed so that absent, `null`,
/// empty and numeric values can all be judged in one place.
#[derive(Debug, Default, Deserialize)]
pub struct MergeRequestBody {
    #[serde(rename = "downloadURL", default)]
    pub download_url: Option<Value>,
    #[serde(rename = "prospectName", default)]
    pub prospect_name: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// A request with every required field present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub download_url: String,
    pub prospect_name: String,
    pub timestamp: String,
}

impl MergeRequestBody {
    pub fn from_slice(body: &[u8]) -> AppResult<Self> {
        serde_json::from_slice(body)
            .map_err(|_| AppError::ValidationError(MISSING_FIELDS_MESSAGE.to_string()))
    }

    pub fn validate(self) -> AppResult<MergeRequest> {
        match (
            required_text(self.download_url),
            required_text(self.prospect_name),
            required_text(self.timestamp),
        ) {
            (Some(download_url), Some(prospect_name), Some(timestamp)) => Ok(MergeRequest {
                download_url,
                prospect_name,
                timestamp,
            }),
            _ => Err(AppError::ValidationError(MISSING_FIELDS_MESSAGE.to_string())),
        }
    }
}

fn required_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Replace everything outside `[A-Za-z0-9]` with `_`, one underscore per char.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// The uploaded greeting clip.
#[derive(Debug, Clone, PartialEq)]
pub struct GreetingAsset {
    pub public_id: String,
    pub duration: f64,
    pub secure_url: String,
}

/// The merged voice note, either stored by the service or described by URL.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedAsset {
    pub public_id: String,
    /// `None` when the service computes it on first delivery.
    pub duration: Option<f64>,
    pub secure_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// The service stored the rendering as its own asset.
    Materialized,
    /// The service refused to store it; the transformation URL is returned as is.
    Deferred,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CleanupOutcome {
    Skipped,
    Destroyed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub prospect_name: String,
    pub greeting: GreetingAsset,
    pub merged: MergedAsset,
    pub transformation_url: String,
    pub file_name: String,
    pub render_mode: RenderMode,
    pub cleanup: CleanupOutcome,
}

/// Success body returned to the caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub status: &'static str,
    pub merged_audio_url: String,
    pub public_id: String,
    pub file_name: String,
    pub duration: Option<f64>,
    pub greeting_duration: f64,
    pub message: String,
}

impl MergeOutcome {
    pub fn message(&self) -> String {
        match self.render_mode {
            RenderMode::Materialized => match self.merged.duration {
                Some(duration) => format!(
                    "Successfully merged audio for {}. Final duration: {}s",
                    self.prospect_name, duration
                ),
                None => format!("Successfully merged audio for {}", self.prospect_name),
            },
            RenderMode::Deferred => {
                format!("Direct concatenation URL created for {}", self.prospect_name)
            }
        }
    }

    pub fn into_response(self) -> MergeResponse {
        let message = self.message();
        MergeResponse {
            status: "success",
            merged_audio_url: self.merged.secure_url,
            public_id: self.merged.public_id,
            file_name: self.file_name,
            duration: self.merged.duration,
            greeting_duration: self.greeting.duration,
            message,
        }
    }
}

/// Runs the merge flow against a [`MediaService`].
pub struct AudioMerger {
    media: Arc<dyn MediaService>,
    upload_preset: String,
    resource_type: String,
    base_script_public_id: String,
    merge: MergeConfig,
    cleanup_enabled: bool,
}

impl AudioMerger {
    pub fn new(media: Arc<dyn MediaService>, media_config: &MediaConfig, merge: &MergeConfig) -> Self {
        Self {
            media,
            upload_preset: media_config.upload_preset.clone(),
            resource_type: media_config.resource_type.clone(),
            base_script_public_id: media_config.base_script_public_id.clone(),
            merge: merge.clone(),
            cleanup_enabled: media_config.credentials().is_some(),
        }
    }

    pub fn cleanup_enabled(&self) -> bool {
        self.cleanup_enabled
    }

    pub fn base_script_public_id(&self) -> &str {
        &self.base_script_public_id
    }

    pub async fn merge(&self, request: &MergeRequest) -> AppResult<MergeOutcome> {
        let sanitized = sanitize_name(&request.prospect_name);
        info!(prospect = %request.prospect_name, download_url = %request.download_url, "Processing audio");

        let greeting = self.upload_greeting(request, &sanitized).await?;

        let transformation = self.overlay_for(&greeting);
        let transformation_url = self.media.transformation_url(&transformation);
        info!(url = %transformation_url, "Generated concatenation URL");
        info!(
            greeting_duration = greeting.duration,
            "Expected total duration: greeting + base script duration"
        );

        let file_name = format!("{}_voice_note_{}.mp3", sanitized, request.timestamp);
        let final_upload = UploadRequest {
            file: transformation_url.clone(),
            upload_preset: self.upload_preset.clone(),
            public_id: format!("{}_full_voice_note_{}", sanitized, request.timestamp),
            resource_type: self.resource_type.clone(),
        };

        info!(public_id = %final_upload.public_id, "Creating final concatenated audio");
        let (merged, render_mode) = match self.media.upload(&final_upload).await {
            Ok(asset) => {
                info!(
                    duration = ?asset.duration,
                    url = %asset.secure_url,
                    "Final concatenated audio created"
                );
                (
                    MergedAsset {
                        public_id: asset.public_id,
                        duration: asset.duration,
                        secure_url: asset.secure_url,
                    },
                    RenderMode::Materialized,
                )
            }
            Err(MediaServiceError::Rejected { status, body }) => {
                warn!(status, error = %body, "Final concatenation failed, returning transformation URL");
                (
                    MergedAsset {
                        public_id: format!("{}_direct_{}", sanitized, request.timestamp),
                        duration: None,
                        secure_url: transformation_url.clone(),
                    },
                    RenderMode::Deferred,
                )
            }
            Err(err) => return Err(err.into()),
        };

        // The deferred URL still layers the greeting, so it must outlive this request.
        let cleanup = match render_mode {
            RenderMode::Materialized => self.cleanup(&greeting.public_id).await,
            RenderMode::Deferred => CleanupOutcome::Skipped,
        };

        Ok(MergeOutcome {
            prospect_name: request.prospect_name.clone(),
            greeting,
            merged,
            transformation_url,
            file_name,
            render_mode,
            cleanup,
        })
    }

    async fn upload_greeting(&self, request: &MergeRequest, sanitized: &str) -> AppResult<GreetingAsset> {
        let upload = UploadRequest {
            file: request.download_url.clone(),
            upload_preset: self.upload_preset.clone(),
            public_id: format!(
                "greeting_{}_{}",
                sanitized,
                chrono::Utc::now().timestamp_millis()
            ),
            resource_type: self.resource_type.clone(),
        };

        info!(public_id = %upload.public_id, "Uploading greeting");
        let asset = match self.media.upload(&upload).await {
            Ok(asset) => asset,
            Err(MediaServiceError::Rejected { status, body }) => {
                error!(status, error = %body, "Greeting upload failed");
                return Err(AppError::UploadFailed(format!(
                    "Greeting upload failed: {}",
                    body
                )));
            }
            Err(err) => return Err(err.into()),
        };

        let duration = asset
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Greeting upload '{}' returned no usable duration",
                    asset.public_id
                ))
            })?;

        info!(public_id = %asset.public_id, duration, "Greeting uploaded");
        Ok(GreetingAsset {
            public_id: asset.public_id,
            duration,
            secure_url: asset.secure_url,
        })
    }

    fn overlay_for(&self, greeting: &GreetingAsset) -> OverlayTransformation {
        OverlayTransformation {
            base_public_id: self.base_script_public_id.clone(),
            overlay_public_id: greeting.public_id.clone(),
            volume_percent: self.merge.volume_percent,
            fade_ms: self.merge.fade_ms,
            trim_start_secs: 0,
            trim_end_secs: trim_end_secs(greeting.duration),
            output_format: self.merge.output_format.clone(),
        }
    }

    async fn cleanup(&self, public_id: &str) -> CleanupOutcome {
        if !self.cleanup_enabled {
            return CleanupOutcome::Skipped;
        }

        match self.media.destroy(public_id).await {
            Ok(()) => {
                info!(public_id = %public_id, "Temporary greeting file cleaned up");
                CleanupOutcome::Destroyed
            }
            Err(err) => {
                warn!(public_id = %public_id, error = %err, "Cleanup warning (not critical)");
                CleanupOutcome::Failed(err.to_string())
            }
        }
    }
}
