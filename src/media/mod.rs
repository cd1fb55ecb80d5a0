//! Remote media service boundary.
//!
//! The merge flow only needs three things from the media host: upload an
//! asset from a URL, describe a server-side rendering as a URL, and destroy
//! an asset. [`MediaService`] is that seam; [`cloudinary::CloudinaryClient`]
//! is the production implementation.

pub mod cloudinary;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cloudinary::CloudinaryClient;

#[async_trait]
pub trait MediaService: Send + Sync {
    /// Ask the service to fetch `request.file` and store it under `request.public_id`.
    async fn upload(&self, request: &UploadRequest) -> Result<UploadedAsset, MediaServiceError>;

    /// Delivery URL that renders `transformation` on first access.
    fn transformation_url(&self, transformation: &OverlayTransformation) -> String;

    /// Delete a previously uploaded asset.
    async fn destroy(&self, public_id: &str) -> Result<(), MediaServiceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MediaServiceError {
    /// The service answered with a non-success status. `body` is the raw response text.
    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("request to media service failed: {0}")]
    Transport(String),
    #[error("invalid response from media service: {0}")]
    InvalidResponse(String),
    #[error("media service credentials are not configured")]
    MissingCredentials,
}

/// Upload payload, serialized as-is into the request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadRequest {
    pub file: String,
    pub upload_preset: String,
    pub public_id: String,
    pub resource_type: String,
}

/// The subset of the upload response the merge flow reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadedAsset {
    pub public_id: String,
    /// Seconds, fractional. Present for audio and video assets.
    #[serde(default)]
    pub duration: Option<f64>,
    pub secure_url: String,
}

/// Layer a short clip over the start of a base track.
///
/// Rendered as a single transformation chain:
/// `l_video:<overlay>,e_volume:<v>,e_fade:<ms>,so_<start>,eo_<end>/fl_layer_apply/f_<fmt>/<base>.<fmt>`
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayTransformation {
    pub base_public_id: String,
    pub overlay_public_id: String,
    pub volume_percent: u32,
    pub fade_ms: u32,
    pub trim_start_secs: u64,
    pub trim_end_secs: u64,
    pub output_format: String,
}

impl OverlayTransformation {
    /// The transformation and asset part of a delivery URL, without the
    /// host, cloud or resource type prefix.
    pub fn to_path(&self) -> String {
        // Overlay ids address folders with ':' instead of '/'.
        let overlay = self.overlay_public_id.replace('/', ":");
        format!(
            "l_video:{overlay},e_volume:{volume},e_fade:{fade},so_{start},eo_{end}/fl_layer_apply/f_{fmt}/{base}.{fmt}",
            overlay = overlay,
            volume = self.volume_percent,
            fade = self.fade_ms,
            start = self.trim_start_secs,
            end = self.trim_end_secs,
            fmt = self.output_format,
            base = self.base_public_id,
        )
    }
}

/// Whole seconds covering `duration`, rounding any fraction up.
pub fn trim_end_secs(duration: f64) -> u64 {
    if duration.is_finite() && duration > 0.0 {
        duration.ceil() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformation(overlay: &str, end: u64) -> OverlayTransformation {
        OverlayTransformation {
            base_public_id: "base_script".to_string(),
            overlay_public_id: overlay.to_string(),
            volume_percent: 85,
            fade_ms: 200,
            trim_start_secs: 0,
            trim_end_secs: end,
            output_format: "mp3".to_string(),
        }
    }

    #[test]
    fn test_trim_end_rounds_up() {
        assert_eq!(trim_end_secs(4.2), 5);
        assert_eq!(trim_end_secs(3.0), 3);
        assert_eq!(trim_end_secs(0.01), 1);
        assert_eq!(trim_end_secs(0.0), 0);
        assert_eq!(trim_end_secs(f64::NAN), 0);
    }

    #[test]
    fn test_overlay_path_encoding() {
        let path = transformation("greeting_Jo_Ann_1700000000000", 5).to_path();
        assert_eq!(
            path,
            "l_video:greeting_Jo_Ann_1700000000000,e_volume:85,e_fade:200,so_0,eo_5/fl_layer_apply/f_mp3/base_script.mp3"
        );
    }

    #[test]
    fn test_overlay_folder_separator() {
        let path = transformation("merges/greeting_x", 2).to_path();
        assert!(path.starts_with("l_video:merges:greeting_x,"));
    }

    #[test]
    fn test_uploaded_asset_without_duration() {
        let asset: UploadedAsset = serde_json::from_str(
            r#"{"public_id":"a","secure_url":"https://x/a.mp3","bytes":10}"#,
        )
        .unwrap();
        assert_eq!(asset.duration, None);
    }
}
