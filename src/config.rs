//! # Configuration Management
//!
//! Loads the service configuration from several layered sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix, `__` between sections)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform variables (HOST, PORT, CLOUDINARY_API_KEY, CLOUDINARY_API_SECRET)
//! 2. Environment variables (APP_SERVER__PORT, APP_MEDIA__CLOUD_NAME, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## Why the double underscore:
//! Several keys contain underscores themselves (`cloud_name`, `upload_preset`),
//! so a single `_` cannot tell a section boundary from a word boundary.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Sections:
/// - `server`: where the HTTP listener binds
/// - `media`: which remote media account to talk to and how
/// - `merge`: the audio directives baked into every transformation URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub merge: MergeConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Remote media service (Cloudinary) settings.
///
/// ## Fields:
/// - `cloud_name`: account identifier embedded in every API and delivery URL
/// - `upload_preset`: unsigned upload preset used for both uploads
/// - `base_script_public_id`: the pre-provisioned track the greeting is layered onto
/// - `resource_type`: asset class for uploads; audio lives under "video"
/// - `api_base_url` / `delivery_base_url`: upload API and CDN roots
/// - `api_key` / `api_secret`: optional; cleanup only runs when both are set
/// - `request_timeout_secs`: upper bound for each outbound call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub upload_preset: String,
    pub base_script_public_id: String,
    pub resource_type: String,
    pub api_base_url: String,
    pub delivery_base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    pub request_timeout_secs: u64,
}

/// Audio directives applied to the greeting overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Greeting loudness relative to the source, in percent.
    pub volume_percent: u32,
    /// Fade applied to the greeting, in milliseconds.
    pub fade_ms: u32,
    /// Output container/codec requested from the service.
    pub output_format: String,
}

/// API key and secret pair used for destroy calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            media: MediaConfig {
                cloud_name: "df12eghmr".to_string(),
                upload_preset: "audio_merge".to_string(),
                base_script_public_id: "2025-07-15_16.55.08_oxotfl".to_string(),
                resource_type: "video".to_string(),
                api_base_url: "https://api.cloudinary.com/v1_1".to_string(),
                delivery_base_url: "https://res.cloudinary.com".to_string(),
                api_key: None,
                api_secret: None,
                request_timeout_secs: 120,
            },
            merge: MergeConfig {
                volume_percent: 85,
                fade_ms: 200,
                output_format: "mp3".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_MEDIA__BASE_SCRIPT_PUBLIC_ID=intro_v2`: Switch the base track
    /// - `HOST=0.0.0.0` / `PORT=3000`: Deployment platform conventions
    /// - `CLOUDINARY_API_KEY` / `CLOUDINARY_API_SECRET`: Enable cleanup
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("CLOUDINARY_API_KEY") {
            settings = settings.set_override("media.api_key", key)?;
        }

        if let Ok(secret) = env::var("CLOUDINARY_API_SECRET") {
            settings = settings.set_override("media.api_secret", secret)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catches mistakes at startup rather than on the first merge request.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        let required = [
            ("media.cloud_name", &self.media.cloud_name),
            ("media.upload_preset", &self.media.upload_preset),
            ("media.base_script_public_id", &self.media.base_script_public_id),
            ("media.resource_type", &self.media.resource_type),
            ("merge.output_format", &self.merge.output_format),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("{} must not be empty", key));
            }
        }

        if !(1..=100).contains(&self.merge.volume_percent) {
            return Err(anyhow::anyhow!(
                "merge.volume_percent must be between 1 and 100, got {}",
                self.merge.volume_percent
            ));
        }

        if self.media.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("media.request_timeout_secs must be greater than 0"));
        }

        Ok(())
    }
}

impl MediaConfig {
    /// Both halves of the credential pair, or `None` when either is missing or blank.
    pub fn credentials(&self) -> Option<MediaCredentials> {
        let api_key = self.api_key.as_deref().filter(|v| !v.is_empty())?;
        let api_secret = self.api_secret.as_deref().filter(|v| !v.is_empty())?;
        Some(MediaCredentials {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
