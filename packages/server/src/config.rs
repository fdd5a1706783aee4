use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domains::listings::models::PropertyTypeRules;
use crate::domains::media::models::AssetType;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: String,
    pub storage_base_url: String,
    pub storage_bucket: String,
    pub storage_signing_key: String,
    pub notifications_webhook_url: Option<String>,
    pub engine: EngineSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = EngineSettings::default();
        let property_type_rules = match env::var("PROPERTY_TYPE_RULES") {
            Ok(json) => PropertyTypeRules::with_overrides_json(&json)?,
            Err(_) => defaults.property_type_rules.clone(),
        };

        let engine = EngineSettings {
            reservation_ttl: secs_var("RESERVATION_TTL_SECS", defaults.reservation_ttl)?,
            upload_url_ttl: secs_var("UPLOAD_URL_TTL_SECS", defaults.upload_url_ttl)?,
            download_url_ttl: secs_var("DOWNLOAD_URL_TTL_SECS", defaults.download_url_ttl)?,
            max_retries: parsed_var("MEDIA_MAX_RETRIES", defaults.max_retries)?,
            backoff_base: millis_var("MEDIA_BACKOFF_BASE_MS", defaults.backoff_base)?,
            backoff_cap: millis_var("MEDIA_BACKOFF_CAP_MS", defaults.backoff_cap)?,
            command_timeout: millis_var("COMMAND_TIMEOUT_MS", defaults.command_timeout)?,
            property_type_rules,
            ..defaults
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parsed_var("PORT", 8080)?,
            nats_url: env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            storage_base_url: env::var("STORAGE_BASE_URL")
                .context("STORAGE_BASE_URL must be set")?,
            storage_bucket: env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "toq-listings".to_string()),
            storage_signing_key: env::var("STORAGE_SIGNING_KEY")
                .context("STORAGE_SIGNING_KEY must be set")?,
            notifications_webhook_url: env::var("NOTIFICATIONS_WEBHOOK_URL").ok(),
            engine,
        })
    }
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_secs(parsed_var(name, default.as_secs())?))
}

fn millis_var(name: &str, default: Duration) -> Result<Duration> {
    let millis = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Ok(Duration::from_millis(parsed_var(name, millis)?))
}

/// Upload limits for one asset type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPolicy {
    pub mime_types: Vec<&'static str>,
    pub max_bytes: i64,
}

impl AssetPolicy {
    pub fn allows_mime(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        self.mime_types.iter().any(|m| *m == essence)
    }
}

const MB: i64 = 1024 * 1024;

/// Listing engine knobs. Built once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long a reserved slot is held before it may be taken by others.
    pub reservation_ttl: Duration,
    pub upload_url_ttl: Duration,
    pub download_url_ttl: Duration,
    /// Retriable processing failures tolerated before a batch fails for good.
    pub max_retries: i32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Deadline for commands that arrive without one.
    pub command_timeout: Duration,
    pub asset_policies: HashMap<AssetType, AssetPolicy>,
    pub property_type_rules: PropertyTypeRules,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let images = vec!["image/jpeg", "image/png", "image/heic", "image/webp"];
        let mut asset_policies = HashMap::new();
        asset_policies.insert(
            AssetType::Photo,
            AssetPolicy {
                mime_types: images.clone(),
                max_bytes: 30 * MB,
            },
        );
        asset_policies.insert(
            AssetType::Video,
            AssetPolicy {
                mime_types: vec!["video/mp4", "video/quicktime"],
                max_bytes: 2048 * MB,
            },
        );
        asset_policies.insert(
            AssetType::Panorama,
            AssetPolicy {
                mime_types: vec!["image/jpeg"],
                max_bytes: 60 * MB,
            },
        );
        asset_policies.insert(
            AssetType::FloorPlan,
            AssetPolicy {
                mime_types: vec!["application/pdf", "image/jpeg", "image/png"],
                max_bytes: 30 * MB,
            },
        );
        asset_policies.insert(
            AssetType::ProjectDoc,
            AssetPolicy {
                mime_types: vec!["application/pdf"],
                max_bytes: 50 * MB,
            },
        );
        asset_policies.insert(
            AssetType::ProjectRender,
            AssetPolicy {
                mime_types: vec!["image/jpeg", "image/png"],
                max_bytes: 30 * MB,
            },
        );

        Self {
            reservation_ttl: Duration::from_secs(15 * 60),
            upload_url_ttl: Duration::from_secs(15 * 60),
            download_url_ttl: Duration::from_secs(15 * 60),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            command_timeout: Duration::from_secs(10),
            asset_policies,
            property_type_rules: PropertyTypeRules::default(),
        }
    }
}

impl EngineSettings {
    pub fn asset_policy(&self, asset_type: AssetType) -> Option<&AssetPolicy> {
        self.asset_policies.get(&asset_type)
    }

    /// `min(2^retry_count * base, cap)`.
    pub fn backoff_for(&self, retry_count: i32) -> Duration {
        let exponent = u32::try_from(retry_count.max(0)).unwrap_or(0).min(31);
        self.backoff_base
            .checked_mul(1u32 << exponent)
            .map_or(self.backoff_cap, |delay| delay.min(self.backoff_cap))
    }

    /// `std` durations as chrono deltas for timestamp arithmetic.
    pub fn ttl(duration: Duration) -> chrono::Duration {
        chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let settings = EngineSettings::default();
        assert_eq!(settings.backoff_for(0), Duration::from_secs(1));
        assert_eq!(settings.backoff_for(1), Duration::from_secs(2));
        assert_eq!(settings.backoff_for(5), Duration::from_secs(32));
        assert_eq!(settings.backoff_for(6), Duration::from_secs(60));
        assert_eq!(settings.backoff_for(40), Duration::from_secs(60));
    }

    #[test]
    fn test_mime_matching_ignores_parameters_and_case() {
        let settings = EngineSettings::default();
        let photo = settings.asset_policy(AssetType::Photo).unwrap();
        assert!(photo.allows_mime("image/JPEG"));
        assert!(photo.allows_mime("image/png; charset=binary"));
        assert!(!photo.allows_mime("application/pdf"));
    }

    #[test]
    fn test_every_asset_type_has_a_policy() {
        let settings = EngineSettings::default();
        for asset_type in AssetType::ALL {
            assert!(settings.asset_policy(asset_type).is_some(), "{}", asset_type);
        }
    }
}
