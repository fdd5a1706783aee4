//! Upload cycle payloads: requesting signed PUTs and completing a batch.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use crate::common::error::{CoreError, FieldError};
use crate::common::{ListingIdentityId, MediaBatchId, ProcessingJobId};
use crate::config::EngineSettings;
use crate::domains::media::models::{AssetType, BatchStatus, MediaAsset};
use crate::kernel::storage::SHA256_METADATA_HEADER;
use crate::kernel::HttpMethod;

lazy_static! {
    static ref SHA256_HEX: Regex = Regex::new(r"^[0-9a-f]{64}$").unwrap();
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UploadFileInput {
    pub asset_type: AssetType,
    pub sequence: i32,
    #[serde(default)]
    pub title: Option<String>,
    pub content_type: String,
    pub bytes: i64,
    /// Lowercase hex SHA-256 of the file the client is about to PUT.
    pub sha256: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestUploadUrlsInput {
    pub listing_identity_id: ListingIdentityId,
    pub files: Vec<UploadFileInput>,
}

impl RequestUploadUrlsInput {
    /// Static checks against the per-asset-type policies. Hashes are
    /// normalized to lowercase on the way.
    pub fn validate(&mut self, settings: &EngineSettings) -> Result<(), CoreError> {
        if self.files.is_empty() {
            return Err(CoreError::invalid("files", "at least one file is required"));
        }

        let mut errors = Vec::new();
        for (i, file) in self.files.iter_mut().enumerate() {
            let field = |name: &str| format!("files[{}].{}", i, name);
            file.sha256 = file.sha256.trim().to_ascii_lowercase();

            match settings.asset_policy(file.asset_type) {
                None => errors.push(FieldError::new(field("assetType"), "asset type not accepted")),
                Some(policy) => {
                    if !policy.allows_mime(&file.content_type) {
                        errors.push(FieldError::new(
                            field("contentType"),
                            format!("{} is not accepted for {}", file.content_type, file.asset_type),
                        ));
                    }
                    if file.bytes > policy.max_bytes {
                        errors.push(FieldError::new(
                            field("bytes"),
                            format!("exceeds the {} byte limit", policy.max_bytes),
                        ));
                    }
                }
            }
            if file.bytes <= 0 {
                errors.push(FieldError::new(field("bytes"), "must be positive"));
            }
            if file.sequence < 0 {
                errors.push(FieldError::new(field("sequence"), "must not be negative"));
            }
            if !SHA256_HEX.is_match(&file.sha256) {
                errors.push(FieldError::new(field("sha256"), "must be 64 hex characters"));
            }
        }

        errors.extend(uniqueness_errors(
            self.files
                .iter()
                .map(|f| (f.asset_type, f.sequence, f.title.as_deref())),
        ));

        match CoreError::from_field_errors("invalid upload request", errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Sequence unique per asset type, title unique per batch.
pub(crate) fn uniqueness_errors<'a>(
    entries: impl Iterator<Item = (AssetType, i32, Option<&'a str>)>,
) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut sequences = HashSet::new();
    let mut titles = HashSet::new();

    for (asset_type, sequence, title) in entries {
        if !sequences.insert((asset_type, sequence)) {
            errors.push(FieldError::new(
                "sequence",
                format!("sequence {} repeats within {}", sequence, asset_type),
            ));
        }
        if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
            if !titles.insert(title.to_string()) {
                errors.push(FieldError::new("title", format!("title '{}' repeats", title)));
            }
        }
    }
    errors
}

pub(crate) fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/heic" => "heic",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// `listings/{identity_uuid}/{batch_id}/{asset_type}/{sequence}.{ext}`
pub fn raw_object_key(
    identity_uuid: Uuid,
    batch_id: MediaBatchId,
    asset_type: AssetType,
    sequence: i32,
    content_type: &str,
) -> String {
    format!(
        "listings/{}/{}/{}/{}.{}",
        identity_uuid,
        batch_id,
        asset_type.as_str().to_ascii_lowercase(),
        sequence,
        extension_for(content_type)
    )
}

impl UploadFileInput {
    pub fn into_asset(self, raw_object_key: String) -> MediaAsset {
        MediaAsset {
            asset_type: self.asset_type,
            sequence: self.sequence,
            title: self.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            content_type: self.content_type,
            byte_size: self.bytes,
            sha256: self.sha256,
            raw_object_key,
            processed_object_key: None,
            preview_object_key: None,
            thumbnail_object_key: None,
        }
    }
}

/// Headers the client must send with its PUT so the stored object can be
/// checked against the declaration.
pub fn upload_headers(asset: &MediaAsset) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), asset.content_type.clone());
    headers.insert(SHA256_METADATA_HEADER.to_string(), asset.sha256.clone());
    headers.insert("content-length".to_string(), asset.byte_size.to_string());
    headers
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInstruction {
    pub asset_type: AssetType,
    pub sequence: i32,
    pub title: Option<String>,
    pub raw_object_key: String,
    pub method: HttpMethod,
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlsOutput {
    pub batch_id: MediaBatchId,
    pub listing_identity_id: ListingIdentityId,
    pub instructions: Vec<UploadInstruction>,
}

// =============================================================================
// Completion
// =============================================================================

/// Late edits to a declared asset, addressed by its declared type and
/// sequence.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompletedAsset {
    pub asset_type: AssetType,
    pub sequence: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub new_sequence: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompleteUploadInput {
    pub batch_id: MediaBatchId,
    #[serde(default)]
    pub assets: Vec<CompletedAsset>,
}

impl CompleteUploadInput {
    /// Apply the edits to a copy of the batch's assets and re-check
    /// uniqueness.
    pub fn reconcile(&self, assets: &[MediaAsset]) -> Result<Vec<MediaAsset>, CoreError> {
        let mut reconciled = assets.to_vec();
        let mut errors = Vec::new();

        for edit in &self.assets {
            let Some(i) = assets
                .iter()
                .position(|a| a.asset_type == edit.asset_type && a.sequence == edit.sequence)
            else {
                errors.push(FieldError::new(
                    "assets",
                    format!("no {} with sequence {} in this batch", edit.asset_type, edit.sequence),
                ));
                continue;
            };
            if let Some(title) = &edit.title {
                let title = title.trim();
                reconciled[i].title = (!title.is_empty()).then(|| title.to_string());
            }
            if let Some(sequence) = edit.new_sequence {
                if sequence < 0 {
                    errors.push(FieldError::new("newSequence", "must not be negative"));
                }
                reconciled[i].sequence = sequence;
            }
        }

        errors.extend(uniqueness_errors(
            reconciled
                .iter()
                .map(|a| (a.asset_type, a.sequence, a.title.as_deref())),
        ));
        match CoreError::from_field_errors("invalid asset edits", errors) {
            Some(err) => Err(err),
            None => Ok(reconciled),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadOutput {
    pub batch_id: MediaBatchId,
    pub job_id: ProcessingJobId,
    pub status: BatchStatus,
    pub estimated_processing_secs: u64,
}

/// Rough pipeline time: a fixed start-up cost plus a per-asset cost that
/// depends on the kind of media.
pub fn estimate_processing(assets: &[MediaAsset]) -> Duration {
    let per_asset: u64 = assets
        .iter()
        .map(|a| match a.asset_type {
            AssetType::Video => 90,
            AssetType::Panorama => 20,
            AssetType::Photo | AssetType::ProjectRender => 6,
            AssetType::FloorPlan | AssetType::ProjectDoc => 4,
        })
        .sum();
    Duration::from_secs(30 + per_asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorKind;

    fn file(asset_type: AssetType, sequence: i32, title: Option<&str>) -> UploadFileInput {
        UploadFileInput {
            asset_type,
            sequence,
            title: title.map(String::from),
            content_type: "image/jpeg".into(),
            bytes: 1024,
            sha256: "AB".repeat(32),
        }
    }

    fn request(files: Vec<UploadFileInput>) -> RequestUploadUrlsInput {
        RequestUploadUrlsInput {
            listing_identity_id: ListingIdentityId::new(1024),
            files,
        }
    }

    #[test]
    fn test_valid_files_pass_and_hash_is_lowercased() {
        let mut input = request(vec![
            file(AssetType::Photo, 1, Some("Sala")),
            file(AssetType::Photo, 2, Some("Cozinha")),
        ]);
        input.validate(&EngineSettings::default()).unwrap();
        assert_eq!(input.files[0].sha256, "ab".repeat(32));
    }

    #[test]
    fn test_repeated_sequence_and_title_rejected() {
        let mut input = request(vec![
            file(AssetType::Photo, 1, Some("Sala")),
            file(AssetType::Photo, 1, Some("Sala")),
        ]);
        let err = input.validate(&EngineSettings::default()).unwrap_err();
        let CoreError::Validation { details, .. } = err else {
            panic!("expected validation error");
        };
        assert_eq!(details.len(), 2);
    }

    #[test]
    fn test_same_sequence_in_different_types_is_fine() {
        let mut input = request(vec![
            file(AssetType::Photo, 1, None),
            file(AssetType::Panorama, 1, None),
        ]);
        assert!(input.validate(&EngineSettings::default()).is_ok());
    }

    #[test]
    fn test_wrong_mime_and_bad_hash_rejected() {
        let mut bad = file(AssetType::Photo, 1, None);
        bad.content_type = "video/mp4".into();
        bad.sha256 = "xyz".into();
        bad.bytes = 0;
        let err = request(vec![bad])
            .validate(&EngineSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let CoreError::Validation { details, .. } = err else {
            unreachable!()
        };
        let fields: Vec<&str> = details.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["files[0].contentType", "files[0].bytes", "files[0].sha256"]);
    }

    #[test]
    fn test_raw_key_layout() {
        let uuid = Uuid::nil();
        let batch = MediaBatchId::from_uuid(Uuid::nil());
        assert_eq!(
            raw_object_key(uuid, batch, AssetType::FloorPlan, 3, "application/pdf"),
            format!("listings/{}/{}/floor_plan/3.pdf", uuid, batch)
        );
    }

    #[test]
    fn test_reconcile_applies_edits_and_rechecks() {
        let assets: Vec<MediaAsset> = (1..=2)
            .map(|seq| file(AssetType::Photo, seq, None).into_asset(format!("k{}", seq)))
            .collect();

        let ok = CompleteUploadInput {
            batch_id: MediaBatchId::new(),
            assets: vec![CompletedAsset {
                asset_type: AssetType::Photo,
                sequence: 2,
                title: Some("Varanda".into()),
                new_sequence: Some(5),
            }],
        };
        let reconciled = ok.reconcile(&assets).unwrap();
        assert_eq!(reconciled[1].sequence, 5);
        assert_eq!(reconciled[1].title.as_deref(), Some("Varanda"));

        let clash = CompleteUploadInput {
            batch_id: MediaBatchId::new(),
            assets: vec![CompletedAsset {
                asset_type: AssetType::Photo,
                sequence: 2,
                title: None,
                new_sequence: Some(1),
            }],
        };
        assert!(clash.reconcile(&assets).is_err());
    }
}
