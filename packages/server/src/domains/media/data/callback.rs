//! Inbound processing callback.
//!
//! Ids arrive as JSON numbers or strings. Fields this engine does not know
//! are ignored here; the raw body is kept in the callback audit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::error::CoreError;
use crate::common::{ListingIdentityId, MediaBatchId, ProcessingJobId};
use crate::domains::media::models::{AssetType, MediaAsset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackStatus {
    Success,
    Failure,
}

impl CallbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackStatus::Success => "SUCCESS",
            CallbackStatus::Failure => "FAILURE",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingCallback {
    #[serde(default)]
    pub execution_arn: Option<String>,
    pub job_id: ProcessingJobId,
    #[serde(default)]
    pub listing_identity_id: Option<ListingIdentityId>,
    #[serde(default)]
    pub external_id: Option<String>,
    pub status: CallbackStatus,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub traceparent: Option<String>,
    #[serde(default)]
    pub outputs: Vec<CallbackOutput>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub error: Option<CallbackError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackOutput {
    pub asset_type: AssetType,
    /// Raw key of the input this output came from, when the pipeline echoes it.
    #[serde(default)]
    pub raw_key: Option<String>,
    #[serde(default)]
    pub sequence: Option<i32>,
    pub processed_key: String,
    #[serde(default)]
    pub preview_key: Option<String>,
    #[serde(default)]
    pub thumbnail_key: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub retriable: bool,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl ProcessingCallback {
    pub fn parse(raw: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(raw)
            .map_err(|e| CoreError::invalid("body", format!("malformed callback: {}", e)))
    }

    pub fn is_retriable(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.retriable)
    }

    /// Batch id carried in `externalId`, when it is one.
    pub fn external_batch_id(&self) -> Option<MediaBatchId> {
        self.external_id
            .as_deref()
            .and_then(|id| MediaBatchId::parse(id.trim()).ok())
    }

    /// Human-readable reason recorded on terminal failure.
    pub fn failure_text(&self) -> String {
        let from_error = self.error.as_ref().and_then(|e| match (&e.code, &e.message) {
            (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
            (None, Some(message)) => Some(message.clone()),
            (Some(code), None) => Some(code.clone()),
            (None, None) => None,
        });
        self.failure_reason
            .clone()
            .filter(|r| !r.trim().is_empty())
            .or(from_error)
            .unwrap_or_else(|| "processing failed".to_string())
    }

    /// Write processed keys onto the batch's assets. Outputs are matched by
    /// raw key, then by (asset type, sequence), then by position among the
    /// assets of the same type. Returns how many outputs found an asset.
    pub fn apply_outputs(&self, assets: &mut [MediaAsset]) -> usize {
        let mut claimed = vec![false; assets.len()];
        let mut matched = 0;

        for output in &self.outputs {
            let by_key = output.raw_key.as_deref().and_then(|key| {
                assets
                    .iter()
                    .position(|a| a.raw_object_key == key)
                    .filter(|i| !claimed[*i])
            });
            let by_sequence = || {
                output.sequence.and_then(|seq| {
                    assets
                        .iter()
                        .enumerate()
                        .position(|(i, a)| {
                            !claimed[i] && a.asset_type == output.asset_type && a.sequence == seq
                        })
                })
            };
            let by_position = || {
                let mut candidates: Vec<usize> = (0..assets.len())
                    .filter(|i| !claimed[*i] && assets[*i].asset_type == output.asset_type)
                    .collect();
                candidates.sort_by_key(|i| assets[*i].sequence);
                candidates.first().copied()
            };

            let Some(i) = by_key.or_else(by_sequence).or_else(by_position) else {
                continue;
            };
            claimed[i] = true;
            matched += 1;
            let asset = &mut assets[i];
            asset.processed_object_key = Some(output.processed_key.clone());
            asset.preview_object_key = output.preview_key.clone();
            asset.thumbnail_object_key = output.thumbnail_key.clone();
        }
        matched
    }
}
