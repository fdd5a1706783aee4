pub mod callback;
pub mod job;
pub mod upload;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{ListingIdentityId, MediaBatchId, ProcessingJobId};
use crate::domains::media::models::{AssetType, BatchStatus};
use crate::kernel::SignedUrl;

pub use callback::{CallbackError, CallbackOutput, CallbackStatus, ProcessingCallback};
pub use job::{traceparent, JobAsset, ProcessingJobMessage};
pub use upload::{
    estimate_processing, raw_object_key, upload_headers, CompleteUploadInput,
    CompleteUploadOutput, CompletedAsset, RequestUploadUrlsInput, UploadFileInput,
    UploadInstruction, UploadUrlsOutput,
};

/// What the engine did with a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// The batch reached a terminal state.
    Applied,
    /// Retriable failure; the job was queued again.
    Retrying,
    /// Already applied or the batch is already terminal.
    Duplicate,
    /// The job is not the batch's current job, or no batch knows it.
    Ignored,
}

impl CallbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::Applied => "applied",
            CallbackOutcome::Retrying => "retrying",
            CallbackOutcome::Duplicate => "duplicate",
            CallbackOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackReceipt {
    pub job_id: ProcessingJobId,
    pub batch_id: Option<MediaBatchId>,
    pub outcome: CallbackOutcome,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetryMediaBatchInput {
    pub batch_id: MediaBatchId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryMediaBatchOutput {
    pub batch_id: MediaBatchId,
    pub job_id: ProcessingJobId,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAsset {
    pub asset_type: AssetType,
    pub sequence: i32,
    pub title: Option<String>,
    pub url: SignedUrl,
    pub preview_url: Option<SignedUrl>,
    pub thumbnail_url: Option<SignedUrl>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlsOutput {
    pub listing_identity_id: ListingIdentityId,
    pub batch_id: MediaBatchId,
    pub expires_at: DateTime<Utc>,
    pub assets: Vec<DownloadAsset>,
}
