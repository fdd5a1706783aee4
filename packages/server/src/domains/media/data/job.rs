use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::common::{ListingIdentityId, MediaBatchId, ProcessingJobId};
use crate::domains::media::models::{AssetType, MediaBatch};

/// Envelope handed to the processing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJobMessage {
    pub job_id: String,
    pub listing_identity_id: ListingIdentityId,
    pub batch_id: MediaBatchId,
    pub assets: Vec<JobAsset>,
    pub traceparent: String,
    pub retry: bool,
    pub retry_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAsset {
    pub asset_type: AssetType,
    pub raw_key: String,
    pub sequence: i32,
    pub title: Option<String>,
}

impl ProcessingJobMessage {
    /// Message for the batch's current job.
    pub fn for_batch(batch: &MediaBatch, job_id: ProcessingJobId, retry: bool) -> Self {
        Self {
            job_id: job_id.to_string(),
            listing_identity_id: batch.listing_identity_id,
            batch_id: batch.id,
            assets: batch
                .assets
                .iter()
                .map(|a| JobAsset {
                    asset_type: a.asset_type,
                    raw_key: a.raw_object_key.clone(),
                    sequence: a.sequence,
                    title: a.title.clone(),
                })
                .collect(),
            traceparent: traceparent(job_id),
            retry,
            retry_count: batch.retry_count,
        }
    }

    pub fn to_bytes(&self) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// W3C trace context derived from the job id, so every hop of one job
/// shares a trace without coordination.
pub fn traceparent(job_id: ProcessingJobId) -> String {
    let digest = hex::encode(Sha256::digest(format!("toq-job-{}", job_id).as_bytes()));
    format!("00-{}-{}-01", &digest[..32], &digest[32..48])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traceparent_is_stable_and_well_formed() {
        let a = traceparent(ProcessingJobId::new(42));
        assert_eq!(a, traceparent(ProcessingJobId::new(42)));
        assert_ne!(a, traceparent(ProcessingJobId::new(43)));

        let parts: Vec<&str> = a.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "00");
        assert_eq!(parts[1].len(), 32);
        assert_eq!(parts[2].len(), 16);
        assert_eq!(parts[3], "01");
    }
}
