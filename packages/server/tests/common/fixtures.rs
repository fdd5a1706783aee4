//! Payload builders shared by the integration tests.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use toq_core::common::ProcessingJobId;
use toq_core::domains::media::data::{UploadFileInput, UploadInstruction};
use toq_core::domains::media::models::AssetType;

pub const OWNER: i64 = 55;
pub const OTHER_OWNER: i64 = 99;
pub const PHOTOGRAPHER: i64 = 9;
pub const ADMIN: i64 = 1;
pub const VISITOR: i64 = 777;

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Deterministic fake JPEG body for a sequence number.
pub fn photo_bytes(sequence: i32) -> Vec<u8> {
    format!("\u{ff}\u{d8}photo-{}", sequence).into_bytes()
}

pub fn photo_file(sequence: i32) -> UploadFileInput {
    let bytes = photo_bytes(sequence);
    UploadFileInput {
        asset_type: AssetType::Photo,
        sequence,
        title: Some(format!("Room {}", sequence)),
        content_type: "image/jpeg".to_string(),
        bytes: bytes.len() as i64,
        sha256: sha256_hex(&bytes),
    }
}

/// Apartment attributes that satisfy every required field.
pub fn complete_apartment(identity_id: i64, version_id: i64) -> Value {
    json!({
        "identityId": identity_id,
        "versionId": version_id,
        "city": "São Paulo",
        "state": "SP",
        "title": "Bright two-bedroom near the park",
        "unitTower": "B",
        "unitFloor": 5,
        "unitNumber": "502",
        "sellNet": "1200000",
        "monthlyTax": "283.40"
    })
}

pub fn success_callback(job_id: ProcessingJobId, arn: &str, uploads: &[UploadInstruction]) -> Vec<u8> {
    let outputs: Vec<Value> = uploads
        .iter()
        .map(|u| {
            json!({
                "assetType": u.asset_type,
                "rawKey": u.raw_object_key,
                "processedKey": format!("processed/{}", u.raw_object_key),
                "previewKey": format!("preview/{}", u.raw_object_key),
                "metadata": { "width": 4032, "height": 3024 }
            })
        })
        .collect();
    serde_json::to_vec(&json!({
        "executionArn": arn,
        "jobId": job_id.to_string(),
        "status": "SUCCESS",
        "provider": "step-functions",
        "outputs": outputs
    }))
    .unwrap()
}

pub fn failure_callback(job_id: ProcessingJobId, arn: &str, retriable: bool, message: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "executionArn": arn,
        "jobId": job_id,
        "status": "FAILURE",
        "error": {
            "code": "TRANSCODE_FAILED",
            "message": message,
            "retriable": retriable
        }
    }))
    .unwrap()
}
