pub mod batch;
pub mod callback_audit;

pub use batch::{AssetType, BatchStatus, MediaAsset, MediaBatch};
pub use callback_audit::CallbackAudit;
