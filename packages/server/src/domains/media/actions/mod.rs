//! Media batch orchestration.
//!
//! Lock order is batch → identity: callbacks and retries take the batch row
//! first and then the listing they move. Listing commands never lock a batch.

mod callbacks;
mod downloads;
mod retry;
mod upload;

pub use callbacks::handle_processing_callback;
pub use downloads::list_download_urls;
pub use retry::retry_media_batch;
pub use upload::{complete_upload_batch, request_upload_urls};
