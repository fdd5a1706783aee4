use axum::{body::Bytes, extract::Extension, Json};

use crate::common::error::CoreResult;
use crate::common::{Actor, RequestContext};
use crate::domains::media::actions::handle_processing_callback;
use crate::domains::media::data::CallbackReceipt;
use crate::server::app::AppState;

/// Processing pipeline callback. The body is taken raw so it can be audited
/// byte for byte, including payloads that fail to parse.
pub async fn media_callback_handler(
    Extension(state): Extension<AppState>,
    body: Bytes,
) -> CoreResult<Json<CallbackReceipt>> {
    let ctx = RequestContext::with_timeout(Actor::system(), state.deps.settings.command_timeout);
    let receipt = handle_processing_callback(&body, &ctx, &state.deps).await?;
    Ok(Json(receipt))
}
