use std::sync::Arc;

use axum::extract::State;
use axum::{debug_handler, Json};
use serde::{Deserialize, Serialize};

use super::extract::{Body, Path};
use super::{non_empty, ApiError, ApiResult, AppState};
use crate::receipts;
use crate::store::{ChatStore, ReadReceipt};
use crate::types::MessageId;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReceiptBody {
    #[serde(default)]
    message_id: Option<MessageId>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Success {
    success: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    State(store): State<Arc<dyn ChatStore>>,
    Body(ReceiptBody {
        message_id,
        username,
    }): Body<ReceiptBody>,
) -> ApiResult<Json<Success>> {
    let (Some(message_id), Some(username)) = (message_id, non_empty(username)) else {
        return Err(ApiError::bad_request("messageId and username are required"));
    };

    if store.find_message(message_id).await?.is_none() {
        return Err(ApiError::NotFound("Message not found".to_string()));
    }
    receipts::mark_as_read(store.as_ref(), message_id, &username).await?;

    Ok(Json(Success { success: true }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(store): State<Arc<dyn ChatStore>>,
    Path(message_id): Path<MessageId>,
) -> ApiResult<Json<Vec<ReadReceipt>>> {
    Ok(Json(store.find_receipts(message_id).await?))
}
