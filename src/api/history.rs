use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::{debug_handler, Json};
use chrono::Utc;
use serde::Deserialize;

use super::extract::{Path, Query};
use super::{non_empty, text_attachment, ApiResult, AppState};
use crate::export;
use crate::store::{ChatStore, MessageQuery, Order, StoredMessage};
use crate::types::RoomName;

/// Upper bound of the history endpoint
const HISTORY_PAGE: u32 = 100;

#[derive(Deserialize)]
pub(crate) struct HistoryQuery {
    search: Option<String>,
}

/// Newest messages of a room, optionally filtered by text
#[debug_handler(state = AppState)]
pub(crate) async fn history(
    State(store): State<Arc<dyn ChatStore>>,
    Path(room): Path<String>,
    Query(HistoryQuery { search }): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<StoredMessage>>> {
    let query = MessageQuery::room(RoomName(room))
        .contains(non_empty(search))
        .order(Order::Descending)
        .limit(HISTORY_PAGE);

    Ok(Json(store.find_messages(&query).await?))
}

/// Whole room as a text file
#[debug_handler(state = AppState)]
pub(crate) async fn export(
    State(store): State<Arc<dyn ChatStore>>,
    Path(room): Path<String>,
) -> ApiResult<Response> {
    let room = RoomName(room);
    let messages = store.find_messages(&MessageQuery::room(room.clone())).await?;

    let now = Utc::now();
    let body = export::render_text(&room, &messages, None, now);
    Ok(text_attachment(&export::file_name("chat", &room, now), body))
}
