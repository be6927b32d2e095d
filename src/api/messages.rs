use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{debug_handler, Json};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::extract::Query;
use super::{non_empty, text_attachment, ApiError, ApiResult, AppState};
use crate::export::{self, Period};
use crate::store::{ChatStore, MessageQuery, Order, StoredMessage};
use crate::types::RoomName;

const DEFAULT_SEARCH_LIMIT: u32 = 50;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchParams {
    room: Option<String>,
    query: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportParams {
    room: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    format: Option<String>,
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC)
pub(crate) fn parse_date(value: &str) -> ApiResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::bad_request(format!("Invalid date: {value}")))
}

fn parse_optional_date(value: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    value.map(parse_date).transpose()
}

fn required_room(room: Option<String>) -> ApiResult<RoomName> {
    non_empty(room)
        .map(RoomName)
        .ok_or_else(|| ApiError::bad_request("Room is required"))
}

/// Text and date search within a room, newest first
#[debug_handler(state = AppState)]
pub(crate) async fn search(
    State(store): State<Arc<dyn ChatStore>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<StoredMessage>>> {
    let room = required_room(params.room)?;
    let start = non_empty(params.start_date);
    let end = non_empty(params.end_date);

    let query = MessageQuery::room(room)
        .contains(non_empty(params.query))
        .between(
            parse_optional_date(start.as_deref())?,
            parse_optional_date(end.as_deref())?,
        )
        .order(Order::Descending)
        .limit(params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT));

    Ok(Json(store.find_messages(&query).await?))
}

/// Room history within an optional date range, as text or JSON
#[debug_handler(state = AppState)]
pub(crate) async fn export(
    State(store): State<Arc<dyn ChatStore>>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let room = required_room(params.room)?;
    let start = non_empty(params.start_date);
    let end = non_empty(params.end_date);

    let query = MessageQuery::room(room.clone()).between(
        parse_optional_date(start.as_deref())?,
        parse_optional_date(end.as_deref())?,
    );
    let messages = store.find_messages(&query).await?;

    if params.format.as_deref().unwrap_or("txt") != "txt" {
        return Ok(Json(messages).into_response());
    }

    let now = Utc::now();
    let period = Period {
        start: start.as_deref(),
        end: end.as_deref(),
    };
    let body = export::render_text(&room, &messages, Some(period), now);
    Ok(text_attachment(&export::file_name("chat-export", &room, now), body))
}
