use std::sync::Arc;

use axum::extract::State;
use axum::{debug_handler, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::extract::{Body, Path};
use super::{non_empty, ApiError, ApiResult, AppState};
use crate::store::ChatStore;
use crate::types::RoomName;

#[derive(Deserialize)]
pub(crate) struct FavoriteBody {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    room: Option<String>,
}

impl FavoriteBody {
    fn validate(self) -> ApiResult<(String, RoomName)> {
        match (non_empty(self.username), non_empty(self.room)) {
            (Some(username), Some(room)) => Ok((username, RoomName(room))),
            _ => Err(ApiError::bad_request("Username and room are required")),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddResponse {
    success: bool,
    is_favorite: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct RemoveResponse {
    success: bool,
    removed: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn add(
    State(store): State<Arc<dyn ChatStore>>,
    Body(body): Body<FavoriteBody>,
) -> ApiResult<Json<AddResponse>> {
    let (username, room) = body.validate()?;
    let created = store.find_or_create_favorite(&username, &room).await?;
    debug!("Favorite {} for {} (new: {})", room, username, created);

    Ok(Json(AddResponse {
        success: true,
        is_favorite: created,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove(
    State(store): State<Arc<dyn ChatStore>>,
    Body(body): Body<FavoriteBody>,
) -> ApiResult<Json<RemoveResponse>> {
    let (username, room) = body.validate()?;
    let removed = store.remove_favorite(&username, &room).await?;

    Ok(Json(RemoveResponse {
        success: true,
        removed,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(store): State<Arc<dyn ChatStore>>,
    Path(username): Path<String>,
) -> ApiResult<Json<Vec<RoomName>>> {
    Ok(Json(store.find_favorites(&username).await?))
}
