use std::sync::Arc;

use axum::extract::State;
use axum::{debug_handler, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::extract::Body;
use super::{non_empty, ApiError, ApiResult, AppState};
use crate::credentials;
use crate::store::ChatStore;

#[derive(Deserialize)]
pub(crate) struct CredentialsBody {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AccountResponse {
    success: bool,
    username: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(store): State<Arc<dyn ChatStore>>,
    Body(CredentialsBody { username, password }): Body<CredentialsBody>,
) -> ApiResult<Json<AccountResponse>> {
    let (Some(username), Some(password)) = (non_empty(username), password.filter(|p| !p.is_empty()))
    else {
        return Err(ApiError::bad_request("Username and password are required"));
    };

    if store.find_user(&username).await?.is_some() {
        warn!("Registration of existing user {} refused", username);
        return Err(ApiError::bad_request("Username already taken"));
    }

    let hash = credentials::hash_password(&password).await?;
    let user = match store.create_user(&username, &hash).await {
        Ok(user) => user,
        // lost a race with a concurrent registration
        Err(e) if e.is_unique_violation() => {
            return Err(ApiError::bad_request("Username already taken"));
        }
        Err(e) => return Err(e.into()),
    };

    info!("User {} registered", user.username);
    Ok(Json(AccountResponse {
        success: true,
        username: user.username,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(store): State<Arc<dyn ChatStore>>,
    Body(CredentialsBody { username, password }): Body<CredentialsBody>,
) -> ApiResult<Json<AccountResponse>> {
    let (Some(username), Some(password)) = (username, password) else {
        return Err(ApiError::InvalidCredentials);
    };

    let Some(user) = store.find_user(&username).await? else {
        return Err(ApiError::InvalidCredentials);
    };
    if !credentials::verify_password(&password, &user.password_hash).await {
        warn!("Failed login for {}", username);
        return Err(ApiError::InvalidCredentials);
    }

    info!("User {} logged in", user.username);
    Ok(Json(AccountResponse {
        success: true,
        username: user.username,
    }))
}
