use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::dto::{CreateUserRequest, DataResponse};
use crate::error::{AppError, AppResult};
use crate::models::user::User;
use crate::AppState;

/// Create or refresh the profile for a Clerk account.
pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<User>>)> {
    body.validate()?;

    let user = state.stores.users.upsert_user(&body).await?;
    tracing::info!(clerk_id = %user.clerk_id, "User profile saved");

    Ok((StatusCode::CREATED, Json(DataResponse::new(user))))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(clerk_id): Path<String>,
) -> AppResult<Json<DataResponse<User>>> {
    let user = state
        .stores
        .users
        .get_user(&clerk_id)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;
    Ok(Json(DataResponse::new(user)))
}
