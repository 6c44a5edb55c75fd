//! Handlers for the user directory.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/users` | Optional `?name` (substring, any case), `?limit`, `?offset` |
//! | `GET`  | `/users/{id}` | One profile |
//! | `PUT`  | `/users` | Body: [`ProfileBody`]; the caller's own profile. 201 on creation |
//! | `GET`  | `/users/events` | Live profile changes, see [`crate::events`] |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use hush_core::{identity::Identity, store::UserDirectory};

use crate::{
  ApiState,
  error::ApiError,
  identity::Caller,
  wire::{ProfileBody, UserBody, UserChangeBody, UserSearchParams},
};

/// `GET /users[?name=..][&limit=..][&offset=..]`
pub async fn search<S: UserDirectory>(
  State(state): State<ApiState<S>>,
  Caller(_): Caller,
  Query(params): Query<UserSearchParams>,
) -> Result<Json<Vec<UserBody>>, ApiError> {
  let users = state.directory.users(params.into()).await?;
  Ok(Json(users.into_iter().map(UserBody::from).collect()))
}

/// `GET /users/{id}`
pub async fn fetch<S: UserDirectory>(
  State(state): State<ApiState<S>>,
  Caller(_): Caller,
  Path(id): Path<Identity>,
) -> Result<Json<UserBody>, ApiError> {
  state
    .directory
    .user(id)
    .await?
    .map(|user| Json(user.into()))
    .ok_or_else(|| ApiError::NotFound(format!("user {id}")))
}

/// `PUT /users`
pub async fn update<S: UserDirectory>(
  State(state): State<ApiState<S>>,
  Caller(me): Caller,
  Json(body): Json<ProfileBody>,
) -> Result<impl IntoResponse, ApiError> {
  let change = state.directory.update_user(me, body.into()).await?;
  let status = if change.created { StatusCode::CREATED } else { StatusCode::OK };
  Ok((status, Json(UserChangeBody::from(change))))
}
