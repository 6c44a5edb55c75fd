//! Handlers for key-epoch endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/keys` | Body: [`RotateBody`]; returns 201 + `{"version":n}` |
//! | `GET`  | `/keys/{target}` | The caller's shares; optional `?min`, `?max` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use hush_core::{
  identity::Identity,
  message::{KeyShare, NewKeyEpoch},
  store::ConversationLog,
};

use crate::{
  ApiState,
  error::ApiError,
  identity::Caller,
  wire::{KeyBody, RangeParams, RotateBody, VersionBody},
};

/// `POST /keys`
pub async fn rotate<S: ConversationLog>(
  State(state): State<ApiState<S>>,
  Caller(me): Caller,
  Json(body): Json<RotateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let epoch = state
    .chat
    .rotate_keys(NewKeyEpoch {
      initiator: KeyShare {
        owner:              me,
        encrypted_key:      body.own_key,
        public_key_version: body.own_public_key_version,
      },
      responder: KeyShare {
        owner:              body.target_id,
        encrypted_key:      body.target_key,
        public_key_version: body.target_public_key_version,
      },
    })
    .await?;
  Ok((StatusCode::CREATED, Json(VersionBody { version: epoch.version })))
}

/// `GET /keys/{target}[?min=..][&max=..]`
pub async fn list<S: ConversationLog>(
  State(state): State<ApiState<S>>,
  Caller(me): Caller,
  Path(target): Path<Identity>,
  Query(range): Query<RangeParams>,
) -> Result<Json<Vec<KeyBody>>, ApiError> {
  let keys = state.chat.key_epochs(me, target, range.into()).await?;
  Ok(Json(keys.into_iter().map(KeyBody::from).collect()))
}
