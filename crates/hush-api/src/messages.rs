//! Handlers for message endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/messages` | Body: [`SendBody`]; returns 201 + stored message |
//! | `GET`    | `/messages/{target}` | Optional `?min`, `?max` (inclusive) |
//! | `PATCH`  | `/messages/{target}/{id}` | Body: [`EditBody`]; sender only |
//! | `DELETE` | `/messages/{target}/{id}` | Sender only; terminal |
//! | `GET`    | `/overview` | Latest message of each conversation |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use hush_core::{identity::Identity, message::NewMessage, store::ConversationLog};

use crate::{
  ApiState,
  error::ApiError,
  identity::Caller,
  wire::{EditBody, MessageBody, RangeParams, SendBody},
};

// ─── Send ────────────────────────────────────────────────────────────────────

/// `POST /messages`
pub async fn send<S: ConversationLog>(
  State(state): State<ApiState<S>>,
  Caller(me): Caller,
  Json(body): Json<SendBody>,
) -> Result<impl IntoResponse, ApiError> {
  let message = state
    .chat
    .send_message(NewMessage {
      sender:                 me,
      receiver:               body.target_id,
      encrypted_content_type: body.encrypted_content_type,
      encrypted_body:         body.encrypted_body,
      key_version:            body.key_version,
    })
    .await?;
  Ok((StatusCode::CREATED, Json(MessageBody::from(message))))
}

// ─── Range read ──────────────────────────────────────────────────────────────

/// `GET /messages/{target}[?min=..][&max=..]`
pub async fn list<S: ConversationLog>(
  State(state): State<ApiState<S>>,
  Caller(me): Caller,
  Path(target): Path<Identity>,
  Query(range): Query<RangeParams>,
) -> Result<Json<Vec<MessageBody>>, ApiError> {
  let messages = state.chat.messages(me, target, range.into()).await?;
  Ok(Json(messages.into_iter().map(MessageBody::from).collect()))
}

// ─── Edit / delete ───────────────────────────────────────────────────────────

/// `PATCH /messages/{target}/{id}`
pub async fn edit<S: ConversationLog>(
  State(state): State<ApiState<S>>,
  Caller(me): Caller,
  Path((target, message_id)): Path<(Identity, u32)>,
  Json(body): Json<EditBody>,
) -> Result<Json<MessageBody>, ApiError> {
  let message = state
    .chat
    .edit_message(me, target, message_id, body.encrypted_body, body.key_version)
    .await?;
  Ok(Json(message.into()))
}

/// `DELETE /messages/{target}/{id}`
pub async fn remove<S: ConversationLog>(
  State(state): State<ApiState<S>>,
  Caller(me): Caller,
  Path((target, message_id)): Path<(Identity, u32)>,
) -> Result<Json<MessageBody>, ApiError> {
  let message = state.chat.delete_message(me, target, message_id).await?;
  Ok(Json(message.into()))
}

// ─── Overview ────────────────────────────────────────────────────────────────

/// `GET /overview`
pub async fn overview<S: ConversationLog>(
  State(state): State<ApiState<S>>,
  Caller(me): Caller,
) -> Result<Json<Vec<MessageBody>>, ApiError> {
  let latest = state.chat.chat_overview(me).await?;
  Ok(Json(latest.into_iter().map(MessageBody::from).collect()))
}
