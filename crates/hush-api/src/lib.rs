//! JSON REST API and live event streams for Hush.
//!
//! Exposes an axum [`Router`] backed by a [`ChatService`] and a
//! [`DirectoryService`] over one store. The caller's identity is taken from
//! the `x-hush-identity` header; authenticating that header, TLS and other
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", hush_api::api_router(ApiState::new(chat, directory)))
//! ```

pub mod error;
pub mod events;
pub mod identity;
pub mod keys;
pub mod messages;
pub mod users;
pub mod wire;

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, patch, post},
};
use hush_core::{
  chat::ChatService,
  directory::DirectoryService,
  store::{ConversationLog, UserDirectory},
};
use tokio_util::sync::CancellationToken;

pub use error::ApiError;
pub use identity::Caller;

/// Interval between SSE keep-alive comments unless configured otherwise.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub chat:       Arc<ChatService<S>>,
  pub directory:  Arc<DirectoryService<S>>,
  /// Keep-alive interval for event streams.
  pub keep_alive: Duration,
  /// Cancelled on shutdown; ends every open event stream.
  pub shutdown:   CancellationToken,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      chat:       Arc::clone(&self.chat),
      directory:  Arc::clone(&self.directory),
      keep_alive: self.keep_alive,
      shutdown:   self.shutdown.clone(),
    }
  }
}

impl<S> ApiState<S> {
  pub fn new(chat: Arc<ChatService<S>>, directory: Arc<DirectoryService<S>>) -> Self {
    Self {
      chat,
      directory,
      keep_alive: DEFAULT_KEEP_ALIVE,
      shutdown: CancellationToken::new(),
    }
  }

  pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
    self.keep_alive = keep_alive;
    self
  }

  pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
    self.shutdown = shutdown;
    self
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: ConversationLog + UserDirectory + 'static,
{
  Router::new()
    // Messages
    .route("/messages", post(messages::send::<S>))
    .route("/messages/{target}", get(messages::list::<S>))
    .route(
      "/messages/{target}/{id}",
      patch(messages::edit::<S>).delete(messages::remove::<S>),
    )
    .route("/overview", get(messages::overview::<S>))
    // Key epochs
    .route("/keys", post(keys::rotate::<S>))
    .route("/keys/{target}", get(keys::list::<S>))
    // Users
    .route("/users", get(users::search::<S>).put(users::update::<S>))
    .route("/users/events", get(events::user_stream::<S>))
    .route("/users/{id}", get(users::fetch::<S>))
    // Live events
    .route("/events", get(events::stream::<S>))
    .with_state(state)
}
