//! `GET /events`: the caller's live notifications as server-sent events.
//! `GET /users/events`: directory changes, the same way.
//!
//! Each stream owns one session. It ends when the client disconnects (the
//! response body, and with it the session, is dropped) or when the server
//! shuts down. Only events committed after the stream opened are sent;
//! anything earlier is fetched with the range endpoints.

use std::convert::Infallible;

use axum::{
  extract::State,
  response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, stream};
use hush_core::{
  event::Notification,
  store::{ConversationLog, UserDirectory},
  user::UserChange,
};
use tracing::{info, warn};

use crate::{
  ApiState,
  identity::Caller,
  wire::{EventBody, UserChangeBody},
};

/// SSE event name of a directory change.
const USER_UPDATED: &str = "user_updated";

/// `GET /events`
pub async fn stream<S: ConversationLog>(
  State(state): State<ApiState<S>>,
  Caller(me): Caller,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
  let subscription = state.chat.subscribe(me);
  info!(identity = %me, session = %subscription.session_id(), "event stream opened");

  let events = stream::unfold(
    (subscription, state.shutdown),
    |(mut subscription, shutdown)| async move {
      let notification = subscription.next_or_cancelled(&shutdown).await?;
      Some((Ok(to_event(&notification)), (subscription, shutdown)))
    },
  );

  Sse::new(events).keep_alive(KeepAlive::new().interval(state.keep_alive).text("keep-alive"))
}

/// `GET /users/events`
pub async fn user_stream<S: UserDirectory>(
  State(state): State<ApiState<S>>,
  Caller(me): Caller,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
  let subscription = state.directory.subscribe(me);
  info!(identity = %me, session = %subscription.session_id(), "directory stream opened");

  let events = stream::unfold(
    (subscription, state.shutdown),
    |(mut subscription, shutdown)| async move {
      let change = subscription.next_or_cancelled(&shutdown).await?;
      Some((Ok(user_event(change)), (subscription, shutdown)))
    },
  );

  Sse::new(events).keep_alive(KeepAlive::new().interval(state.keep_alive).text("keep-alive"))
}

fn user_event(change: UserChange) -> Event {
  Event::default()
    .event(USER_UPDATED)
    .json_data(UserChangeBody::from(change))
    .unwrap_or_else(|e| {
      warn!(kind = USER_UPDATED, error = %e, "could not encode event");
      Event::default().event("error").data(e.to_string())
    })
}

fn to_event(notification: &Notification) -> Event {
  let kind = notification.kind();
  Event::default()
    .event(kind)
    .json_data(EventBody::from(notification))
    .unwrap_or_else(|e| {
      warn!(%kind, error = %e, "could not encode event");
      Event::default().event("error").data(e.to_string())
    })
}
