//! Session lifecycle: one registry entry per streaming subscription.
//!
//! A [`Subscription`] registers on creation and unregisters exactly once,
//! whichever comes first of: the consumer calling [`Subscription::close`],
//! cancellation, the queue ending, or the value being dropped (which is what
//! happens when a client disconnects from a streaming response).

use std::{
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
};

use futures_util::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
  event::Notification,
  identity::{Identity, SessionId},
  registry::{EventSource, SessionRegistry},
};

/// A live session's pull side.
#[derive(Debug)]
pub struct Subscription<E = Notification> {
  registry: Arc<SessionRegistry<E>>,
  identity: Identity,
  session:  SessionId,
  events:   EventSource<E>,
  open:     bool,
}

impl<E> Subscription<E> {
  /// Register a fresh session for `identity`.
  pub fn open(registry: Arc<SessionRegistry<E>>, identity: Identity) -> Self {
    let (session, events) = registry.register(identity);
    Self { registry, identity, session, events, open: true }
  }

  pub fn session_id(&self) -> SessionId { self.session }

  pub fn identity(&self) -> Identity { self.identity }

  pub fn is_open(&self) -> bool { self.open }

  /// Wait for the next event. Returns `None` once the subscription is
  /// closed; an ended queue closes the subscription.
  pub async fn recv(&mut self) -> Option<E> {
    if !self.open {
      return None;
    }
    let event = self.events.recv().await;
    if event.is_none() {
      self.close();
    }
    event
  }

  /// Take an already-queued event without waiting.
  pub fn try_recv(&mut self) -> Option<E> {
    if !self.open {
      return None;
    }
    self.events.try_recv().ok()
  }

  /// Like [`Subscription::recv`], but also returns `None` (and closes) as
  /// soon as `cancel` fires.
  pub async fn next_or_cancelled(&mut self, cancel: &CancellationToken) -> Option<E> {
    tokio::select! {
      biased;
      () = cancel.cancelled() => {
        self.close();
        None
      }
      event = self.recv() => event,
    }
  }

  /// Pull events into `deliver` until the subscription ends or `cancel`
  /// fires. A delivery error stops the loop and is returned; cancellation is
  /// a normal end. The session is unregistered in every case.
  pub async fn forward<F, Fut, Err>(mut self, cancel: &CancellationToken, mut deliver: F) -> Result<(), Err>
  where
    F: FnMut(E) -> Fut,
    Fut: Future<Output = Result<(), Err>>,
  {
    while let Some(event) = self.next_or_cancelled(cancel).await {
      if let Err(e) = deliver(event).await {
        self.close();
        return Err(e);
      }
    }
    Ok(())
  }

  /// Unregister the session and discard anything still queued.
  ///
  /// Returns `true` only for the call that actually removed the session;
  /// later calls are no-ops.
  pub fn close(&mut self) -> bool {
    if !std::mem::replace(&mut self.open, false) {
      return false;
    }
    self.events.close();
    while self.events.try_recv().is_ok() {}

    let removed = self.registry.unregister(self.session);
    debug!(identity = %self.identity, session = %self.session, removed, "subscription closed");
    removed
  }
}

impl<E> Stream for Subscription<E> {
  type Item = E;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    if !self.open {
      return Poll::Ready(None);
    }
    match self.events.poll_recv(cx) {
      Poll::Ready(None) => {
        self.close();
        Poll::Ready(None)
      }
      other => other,
    }
  }
}

impl<E> Drop for Subscription<E> {
  fn drop(&mut self) { self.close(); }
}
