//! Live-session registry: which sessions each identity currently has open.
//!
//! The registry is generic over the event it carries, so chat notifications
//! and user-directory updates share one implementation. Every session owns
//! one unbounded queue. The registry keeps the sending
//! half; the receiving half goes to whoever serves the session (normally a
//! [`crate::session::Subscription`]). Membership lives behind a single
//! mutex that is never held across an `.await`.

use std::{
  collections::HashMap,
  sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::info;

use crate::{
  event::Notification,
  identity::{Identity, SessionId},
};

/// Receiving end of a session's queue.
pub type EventSource<E = Notification> = UnboundedReceiver<E>;

#[derive(Debug)]
pub(crate) struct Members<E> {
  pub(crate) by_identity: HashMap<Identity, HashMap<SessionId, UnboundedSender<E>>>,
  owners:                 HashMap<SessionId, Identity>,
}

impl<E> Default for Members<E> {
  fn default() -> Self {
    Self { by_identity: HashMap::new(), owners: HashMap::new() }
  }
}

/// Maps identities to their live session queues.
#[derive(Debug)]
pub struct SessionRegistry<E = Notification> {
  members: Mutex<Members<E>>,
}

impl<E> Default for SessionRegistry<E> {
  fn default() -> Self { Self { members: Mutex::new(Members::default()) } }
}

impl<E> SessionRegistry<E> {
  pub fn new() -> Self { Self::default() }

  pub(crate) fn members(&self) -> MutexGuard<'_, Members<E>> {
    // Every mutation below leaves the maps consistent before it can panic,
    // so a poisoned lock still guards valid data.
    self.members.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Open a new session for `identity` and return its id and queue.
  pub fn register(&self, identity: Identity) -> (SessionId, EventSource<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = SessionId::new();

    let sessions = {
      let mut members = self.members();
      let sessions = members.by_identity.entry(identity).or_default();
      sessions.insert(session, tx);
      let count = sessions.len();
      members.owners.insert(session, identity);
      count
    };

    info!(%identity, %session, sessions, "session registered");
    (session, rx)
  }

  /// Remove a session. Its queue is closed; events already queued can still
  /// be drained by the receiver.
  ///
  /// Returns `false` if the session is unknown or already removed.
  pub fn unregister(&self, session: SessionId) -> bool {
    let identity = {
      let mut members = self.members();
      let Some(identity) = members.owners.remove(&session) else {
        return false;
      };
      if let Some(sessions) = members.by_identity.get_mut(&identity) {
        sessions.remove(&session);
        if sessions.is_empty() {
          members.by_identity.remove(&identity);
        }
      }
      identity
    };

    info!(%identity, %session, "session unregistered");
    true
  }

  pub fn is_registered(&self, session: SessionId) -> bool {
    self.members().owners.contains_key(&session)
  }

  /// Number of live sessions held by `identity`.
  pub fn session_count(&self, identity: Identity) -> usize {
    self
      .members()
      .by_identity
      .get(&identity)
      .map_or(0, HashMap::len)
  }

  /// Number of identities with at least one live session.
  pub fn identity_count(&self) -> usize { self.members().by_identity.len() }

  /// Number of live sessions across all identities.
  pub fn total_sessions(&self) -> usize { self.members().owners.len() }
}
