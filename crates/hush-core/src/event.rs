//! Notifications pushed to live sessions after a write commits.

use strum::{AsRefStr, Display};

use crate::{
  identity::{Identity, PairKey},
  message::{KeyEpoch, Message},
};

// ─── Routing ─────────────────────────────────────────────────────────────────

/// Which live sessions an event is offered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
  /// Every session of these identities. Both may be the same identity.
  Pair(Identity, Identity),
  /// Every registered session.
  Everyone,
}

/// An event the [`crate::registry::SessionRegistry`] can fan out.
pub trait Routed: Clone {
  fn recipients(&self) -> Recipients;
}

// ─── Conversation notifications ──────────────────────────────────────────────

/// Discriminant of a [`Notification`]; doubles as the event name on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
  MessageCreated,
  MessageEdited,
  MessageDeleted,
  KeyEpochUpdated,
}

/// A committed change, carrying the record's state as of the commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
  MessageCreated(Message),
  MessageEdited(Message),
  MessageDeleted(Message),
  KeyEpochUpdated(KeyEpoch),
}

impl Notification {
  pub fn kind(&self) -> NotificationKind {
    match self {
      Self::MessageCreated(_) => NotificationKind::MessageCreated,
      Self::MessageEdited(_) => NotificationKind::MessageEdited,
      Self::MessageDeleted(_) => NotificationKind::MessageDeleted,
      Self::KeyEpochUpdated(_) => NotificationKind::KeyEpochUpdated,
    }
  }

  /// The identity whose write produced this event. For key epochs this is the
  /// identity that rotated the key.
  pub fn sender(&self) -> Identity {
    match self {
      Self::MessageCreated(m) | Self::MessageEdited(m) | Self::MessageDeleted(m) => m.sender,
      Self::KeyEpochUpdated(k) => k.initiator.owner,
    }
  }

  pub fn receiver(&self) -> Identity {
    match self {
      Self::MessageCreated(m) | Self::MessageEdited(m) | Self::MessageDeleted(m) => m.receiver,
      Self::KeyEpochUpdated(k) => k.responder.owner,
    }
  }

  pub fn pair(&self) -> PairKey { PairKey::new(self.sender(), self.receiver()) }

  pub fn message(&self) -> Option<&Message> {
    match self {
      Self::MessageCreated(m) | Self::MessageEdited(m) | Self::MessageDeleted(m) => Some(m),
      Self::KeyEpochUpdated(_) => None,
    }
  }

  pub fn key_epoch(&self) -> Option<&KeyEpoch> {
    match self {
      Self::KeyEpochUpdated(k) => Some(k),
      _ => None,
    }
  }
}

impl Routed for Notification {
  fn recipients(&self) -> Recipients { Recipients::Pair(self.sender(), self.receiver()) }
}
