//! Identities, the canonical pair key that indexes a conversation, and the
//! ephemeral ids handed to live sessions.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

// ─── Identity ────────────────────────────────────────────────────────────────

/// A stable account id. Issued and authenticated elsewhere; this crate only
/// compares and indexes them.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Identity(Uuid);

impl Identity {
  pub const fn from_uuid(id: Uuid) -> Self { Self(id) }

  pub const fn as_uuid(&self) -> &Uuid { &self.0 }
}

impl From<Uuid> for Identity {
  fn from(id: Uuid) -> Self { Self(id) }
}

impl FromStr for Identity {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Uuid::parse_str(s.trim())
      .map(Self)
      .map_err(|_| Error::InvalidIdentity(s.to_owned()))
  }
}

impl fmt::Display for Identity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.hyphenated().fmt(f)
  }
}

// ─── PairKey ─────────────────────────────────────────────────────────────────

/// Order-independent key for the conversation between two identities.
///
/// The lower identity (by UUID byte order) always comes first, so
/// `PairKey::new(a, b) == PairKey::new(b, a)`. Every index over
/// conversations (allocator locks, storage columns) goes through this type;
/// there is no other constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
  low:  Identity,
  high: Identity,
}

impl PairKey {
  pub fn new(a: Identity, b: Identity) -> Self {
    if a <= b {
      Self { low: a, high: b }
    } else {
      Self { low: b, high: a }
    }
  }

  pub fn low(&self) -> Identity { self.low }

  pub fn high(&self) -> Identity { self.high }

  pub fn contains(&self, id: Identity) -> bool {
    self.low == id || self.high == id
  }

  /// The other side of the conversation as seen from `id`, or `None` if `id`
  /// is not part of it. A conversation with oneself returns `id`.
  pub fn counterpart(&self, id: Identity) -> Option<Identity> {
    if self.low == id {
      Some(self.high)
    } else if self.high == id {
      Some(self.low)
    } else {
      None
    }
  }
}

/// Rendered as `"<low>:<high>"`; this is also the storage encoding.
impl fmt::Display for PairKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.low, self.high)
  }
}

// ─── SessionId ───────────────────────────────────────────────────────────────

/// Id of one live streaming subscription. Never persisted and never reused.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
  pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for SessionId {
  fn default() -> Self { Self::new() }
}

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.hyphenated().fmt(f)
  }
}
