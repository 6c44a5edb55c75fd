//! Conversation records: messages and key epochs.
//!
//! All payloads are ciphertext produced by the clients. The backend never
//! looks inside them; it only orders, stores and forwards them.

use chrono::{DateTime, Utc};

use crate::identity::{Identity, PairKey};

// ─── Ranges ──────────────────────────────────────────────────────────────────

/// Inclusive id range for range queries over sequence ids or key versions.
/// The default covers everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
  pub min: u32,
  pub max: u32,
}

impl IdRange {
  pub fn new(min: Option<u32>, max: Option<u32>) -> Self {
    Self {
      min: min.unwrap_or(0),
      max: max.unwrap_or(u32::MAX),
    }
  }

  /// A range selecting exactly one id.
  pub fn single(id: u32) -> Self { Self { min: id, max: id } }

  pub fn contains(&self, id: u32) -> bool { self.min <= id && id <= self.max }
}

impl Default for IdRange {
  fn default() -> Self { Self::new(None, None) }
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// A stored message. `message_id` is strictly increasing per conversation
/// and starts at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
  pub message_id:             u32,
  pub sender:                 Identity,
  pub receiver:               Identity,
  pub encrypted_content_type: Vec<u8>,
  /// Empty once the message is deleted.
  pub encrypted_body:         Vec<u8>,
  pub created_at:             DateTime<Utc>,
  /// Set on edit and on deletion.
  pub edited_at:              Option<DateTime<Utc>>,
  /// Key epoch the body was encrypted under.
  pub key_version:            u32,
  pub deleted:                bool,
}

impl Message {
  pub fn pair(&self) -> PairKey { PairKey::new(self.sender, self.receiver) }
}

/// Input to [`crate::chat::ChatService::send_message`]. The id and creation
/// time are assigned on commit.
#[derive(Debug, Clone)]
pub struct NewMessage {
  pub sender:                 Identity,
  pub receiver:               Identity,
  pub encrypted_content_type: Vec<u8>,
  pub encrypted_body:         Vec<u8>,
  pub key_version:            u32,
}

impl NewMessage {
  pub fn pair(&self) -> PairKey { PairKey::new(self.sender, self.receiver) }

  pub(crate) fn into_message(self, message_id: u32, created_at: DateTime<Utc>) -> Message {
    Message {
      message_id,
      sender: self.sender,
      receiver: self.receiver,
      encrypted_content_type: self.encrypted_content_type,
      encrypted_body: self.encrypted_body,
      created_at,
      edited_at: None,
      key_version: self.key_version,
      deleted: false,
    }
  }
}

// ─── Key epochs ──────────────────────────────────────────────────────────────

/// One side of a key epoch: the shared secret encrypted to `owner`'s public
/// key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShare {
  pub owner:              Identity,
  pub encrypted_key:      Vec<u8>,
  /// Version of `owner`'s public key the share was encrypted to.
  pub public_key_version: u32,
}

/// A shared-secret generation for a conversation. Always stored as two rows,
/// one per share, under the same version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEpoch {
  pub version:    u32,
  pub created_at: DateTime<Utc>,
  /// Share of the identity that rotated the key.
  pub initiator:  KeyShare,
  pub responder:  KeyShare,
}

impl KeyEpoch {
  pub fn pair(&self) -> PairKey {
    PairKey::new(self.initiator.owner, self.responder.owner)
  }

  /// The two rows this epoch is stored as.
  pub fn owned_keys(&self) -> [OwnedKey; 2] {
    let row = |share: &KeyShare, counterpart: Identity| OwnedKey {
      owner:              share.owner,
      counterpart,
      version:            self.version,
      encrypted_key:      share.encrypted_key.clone(),
      public_key_version: share.public_key_version,
      created_at:         self.created_at,
    };
    [
      row(&self.initiator, self.responder.owner),
      row(&self.responder, self.initiator.owner),
    ]
  }
}

/// Input to [`crate::chat::ChatService::rotate_keys`].
#[derive(Debug, Clone)]
pub struct NewKeyEpoch {
  pub initiator: KeyShare,
  pub responder: KeyShare,
}

impl NewKeyEpoch {
  pub fn pair(&self) -> PairKey {
    PairKey::new(self.initiator.owner, self.responder.owner)
  }

  pub(crate) fn into_epoch(self, version: u32, created_at: DateTime<Utc>) -> KeyEpoch {
    KeyEpoch {
      version,
      created_at,
      initiator: self.initiator,
      responder: self.responder,
    }
  }
}

/// One stored key-epoch row, as read back by its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedKey {
  pub owner:              Identity,
  pub counterpart:        Identity,
  pub version:            u32,
  pub encrypted_key:      Vec<u8>,
  pub public_key_version: u32,
  pub created_at:         DateTime<Utc>,
}
