//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with fixed microsecond precision, so they
//! sort lexically. Identities are hyphenated lowercase UUIDs. Ciphertext is
//! stored as-is in BLOB columns.

use chrono::{DateTime, SecondsFormat, Utc};
use hush_core::{
  identity::{Identity, PairKey},
  message::{Message, OwnedKey},
  user::User,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Identity ────────────────────────────────────────────────────────────────

pub fn encode_identity(id: Identity) -> String { id.as_uuid().hyphenated().to_string() }

pub fn decode_identity(s: &str) -> Result<Identity> { Ok(Identity::from_uuid(Uuid::parse_str(s)?)) }

/// Conversation key column; identical for both directions of a pair.
pub fn encode_pair(pair: PairKey) -> String { pair.to_string() }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected for every message read, in this order.
pub const MESSAGE_COLUMNS: &str = "message_id, sender_id, receiver_id, encrypted_content_type, \
                                   encrypted_body, created_at, edited_at, key_version, deleted";

/// Raw values read directly from a `messages` row.
pub struct RawMessage {
  pub message_id:             u32,
  pub sender_id:              String,
  pub receiver_id:            String,
  pub encrypted_content_type: Vec<u8>,
  pub encrypted_body:         Vec<u8>,
  pub created_at:             String,
  pub edited_at:              Option<String>,
  pub key_version:            u32,
  pub deleted:                bool,
}

impl RawMessage {
  /// Map a row selected with [`MESSAGE_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id:             row.get(0)?,
      sender_id:              row.get(1)?,
      receiver_id:            row.get(2)?,
      encrypted_content_type: row.get(3)?,
      encrypted_body:         row.get(4)?,
      created_at:             row.get(5)?,
      edited_at:              row.get(6)?,
      key_version:            row.get(7)?,
      deleted:                row.get(8)?,
    })
  }

  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      message_id:             self.message_id,
      sender:                 decode_identity(&self.sender_id)?,
      receiver:               decode_identity(&self.receiver_id)?,
      encrypted_content_type: self.encrypted_content_type,
      encrypted_body:         self.encrypted_body,
      created_at:             decode_dt(&self.created_at)?,
      edited_at:              self.edited_at.as_deref().map(decode_dt).transpose()?,
      key_version:            self.key_version,
      deleted:                self.deleted,
    })
  }
}

/// Raw values read directly from a `key_epochs` row.
pub struct RawOwnedKey {
  pub owner_id:           String,
  pub counterpart_id:     String,
  pub version:            u32,
  pub encrypted_key:      Vec<u8>,
  pub public_key_version: u32,
  pub created_at:         String,
}

impl RawOwnedKey {
  pub fn into_owned_key(self) -> Result<OwnedKey> {
    Ok(OwnedKey {
      owner:              decode_identity(&self.owner_id)?,
      counterpart:        decode_identity(&self.counterpart_id)?,
      version:            self.version,
      encrypted_key:      self.encrypted_key,
      public_key_version: self.public_key_version,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

/// Columns selected for every user read, in this order.
pub const USER_COLUMNS: &str = "id, name, public_key, public_key_version";

/// Raw values read directly from a `users` row.
pub struct RawUser {
  pub id:                 String,
  pub name:               String,
  pub public_key:         Vec<u8>,
  pub public_key_version: u32,
}

impl RawUser {
  /// Map a row selected with [`USER_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(0)?,
      name:               row.get(1)?,
      public_key:         row.get(2)?,
      public_key_version: row.get(3)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      id:                 decode_identity(&self.id)?,
      name:               self.name,
      public_key:         self.public_key,
      public_key_version: self.public_key_version,
    })
  }
}
