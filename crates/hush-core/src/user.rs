//! The user directory: display names and public keys.
//!
//! Clients encrypt each key-epoch share to the counterpart's current public
//! key and record that key's version in the share. The directory is where
//! those keys and versions come from.

use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::{
  event::{Recipients, Routed},
  identity::Identity,
};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
  pub id:                 Identity,
  pub name:               String,
  pub public_key:         Vec<u8>,
  /// Starts at 1 and grows by one with every new public key.
  pub public_key_version: u32,
}

/// A profile change requested by the user it applies to. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
  pub name:       Option<String>,
  pub public_key: Option<Vec<u8>>,
}

impl UserUpdate {
  pub fn is_empty(&self) -> bool { self.name.is_none() && self.public_key.is_none() }
}

/// Directory search. `name_part` matches case-insensitively anywhere in the
/// name; results are ordered by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
  pub name_part: Option<String>,
  pub limit:     u32,
  pub offset:    u32,
}

impl Default for UserQuery {
  fn default() -> Self { Self { name_part: None, limit: u32::MAX, offset: 0 } }
}

/// Profile field named in a [`UserChange`]; doubles as its wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum UserField {
  Name,
  PublicKey,
}

/// Why the directory refused an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProfileRejection {
  #[error("a new user needs both a name and a public key")]
  Incomplete,
  #[error("no public key versions are left")]
  KeyVersionExhausted,
}

/// A committed directory write: the user as stored afterwards and the
/// fields the write supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserChange {
  pub user:    User,
  pub fields:  Vec<UserField>,
  pub created: bool,
}

impl UserChange {
  /// Work out what `update` does to `existing`.
  ///
  /// Stores call this inside the transaction that writes the result, so the
  /// read and the write see the same row.
  pub fn apply(
    id: Identity,
    existing: Option<User>,
    update: UserUpdate,
  ) -> Result<Self, ProfileRejection> {
    let Some(mut user) = existing else {
      let (Some(name), Some(public_key)) = (update.name, update.public_key) else {
        return Err(ProfileRejection::Incomplete);
      };
      return Ok(Self {
        user:    User { id, name, public_key, public_key_version: 1 },
        fields:  vec![UserField::Name, UserField::PublicKey],
        created: true,
      });
    };

    let mut fields = Vec::new();
    if let Some(name) = update.name {
      user.name = name;
      fields.push(UserField::Name);
    }
    if let Some(public_key) = update.public_key {
      user.public_key_version = user
        .public_key_version
        .checked_add(1)
        .ok_or(ProfileRejection::KeyVersionExhausted)?;
      user.public_key = public_key;
      fields.push(UserField::PublicKey);
    }

    Ok(Self { user, fields, created: false })
  }
}

/// Directory changes go to every live directory session.
impl Routed for UserChange {
  fn recipients(&self) -> Recipients { Recipients::Everyone }
}
