//! Error types for `hush-core`.

use thiserror::Error;

use crate::{
  identity::{Identity, PairKey},
  user::ProfileRejection,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid identity: {0:?}")]
  InvalidIdentity(String),

  /// The message does not exist, is already deleted, or was not authored by
  /// the caller.
  #[error("message {message_id} in {pair} is not available for this change")]
  MessageUnavailable { pair: PairKey, message_id: u32 },

  #[error("gave up allocating a new id for {pair} after {attempts} conflicts")]
  AllocationExhausted { pair: PairKey, attempts: usize },

  #[error("invalid profile: {0}")]
  InvalidProfile(&'static str),

  #[error("profile update for {user} refused: {reason}")]
  ProfileRejected { user: Identity, reason: ProfileRejection },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
