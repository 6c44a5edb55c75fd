//! Storage traits: the ordered, per-conversation record of messages and key
//! epochs, and the user directory.
//!
//! The traits are implemented by storage backends (e.g. `hush-store-sqlite`).
//! The services in [`crate::chat`] and [`crate::directory`] depend on these
//! abstractions, not on any concrete backend.
//!
//! # Commit hooks
//!
//! Every write takes an `on_commit` callback. A backend runs it exactly once,
//! with the record as stored, after the write is durable and before any
//! other write to the same backend can commit. Backends serialize their
//! commits, so hooks run in commit order across every conversation. A write
//! that fails or changes nothing never runs its hook.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  identity::{Identity, PairKey},
  message::{IdRange, KeyEpoch, Message, OwnedKey},
  user::{ProfileRejection, User, UserChange, UserQuery, UserUpdate},
};

/// Errors raised by a storage backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// `true` when the write was rejected because the id it carried is already
  /// taken. The allocator answers this with a fresh read and a retry.
  fn is_conflict(&self) -> bool;
}

/// Abstraction over a conversation log backend.
///
/// Ids are never chosen by the backend: [`crate::allocator::SequenceAllocator`]
/// reads the current maximum, picks the next value and hands over a fully
/// built record. Backends must reject a record whose id already exists with
/// an error for which [`StoreError::is_conflict`] is `true`.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ConversationLog: Send + Sync {
  type Error: StoreError;

  // ── Messages ──────────────────────────────────────────────────────────

  /// Highest message id in the conversation, or 0 if it is empty.
  fn max_message_id(
    &self,
    pair: PairKey,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + '_;

  /// Persist a message under the id it carries.
  fn insert_message<'a, F>(
    &'a self,
    message: &'a Message,
    on_commit: F,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a
  where
    F: FnOnce(&Message) + Send + 'static;

  /// Replace the body of a message authored by `editor` and return the row
  /// as written.
  ///
  /// Returns `None` without changing anything if the message does not
  /// exist, is deleted, or was sent by someone else.
  #[allow(clippy::too_many_arguments)]
  fn edit_message<F>(
    &self,
    pair: PairKey,
    message_id: u32,
    editor: Identity,
    encrypted_body: Vec<u8>,
    key_version: u32,
    edited_at: DateTime<Utc>,
    on_commit: F,
  ) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send + '_
  where
    F: FnOnce(&Message) + Send + 'static;

  /// Mark a message authored by `editor` as deleted, clear its body and
  /// return the row as written.
  ///
  /// Same conditions as [`ConversationLog::edit_message`]; deleting twice
  /// returns `None` the second time.
  fn delete_message<F>(
    &self,
    pair: PairKey,
    message_id: u32,
    editor: Identity,
    deleted_at: DateTime<Utc>,
    on_commit: F,
  ) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send + '_
  where
    F: FnOnce(&Message) + Send + 'static;

  /// Messages of a conversation within `range`, ordered by id.
  fn get_messages(
    &self,
    pair: PairKey,
    range: IdRange,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + '_;

  /// The latest message of every conversation `identity` takes part in,
  /// newest first.
  fn chat_overview(
    &self,
    identity: Identity,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + '_;

  // ── Key epochs ────────────────────────────────────────────────────────

  /// Highest key-epoch version of the conversation, or 0 if none exists.
  fn max_key_version(
    &self,
    pair: PairKey,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + '_;

  /// Persist both rows of a key epoch. Either both become visible or
  /// neither does; the hook runs once, for the pair of rows.
  fn insert_key_epoch<'a, F>(
    &'a self,
    epoch: &'a KeyEpoch,
    on_commit: F,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a
  where
    F: FnOnce(&KeyEpoch) + Send + 'static;

  /// Key-epoch rows owned by `owner` for the conversation with
  /// `counterpart`, within `range`, ordered by version.
  fn get_key_epochs(
    &self,
    owner: Identity,
    counterpart: Identity,
    range: IdRange,
  ) -> impl Future<Output = Result<Vec<OwnedKey>, Self::Error>> + Send + '_;
}

/// Abstraction over the user directory.
pub trait UserDirectory: Send + Sync {
  type Error: StoreError;

  /// Users matching `query`, ordered by name then id.
  fn get_users(
    &self,
    query: UserQuery,
  ) -> impl Future<Output = Result<Vec<User>, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: Identity,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Create or update the user `id`.
  ///
  /// The current row is read and the result of [`UserChange::apply`] is
  /// written in one transaction. A rejected update writes nothing and does
  /// not run the hook.
  fn save_user<F>(
    &self,
    id: Identity,
    update: UserUpdate,
    on_commit: F,
  ) -> impl Future<Output = Result<Result<UserChange, ProfileRejection>, Self::Error>> + Send + '_
  where
    F: FnOnce(&UserChange) + Send + 'static;
}
