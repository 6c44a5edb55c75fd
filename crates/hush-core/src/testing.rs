//! In-memory `ConversationLog` with fault injection, for unit tests.

use std::{
  collections::BTreeMap,
  sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  identity::{Identity, PairKey},
  message::{IdRange, KeyEpoch, KeyShare, Message, NewKeyEpoch, NewMessage, OwnedKey},
  store::{ConversationLog, StoreError, UserDirectory},
  user::{ProfileRejection, User, UserChange, UserQuery, UserUpdate},
};

pub fn identity() -> Identity { Identity::from_uuid(Uuid::new_v4()) }

pub fn message_draft(sender: Identity, receiver: Identity) -> NewMessage {
  NewMessage {
    sender,
    receiver,
    encrypted_content_type: b"text".to_vec(),
    encrypted_body: b"hello".to_vec(),
    key_version: 1,
  }
}

pub fn key_epoch_draft(initiator: Identity, responder: Identity) -> NewKeyEpoch {
  NewKeyEpoch {
    initiator: KeyShare {
      owner:              initiator,
      encrypted_key:      b"initiator-share".to_vec(),
      public_key_version: 1,
    },
    responder: KeyShare {
      owner:              responder,
      encrypted_key:      b"responder-share".to_vec(),
      public_key_version: 3,
    },
  }
}

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("id already taken")]
  Conflict,
  #[error("injected failure")]
  Injected,
}

impl StoreError for MemoryError {
  fn is_conflict(&self) -> bool { matches!(self, Self::Conflict) }
}

#[derive(Default)]
struct State {
  messages: BTreeMap<(PairKey, u32), Message>,
  keys:     BTreeMap<(PairKey, u32, u8), OwnedKey>,
  users:    BTreeMap<Identity, User>,
}

/// Commits happen under `state`'s lock, and hooks run before it is
/// released, so hooks observe commit order.
#[derive(Default)]
pub struct MemoryLog {
  state:           Mutex<State>,
  conflicts:       AtomicUsize,
  fail_writes:     AtomicBool,
  fail_reads:      AtomicBool,
  fail_second_key: AtomicBool,
  slow_ack:        Mutex<Option<(PairKey, Duration)>>,
}

impl MemoryLog {
  /// Reject the next `n` inserts as conflicts.
  pub fn inject_conflicts(&self, n: usize) { self.conflicts.store(n, Ordering::SeqCst); }

  pub fn fail_writes(&self, on: bool) { self.fail_writes.store(on, Ordering::SeqCst); }

  /// Make every read fail. Writes are unaffected.
  pub fn fail_reads(&self, on: bool) { self.fail_reads.store(on, Ordering::SeqCst); }

  /// Hold back the reply to a committed message insert on `pair` for
  /// `delay`. The commit and its hook happen first.
  pub fn slow_ack(&self, pair: PairKey, delay: Duration) {
    *self.slow_ack.lock().unwrap() = Some((pair, delay));
  }

  pub fn fail_second_key_row(&self, on: bool) {
    self.fail_second_key.store(on, Ordering::SeqCst);
  }

  pub fn message_count(&self, pair: PairKey) -> usize {
    let state = self.state.lock().unwrap();
    state.messages.keys().filter(|(p, _)| *p == pair).count()
  }

  pub fn key_row_count(&self, pair: PairKey) -> usize {
    let state = self.state.lock().unwrap();
    state.keys.keys().filter(|(p, _, _)| *p == pair).count()
  }

  fn check_read(&self) -> Result<(), MemoryError> {
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(MemoryError::Injected);
    }
    Ok(())
  }

  fn ack_delay(&self, pair: PairKey) -> Option<Duration> {
    let slow = *self.slow_ack.lock().unwrap();
    slow.and_then(|(p, delay)| (p == pair).then_some(delay))
  }

  fn check_write(&self) -> Result<(), MemoryError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(MemoryError::Injected);
    }
    let injected = self
      .conflicts
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if injected { Err(MemoryError::Conflict) } else { Ok(()) }
  }

  fn update_message(
    &self,
    pair: PairKey,
    message_id: u32,
    editor: Identity,
    change: impl FnOnce(&mut Message),
    on_commit: impl FnOnce(&Message),
  ) -> Result<Option<Message>, MemoryError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(MemoryError::Injected);
    }
    let mut state = self.state.lock().unwrap();
    match state.messages.get_mut(&(pair, message_id)) {
      Some(m) if !m.deleted && m.sender == editor => {
        change(m);
        on_commit(&*m);
        Ok(Some(m.clone()))
      }
      _ => Ok(None),
    }
  }
}

impl ConversationLog for MemoryLog {
  type Error = MemoryError;

  async fn max_message_id(&self, pair: PairKey) -> Result<u32, MemoryError> {
    self.check_read()?;
    let max = {
      let state = self.state.lock().unwrap();
      state
        .messages
        .keys()
        .filter(|(p, _)| *p == pair)
        .map(|(_, id)| *id)
        .max()
        .unwrap_or(0)
    };
    // Give other writers a chance to read the same maximum.
    tokio::task::yield_now().await;
    Ok(max)
  }

  async fn insert_message<F>(&self, message: &Message, on_commit: F) -> Result<(), MemoryError>
  where
    F: FnOnce(&Message) + Send + 'static,
  {
    self.check_write()?;
    {
      let mut state = self.state.lock().unwrap();
      let key = (message.pair(), message.message_id);
      if state.messages.contains_key(&key) {
        return Err(MemoryError::Conflict);
      }
      state.messages.insert(key, message.clone());
      on_commit(message);
    }
    if let Some(delay) = self.ack_delay(message.pair()) {
      tokio::time::sleep(delay).await;
    }
    Ok(())
  }

  async fn edit_message<F>(
    &self,
    pair: PairKey,
    message_id: u32,
    editor: Identity,
    encrypted_body: Vec<u8>,
    key_version: u32,
    edited_at: DateTime<Utc>,
    on_commit: F,
  ) -> Result<Option<Message>, MemoryError>
  where
    F: FnOnce(&Message) + Send + 'static,
  {
    self.update_message(
      pair,
      message_id,
      editor,
      |m| {
        m.encrypted_body = encrypted_body;
        m.key_version = key_version;
        m.edited_at = Some(edited_at);
      },
      on_commit,
    )
  }

  async fn delete_message<F>(
    &self,
    pair: PairKey,
    message_id: u32,
    editor: Identity,
    deleted_at: DateTime<Utc>,
    on_commit: F,
  ) -> Result<Option<Message>, MemoryError>
  where
    F: FnOnce(&Message) + Send + 'static,
  {
    self.update_message(
      pair,
      message_id,
      editor,
      |m| {
        m.encrypted_body.clear();
        m.deleted = true;
        m.edited_at = Some(deleted_at);
      },
      on_commit,
    )
  }

  async fn get_messages(&self, pair: PairKey, range: IdRange) -> Result<Vec<Message>, MemoryError> {
    self.check_read()?;
    let state = self.state.lock().unwrap();
    Ok(
      state
        .messages
        .iter()
        .filter(|((p, id), _)| *p == pair && range.contains(*id))
        .map(|(_, m)| m.clone())
        .collect(),
    )
  }

  async fn chat_overview(&self, identity: Identity) -> Result<Vec<Message>, MemoryError> {
    self.check_read()?;
    let state = self.state.lock().unwrap();
    let mut latest: BTreeMap<PairKey, Message> = BTreeMap::new();
    for ((pair, _), m) in &state.messages {
      if pair.contains(identity) {
        latest.insert(*pair, m.clone());
      }
    }
    let mut out: Vec<Message> = latest.into_values().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
  }

  async fn max_key_version(&self, pair: PairKey) -> Result<u32, MemoryError> {
    self.check_read()?;
    let max = {
      let state = self.state.lock().unwrap();
      state
        .keys
        .keys()
        .filter(|(p, _, _)| *p == pair)
        .map(|(_, v, _)| *v)
        .max()
        .unwrap_or(0)
    };
    tokio::task::yield_now().await;
    Ok(max)
  }

  async fn insert_key_epoch<F>(&self, epoch: &KeyEpoch, on_commit: F) -> Result<(), MemoryError>
  where
    F: FnOnce(&KeyEpoch) + Send + 'static,
  {
    self.check_write()?;
    let pair = epoch.pair();
    let mut state = self.state.lock().unwrap();
    let [first, second] = epoch.owned_keys();

    let first_key = (pair, first.version, 0);
    if state.keys.contains_key(&first_key) {
      return Err(MemoryError::Conflict);
    }
    state.keys.insert(first_key, first);

    // Emulate a transaction: undo the first row if the second fails.
    if self.fail_second_key.load(Ordering::SeqCst) {
      state.keys.remove(&first_key);
      return Err(MemoryError::Injected);
    }
    let second_key = (pair, second.version, 1);
    if state.keys.contains_key(&second_key) {
      state.keys.remove(&first_key);
      return Err(MemoryError::Conflict);
    }
    state.keys.insert(second_key, second);
    on_commit(epoch);
    Ok(())
  }

  async fn get_key_epochs(
    &self,
    owner: Identity,
    counterpart: Identity,
    range: IdRange,
  ) -> Result<Vec<OwnedKey>, MemoryError> {
    self.check_read()?;
    let pair = PairKey::new(owner, counterpart);
    let state = self.state.lock().unwrap();
    Ok(
      state
        .keys
        .iter()
        .filter(|((p, v, _), k)| *p == pair && k.owner == owner && range.contains(*v))
        .map(|(_, k)| k.clone())
        .collect(),
    )
  }
}

impl UserDirectory for MemoryLog {
  type Error = MemoryError;

  async fn get_users(&self, query: UserQuery) -> Result<Vec<User>, MemoryError> {
    self.check_read()?;
    let state = self.state.lock().unwrap();
    let needle = query.name_part.map(|n| n.to_lowercase());
    let mut users: Vec<User> = state
      .users
      .values()
      .filter(|u| needle.as_deref().is_none_or(|n| u.name.to_lowercase().contains(n)))
      .cloned()
      .collect();
    users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(
      users
        .into_iter()
        .skip(query.offset as usize)
        .take(query.limit as usize)
        .collect(),
    )
  }

  async fn get_user(&self, id: Identity) -> Result<Option<User>, MemoryError> {
    self.check_read()?;
    Ok(self.state.lock().unwrap().users.get(&id).cloned())
  }

  async fn save_user<F>(
    &self,
    id: Identity,
    update: UserUpdate,
    on_commit: F,
  ) -> Result<Result<UserChange, ProfileRejection>, MemoryError>
  where
    F: FnOnce(&UserChange) + Send + 'static,
  {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(MemoryError::Injected);
    }
    let mut state = self.state.lock().unwrap();
    let change = match UserChange::apply(id, state.users.get(&id).cloned(), update) {
      Ok(change) => change,
      Err(rejection) => return Ok(Err(rejection)),
    };
    state.users.insert(id, change.user.clone());
    on_commit(&change);
    Ok(Ok(change))
  }
}
