//! Per-conversation id allocation.
//!
//! Message ids and key-epoch versions are `max(existing) + 1`. The read of
//! the maximum and the insert that claims the next value run under one async
//! mutex per `(namespace, pair)`, so two writers to the same conversation can
//! never observe the same maximum. Writers to different conversations only
//! share the short critical section that looks up their mutex.
//!
//! The backend's uniqueness constraint is the second line: if an insert is
//! still rejected as a conflict (another process writing the same database),
//! the allocator re-reads and retries instead of surfacing an error.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError, Weak},
};

use chrono::Utc;
use strum::Display;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::{
  Error, Result,
  identity::PairKey,
  message::{KeyEpoch, Message, NewKeyEpoch, NewMessage},
  store::{ConversationLog, StoreError as _},
};

/// Attempts per allocation before giving up on repeated conflicts.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 5;

/// Smallest map size at which dead lock entries are swept.
const PRUNE_THRESHOLD: usize = 128;

/// Independent id sequences kept per conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Namespace {
  Message,
  KeyEpoch,
}

type LockKey = (Namespace, PairKey);

/// Weak lock handles plus the size at which the next sweep runs. After a
/// sweep the threshold moves to twice the live count, so sweeping stays
/// amortised constant per lookup however many locks are held.
#[derive(Debug)]
struct LockMap {
  entries:  HashMap<LockKey, Weak<AsyncMutex<()>>>,
  prune_at: usize,
}

impl Default for LockMap {
  fn default() -> Self { Self { entries: HashMap::new(), prune_at: PRUNE_THRESHOLD } }
}

impl LockMap {
  fn sweep_if_due(&mut self) {
    if self.entries.len() <= self.prune_at {
      return;
    }
    self.entries.retain(|_, weak| weak.strong_count() > 0);
    self.prune_at = (self.entries.len() * 2).max(PRUNE_THRESHOLD);
  }
}

/// Exclusive hold on one `(namespace, pair)` sequence. Released on drop.
#[derive(Debug)]
pub struct PairGuard {
  _guard:    OwnedMutexGuard<()>,
  namespace: Namespace,
  pair:      PairKey,
}

impl PairGuard {
  pub fn namespace(&self) -> Namespace { self.namespace }

  pub fn pair(&self) -> PairKey { self.pair }
}

/// Hands out per-conversation sequence ids. Shared by every writer.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
  locks: Mutex<LockMap>,
}

impl SequenceAllocator {
  pub fn new() -> Self { Self::default() }

  fn pair_lock(&self, key: LockKey) -> Arc<AsyncMutex<()>> {
    // The map only holds weak handles; its contents stay valid even if a
    // holder panicked.
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    locks.sweep_if_due();

    if let Some(existing) = locks.entries.get(&key).and_then(Weak::upgrade) {
      return existing;
    }

    let lock = Arc::new(AsyncMutex::new(()));
    locks.entries.insert(key, Arc::downgrade(&lock));
    lock
  }

  /// Wait for exclusive access to one conversation's sequence. Appends take
  /// this internally.
  pub async fn lock(&self, namespace: Namespace, pair: PairKey) -> PairGuard {
    let guard = self.pair_lock((namespace, pair)).lock_owned().await;
    PairGuard { _guard: guard, namespace, pair }
  }

  /// Number of conversations with a live lock handle.
  pub fn active_locks(&self) -> usize {
    let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entries.values().filter(|weak| weak.strong_count() > 0).count()
  }

  /// Entries in the lock map, dead ones included.
  pub fn tracked_locks(&self) -> usize {
    self.locks.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
  }

  /// Assign the next message id for `draft`'s conversation and persist it.
  ///
  /// `on_commit` is handed to the store with each attempt; only the attempt
  /// that commits runs it.
  pub async fn append_message<S, F>(
    &self,
    store: &S,
    draft: NewMessage,
    on_commit: F,
  ) -> Result<Message>
  where
    S: ConversationLog,
    F: FnOnce(&Message) + Clone + Send + 'static,
  {
    let pair = draft.pair();
    let _guard = self.lock(Namespace::Message, pair).await;
    let mut message = draft.into_message(0, Utc::now());

    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
      let current = store.max_message_id(pair).await.map_err(Error::store)?;
      message.message_id = next_id(pair, current)?;

      match store.insert_message(&message, on_commit.clone()).await {
        Ok(()) => {
          debug!(%pair, message_id = message.message_id, "message committed");
          return Ok(message);
        }
        Err(e) if e.is_conflict() => {
          warn!(%pair, message_id = message.message_id, attempt, "message id already taken; re-reading");
        }
        Err(e) => return Err(Error::store(e)),
      }
    }

    Err(Error::AllocationExhausted { pair, attempts: MAX_ALLOCATION_ATTEMPTS })
  }

  /// Assign the next key-epoch version for `draft`'s conversation and
  /// persist both of its rows.
  pub async fn append_key_epoch<S, F>(
    &self,
    store: &S,
    draft: NewKeyEpoch,
    on_commit: F,
  ) -> Result<KeyEpoch>
  where
    S: ConversationLog,
    F: FnOnce(&KeyEpoch) + Clone + Send + 'static,
  {
    let pair = draft.pair();
    let _guard = self.lock(Namespace::KeyEpoch, pair).await;
    let mut epoch = draft.into_epoch(0, Utc::now());

    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
      let current = store.max_key_version(pair).await.map_err(Error::store)?;
      epoch.version = next_id(pair, current)?;

      match store.insert_key_epoch(&epoch, on_commit.clone()).await {
        Ok(()) => {
          debug!(%pair, version = epoch.version, "key epoch committed");
          return Ok(epoch);
        }
        Err(e) if e.is_conflict() => {
          warn!(%pair, version = epoch.version, attempt, "key version already taken; re-reading");
        }
        Err(e) => return Err(Error::store(e)),
      }
    }

    Err(Error::AllocationExhausted { pair, attempts: MAX_ALLOCATION_ATTEMPTS })
  }
}

fn next_id(pair: PairKey, current: u32) -> Result<u32> {
  current
    .checked_add(1)
    .ok_or(Error::AllocationExhausted { pair, attempts: 0 })
}
