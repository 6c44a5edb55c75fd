//! The chat write path: validate, allocate, persist, then notify.
//!
//! Notifications are published from the store's commit hook, which runs
//! inside the backend's serialized commit step. Every live session therefore
//! sees changes in commit order, across all of its conversations, no matter
//! when each writer gets its reply. Publication is best-effort and never
//! affects the write's result; a failed write publishes nothing.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::{
  Error, Result,
  allocator::SequenceAllocator,
  event::Notification,
  identity::{Identity, PairKey},
  message::{IdRange, KeyEpoch, Message, NewKeyEpoch, NewMessage, OwnedKey},
  registry::SessionRegistry,
  session::Subscription,
  store::ConversationLog,
};

/// Message and key-epoch operations over a [`ConversationLog`], wired to a
/// [`SessionRegistry`] for live delivery.
#[derive(Debug)]
pub struct ChatService<S> {
  store:     Arc<S>,
  allocator: SequenceAllocator,
  registry:  Arc<SessionRegistry>,
}

impl<S: ConversationLog> ChatService<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self::with_registry(store, Arc::new(SessionRegistry::new()))
  }

  pub fn with_registry(store: Arc<S>, registry: Arc<SessionRegistry>) -> Self {
    Self { store, allocator: SequenceAllocator::new(), registry }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn registry(&self) -> &Arc<SessionRegistry> { &self.registry }

  // ── Sessions ──────────────────────────────────────────────────────────────

  /// Open a live session for `identity`. Events committed after this call
  /// returns are delivered to it until it is closed or dropped.
  pub fn subscribe(&self, identity: Identity) -> Subscription {
    Subscription::open(Arc::clone(&self.registry), identity)
  }

  /// Commit hook that wraps the stored record with `wrap` and fans it out.
  fn notifier<T, W>(&self, wrap: W) -> impl FnOnce(&T) + Clone + Send + 'static
  where
    T: Clone + 'static,
    W: FnOnce(T) -> Notification + Clone + Send + 'static,
  {
    let registry = Arc::clone(&self.registry);
    move |record: &T| {
      let notification = wrap(record.clone());
      let delivered = registry.publish(&notification);
      debug!(kind = %notification.kind(), pair = %notification.pair(), delivered, "notified live sessions");
    }
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  /// Store a new message under the conversation's next sequence id.
  pub async fn send_message(&self, draft: NewMessage) -> Result<Message> {
    self
      .allocator
      .append_message(self.store.as_ref(), draft, self.notifier(Notification::MessageCreated))
      .await
  }

  /// Replace the body of a message `editor` sent to `target`.
  pub async fn edit_message(
    &self,
    editor: Identity,
    target: Identity,
    message_id: u32,
    encrypted_body: Vec<u8>,
    key_version: u32,
  ) -> Result<Message> {
    let pair = PairKey::new(editor, target);
    let message = self
      .store
      .edit_message(
        pair,
        message_id,
        editor,
        encrypted_body,
        key_version,
        Utc::now(),
        self.notifier(Notification::MessageEdited),
      )
      .await
      .map_err(Error::store)?
      .ok_or(Error::MessageUnavailable { pair, message_id })?;

    debug!(%pair, message_id, "message edited");
    Ok(message)
  }

  /// Delete a message `editor` sent to `target`. The row stays, its body is
  /// cleared; deleting again fails.
  pub async fn delete_message(
    &self,
    editor: Identity,
    target: Identity,
    message_id: u32,
  ) -> Result<Message> {
    let pair = PairKey::new(editor, target);
    let message = self
      .store
      .delete_message(pair, message_id, editor, Utc::now(), self.notifier(Notification::MessageDeleted))
      .await
      .map_err(Error::store)?
      .ok_or(Error::MessageUnavailable { pair, message_id })?;

    debug!(%pair, message_id, "message deleted");
    Ok(message)
  }

  /// Messages between `user` and `target` within `range`, ordered by id.
  pub async fn messages(&self, user: Identity, target: Identity, range: IdRange) -> Result<Vec<Message>> {
    self
      .store
      .get_messages(PairKey::new(user, target), range)
      .await
      .map_err(Error::store)
  }

  /// The latest message of each conversation `user` takes part in.
  pub async fn chat_overview(&self, user: Identity) -> Result<Vec<Message>> {
    self.store.chat_overview(user).await.map_err(Error::store)
  }

  // ── Key epochs ────────────────────────────────────────────────────────────

  /// `user`'s shares of the keys for the conversation with `target`.
  pub async fn key_epochs(&self, user: Identity, target: Identity, range: IdRange) -> Result<Vec<OwnedKey>> {
    self
      .store
      .get_key_epochs(user, target, range)
      .await
      .map_err(Error::store)
  }

  /// Commit a new key epoch (both shares) under the next version.
  pub async fn rotate_keys(&self, draft: NewKeyEpoch) -> Result<KeyEpoch> {
    let epoch = self
      .allocator
      .append_key_epoch(self.store.as_ref(), draft, self.notifier(Notification::KeyEpochUpdated))
      .await?;

    info!(pair = %epoch.pair(), version = epoch.version, "key epoch rotated");
    Ok(epoch)
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::BTreeSet, time::Duration};

  use super::*;
  use crate::{
    event::NotificationKind,
    testing::{MemoryLog, identity, key_epoch_draft, message_draft},
  };

  fn service() -> ChatService<MemoryLog> { ChatService::new(Arc::new(MemoryLog::default())) }

  async fn next(sub: &mut Subscription) -> Notification {
    tokio::time::timeout(Duration::from_secs(1), sub.recv())
      .await
      .expect("event within a second")
      .expect("subscription open")
  }

  #[tokio::test]
  async fn send_then_delete_reaches_both_sides() {
    let chat = service();
    let (x, y) = (identity(), identity());
    let mut s1 = chat.subscribe(x);
    let mut s2 = chat.subscribe(y);

    let sent = chat.send_message(message_draft(x, y)).await.unwrap();
    assert_eq!(sent.message_id, 1);

    for sub in [&mut s1, &mut s2] {
      let event = next(sub).await;
      assert_eq!(event.kind(), NotificationKind::MessageCreated);
      let message = event.message().unwrap();
      assert_eq!(message.message_id, 1);
      assert!(!message.deleted);
      assert_eq!(message.encrypted_body, b"hello");
    }

    chat.delete_message(x, y, 1).await.unwrap();

    for sub in [&mut s1, &mut s2] {
      let event = next(sub).await;
      assert_eq!(event.kind(), NotificationKind::MessageDeleted);
      let message = event.message().unwrap();
      assert_eq!(message.message_id, 1);
      assert!(message.deleted);
      assert!(message.encrypted_body.is_empty());
      assert!(message.edited_at.is_some());
    }
  }

  #[tokio::test]
  async fn send_succeeds_without_live_receiver() {
    let chat = service();
    let (x, y) = (identity(), identity());

    let sent = chat.send_message(message_draft(x, y)).await.unwrap();
    assert_eq!(sent.message_id, 1);
    assert_eq!(chat.registry().session_count(y), 0);
  }

  #[tokio::test]
  async fn editing_a_deleted_message_fails_and_changes_nothing() {
    let chat = service();
    let (x, y) = (identity(), identity());

    chat.send_message(message_draft(x, y)).await.unwrap();
    chat.delete_message(x, y, 1).await.unwrap();

    let mut sub = chat.subscribe(y);
    let err = chat.edit_message(x, y, 1, b"revived".to_vec(), 2).await.unwrap_err();
    assert!(matches!(err, Error::MessageUnavailable { message_id: 1, .. }));

    let stored = chat.messages(x, y, IdRange::single(1)).await.unwrap();
    assert!(stored[0].deleted);
    assert!(stored[0].encrypted_body.is_empty());
    assert_eq!(stored[0].key_version, 1);

    let err = chat.delete_message(x, y, 1).await.unwrap_err();
    assert!(matches!(err, Error::MessageUnavailable { .. }));
    assert!(sub.try_recv().is_none(), "failed writes publish nothing");
  }

  #[tokio::test]
  async fn only_the_sender_may_change_a_message() {
    let chat = service();
    let (x, y) = (identity(), identity());
    chat.send_message(message_draft(x, y)).await.unwrap();

    assert!(chat.edit_message(y, x, 1, b"forged".to_vec(), 1).await.is_err());
    assert!(chat.delete_message(y, x, 1).await.is_err());

    let edited = chat.edit_message(x, y, 1, b"fixed".to_vec(), 2).await.unwrap();
    assert_eq!(edited.encrypted_body, b"fixed");
    assert_eq!(edited.key_version, 2);
    assert!(edited.edited_at.is_some());
  }

  #[tokio::test]
  async fn editing_a_missing_message_fails() {
    let chat = service();
    let (x, y) = (identity(), identity());
    assert!(matches!(
      chat.edit_message(x, y, 9, Vec::new(), 1).await,
      Err(Error::MessageUnavailable { message_id: 9, .. })
    ));
  }

  #[tokio::test]
  async fn failed_store_write_is_reported_and_not_published() {
    let store = Arc::new(MemoryLog::default());
    let chat = ChatService::new(Arc::clone(&store));
    let (x, y) = (identity(), identity());
    let mut sub = chat.subscribe(y);

    store.fail_writes(true);
    assert!(matches!(chat.send_message(message_draft(x, y)).await, Err(Error::Store(_))));
    assert!(sub.try_recv().is_none());
  }

  #[tokio::test]
  async fn events_arrive_in_commit_order() {
    let chat = service();
    let (x, y) = (identity(), identity());
    let mut sub = chat.subscribe(y);

    chat.send_message(message_draft(x, y)).await.unwrap();
    chat.send_message(message_draft(y, x)).await.unwrap();
    chat.edit_message(x, y, 1, b"edited".to_vec(), 1).await.unwrap();
    chat.delete_message(y, x, 2).await.unwrap();

    let kinds = [
      (NotificationKind::MessageCreated, 1),
      (NotificationKind::MessageCreated, 2),
      (NotificationKind::MessageEdited, 1),
      (NotificationKind::MessageDeleted, 2),
    ];
    for (kind, id) in kinds {
      let event = next(&mut sub).await;
      assert_eq!(event.kind(), kind);
      assert_eq!(event.message().unwrap().message_id, id);
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_sends_deliver_strictly_increasing_ids() {
    let chat = Arc::new(service());
    let (x, y) = (identity(), identity());
    let mut sub = chat.subscribe(y);

    let tasks: Vec<_> = (0..20)
      .map(|_| {
        let chat = Arc::clone(&chat);
        tokio::spawn(async move { chat.send_message(message_draft(x, y)).await })
      })
      .collect();
    let mut ids = BTreeSet::new();
    for task in tasks {
      ids.insert(task.await.unwrap().unwrap().message_id);
    }
    assert_eq!(ids, (1..=20).collect::<BTreeSet<_>>());

    for expected in 1..=20 {
      assert_eq!(next(&mut sub).await.message().unwrap().message_id, expected);
    }
  }

  #[tokio::test]
  async fn overview_lists_latest_message_per_counterpart() {
    let chat = service();
    let (x, y, z) = (identity(), identity(), identity());

    chat.send_message(message_draft(x, y)).await.unwrap();
    chat.send_message(message_draft(y, x)).await.unwrap();
    chat.send_message(message_draft(z, x)).await.unwrap();
    chat.send_message(message_draft(y, z)).await.unwrap();

    let overview = chat.chat_overview(x).await.unwrap();
    assert_eq!(overview.len(), 2);
    let with_y = overview.iter().find(|m| m.pair() == PairKey::new(x, y)).unwrap();
    assert_eq!(with_y.message_id, 2);
  }

  #[tokio::test]
  async fn key_rotation_commits_two_rows_and_notifies_both() {
    let chat = service();
    let (x, y) = (identity(), identity());
    let mut sx = chat.subscribe(x);
    let mut sy = chat.subscribe(y);

    let epoch = chat.rotate_keys(key_epoch_draft(x, y)).await.unwrap();
    assert_eq!(epoch.version, 1);

    let mine = chat.key_epochs(x, y, IdRange::default()).await.unwrap();
    let theirs = chat.key_epochs(y, x, IdRange::default()).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(theirs.len(), 1);
    assert_eq!(mine[0].version, theirs[0].version);
    assert_eq!(mine[0].encrypted_key, b"initiator-share");
    assert_eq!(theirs[0].encrypted_key, b"responder-share");
    assert_eq!(theirs[0].public_key_version, 3);

    for sub in [&mut sx, &mut sy] {
      let event = next(sub).await;
      assert_eq!(event.kind(), NotificationKind::KeyEpochUpdated);
      assert_eq!(event.key_epoch().unwrap().version, 1);
    }

    let second = chat.rotate_keys(key_epoch_draft(y, x)).await.unwrap();
    assert_eq!(second.version, 2);
  }

  #[tokio::test]
  async fn failed_key_rotation_is_invisible() {
    let store = Arc::new(MemoryLog::default());
    let chat = ChatService::new(Arc::clone(&store));
    let (x, y) = (identity(), identity());
    let mut sub = chat.subscribe(x);

    store.fail_second_key_row(true);
    assert!(chat.rotate_keys(key_epoch_draft(x, y)).await.is_err());
    assert!(chat.key_epochs(x, y, IdRange::default()).await.unwrap().is_empty());
    assert!(chat.key_epochs(y, x, IdRange::default()).await.unwrap().is_empty());
    assert!(sub.try_recv().is_none());
  }

  #[tokio::test]
  async fn events_across_conversations_follow_commit_order() {
    let store = Arc::new(MemoryLog::default());
    let chat = Arc::new(ChatService::new(Arc::clone(&store)));
    let (x, y, z) = (identity(), identity(), identity());
    let mut sub = chat.subscribe(x);

    // The send to y commits first but its reply is held back; the send to z
    // commits second and returns first.
    store.slow_ack(PairKey::new(x, y), Duration::from_millis(50));
    let slow = {
      let chat = Arc::clone(&chat);
      tokio::spawn(async move { chat.send_message(message_draft(x, y)).await })
    };
    while store.message_count(PairKey::new(x, y)) == 0 {
      tokio::task::yield_now().await;
    }
    chat.send_message(message_draft(x, z)).await.unwrap();
    assert!(!slow.is_finished(), "the first send is still waiting for its reply");
    slow.await.unwrap().unwrap();

    assert_eq!(next(&mut sub).await.pair(), PairKey::new(x, y));
    assert_eq!(next(&mut sub).await.pair(), PairKey::new(x, z));
    assert!(sub.try_recv().is_none());
  }

  #[tokio::test]
  async fn committed_changes_report_success_when_reads_fail() {
    let store = Arc::new(MemoryLog::default());
    let chat = ChatService::new(Arc::clone(&store));
    let (x, y) = (identity(), identity());
    chat.send_message(message_draft(x, y)).await.unwrap();
    chat.send_message(message_draft(x, y)).await.unwrap();
    let mut sub = chat.subscribe(y);

    store.fail_reads(true);
    let deleted = chat.delete_message(x, y, 1).await.unwrap();
    assert!(deleted.deleted);
    assert!(deleted.encrypted_body.is_empty());
    let edited = chat.edit_message(x, y, 2, b"fixed".to_vec(), 2).await.unwrap();
    assert_eq!(edited.encrypted_body, b"fixed");

    let event = next(&mut sub).await;
    assert_eq!(event.kind(), NotificationKind::MessageDeleted);
    assert_eq!(event.message(), Some(&deleted));
    let event = next(&mut sub).await;
    assert_eq!(event.kind(), NotificationKind::MessageEdited);
    assert_eq!(event.message(), Some(&edited));

    store.fail_reads(false);
    let stored = chat.messages(x, y, IdRange::default()).await.unwrap();
    assert_eq!(stored, [deleted, edited]);
  }
}
