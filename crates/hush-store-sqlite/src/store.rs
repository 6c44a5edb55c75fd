//! [`SqliteStore`]: the SQLite implementation of [`ConversationLog`] and
//! [`UserDirectory`].
//!
//! Every statement runs on the connection's single worker thread, one
//! `call` at a time. Commit hooks run inside the `call` that commits, so
//! they fire in commit order.

use std::path::Path;

use chrono::{DateTime, Utc};
use hush_core::{
  identity::{Identity, PairKey},
  message::{IdRange, KeyEpoch, Message, OwnedKey},
  store::{ConversationLog, UserDirectory},
  user::{ProfileRejection, User, UserChange, UserQuery, UserUpdate},
};
use rusqlite::OptionalExtension as _;
use tracing::debug;

use crate::{
  Error, Result,
  encode::{
    MESSAGE_COLUMNS, RawMessage, RawOwnedKey, RawUser, USER_COLUMNS, encode_dt, encode_identity,
    encode_pair,
  },
  schema::SCHEMA,
};

/// Carry a decode failure out of a `call` closure.
fn in_call(err: Error) -> tokio_rusqlite::Error { tokio_rusqlite::Error::Other(Box::new(err)) }

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Hush conversation log backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    debug!("sqlite schema ready");
    Ok(())
  }

  /// Run raw SQL against the connection. Tests use it to install faults.
  #[cfg(test)]
  pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Shared tail of edit and delete: run a guarded `UPDATE ... RETURNING`
  /// and hand back the row it wrote, if any.
  ///
  /// The row is decoded before the transaction commits, so a row that cannot
  /// be read back leaves the update undone.
  async fn update_message<F>(
    &self,
    sql: String,
    params: Vec<rusqlite::types::Value>,
    on_commit: F,
  ) -> Result<Option<Message>>
  where
    F: FnOnce(&Message) + Send + 'static,
  {
    let updated = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let raw = tx
          .query_row(&sql, rusqlite::params_from_iter(params), RawMessage::from_row)
          .optional()?;
        let Some(raw) = raw else {
          return Ok(None);
        };
        let message = raw.into_message().map_err(in_call)?;
        tx.commit()?;
        on_commit(&message);
        Ok(Some(message))
      })
      .await?;
    Ok(updated)
  }

  async fn max_of(&self, sql: &'static str, pair: PairKey) -> Result<u32> {
    let pair_str = encode_pair(pair);
    let max: u32 = self
      .conn
      .call(move |conn| Ok(conn.query_row(sql, rusqlite::params![pair_str], |r| r.get(0))?))
      .await?;
    Ok(max)
  }
}

// ─── ConversationLog impl ────────────────────────────────────────────────────

impl ConversationLog for SqliteStore {
  type Error = Error;

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn max_message_id(&self, pair: PairKey) -> Result<u32> {
    self
      .max_of("SELECT COALESCE(MAX(message_id), 0) FROM messages WHERE pair_key = ?1", pair)
      .await
  }

  async fn insert_message<F>(&self, message: &Message, on_commit: F) -> Result<()>
  where
    F: FnOnce(&Message) + Send + 'static,
  {
    let committed    = message.clone();
    let pair_str     = encode_pair(message.pair());
    let message_id   = message.message_id;
    let sender_str   = encode_identity(message.sender);
    let receiver_str = encode_identity(message.receiver);
    let content_type = message.encrypted_content_type.clone();
    let body         = message.encrypted_body.clone();
    let created_str  = encode_dt(message.created_at);
    let edited_str   = message.edited_at.map(encode_dt);
    let key_version  = message.key_version;
    let deleted      = message.deleted;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO messages (
             pair_key, message_id, sender_id, receiver_id,
             encrypted_content_type, encrypted_body,
             created_at, edited_at, key_version, deleted
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            pair_str,
            message_id,
            sender_str,
            receiver_str,
            content_type,
            body,
            created_str,
            edited_str,
            key_version,
            deleted,
          ],
        )?;
        on_commit(&committed);
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn edit_message<F>(
    &self,
    pair:           PairKey,
    message_id:     u32,
    editor:         Identity,
    encrypted_body: Vec<u8>,
    key_version:    u32,
    edited_at:      DateTime<Utc>,
    on_commit:      F,
  ) -> Result<Option<Message>>
  where
    F: FnOnce(&Message) + Send + 'static,
  {
    use rusqlite::types::Value;

    self
      .update_message(
        format!(
          "UPDATE messages
           SET encrypted_body = ?1, key_version = ?2, edited_at = ?3
           WHERE pair_key = ?4 AND message_id = ?5 AND sender_id = ?6 AND deleted = 0
           RETURNING {MESSAGE_COLUMNS}"
        ),
        vec![
          Value::Blob(encrypted_body),
          Value::Integer(key_version.into()),
          Value::Text(encode_dt(edited_at)),
          Value::Text(encode_pair(pair)),
          Value::Integer(message_id.into()),
          Value::Text(encode_identity(editor)),
        ],
        on_commit,
      )
      .await
  }

  async fn delete_message<F>(
    &self,
    pair:       PairKey,
    message_id: u32,
    editor:     Identity,
    deleted_at: DateTime<Utc>,
    on_commit:  F,
  ) -> Result<Option<Message>>
  where
    F: FnOnce(&Message) + Send + 'static,
  {
    use rusqlite::types::Value;

    self
      .update_message(
        format!(
          "UPDATE messages
           SET deleted = 1, encrypted_body = X'', edited_at = ?1
           WHERE pair_key = ?2 AND message_id = ?3 AND sender_id = ?4 AND deleted = 0
           RETURNING {MESSAGE_COLUMNS}"
        ),
        vec![
          Value::Text(encode_dt(deleted_at)),
          Value::Text(encode_pair(pair)),
          Value::Integer(message_id.into()),
          Value::Text(encode_identity(editor)),
        ],
        on_commit,
      )
      .await
  }

  async fn get_messages(&self, pair: PairKey, range: IdRange) -> Result<Vec<Message>> {
    let pair_str = encode_pair(pair);

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM messages
           WHERE pair_key = ?1 AND message_id BETWEEN ?2 AND ?3
           ORDER BY message_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![pair_str, range.min, range.max], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }

  async fn chat_overview(&self, identity: Identity) -> Result<Vec<Message>> {
    let id_str = encode_identity(identity);

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        // Every row of a pair has the same two participants, so filtering on
        // sender or receiver selects exactly the pairs `identity` is in.
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM messages m
           JOIN (
             SELECT pair_key, MAX(message_id) AS latest
             FROM messages
             WHERE sender_id = ?1 OR receiver_id = ?1
             GROUP BY pair_key
           ) l ON l.pair_key = m.pair_key AND l.latest = m.message_id
           ORDER BY m.created_at DESC, m.pair_key"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }

  // ── Key epochs ────────────────────────────────────────────────────────────

  async fn max_key_version(&self, pair: PairKey) -> Result<u32> {
    self
      .max_of("SELECT COALESCE(MAX(version), 0) FROM key_epochs WHERE pair_key = ?1", pair)
      .await
  }

  async fn insert_key_epoch<F>(&self, epoch: &KeyEpoch, on_commit: F) -> Result<()>
  where
    F: FnOnce(&KeyEpoch) + Send + 'static,
  {
    let committed = epoch.clone();
    let pair_str = encode_pair(epoch.pair());
    let rows: Vec<_> = epoch
      .owned_keys()
      .into_iter()
      .map(|k| {
        (
          encode_identity(k.owner),
          encode_identity(k.counterpart),
          k.version,
          k.encrypted_key,
          k.public_key_version,
          encode_dt(k.created_at),
        )
      })
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO key_epochs (
               pair_key, version, direction, owner_id, counterpart_id,
               encrypted_key, public_key_version, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          )?;
          for (direction, (owner, counterpart, version, key, pkv, created)) in
            rows.into_iter().enumerate()
          {
            stmt.execute(rusqlite::params![
              pair_str, version, direction as i64, owner, counterpart, key, pkv, created,
            ])?;
          }
        }
        // Dropping an uncommitted transaction rolls it back, so an error on
        // either row leaves nothing behind.
        tx.commit()?;
        on_commit(&committed);
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_key_epochs(
    &self,
    owner:       Identity,
    counterpart: Identity,
    range:       IdRange,
  ) -> Result<Vec<OwnedKey>> {
    let pair_str        = encode_pair(PairKey::new(owner, counterpart));
    let owner_str       = encode_identity(owner);
    let counterpart_str = encode_identity(counterpart);

    let raws: Vec<RawOwnedKey> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT owner_id, counterpart_id, version, encrypted_key,
                  public_key_version, created_at
           FROM key_epochs
           WHERE pair_key = ?1 AND owner_id = ?2 AND counterpart_id = ?3
             AND version BETWEEN ?4 AND ?5
           ORDER BY version, direction",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![pair_str, owner_str, counterpart_str, range.min, range.max],
            |row| {
              Ok(RawOwnedKey {
                owner_id:           row.get(0)?,
                counterpart_id:     row.get(1)?,
                version:            row.get(2)?,
                encrypted_key:      row.get(3)?,
                public_key_version: row.get(4)?,
                created_at:         row.get(5)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOwnedKey::into_owned_key).collect()
  }
}

// ─── UserDirectory impl ──────────────────────────────────────────────────────

impl UserDirectory for SqliteStore {
  type Error = Error;

  async fn get_users(&self, query: UserQuery) -> Result<Vec<User>> {
    let raws: Vec<RawUser> = self
      .conn
      .call(move |conn| {
        // instr() rather than LIKE, so `%` and `_` in the search are literal.
        let mut stmt = conn.prepare(&format!(
          "SELECT {USER_COLUMNS} FROM users
           WHERE ?1 IS NULL OR instr(lower(name), lower(?1)) > 0
           ORDER BY name, id
           LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![query.name_part, i64::from(query.limit), i64::from(query.offset)],
            RawUser::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUser::into_user).collect()
  }

  async fn get_user(&self, id: Identity) -> Result<Option<User>> {
    let id_str = encode_identity(id);

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
              rusqlite::params![id_str],
              RawUser::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn save_user<F>(
    &self,
    id:        Identity,
    update:    UserUpdate,
    on_commit: F,
  ) -> Result<Result<UserChange, ProfileRejection>>
  where
    F: FnOnce(&UserChange) + Send + 'static,
  {
    let id_str = encode_identity(id);

    let saved = self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock before the read, so no other writer
        // can slip in between reading the row and replacing it.
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let existing = tx
          .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            rusqlite::params![id_str],
            RawUser::from_row,
          )
          .optional()?
          .map(RawUser::into_user)
          .transpose()
          .map_err(in_call)?;

        let change = match UserChange::apply(id, existing, update) {
          Ok(change) => change,
          Err(rejection) => return Ok(Err(rejection)),
        };

        tx.execute(
          "INSERT INTO users (id, name, public_key, public_key_version)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (id) DO UPDATE SET
             name               = excluded.name,
             public_key         = excluded.public_key,
             public_key_version = excluded.public_key_version",
          rusqlite::params![
            id_str,
            change.user.name,
            change.user.public_key,
            change.user.public_key_version,
          ],
        )?;
        tx.commit()?;
        on_commit(&change);
        Ok(Ok(change))
      })
      .await?;
    Ok(saved)
  }
}
