//! SQL schema for the Hush SQLite store.
//!
//! Executed once at connection startup. The `PRAGMA user_version` marks the
//! layout so later migrations can be gated on it.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per message. Ids are assigned by the server's allocator; the
-- primary key rejects a second writer that picked the same id.
CREATE TABLE IF NOT EXISTS messages (
    pair_key               TEXT    NOT NULL,   -- 'low:high' identity pair
    message_id             INTEGER NOT NULL,
    sender_id              TEXT    NOT NULL,
    receiver_id            TEXT    NOT NULL,
    encrypted_content_type BLOB    NOT NULL,
    encrypted_body         BLOB    NOT NULL,   -- empty once deleted
    created_at             TEXT    NOT NULL,
    edited_at              TEXT,
    key_version            INTEGER NOT NULL,
    deleted                INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (pair_key, message_id),
    CHECK (message_id > 0)
);

-- Each key epoch is two rows under one version: direction 0 is the
-- initiator's share, direction 1 the responder's.
CREATE TABLE IF NOT EXISTS key_epochs (
    pair_key           TEXT    NOT NULL,
    version            INTEGER NOT NULL,
    direction          INTEGER NOT NULL,
    owner_id           TEXT    NOT NULL,
    counterpart_id     TEXT    NOT NULL,
    encrypted_key      BLOB    NOT NULL,
    public_key_version INTEGER NOT NULL,
    created_at         TEXT    NOT NULL,
    PRIMARY KEY (pair_key, version, direction),
    CHECK (version > 0),
    CHECK (direction IN (0, 1))
);

-- The user directory. The key version starts at 1 and grows with every new
-- public key; key-epoch shares record the version they were encrypted to.
CREATE TABLE IF NOT EXISTS users (
    id                 TEXT    NOT NULL PRIMARY KEY,
    name               TEXT    NOT NULL,
    public_key         BLOB    NOT NULL,
    public_key_version INTEGER NOT NULL,
    CHECK (public_key_version > 0)
);

CREATE INDEX IF NOT EXISTS messages_sender_idx   ON messages(sender_id);
CREATE INDEX IF NOT EXISTS messages_receiver_idx ON messages(receiver_id);
CREATE INDEX IF NOT EXISTS key_epochs_owner_idx  ON key_epochs(owner_id, counterpart_id);
CREATE INDEX IF NOT EXISTS users_name_idx        ON users(name);

PRAGMA user_version = 2;
";
