//! JSON shapes exchanged with clients.
//!
//! Ciphertext fields travel as standard base64 strings.

use chrono::{DateTime, Utc};
use hush_core::{
  event::Notification,
  identity::Identity,
  message::{IdRange, Message, OwnedKey},
  user::{User, UserChange, UserQuery, UserUpdate},
};
use serde::{Deserialize, Serialize};

/// `#[serde(with = "b64")]` for byte fields.
pub mod b64 {
  use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(bytes: impl AsRef<[u8]>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&B64.encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let text = String::deserialize(deserializer)?;
    B64.decode(text).map_err(D::Error::custom)
  }

  /// `#[serde(default, deserialize_with = "b64::optional")]` for optional
  /// byte fields in requests.
  pub fn optional<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
    Option::<String>::deserialize(deserializer)?
      .map(|text| B64.decode(text).map_err(D::Error::custom))
      .transpose()
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// `?min=&max=` on range reads; both bounds inclusive and optional.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
  pub min: Option<u32>,
  pub max: Option<u32>,
}

impl From<RangeParams> for IdRange {
  fn from(p: RangeParams) -> Self { IdRange::new(p.min, p.max) }
}

/// `?name=&limit=&offset=` on `GET /users`.
#[derive(Debug, Default, Deserialize)]
pub struct UserSearchParams {
  pub name:   Option<String>,
  pub limit:  Option<u32>,
  pub offset: Option<u32>,
}

impl From<UserSearchParams> for UserQuery {
  fn from(p: UserSearchParams) -> Self {
    let defaults = UserQuery::default();
    Self {
      name_part: p.name.filter(|n| !n.is_empty()),
      limit:     p.limit.unwrap_or(defaults.limit),
      offset:    p.offset.unwrap_or(defaults.offset),
    }
  }
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// Body of `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct SendBody {
  pub target_id:              Identity,
  #[serde(with = "b64")]
  pub encrypted_content_type: Vec<u8>,
  #[serde(with = "b64")]
  pub encrypted_body:         Vec<u8>,
  pub key_version:            u32,
}

/// Body of `PATCH /messages/{target}/{id}`.
#[derive(Debug, Deserialize)]
pub struct EditBody {
  #[serde(with = "b64")]
  pub encrypted_body: Vec<u8>,
  pub key_version:    u32,
}

/// Body of `POST /keys`: the new shared secret, encrypted once for each side.
#[derive(Debug, Deserialize)]
pub struct RotateBody {
  pub target_id:                 Identity,
  #[serde(with = "b64")]
  pub own_key:                   Vec<u8>,
  pub own_public_key_version:    u32,
  #[serde(with = "b64")]
  pub target_key:                Vec<u8>,
  pub target_public_key_version: u32,
}

/// Body of `PUT /users`. Omitted fields keep their current value; a new
/// user needs both.
#[derive(Debug, Deserialize)]
pub struct ProfileBody {
  #[serde(default)]
  pub name:       Option<String>,
  #[serde(default, deserialize_with = "b64::optional")]
  pub public_key: Option<Vec<u8>>,
}

impl From<ProfileBody> for UserUpdate {
  fn from(b: ProfileBody) -> Self { Self { name: b.name, public_key: b.public_key } }
}

// ─── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MessageBody {
  pub message_id:             u32,
  pub sender_id:              Identity,
  pub receiver_id:            Identity,
  #[serde(with = "b64")]
  pub encrypted_content_type: Vec<u8>,
  #[serde(with = "b64")]
  pub encrypted_body:         Vec<u8>,
  pub created_at:             DateTime<Utc>,
  pub edited_at:              Option<DateTime<Utc>>,
  pub key_version:            u32,
  pub deleted:                bool,
}

impl From<Message> for MessageBody {
  fn from(m: Message) -> Self {
    Self {
      message_id:             m.message_id,
      sender_id:              m.sender,
      receiver_id:            m.receiver,
      encrypted_content_type: m.encrypted_content_type,
      encrypted_body:         m.encrypted_body,
      created_at:             m.created_at,
      edited_at:              m.edited_at,
      key_version:            m.key_version,
      deleted:                m.deleted,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct KeyBody {
  pub owner_id:           Identity,
  pub counterpart_id:     Identity,
  pub version:            u32,
  #[serde(with = "b64")]
  pub encrypted_key:      Vec<u8>,
  pub public_key_version: u32,
  pub created_at:         DateTime<Utc>,
}

impl From<OwnedKey> for KeyBody {
  fn from(k: OwnedKey) -> Self {
    Self {
      owner_id:           k.owner,
      counterpart_id:     k.counterpart,
      version:            k.version,
      encrypted_key:      k.encrypted_key,
      public_key_version: k.public_key_version,
      created_at:         k.created_at,
    }
  }
}

/// Response of `POST /keys`.
#[derive(Debug, Serialize)]
pub struct VersionBody {
  pub version: u32,
}

#[derive(Debug, Serialize)]
pub struct UserBody {
  pub id:                 Identity,
  pub name:               String,
  #[serde(with = "b64")]
  pub public_key:         Vec<u8>,
  pub public_key_version: u32,
}

impl From<User> for UserBody {
  fn from(u: User) -> Self {
    Self {
      id:                 u.id,
      name:               u.name,
      public_key:         u.public_key,
      public_key_version: u.public_key_version,
    }
  }
}

/// Response of `PUT /users` and payload of one `/users/events` item.
#[derive(Debug, Serialize)]
pub struct UserChangeBody {
  #[serde(flatten)]
  pub user:    UserBody,
  /// Fields the write supplied: `"name"`, `"public_key"`.
  pub fields:  Vec<String>,
  pub created: bool,
}

impl From<UserChange> for UserChangeBody {
  fn from(c: UserChange) -> Self {
    Self {
      user:    c.user.into(),
      fields:  c.fields.iter().map(ToString::to_string).collect(),
      created: c.created,
    }
  }
}

/// Payload of one `/events` item. Message events carry the full message;
/// key events only announce the new version, since each side fetches its
/// own share.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EventBody {
  Message {
    kind:    String,
    #[serde(flatten)]
    message: MessageBody,
  },
  Key {
    kind:        String,
    sender_id:   Identity,
    receiver_id: Identity,
    version:     u32,
    created_at:  DateTime<Utc>,
  },
}

impl From<&Notification> for EventBody {
  fn from(n: &Notification) -> Self {
    let kind = n.kind().to_string();
    match n {
      Notification::MessageCreated(m)
      | Notification::MessageEdited(m)
      | Notification::MessageDeleted(m) => Self::Message { kind, message: m.clone().into() },
      Notification::KeyEpochUpdated(epoch) => Self::Key {
        kind,
        sender_id: n.sender(),
        receiver_id: n.receiver(),
        version: epoch.version,
        created_at: epoch.created_at,
      },
    }
  }
}
