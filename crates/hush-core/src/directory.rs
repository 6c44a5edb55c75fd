//! The user-directory service: profile lookups, self-service updates, and a
//! live feed of committed changes.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
  Error, Result,
  identity::Identity,
  registry::SessionRegistry,
  session::Subscription,
  store::UserDirectory,
  user::{User, UserChange, UserQuery, UserUpdate},
};

/// Directory operations over a [`UserDirectory`], wired to its own
/// [`SessionRegistry`] for live change feeds.
#[derive(Debug)]
pub struct DirectoryService<S> {
  store:    Arc<S>,
  registry: Arc<SessionRegistry<UserChange>>,
}

impl<S: UserDirectory> DirectoryService<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, registry: Arc::new(SessionRegistry::new()) }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn registry(&self) -> &Arc<SessionRegistry<UserChange>> { &self.registry }

  /// Open a change feed. Every committed profile change is delivered to every
  /// open feed, whoever it belongs to.
  pub fn subscribe(&self, identity: Identity) -> Subscription<UserChange> {
    Subscription::open(Arc::clone(&self.registry), identity)
  }

  pub async fn users(&self, query: UserQuery) -> Result<Vec<User>> {
    self.store.get_users(query).await.map_err(Error::store)
  }

  pub async fn user(&self, id: Identity) -> Result<Option<User>> {
    self.store.get_user(id).await.map_err(Error::store)
  }

  /// Create or update `id`'s own profile. A new public key gets the next
  /// key version.
  pub async fn update_user(&self, id: Identity, update: UserUpdate) -> Result<UserChange> {
    if update.is_empty() {
      return Err(Error::InvalidProfile("nothing to update"));
    }
    if update.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
      return Err(Error::InvalidProfile("name must not be blank"));
    }
    if update.public_key.as_ref().is_some_and(Vec::is_empty) {
      return Err(Error::InvalidProfile("public key must not be empty"));
    }

    let registry = Arc::clone(&self.registry);
    let change = self
      .store
      .save_user(id, update, move |change: &UserChange| {
        let delivered = registry.publish(change);
        debug!(user = %change.user.id, delivered, "notified directory feeds");
      })
      .await
      .map_err(Error::store)?
      .map_err(|reason| Error::ProfileRejected { user: id, reason })?;

    if change.created {
      info!(user = %id, "user created");
    } else {
      info!(user = %id, version = change.user.public_key_version, "user updated");
    }
    Ok(change)
  }
}
