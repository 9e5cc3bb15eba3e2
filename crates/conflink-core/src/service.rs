//! [`SubscriptionService`]: save, edit, delete and look up subscriptions.
//!
//! Each operation reads the whole index from the injected [`KvStore`]; there is
//! no in-process cache. Mutations run inside [`atomic_modify`], and validation
//! happens inside the modify step, so a writer that loses a race is validated
//! again against the index it is about to overwrite.

use crate::{
  Error, Result,
  index::{ChannelSubscriptions, SubscriberEvents, SubscriptionIndex},
  keys,
  store::{KvStore, RetryPolicy, atomic_modify},
  subscription::Subscription,
};

/// Outcome of [`SubscriptionService::replace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replaced {
  pub previous: Subscription,
  /// The subscription as committed, with inherited fields filled in.
  pub current:  Subscription,
}

pub struct SubscriptionService<S> {
  store: S,
  retry: RetryPolicy,
  key:   String,
}

impl<S: KvStore> SubscriptionService<S> {
  /// A service over `store`, keeping the index under the standard key.
  pub fn new(store: S) -> Self {
    Self {
      store,
      retry: RetryPolicy::default(),
      key: keys::subscription_index_key(),
    }
  }

  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// Read a snapshot of the whole index.
  pub async fn load(&self) -> Result<SubscriptionIndex> {
    let stored = self
      .store
      .get(&self.key)
      .await
      .map_err(|e| Error::storage("read", &self.key, e))?;
    SubscriptionIndex::from_bytes(stored.as_ref().map(|v| v.value.as_slice()))
      .map_err(|e| Error::storage("decode", &self.key, e))
  }

  /// All subscriptions of a channel; empty if it has none.
  pub async fn get_by_channel_id(
    &self,
    channel_id: &str,
  ) -> Result<ChannelSubscriptions> {
    Ok(self.load().await?.channel(channel_id).cloned().unwrap_or_default())
  }

  pub async fn get_by_url_and_space_key(
    &self,
    base_url: &str,
    space_key: &str,
  ) -> Result<SubscriberEvents> {
    let index = self.load().await?;
    Ok(
      index
        .subscribers_for_space(base_url, space_key)
        .cloned()
        .unwrap_or_default(),
    )
  }

  pub async fn get_by_url_and_page_id(
    &self,
    base_url: &str,
    page_id: &str,
  ) -> Result<SubscriberEvents> {
    let index = self.load().await?;
    Ok(
      index
        .subscribers_for_page(base_url, page_id)
        .cloned()
        .unwrap_or_default(),
    )
  }

  /// Look up one subscription, ignoring alias case.
  pub async fn get_alias(
    &self,
    channel_id: &str,
    alias: &str,
  ) -> Result<Subscription> {
    self
      .load()
      .await?
      .find(channel_id, alias)
      .cloned()
      .ok_or_else(|| Error::not_found(channel_id, alias))
  }

  /// Resolve a space id recorded by a space subscription to its space key.
  pub async fn space_key_for_space_id(
    &self,
    space_id: &str,
  ) -> Result<Option<String>> {
    Ok(self.load().await?.space_key_for(space_id).map(str::to_owned))
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Store a new subscription.
  ///
  /// Fails with a validation error for malformed input, or a conflict if the
  /// alias or the URL slot is already taken in the channel.
  pub async fn save(&self, sub: Subscription) -> Result<()> {
    sub.is_valid()?;
    self
      .modify(|index| {
        index.validate(&sub)?;
        index.add(sub.clone());
        Ok(())
      })
      .await?;
    tracing::info!(
      channel_id = sub.channel_id(),
      alias = sub.alias(),
      kind = sub.type_name(),
      "subscription saved"
    );
    Ok(())
  }

  /// Replace the subscription stored under `sub`'s own channel and alias.
  pub async fn edit(&self, sub: Subscription) -> Result<Replaced> {
    let channel_id = sub.channel_id().to_owned();
    let alias = sub.alias().to_owned();
    self.replace(&channel_id, &alias, sub).await
  }

  /// Replace the subscription stored as `channel_id`/`alias` with `new`,
  /// which may carry a different alias, URL or target. Returns both the
  /// previous subscription and the one written in its place.
  ///
  /// `new` is validated against the index with the old entry removed, so
  /// keeping the alias or slot is allowed but taking another subscription's
  /// is a conflict. An empty `userID` on `new` keeps the previous owner.
  pub async fn replace(
    &self,
    channel_id: &str,
    alias: &str,
    new: Subscription,
  ) -> Result<Replaced> {
    new.is_valid()?;
    let replaced = self
      .modify(|index| {
        let previous = index
          .find(channel_id, alias)
          .cloned()
          .ok_or_else(|| Error::not_found(channel_id, alias))?;
        let current = inherit(&previous, new.clone());
        index.remove(&previous);
        index.validate(&current)?;
        index.add(current.clone());
        Ok(Replaced { previous, current })
      })
      .await?;
    tracing::info!(
      channel_id,
      alias,
      new_alias = replaced.current.alias(),
      "subscription edited"
    );
    Ok(replaced)
  }

  /// Delete a subscription by channel and alias (ignoring case), returning
  /// what was removed.
  pub async fn delete(
    &self,
    channel_id: &str,
    alias: &str,
  ) -> Result<Subscription> {
    let removed = self
      .modify(|index| {
        index
          .remove_by_alias(channel_id, alias)
          .ok_or_else(|| Error::not_found(channel_id, alias))
      })
      .await?;
    tracing::info!(channel_id, alias, "subscription deleted");
    Ok(removed)
  }

  /// Run `apply` against the freshly decoded index and store the result.
  async fn modify<T, F>(&self, mut apply: F) -> Result<T>
  where
    F: FnMut(&mut SubscriptionIndex) -> Result<T> + Send,
    T: Send,
  {
    let key = self.key.as_str();
    atomic_modify(&self.store, key, &self.retry, |bytes| {
      let mut index = SubscriptionIndex::from_bytes(bytes)
        .map_err(|e| Error::storage("decode", key, e))?;
      let output = apply(&mut index)?;
      let encoded = index
        .to_bytes()
        .map_err(|e| Error::storage("encode", key, e))?;
      Ok((encoded, output))
    })
    .await
  }
}

/// Carry over fields an edit request does not resend.
fn inherit(old: &Subscription, mut new: Subscription) -> Subscription {
  if new.user_id().is_empty() && !old.user_id().is_empty() {
    new = new.with_user_id(old.user_id());
  }
  if let (Subscription::Space(prev), Subscription::Space(next)) = (old, &mut new)
    && next.space_id.is_none()
    && prev.space_key == next.space_key
  {
    next.space_id = prev.space_id.clone();
  }
  new
}
