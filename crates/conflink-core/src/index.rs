//! The subscription index: one aggregate holding every subscription in four
//! cross-referenced views, persisted as a single unit.
//!
//! | View | Shape |
//! |------|-------|
//! | `byChannelID` | channel → alias → [`Subscription`] |
//! | `byURLSpaceKey` | key(url, space key) → channel → user → events |
//! | `byURLPageID` | key(url, page id) → channel → user → events |
//! | `bySpaceID` | space id → space key |
//!
//! All views are updated together by [`SubscriptionIndex::add`] and
//! [`SubscriptionIndex::remove`], so a single write of the aggregate keeps them
//! consistent.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
  ConflictError, EventKind, Result,
  keys,
  subscription::{Slot, Subscription},
};

/// Subscribers of one URL-index slot: channel → user → subscribed events.
pub type SubscriberEvents = BTreeMap<String, BTreeMap<String, BTreeSet<EventKind>>>;

// ─── Per-channel view ────────────────────────────────────────────────────────

/// A channel's subscriptions keyed by alias as originally written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSubscriptions(BTreeMap<String, Subscription>);

impl ChannelSubscriptions {
  /// Look up an alias ignoring case. An exact match wins if present.
  pub fn get_insensitive(&self, alias: &str) -> Option<&Subscription> {
    self
      .stored_alias(alias)
      .and_then(|stored| self.0.get(stored))
  }

  /// The stored spelling of `alias`, matched ignoring case.
  fn stored_alias(&self, alias: &str) -> Option<&str> {
    if let Some((k, _)) = self.0.get_key_value(alias) {
      return Some(k.as_str());
    }
    let folded = alias.to_lowercase();
    self
      .0
      .keys()
      .find(|k| k.to_lowercase() == folded)
      .map(String::as_str)
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Iterate `(alias, subscription)` pairs in alias order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &Subscription)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v))
  }
}

impl IntoIterator for ChannelSubscriptions {
  type Item = (String, Subscription);
  type IntoIter = std::collections::btree_map::IntoIter<String, Subscription>;

  fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

// ─── Index ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionIndex {
  #[serde(rename = "byChannelID", default)]
  by_channel_id:    BTreeMap<String, ChannelSubscriptions>,
  #[serde(rename = "byURLSpaceKey", default)]
  by_url_space_key: BTreeMap<String, SubscriberEvents>,
  #[serde(rename = "byURLPageID", default)]
  by_url_page_id:   BTreeMap<String, SubscriberEvents>,
  #[serde(rename = "bySpaceID", default)]
  by_space_id:      BTreeMap<String, String>,
}

impl SubscriptionIndex {
  pub fn new() -> Self { Self::default() }

  /// Decode a stored index. A missing or empty value is an empty index.
  pub fn from_bytes(bytes: Option<&[u8]>) -> serde_json::Result<Self> {
    match bytes {
      Some(b) if !b.is_empty() => serde_json::from_slice(b),
      _ => Ok(Self::default()),
    }
  }

  pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(self)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub fn channel(&self, channel_id: &str) -> Option<&ChannelSubscriptions> {
    self.by_channel_id.get(channel_id)
  }

  /// Find a subscription by channel and alias, ignoring alias case.
  pub fn find(&self, channel_id: &str, alias: &str) -> Option<&Subscription> {
    self.channel(channel_id)?.get_insensitive(alias)
  }

  pub fn subscribers_for_space(
    &self,
    base_url: &str,
    space_key: &str,
  ) -> Option<&SubscriberEvents> {
    let key = keys::url_space_key(base_url, space_key)?;
    self.by_url_space_key.get(&key)
  }

  pub fn subscribers_for_page(
    &self,
    base_url: &str,
    page_id: &str,
  ) -> Option<&SubscriberEvents> {
    let key = keys::url_page_id(base_url, page_id)?;
    self.by_url_page_id.get(&key)
  }

  /// Resolve a space id recorded by an earlier space subscription.
  pub fn space_key_for(&self, space_id: &str) -> Option<&str> {
    self.by_space_id.get(space_id).map(String::as_str)
  }

  /// Every stored subscription, grouped by channel.
  pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
    self.by_channel_id.values().flat_map(|c| c.0.values())
  }

  pub fn len(&self) -> usize { self.by_channel_id.values().map(ChannelSubscriptions::len).sum() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  // ── Validation ────────────────────────────────────────────────────────────

  /// Check that `sub` is structurally valid and that neither its alias nor its
  /// URL slot is taken in its channel. Structural problems are reported before
  /// conflicts.
  pub fn validate(&self, sub: &Subscription) -> Result<()> {
    sub.is_valid()?;

    if let Some(existing) = self.find(sub.channel_id(), sub.alias()) {
      return Err(
        ConflictError::AliasExists { alias: existing.alias().to_owned() }.into(),
      );
    }

    let occupied = match sub.slot() {
      Some(Slot::Space(key)) => self.by_url_space_key.get(&key),
      Some(Slot::Page(key)) => self.by_url_page_id.get(&key),
      None => None,
    }
    .is_some_and(|channels| channels.contains_key(sub.channel_id()));

    if occupied {
      let base_url = sub.base_url().to_owned();
      let err = match sub {
        Subscription::Space(s) => ConflictError::SpaceKeyExists {
          base_url,
          space_key: s.space_key.clone(),
        },
        Subscription::Page(p) => ConflictError::PageIdExists {
          base_url,
          page_id: p.page_id.clone(),
        },
      };
      return Err(err.into());
    }

    Ok(())
  }

  // ── Mutations ─────────────────────────────────────────────────────────────

  /// Insert `sub` into every view, creating nested maps as needed. An existing
  /// entry for the same channel in the same URL slot is overwritten.
  pub fn add(&mut self, sub: Subscription) {
    if let Some(slot) = sub.slot() {
      let user_events = BTreeMap::from([(
        sub.user_id().to_owned(),
        sub.indexed_events(),
      )]);
      let view = match slot {
        Slot::Space(key) => self.by_url_space_key.entry(key),
        Slot::Page(key) => self.by_url_page_id.entry(key),
      };
      view
        .or_default()
        .insert(sub.channel_id().to_owned(), user_events);
    }

    if let Subscription::Space(s) = &sub
      && let Some(space_id) = s.space_id.as_ref().filter(|id| !id.is_empty())
    {
      self.by_space_id.insert(space_id.clone(), s.space_key.clone());
    }

    self
      .by_channel_id
      .entry(sub.channel_id().to_owned())
      .or_default()
      .0
      .insert(sub.alias().to_owned(), sub);
  }

  /// Remove the subscription stored under `sub`'s channel and alias (ignoring
  /// case), together with its URL-index entry. Returns the stored value.
  ///
  /// `sub` must carry the alias and URL slot of the stored subscription; the
  /// URL-index entry removed is the one `sub` points at.
  pub fn remove(&mut self, sub: &Subscription) -> Option<Subscription> {
    let removed = self.remove_alias(sub.channel_id(), sub.alias());
    if let Some(slot) = sub.slot() {
      self.remove_slot(&slot, sub.channel_id());
    }
    removed
  }

  /// Remove by channel and alias alone, using the stored subscription to find
  /// its URL-index entry.
  pub fn remove_by_alias(
    &mut self,
    channel_id: &str,
    alias: &str,
  ) -> Option<Subscription> {
    let stored = self.find(channel_id, alias)?.clone();
    self.remove(&stored)
  }

  /// Replace `old` with `new`: remove then add. Moving to a different URL slot
  /// or alias relocates the index entries.
  pub fn edit(&mut self, old: &Subscription, new: Subscription) {
    self.remove(old);
    self.add(new);
  }

  fn remove_alias(
    &mut self,
    channel_id: &str,
    alias: &str,
  ) -> Option<Subscription> {
    let channel = self.by_channel_id.get_mut(channel_id)?;
    let stored = channel.stored_alias(alias)?.to_owned();
    let removed = channel.0.remove(&stored);
    if channel.is_empty() {
      self.by_channel_id.remove(channel_id);
    }
    removed
  }

  fn remove_slot(&mut self, slot: &Slot, channel_id: &str) {
    let (view, key) = match slot {
      Slot::Space(key) => (&mut self.by_url_space_key, key),
      Slot::Page(key) => (&mut self.by_url_page_id, key),
    };
    if let Some(channels) = view.get_mut(key) {
      channels.remove(channel_id);
      if channels.is_empty() {
        view.remove(key);
      }
    }
  }
}
