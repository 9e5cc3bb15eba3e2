//! Subscription entities: a channel's interest in a Confluence space or page.
//!
//! The two variants share [`SubscriptionBase`] and are told apart on the wire
//! by the `subscriptionType` discriminator (`space_subscription` |
//! `page_subscription`).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{EventKind, ValidationError, keys};

// ─── Shared fields ───────────────────────────────────────────────────────────

/// Fields common to every subscription.
///
/// String fields default to empty when absent so that [`Subscription::is_valid`]
/// reports the missing value instead of a decoding error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionBase {
  /// User-chosen name, unique within the channel ignoring case.
  #[serde(default)]
  pub alias:      String,
  #[serde(rename = "baseURL", default)]
  pub base_url:   String,
  #[serde(rename = "channelID", default)]
  pub channel_id: String,
  #[serde(default)]
  pub events:     BTreeSet<EventKind>,
  /// The chat user who created (or last edited) the subscription. Empty when
  /// unknown.
  #[serde(rename = "userID", default)]
  pub user_id:    String,
}

impl SubscriptionBase {
  pub fn new(
    alias: impl Into<String>,
    base_url: impl Into<String>,
    channel_id: impl Into<String>,
    events: impl IntoIterator<Item = EventKind>,
  ) -> Self {
    Self {
      alias:      alias.into(),
      base_url:   base_url.into(),
      channel_id: channel_id.into(),
      events:     events.into_iter().collect(),
      user_id:    String::new(),
    }
  }

  fn check(&self) -> Result<(), ValidationError> {
    if self.alias.trim().is_empty() {
      return Err(ValidationError::EmptyAlias);
    }
    if self.base_url.trim().is_empty() {
      return Err(ValidationError::EmptyBaseUrl);
    }
    keys::parse_base_url(&self.base_url)?;
    Ok(())
  }
}

// ─── Variants ────────────────────────────────────────────────────────────────

/// Interest in every event within a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSubscription {
  #[serde(flatten)]
  pub base:      SubscriptionBase,
  #[serde(rename = "spaceKey", default)]
  pub space_key: String,
  /// Numeric space id, filled in once resolved against the instance.
  #[serde(rename = "spaceID", default, skip_serializing_if = "Option::is_none")]
  pub space_id:  Option<String>,
}

/// Interest in the events of a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSubscription {
  #[serde(flatten)]
  pub base:    SubscriptionBase,
  #[serde(rename = "pageID", default)]
  pub page_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subscriptionType")]
pub enum Subscription {
  #[serde(rename = "space_subscription")]
  Space(SpaceSubscription),
  #[serde(rename = "page_subscription")]
  Page(PageSubscription),
}

/// Which URL index a subscription occupies, and under which key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
  Space(String),
  Page(String),
}

impl Subscription {
  pub fn space(base: SubscriptionBase, space_key: impl Into<String>) -> Self {
    Self::Space(SpaceSubscription {
      base,
      space_key: space_key.into(),
      space_id: None,
    })
  }

  pub fn page(base: SubscriptionBase, page_id: impl Into<String>) -> Self {
    Self::Page(PageSubscription { base, page_id: page_id.into() })
  }

  pub fn base(&self) -> &SubscriptionBase {
    match self {
      Self::Space(s) => &s.base,
      Self::Page(p) => &p.base,
    }
  }

  fn base_mut(&mut self) -> &mut SubscriptionBase {
    match self {
      Self::Space(s) => &mut s.base,
      Self::Page(p) => &mut p.base,
    }
  }

  pub fn alias(&self) -> &str { &self.base().alias }

  pub fn channel_id(&self) -> &str { &self.base().channel_id }

  pub fn base_url(&self) -> &str { &self.base().base_url }

  pub fn user_id(&self) -> &str { &self.base().user_id }

  /// The discriminator string written to `subscriptionType`.
  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Space(_) => "space_subscription",
      Self::Page(_) => "page_subscription",
    }
  }

  /// Stamp the owning user onto the subscription.
  pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
    self.base_mut().user_id = user_id.into();
    self
  }

  pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
    self.base_mut().channel_id = channel_id.into();
    self
  }

  /// Record the resolved space id. No-op for page subscriptions.
  pub fn with_space_id(mut self, space_id: impl Into<String>) -> Self {
    if let Self::Space(s) = &mut self {
      s.space_id = Some(space_id.into());
    }
    self
  }

  /// Events as written to the URL index. Space subscriptions always receive
  /// `space_updated` in addition to their selected events.
  pub fn indexed_events(&self) -> BTreeSet<EventKind> {
    let mut events = self.base().events.clone();
    if matches!(self, Self::Space(_)) {
      events.insert(EventKind::SpaceUpdated);
    }
    events
  }

  /// Structural validation. Returns the first violated rule.
  pub fn is_valid(&self) -> Result<(), ValidationError> {
    self.base().check()?;
    match self {
      Self::Space(s) if s.space_key.trim().is_empty() => {
        return Err(ValidationError::EmptySpaceKey);
      }
      Self::Page(p) if p.page_id.trim().is_empty() => {
        return Err(ValidationError::EmptyPageId);
      }
      _ => {}
    }
    if self.channel_id().trim().is_empty() {
      return Err(ValidationError::EmptyChannelId);
    }
    if let Self::Page(p) = self
      && let Some(kind) = p
        .base
        .events
        .iter()
        .find(|k| k.is_space_only())
    {
      return Err(ValidationError::SpaceOnlyEvent(*kind));
    }
    Ok(())
  }

  /// The URL-index slot this subscription occupies. `None` when the base URL
  /// does not parse, which [`Self::is_valid`] rules out for stored entries.
  pub(crate) fn slot(&self) -> Option<Slot> {
    match self {
      Self::Space(s) => {
        keys::url_space_key(&s.base.base_url, &s.space_key).map(Slot::Space)
      }
      Self::Page(p) => {
        keys::url_page_id(&p.base.base_url, &p.page_id).map(Slot::Page)
      }
    }
  }
}
