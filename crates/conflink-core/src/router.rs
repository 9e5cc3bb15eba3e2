//! Routing inbound Confluence events to the channels (or users) that asked for
//! them.
//!
//! The router only reads. Each call loads one snapshot of the index, looks the
//! event up in both URL views, keeps subscribers whose event set contains the
//! event's kind and returns the union as a set. Webhooks that identify only a
//! page go through [`NotificationRouter::channels_for_page`], which consults
//! the page view alone.

use std::{
  collections::{BTreeSet, HashSet},
  fmt,
  sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
  EventKind, Result,
  index::{SubscriberEvents, SubscriptionIndex},
  service::SubscriptionService,
  store::KvStore,
};

/// Wire value of the page id for events that are not about a page.
pub const NO_PAGE: &str = "-1";

// ─── Event ───────────────────────────────────────────────────────────────────

/// The page an event concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PageRef {
  /// A page id. Empty means the id was missing from the event.
  Page(String),
  /// The event is space-wide (for example `space_updated`).
  NoPage,
}

impl PageRef {
  /// The page id to look up, or `None` when the event has no page or the id
  /// is missing.
  pub fn id(&self) -> Option<&str> {
    match self {
      Self::Page(id) if !id.is_empty() => Some(id),
      _ => None,
    }
  }

  fn is_missing(&self) -> bool {
    matches!(self, Self::Page(id) if id.is_empty())
  }
}

impl Default for PageRef {
  fn default() -> Self { Self::Page(String::new()) }
}

impl From<String> for PageRef {
  fn from(s: String) -> Self {
    if s == NO_PAGE { Self::NoPage } else { Self::Page(s) }
  }
}

impl From<PageRef> for String {
  fn from(page: PageRef) -> Self {
    match page {
      PageRef::Page(id) => id,
      PageRef::NoPage => NO_PAGE.to_owned(),
    }
  }
}

/// What the router needs to know about an inbound webhook event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfluenceEvent {
  #[serde(rename = "baseURL", default)]
  pub base_url:   String,
  #[serde(rename = "spaceKey", default)]
  pub space_key:  String,
  #[serde(rename = "pageID", default)]
  pub page:       PageRef,
  /// Kept as text so that kinds outside [`EventKind`] route to nobody instead
  /// of failing to decode.
  #[serde(rename = "eventType", default)]
  pub event_type: String,
}

impl ConfluenceEvent {
  pub fn new(
    base_url: impl Into<String>,
    space_key: impl Into<String>,
    page: PageRef,
    event_type: impl Into<String>,
  ) -> Self {
    Self {
      base_url: base_url.into(),
      space_key: space_key.into(),
      page,
      event_type: event_type.into(),
    }
  }
}

impl fmt::Display for ConfluenceEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}/{}", self.event_type, self.base_url, self.space_key)?;
    match &self.page {
      PageRef::Page(id) => write!(f, "/{id}"),
      PageRef::NoPage => Ok(()),
    }
  }
}

// ─── Templates ───────────────────────────────────────────────────────────────

/// Whether a notification can be rendered for an event kind. Events without
/// one are not routed.
pub trait NotificationTemplates: Send + Sync {
  fn has_template(&self, kind: EventKind) -> bool;
}

/// Every known kind has a template.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllTemplates;

impl NotificationTemplates for AllTemplates {
  fn has_template(&self, _kind: EventKind) -> bool { true }
}

impl NotificationTemplates for BTreeSet<EventKind> {
  fn has_template(&self, kind: EventKind) -> bool { self.contains(&kind) }
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub struct NotificationRouter<S, T = AllTemplates> {
  service:   Arc<SubscriptionService<S>>,
  templates: T,
}

impl<S: KvStore> NotificationRouter<S> {
  pub fn new(service: Arc<SubscriptionService<S>>) -> Self {
    Self { service, templates: AllTemplates }
  }
}

impl<S: KvStore, T: NotificationTemplates> NotificationRouter<S, T> {
  pub fn with_templates<U: NotificationTemplates>(
    self,
    templates: U,
  ) -> NotificationRouter<S, U> {
    NotificationRouter { service: self.service, templates }
  }

  /// Channels that should receive `event`, each at most once.
  pub async fn channels_for(
    &self,
    event: &ConfluenceEvent,
  ) -> Result<BTreeSet<String>> {
    let channels: BTreeSet<_> = self
      .matches(event)
      .await?
      .into_iter()
      .map(|(channel, _)| channel)
      .collect();
    tracing::debug!(%event, count = channels.len(), "routed to channels");
    Ok(channels)
  }

  /// Users whose subscriptions match `event`, each at most once. Subscriptions
  /// with no recorded owner contribute nothing.
  pub async fn user_ids_for(
    &self,
    event: &ConfluenceEvent,
  ) -> Result<BTreeSet<String>> {
    let users: BTreeSet<_> = self
      .matches(event)
      .await?
      .into_iter()
      .filter_map(|(_, user)| (!user.is_empty()).then_some(user))
      .collect();
    tracing::debug!(%event, count = users.len(), "routed to users");
    Ok(users)
  }

  /// Channels subscribed to `page_id` for `event_type`, from the page view
  /// only. Used for webhooks that carry a page id but no space key.
  pub async fn channels_for_page(
    &self,
    base_url: &str,
    page_id: &str,
    event_type: &str,
  ) -> Result<BTreeSet<String>> {
    if base_url.is_empty() || page_id.is_empty() || page_id == NO_PAGE {
      return Ok(BTreeSet::new());
    }
    let Some(kind) = self.templated_kind(event_type) else {
      return Ok(BTreeSet::new());
    };
    let index = self.service.load().await?;
    let channels: BTreeSet<_> = index
      .subscribers_for_page(base_url, page_id)
      .into_iter()
      .flat_map(|subscribers| filter_by_event(subscribers, kind))
      .map(|(channel, _)| channel)
      .collect();
    tracing::debug!(
      base_url,
      page_id,
      event_type,
      count = channels.len(),
      "routed page event to channels"
    );
    Ok(channels)
  }

  /// `(channel, user)` pairs subscribed to `event`, from one index snapshot.
  async fn matches(
    &self,
    event: &ConfluenceEvent,
  ) -> Result<HashSet<(String, String)>> {
    let Some(kind) = self.routable_kind(event) else {
      return Ok(HashSet::new());
    };
    let index = self.service.load().await?;
    Ok(subscribers_for(&index, event, kind))
  }

  fn routable_kind(&self, event: &ConfluenceEvent) -> Option<EventKind> {
    if event.base_url.is_empty()
      || event.space_key.is_empty()
      || event.page.is_missing()
    {
      return None;
    }
    self.templated_kind(&event.event_type)
  }

  fn templated_kind(&self, event_type: &str) -> Option<EventKind> {
    EventKind::parse(event_type).filter(|kind| self.templates.has_template(*kind))
  }
}

/// Subscribers of `event` in `index` whose event set contains `kind`, across
/// the space view and (if the event names a page) the page view.
pub fn subscribers_for(
  index: &SubscriptionIndex,
  event: &ConfluenceEvent,
  kind: EventKind,
) -> HashSet<(String, String)> {
  let by_space = index.subscribers_for_space(&event.base_url, &event.space_key);
  let by_page = event
    .page
    .id()
    .and_then(|id| index.subscribers_for_page(&event.base_url, id));

  [by_space, by_page]
    .into_iter()
    .flatten()
    .flat_map(|subscribers| filter_by_event(subscribers, kind))
    .collect()
}

fn filter_by_event(
  subscribers: &SubscriberEvents,
  kind: EventKind,
) -> impl Iterator<Item = (String, String)> + '_ {
  subscribers.iter().flat_map(move |(channel, users)| {
    users
      .iter()
      .filter(move |(_, events)| events.contains(&kind))
      .map(move |(user, _)| (channel.clone(), user.clone()))
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{Subscription, memory::MemoryStore, subscription::SubscriptionBase};

  const URL: &str = "https://c.example.com";

  type Service = Arc<SubscriptionService<MemoryStore>>;

  fn setup() -> (Service, NotificationRouter<MemoryStore>) {
    let service = Arc::new(SubscriptionService::new(MemoryStore::new()));
    let router = NotificationRouter::new(service.clone());
    (service, router)
  }

  fn space(alias: &str, channel: &str, key: &str, events: &[EventKind]) -> Subscription {
    Subscription::space(
      SubscriptionBase::new(alias, URL, channel, events.iter().copied()),
      key,
    )
  }

  fn page(alias: &str, channel: &str, id: &str, events: &[EventKind]) -> Subscription {
    Subscription::page(
      SubscriptionBase::new(alias, URL, channel, events.iter().copied()),
      id,
    )
  }

  fn event(kind: EventKind, page: PageRef) -> ConfluenceEvent {
    ConfluenceEvent::new(URL, "ENG", page, kind.to_string())
  }

  fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  #[tokio::test]
  async fn space_and_page_match_notify_once() {
    let (service, router) = setup();
    service
      .save(space("s", "CH1", "ENG", &[EventKind::PageUpdated]))
      .await
      .unwrap();
    service
      .save(page("p", "CH1", "42", &[EventKind::PageUpdated]))
      .await
      .unwrap();

    let channels = router
      .channels_for(&event(EventKind::PageUpdated, PageRef::Page("42".into())))
      .await
      .unwrap();
    assert_eq!(channels, set(&["CH1"]));
  }

  #[tokio::test]
  async fn channels_without_the_event_are_filtered_out() {
    let (service, router) = setup();
    service
      .save(space("a", "CH1", "ENG", &[EventKind::CommentCreated]))
      .await
      .unwrap();
    service
      .save(space("b", "CH2", "ENG", &[EventKind::PageCreated]))
      .await
      .unwrap();
    service
      .save(page("c", "CH3", "42", &[EventKind::CommentCreated]))
      .await
      .unwrap();

    let page_42 = PageRef::Page("42".into());
    assert_eq!(
      router
        .channels_for(&event(EventKind::CommentCreated, page_42.clone()))
        .await
        .unwrap(),
      set(&["CH1", "CH3"])
    );
    assert_eq!(
      router
        .channels_for(&event(EventKind::PageCreated, page_42))
        .await
        .unwrap(),
      set(&["CH2"])
    );
  }

  #[tokio::test]
  async fn space_update_reaches_space_subscribers_only() {
    let (service, router) = setup();
    service
      .save(space("s", "CH1", "ENG", &[EventKind::PageCreated]))
      .await
      .unwrap();
    service
      .save(page("p", "CH2", "42", &[EventKind::PageCreated]))
      .await
      .unwrap();

    let channels = router
      .channels_for(&event(EventKind::SpaceUpdated, PageRef::NoPage))
      .await
      .unwrap();
    assert_eq!(channels, set(&["CH1"]));
  }

  #[tokio::test]
  async fn incomplete_or_unknown_events_route_nowhere() {
    let (service, router) = setup();
    service
      .save(space("s", "CH1", "ENG", &[EventKind::PageCreated]))
      .await
      .unwrap();

    let mut missing_page = event(EventKind::PageCreated, PageRef::Page(String::new()));
    assert!(router.channels_for(&missing_page).await.unwrap().is_empty());

    missing_page.page = PageRef::Page("1".into());
    missing_page.space_key.clear();
    assert!(router.channels_for(&missing_page).await.unwrap().is_empty());

    let unknown = ConfluenceEvent::new(URL, "ENG", PageRef::NoPage, "page_moved");
    assert!(router.channels_for(&unknown).await.unwrap().is_empty());

    let bad_url = ConfluenceEvent::new("nope", "ENG", PageRef::NoPage, "page_created");
    assert!(router.channels_for(&bad_url).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn kinds_without_templates_are_not_routed() {
    let (service, router) = setup();
    service
      .save(space("s", "CH1", "ENG", &[EventKind::PageCreated, EventKind::PageRemoved]))
      .await
      .unwrap();
    let router = router.with_templates(BTreeSet::from([EventKind::PageCreated]));

    let removed = event(EventKind::PageRemoved, PageRef::Page("1".into()));
    assert!(router.channels_for(&removed).await.unwrap().is_empty());
    let created = event(EventKind::PageCreated, PageRef::Page("1".into()));
    assert_eq!(router.channels_for(&created).await.unwrap(), set(&["CH1"]));
  }

  #[tokio::test]
  async fn user_ids_are_deduplicated_and_skip_unknown_owners() {
    let (service, router) = setup();
    let kinds = [EventKind::CommentUpdated];
    service.save(space("a", "CH1", "ENG", &kinds).with_user_id("u1")).await.unwrap();
    service.save(page("b", "CH2", "42", &kinds).with_user_id("u1")).await.unwrap();
    service.save(page("c", "CH3", "42", &kinds).with_user_id("u2")).await.unwrap();
    service.save(page("d", "CH4", "42", &kinds)).await.unwrap();

    let ev = event(EventKind::CommentUpdated, PageRef::Page("42".into()));
    assert_eq!(router.user_ids_for(&ev).await.unwrap(), set(&["u1", "u2"]));
    assert_eq!(
      router.channels_for(&ev).await.unwrap(),
      set(&["CH1", "CH2", "CH3", "CH4"])
    );
  }

  #[tokio::test]
  async fn deleted_subscription_stops_routing() {
    let (service, router) = setup();
    service
      .save(space("s", "CH1", "ENG", &[EventKind::PageTrashed]))
      .await
      .unwrap();
    service.delete("CH1", "s").await.unwrap();

    let ev = event(EventKind::PageTrashed, PageRef::Page("9".into()));
    assert!(router.channels_for(&ev).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn page_only_events_use_the_page_view_alone() {
    let (service, router) = setup();
    service
      .save(page("p", "CH1", "42", &[EventKind::PageUpdated]))
      .await
      .unwrap();
    service
      .save(space("s", "CH2", "ENG", &[EventKind::PageUpdated]))
      .await
      .unwrap();

    let channels = router
      .channels_for_page(URL, "42", "page_updated")
      .await
      .unwrap();
    assert_eq!(channels, set(&["CH1"]));

    // The same event with its space key left out routes nowhere through the
    // combined lookup.
    let no_space = ConfluenceEvent::new(URL, "", PageRef::Page("42".into()), "page_updated");
    assert!(router.channels_for(&no_space).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn page_only_lookup_filters_like_the_combined_one() {
    let (service, router) = setup();
    service
      .save(page("p", "CH1", "42", &[EventKind::CommentCreated]))
      .await
      .unwrap();

    for (page_id, event_type) in [
      ("42", "page_updated"),
      ("42", "page_moved"),
      ("7", "comment_created"),
      ("", "comment_created"),
      (NO_PAGE, "comment_created"),
    ] {
      let channels = router
        .channels_for_page(URL, page_id, event_type)
        .await
        .unwrap();
      assert!(channels.is_empty(), "{page_id}/{event_type} routed to {channels:?}");
    }
    assert!(router.channels_for_page("", "42", "comment_created").await.unwrap().is_empty());

    let router = router.with_templates(BTreeSet::from([EventKind::PageCreated]));
    assert!(router.channels_for_page(URL, "42", "comment_created").await.unwrap().is_empty());
  }

  #[test]
  fn page_sentinel_decodes_to_no_page() {
    let ev: ConfluenceEvent = serde_json::from_value(json!({
      "baseURL": URL,
      "spaceKey": "ENG",
      "pageID": "-1",
      "eventType": "space_updated",
    }))
    .unwrap();
    assert_eq!(ev.page, PageRef::NoPage);
    assert_eq!(serde_json::to_value(&ev).unwrap()["pageID"], "-1");

    let ev: ConfluenceEvent = serde_json::from_value(json!({ "baseURL": URL })).unwrap();
    assert_eq!(ev.page.id(), None);
    assert!(ev.page.is_missing());
  }
}
