//! Handlers for `/events/*`: resolve an inbound Confluence event to its
//! recipients. Delivery is left to the caller.
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `POST` | `/events/channels` | `{"channelIDs": [...]}` |
//! | `POST` | `/events/pages/channels` | `{"channelIDs": [...]}` |
//! | `POST` | `/events/users` | `{"userIDs": [...]}` |
//! | `GET`  | `/events/kinds` | `{"kinds": [...]}` |
//!
//! `/events/pages/channels` is for webhooks that identify only a page: the
//! body's `spaceKey` is ignored and only page subscriptions are consulted.

use std::collections::BTreeSet;

use axum::{Json, extract::State};
use conflink_core::{ConfluenceEvent, EventKind, KvStore, PageRef};
use serde::Serialize;
use strum::IntoEnumIterator as _;

use crate::{ApiState, auth::WebhookAuthorized, error::ApiError};

#[derive(Debug, Serialize)]
pub struct ChannelsResponse {
  #[serde(rename = "channelIDs")]
  pub channel_ids: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
  #[serde(rename = "userIDs")]
  pub user_ids: BTreeSet<String>,
}

/// `POST /events/channels`
pub async fn channels<S: KvStore + 'static>(
  State(state): State<ApiState<S>>,
  _auth: WebhookAuthorized,
  Json(event): Json<ConfluenceEvent>,
) -> Result<Json<ChannelsResponse>, ApiError> {
  let channel_ids = state.router.channels_for(&event).await?;
  Ok(Json(ChannelsResponse { channel_ids }))
}

/// `POST /events/pages/channels`
pub async fn page_channels<S: KvStore + 'static>(
  State(state): State<ApiState<S>>,
  _auth: WebhookAuthorized,
  Json(event): Json<ConfluenceEvent>,
) -> Result<Json<ChannelsResponse>, ApiError> {
  let channel_ids = match &event.page {
    PageRef::Page(id) => {
      state
        .router
        .channels_for_page(&event.base_url, id, &event.event_type)
        .await?
    }
    PageRef::NoPage => BTreeSet::new(),
  };
  Ok(Json(ChannelsResponse { channel_ids }))
}

/// `POST /events/users`
pub async fn users<S: KvStore + 'static>(
  State(state): State<ApiState<S>>,
  _auth: WebhookAuthorized,
  Json(event): Json<ConfluenceEvent>,
) -> Result<Json<UsersResponse>, ApiError> {
  let user_ids = state.router.user_ids_for(&event).await?;
  Ok(Json(UsersResponse { user_ids }))
}

// ─── Kinds ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct KindEntry {
  #[serde(rename = "eventType")]
  pub event_type:   EventKind,
  #[serde(rename = "displayName")]
  pub display_name: &'static str,
  /// Only space subscriptions may select it.
  #[serde(rename = "spaceOnly")]
  pub space_only:   bool,
}

#[derive(Debug, Serialize)]
pub struct KindsResponse {
  pub kinds: Vec<KindEntry>,
}

/// `GET /events/kinds`: the selectable event kinds with their labels.
pub async fn kinds() -> Json<KindsResponse> {
  let kinds = EventKind::iter()
    .map(|kind| KindEntry {
      event_type:   kind,
      display_name: kind.display_name(),
      space_only:   kind.is_space_only(),
    })
    .collect();
  Json(KindsResponse { kinds })
}
