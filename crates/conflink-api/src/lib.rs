//! JSON REST API for conflink.
//!
//! Exposes an axum [`Router`] over a [`SubscriptionService`] and its
//! [`NotificationRouter`], backed by any [`KvStore`]. TLS and chat-side
//! authorisation are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", conflink_api::api_router(state))
//! ```

pub mod auth;
pub mod error;
pub mod events;
pub mod subscriptions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use conflink_core::{KvStore, NotificationRouter, SubscriptionService};

pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub service:        Arc<SubscriptionService<S>>,
  pub router:         Arc<NotificationRouter<S>>,
  /// When set, the webhook routes under `/events/` require a matching
  /// `?secret=` query parameter.
  pub webhook_secret: Option<Arc<str>>,
}

impl<S: KvStore> ApiState<S> {
  pub fn new(service: Arc<SubscriptionService<S>>) -> Self {
    Self {
      router: Arc::new(NotificationRouter::new(service.clone())),
      service,
      webhook_secret: None,
    }
  }

  pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
    self.webhook_secret = secret.filter(|s| !s.is_empty()).map(Arc::from);
    self
  }
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      service:        self.service.clone(),
      router:         self.router.clone(),
      webhook_secret: self.webhook_secret.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: KvStore + 'static,
{
  Router::new()
    // Subscriptions
    .route(
      "/channels/{channel_id}/subscriptions",
      get(subscriptions::list::<S>).post(subscriptions::create::<S>),
    )
    .route(
      "/channels/{channel_id}/subscriptions/{alias}",
      get(subscriptions::get_one::<S>)
        .put(subscriptions::update::<S>)
        .delete(subscriptions::delete_one::<S>),
    )
    // Events
    .route("/events/channels", post(events::channels::<S>))
    .route("/events/pages/channels", post(events::page_channels::<S>))
    .route("/events/users", post(events::users::<S>))
    .route("/events/kinds", get(events::kinds))
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use conflink_core::memory::MemoryStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  use super::*;

  const URL: &str = "https://c.example.com";

  fn make_state(secret: Option<&str>) -> ApiState<MemoryStore> {
    let service = Arc::new(SubscriptionService::new(MemoryStore::new()));
    ApiState::new(service).with_webhook_secret(secret.map(str::to_owned))
  }

  async fn oneshot_raw(
    state:   ApiState<MemoryStore>,
    method:  &str,
    uri:     &str,
    headers: Vec<(&str, &str)>,
    body:    Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = api_router(state)
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  fn space_body(alias: &str, key: &str, events: &[&str]) -> Value {
    json!({
      "subscriptionType": "space_subscription",
      "alias": alias,
      "baseURL": URL,
      "events": events,
      "spaceKey": key,
    })
  }

  fn page_body(alias: &str, page_id: &str, events: &[&str]) -> Value {
    json!({
      "subscriptionType": "page_subscription",
      "alias": alias,
      "baseURL": URL,
      "events": events,
      "pageID": page_id,
    })
  }

  // ── Subscriptions ───────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_then_list_and_get() {
    let state = make_state(None);
    let (status, created) = oneshot_raw(
      state.clone(),
      "POST",
      "/channels/CH1/subscriptions",
      vec![("x-user-id", "u1")],
      Some(space_body("eng", "ENG", &["comment_created"])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["channelID"], "CH1");
    assert_eq!(created["userID"], "u1");

    let (status, listed) =
      oneshot_raw(state.clone(), "GET", "/channels/CH1/subscriptions", vec![], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["eng"]["spaceKey"], "ENG");

    let (status, one) =
      oneshot_raw(state, "GET", "/channels/CH1/subscriptions/ENG", vec![], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["alias"], "eng");
  }

  #[tokio::test]
  async fn validation_and_conflicts_map_to_status_codes() {
    let state = make_state(None);
    let uri = "/channels/CH1/subscriptions";

    let (status, body) =
      oneshot_raw(state.clone(), "POST", uri, vec![], Some(space_body("", "ENG", &[]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("alias"));

    let (status, _) =
      oneshot_raw(state.clone(), "POST", uri, vec![], Some(space_body("eng", "ENG", &[]))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) =
      oneshot_raw(state.clone(), "POST", uri, vec![], Some(space_body("ENG", "OPS", &[]))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) =
      oneshot_raw(state, "POST", uri, vec![], Some(space_body("other", "ENG", &[]))).await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn mismatched_body_channel_is_rejected() {
    let state = make_state(None);
    let mut body = page_body("docs", "42", &["page_updated"]);
    body["channelID"] = json!("CH2");
    let (status, _) =
      oneshot_raw(state, "POST", "/channels/CH1/subscriptions", vec![], Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn update_renames_and_keeps_owner() {
    let state = make_state(None);
    oneshot_raw(
      state.clone(),
      "POST",
      "/channels/CH1/subscriptions",
      vec![("x-user-id", "u1")],
      Some(space_body("eng", "ENG", &["page_created"])),
    )
    .await;

    let (status, updated) = oneshot_raw(
      state.clone(),
      "PUT",
      "/channels/CH1/subscriptions/eng",
      vec![],
      Some(space_body("engineering", "OPS", &["page_updated"])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["alias"], "engineering");
    assert_eq!(updated["spaceKey"], "OPS");
    assert_eq!(updated["userID"], "u1");

    let (status, _) =
      oneshot_raw(state, "GET", "/channels/CH1/subscriptions/eng", vec![], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn delete_then_delete_again() {
    let state = make_state(None);
    oneshot_raw(
      state.clone(),
      "POST",
      "/channels/CH1/subscriptions",
      vec![],
      Some(page_body("docs", "42", &["page_updated"])),
    )
    .await;

    let uri = "/channels/CH1/subscriptions/docs";
    let (status, _) = oneshot_raw(state.clone(), "DELETE", uri, vec![], None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = oneshot_raw(state, "DELETE", uri, vec![], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("docs"));
  }

  // ── Events ──────────────────────────────────────────────────────────────────

  fn event(event_type: &str, page_id: &str) -> Value {
    json!({
      "baseURL": URL,
      "spaceKey": "ENG",
      "pageID": page_id,
      "eventType": event_type,
    })
  }

  #[tokio::test]
  async fn events_route_to_each_channel_once() {
    let state = make_state(None);
    let uri = "/channels/CH1/subscriptions";
    oneshot_raw(
      state.clone(),
      "POST",
      uri,
      vec![("x-user-id", "u1")],
      Some(space_body("s", "ENG", &["page_updated"])),
    )
    .await;
    oneshot_raw(
      state.clone(),
      "POST",
      uri,
      vec![("x-user-id", "u1")],
      Some(page_body("p", "42", &["page_updated"])),
    )
    .await;

    let (status, body) = oneshot_raw(
      state.clone(),
      "POST",
      "/events/channels",
      vec![],
      Some(event("page_updated", "42")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "channelIDs": ["CH1"] }));

    let (_, body) = oneshot_raw(
      state.clone(),
      "POST",
      "/events/users",
      vec![],
      Some(event("page_updated", "42")),
    )
    .await;
    assert_eq!(body, json!({ "userIDs": ["u1"] }));

    let (_, body) = oneshot_raw(
      state,
      "POST",
      "/events/channels",
      vec![],
      Some(event("comment_created", "42")),
    )
    .await;
    assert_eq!(body, json!({ "channelIDs": [] }));
  }

  #[tokio::test]
  async fn page_only_webhooks_reach_page_subscribers() {
    let state = make_state(Some("s3cret"));
    let uri = "/channels/CH1/subscriptions";
    oneshot_raw(
      state.clone(),
      "POST",
      uri,
      vec![],
      Some(page_body("p", "42", &["page_updated"])),
    )
    .await;
    oneshot_raw(
      state.clone(),
      "POST",
      "/channels/CH2/subscriptions",
      vec![],
      Some(space_body("s", "ENG", &["page_updated"])),
    )
    .await;

    let page_only = json!({
      "baseURL": URL,
      "pageID": "42",
      "eventType": "page_updated",
    });
    let (status, body) = oneshot_raw(
      state.clone(),
      "POST",
      "/events/channels?secret=s3cret",
      vec![],
      Some(page_only.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "channelIDs": [] }));

    let (status, body) = oneshot_raw(
      state.clone(),
      "POST",
      "/events/pages/channels?secret=s3cret",
      vec![],
      Some(page_only.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "channelIDs": ["CH1"] }));

    let (status, _) = oneshot_raw(
      state,
      "POST",
      "/events/pages/channels",
      vec![],
      Some(page_only),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn kinds_are_listed_with_labels() {
    let (status, body) =
      oneshot_raw(make_state(Some("s3cret")), "GET", "/events/kinds", vec![], None).await;
    assert_eq!(status, StatusCode::OK);

    let kinds = body["kinds"].as_array().unwrap();
    assert_eq!(kinds.len(), 9);
    assert!(kinds.contains(&json!({
      "eventType": "comment_created",
      "displayName": "Comment Create",
      "spaceOnly": false,
    })));
    assert!(kinds.contains(&json!({
      "eventType": "space_updated",
      "displayName": "Space Update",
      "spaceOnly": true,
    })));
  }

  #[tokio::test]
  async fn webhook_secret_is_enforced() {
    let state = make_state(Some("s3cret"));

    let (status, _) = oneshot_raw(
      state.clone(),
      "POST",
      "/events/channels",
      vec![],
      Some(event("space_updated", "-1")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = oneshot_raw(
      state,
      "POST",
      "/events/channels?secret=s3cret",
      vec![],
      Some(event("space_updated", "-1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "channelIDs": [] }));
  }
}
