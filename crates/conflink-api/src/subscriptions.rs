//! Handlers for `/channels/{channel_id}/subscriptions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/channels/{channel_id}/subscriptions` | Map of alias → subscription |
//! | `POST`   | `/channels/{channel_id}/subscriptions` | 201; 409 on alias or URL clash |
//! | `GET`    | `/channels/{channel_id}/subscriptions/{alias}` | 404 if not found |
//! | `PUT`    | `/channels/{channel_id}/subscriptions/{alias}` | Body may rename the alias |
//! | `DELETE` | `/channels/{channel_id}/subscriptions/{alias}` | 204 |
//!
//! Bodies are tagged by `subscriptionType`. A body `channelID` must be empty
//! or equal to the path's; an `X-User-Id` header stamps the owner.

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use conflink_core::{ChannelSubscriptions, KvStore, Subscription};

use crate::{ApiState, error::ApiError};

/// Header carrying the chat user making the request.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Bind a request body to the channel in the path and the requesting user.
fn prepare(
  channel_id: &str,
  headers: &HeaderMap,
  sub: Subscription,
) -> Result<Subscription, ApiError> {
  if !sub.channel_id().is_empty() && sub.channel_id() != channel_id {
    return Err(ApiError::BadRequest(format!(
      "body channelID {:?} does not match path channel {channel_id:?}",
      sub.channel_id()
    )));
  }
  let sub = sub.with_channel_id(channel_id);
  let user_id = headers
    .get(USER_ID_HEADER)
    .and_then(|v| v.to_str().ok())
    .filter(|v| !v.is_empty());
  Ok(match user_id {
    Some(user_id) => sub.with_user_id(user_id),
    None => sub,
  })
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /channels/{channel_id}/subscriptions`
pub async fn list<S: KvStore + 'static>(
  State(state): State<ApiState<S>>,
  Path(channel_id): Path<String>,
) -> Result<Json<ChannelSubscriptions>, ApiError> {
  Ok(Json(state.service.get_by_channel_id(&channel_id).await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /channels/{channel_id}/subscriptions`
pub async fn create<S: KvStore + 'static>(
  State(state): State<ApiState<S>>,
  Path(channel_id): Path<String>,
  headers: HeaderMap,
  Json(body): Json<Subscription>,
) -> Result<impl IntoResponse, ApiError> {
  let sub = prepare(&channel_id, &headers, body)?;
  state.service.save(sub.clone()).await?;
  Ok((StatusCode::CREATED, Json(sub)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /channels/{channel_id}/subscriptions/{alias}`
pub async fn get_one<S: KvStore + 'static>(
  State(state): State<ApiState<S>>,
  Path((channel_id, alias)): Path<(String, String)>,
) -> Result<Json<Subscription>, ApiError> {
  Ok(Json(state.service.get_alias(&channel_id, &alias).await?))
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// `PUT /channels/{channel_id}/subscriptions/{alias}`; responds with the
/// subscription as stored.
pub async fn update<S: KvStore + 'static>(
  State(state): State<ApiState<S>>,
  Path((channel_id, alias)): Path<(String, String)>,
  headers: HeaderMap,
  Json(body): Json<Subscription>,
) -> Result<Json<Subscription>, ApiError> {
  let sub = prepare(&channel_id, &headers, body)?;
  let replaced = state.service.replace(&channel_id, &alias, sub).await?;
  Ok(Json(replaced.current))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /channels/{channel_id}/subscriptions/{alias}`
pub async fn delete_one<S: KvStore + 'static>(
  State(state): State<ApiState<S>>,
  Path((channel_id, alias)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
  state.service.delete(&channel_id, &alias).await?;
  Ok(StatusCode::NO_CONTENT)
}
