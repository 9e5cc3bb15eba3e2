//! Webhook secret extractor.

use axum::{
  extract::{FromRequestParts, Query},
  http::request::Parts,
};
use conflink_core::KvStore;
use serde::Deserialize;
use subtle::ConstantTimeEq as _;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
struct SecretParams {
  secret: Option<String>,
}

/// Present in a handler means the request carried the configured webhook
/// secret, or that no secret is configured.
pub struct WebhookAuthorized;

/// Check a request URI's `?secret=` against `expected`.
pub fn verify_secret(
  uri: &axum::http::Uri,
  expected: Option<&str>,
) -> Result<(), ApiError> {
  let Some(expected) = expected else {
    return Ok(());
  };
  let Query(params) = Query::<SecretParams>::try_from_uri(uri)
    .map_err(|_| ApiError::Unauthorized)?;
  match params.secret {
    Some(given) if secrets_match(&given, expected) => Ok(()),
    _ => Err(ApiError::Unauthorized),
  }
}

/// Compare in time independent of where the first differing byte is.
fn secrets_match(given: &str, expected: &str) -> bool {
  given.as_bytes().ct_eq(expected.as_bytes()).into()
}

impl<S> FromRequestParts<ApiState<S>> for WebhookAuthorized
where
  S: KvStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &ApiState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_secret(&parts.uri, state.webhook_secret.as_deref())?;
    Ok(WebhookAuthorized)
  }
}

#[cfg(test)]
mod tests {
  use axum::http::Uri;

  use super::*;

  #[test]
  fn no_configured_secret_admits_everything() {
    let uri: Uri = "/events/channels".parse().unwrap();
    assert!(verify_secret(&uri, None).is_ok());
  }

  #[test]
  fn secret_must_match() {
    let ok: Uri = "/events/channels?secret=s3cret".parse().unwrap();
    let wrong: Uri = "/events/channels?secret=nope".parse().unwrap();
    let missing: Uri = "/events/channels".parse().unwrap();
    assert!(verify_secret(&ok, Some("s3cret")).is_ok());
    assert!(matches!(verify_secret(&wrong, Some("s3cret")), Err(ApiError::Unauthorized)));
    assert!(matches!(verify_secret(&missing, Some("s3cret")), Err(ApiError::Unauthorized)));
  }

  #[test]
  fn prefixes_and_extensions_of_the_secret_are_rejected() {
    assert!(secrets_match("s3cret", "s3cret"));
    assert!(!secrets_match("s3cre", "s3cret"));
    assert!(!secrets_match("s3cret!", "s3cret"));
    assert!(!secrets_match("", "s3cret"));
    assert!(!secrets_match("S3CRET", "s3cret"));

    let prefix: Uri = "/events/channels?secret=s3c".parse().unwrap();
    assert!(matches!(verify_secret(&prefix, Some("s3cret")), Err(ApiError::Unauthorized)));
  }
}
