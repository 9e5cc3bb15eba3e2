//! Storage and index key derivation.
//!
//! URL-index keys identify a Confluence instance by host (and non-default
//! port) only, so `https://c.example.com` and `https://c.example.com/wiki/`
//! address the same space or page.

use sha2::{Digest, Sha256};
use url::Url;

use crate::ValidationError;

/// Prefix hashed into the single key that holds the whole subscription index.
pub const SUBSCRIPTION_KEY_PREFIX: &str = "confluence_subs";

/// The storage key under which the serialised index lives.
pub fn subscription_index_key() -> String { hash_key(SUBSCRIPTION_KEY_PREFIX) }

/// Parse a Confluence base URL, requiring a scheme and a host.
pub fn parse_base_url(raw: &str) -> Result<Url, ValidationError> {
  let url = Url::parse(raw.trim())
    .map_err(|_| ValidationError::InvalidBaseUrl(raw.to_owned()))?;
  if url.scheme().is_empty() || url.host_str().is_none_or(str::is_empty) {
    return Err(ValidationError::InvalidBaseUrl(raw.to_owned()));
  }
  Ok(url)
}

/// The `host[:port]` part of a base URL, lower-cased.
pub fn instance_host(raw: &str) -> Option<String> {
  let url = parse_base_url(raw).ok()?;
  let host = url.host_str()?.to_ascii_lowercase();
  Some(match url.port() {
    Some(port) => format!("{host}:{port}"),
    None => host,
  })
}

/// Index key for a (base URL, space key) pair; `None` if the URL is invalid.
pub fn url_space_key(base_url: &str, space_key: &str) -> Option<String> {
  instance_host(base_url).map(|host| hash_key(&format!("{host}/{space_key}")))
}

/// Index key for a (base URL, page id) pair; `None` if the URL is invalid.
pub fn url_page_id(base_url: &str, page_id: &str) -> Option<String> {
  instance_host(base_url).map(|host| hash_key(&format!("{host}/{page_id}")))
}

fn hash_key(s: &str) -> String { hex::encode(Sha256::digest(s.as_bytes())) }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_relative_and_hostless_urls() {
    assert!(parse_base_url("c.example.com").is_err());
    assert!(parse_base_url("mailto:someone@example.com").is_err());
    assert!(parse_base_url("not a url").is_err());
    assert!(parse_base_url("https://c.example.com").is_ok());
  }

  #[test]
  fn host_ignores_path_and_case() {
    assert_eq!(
      instance_host("https://C.Example.com/wiki/").as_deref(),
      Some("c.example.com")
    );
    assert_eq!(
      instance_host("http://localhost:8090").as_deref(),
      Some("localhost:8090")
    );
  }

  #[test]
  fn same_instance_same_key() {
    assert_eq!(
      url_space_key("https://c.example.com", "ENG"),
      url_space_key("https://c.example.com/wiki", "ENG"),
    );
    assert_ne!(
      url_space_key("https://c.example.com", "ENG"),
      url_space_key("https://d.example.com", "ENG"),
    );
    assert_eq!(url_page_id("::", "1"), None);
  }

  #[test]
  fn index_key_is_stable_hex() {
    let key = subscription_index_key();
    assert_eq!(key.len(), 64);
    assert_eq!(key, subscription_index_key());
  }
}
