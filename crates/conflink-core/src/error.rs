//! Error types for `conflink-core`.
//!
//! Every failure carries an [`ErrorKind`] so transports can map it to a status
//! code or chat message without inspecting the message text.

use thiserror::Error;

/// Structurally invalid subscription input. Only the first violated rule is
/// reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("alias can not be empty")]
  EmptyAlias,

  #[error("base url can not be empty")]
  EmptyBaseUrl,

  #[error("enter a valid url: {0:?}")]
  InvalidBaseUrl(String),

  #[error("space key can not be empty")]
  EmptySpaceKey,

  #[error("page id can not be empty")]
  EmptyPageId,

  #[error("channel id can not be empty")]
  EmptyChannelId,

  #[error("event {0} is only available for space subscriptions")]
  SpaceOnlyEvent(crate::EventKind),
}

/// The subscription would collide with one already present in its channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
  #[error("a subscription with the alias {alias:?} already exists")]
  AliasExists { alias: String },

  #[error("a subscription with the same url and space key already exists")]
  SpaceKeyExists { base_url: String, space_key: String },

  #[error("a subscription with the same url and page id already exists")]
  PageIdExists { base_url: String, page_id: String },
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Validation,
  Conflict,
  NotFound,
  Storage,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Conflict(#[from] ConflictError),

  #[error("subscription with alias {alias:?} not found in channel {channel_id}")]
  NotFound { channel_id: String, alias: String },

  /// The key/value collaborator failed, or the stored index could not be
  /// (de)serialised.
  #[error("{operation} failed for key {key}: {source}")]
  Storage {
    operation: &'static str,
    key:       String,
    #[source]
    source:    Box<dyn std::error::Error + Send + Sync>,
  },
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::Validation,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::Storage { .. } => ErrorKind::Storage,
    }
  }

  pub(crate) fn not_found(channel_id: &str, alias: &str) -> Self {
    Self::NotFound {
      channel_id: channel_id.to_owned(),
      alias:      alias.to_owned(),
    }
  }

  pub(crate) fn storage(
    operation: &'static str,
    key: &str,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
  ) -> Self {
    Self::Storage { operation, key: key.to_owned(), source: source.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
