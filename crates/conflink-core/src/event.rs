//! The fixed set of Confluence event kinds a subscription can select.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// A Confluence webhook event kind. The snake_case form is used both on the
/// wire and in the persisted index.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
  CommentCreated,
  CommentUpdated,
  CommentRemoved,
  PageCreated,
  PageUpdated,
  PageTrashed,
  PageRestored,
  PageRemoved,
  SpaceUpdated,
}

/// What an event is about; decides where its space key and page id come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
  Comment,
  Page,
  Space,
}

impl EventKind {
  /// Label shown to users when listing a subscription's events.
  pub fn display_name(self) -> &'static str {
    match self {
      Self::CommentCreated => "Comment Create",
      Self::CommentUpdated => "Comment Update",
      Self::CommentRemoved => "Comment Remove",
      Self::PageCreated => "Page Create",
      Self::PageUpdated => "Page Update",
      Self::PageTrashed => "Page Trash",
      Self::PageRestored => "Page Restore",
      Self::PageRemoved => "Page Remove",
      Self::SpaceUpdated => "Space Update",
    }
  }

  pub fn target(self) -> EventTarget {
    match self {
      Self::CommentCreated | Self::CommentUpdated | Self::CommentRemoved => {
        EventTarget::Comment
      }
      Self::PageCreated
      | Self::PageUpdated
      | Self::PageTrashed
      | Self::PageRestored
      | Self::PageRemoved => EventTarget::Page,
      Self::SpaceUpdated => EventTarget::Space,
    }
  }

  /// Page subscriptions may not select these.
  pub fn is_space_only(self) -> bool { self.target() == EventTarget::Space }

  /// Parse a wire event type, returning `None` for kinds outside the set.
  pub fn parse(s: &str) -> Option<Self> { s.parse().ok() }
}
