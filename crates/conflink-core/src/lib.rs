//! Core types for the Confluence-to-chat subscription bridge.
//!
//! Holds the subscription model, the persisted subscription index, the
//! key/value store abstraction with its atomic read-modify-write primitive,
//! and the notification router. This crate is free of HTTP and database
//! dependencies; backends and transports depend on it.

// Native `async fn` in traits; the store trait spells out `Send` futures
// explicitly where it matters.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod event;
pub mod index;
pub mod keys;
pub mod memory;
pub mod router;
pub mod service;
pub mod store;
pub mod subscription;

pub use error::{ConflictError, Error, ErrorKind, Result, ValidationError};
pub use event::EventKind;
pub use index::{ChannelSubscriptions, SubscriberEvents, SubscriptionIndex};
pub use router::{
  AllTemplates, ConfluenceEvent, NotificationRouter, NotificationTemplates,
  PageRef,
};
pub use service::{Replaced, SubscriptionService};
pub use store::{KvStore, RetryPolicy, Versioned};
pub use subscription::{PageSubscription, SpaceSubscription, Subscription};
