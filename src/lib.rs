//! Synchronization and real-time connectivity core for the vigil client.
//!
//! The crate is split along the data flow:
//!
//! - [`storage`] — the local feed snapshot ([`storage::FeedCache`]) and the
//!   content-addressed image cache ([`storage::AssetStore`]) that let the
//!   feed render instantly while offline
//! - [`sync`] — full-refresh fetch ([`sync::SyncClient`]) and post upload
//!   ([`sync::PublishClient`]) against the REST endpoint
//! - [`push`] — the long-lived notification connection with its
//!   reconnect/keepalive state machine ([`push::ConnectionManager`])
//! - [`notify`] — turns alert events into deliveries to the platform
//!   notification collaborator
//!
//! Presentation, media playback and OS integration are external
//! collaborators; this crate only exposes the data and event streams they
//! consume.

pub mod config;
pub mod notify;
pub mod push;
pub mod storage;
pub mod sync;
pub mod util;
