//! SealTalk relay server
//!
//! Turns inbound user events into outbound actions for a chat transport.
//! The transport itself (bot API, console) is a thin driver: it feeds
//! [`RelayEvent`]s into [`RelayService::process_event`] and renders the
//! returned [`RelayAction`]s.
//!
//! # Components
//!
//! - [`service`]: the event to action driver
//! - [`action`]: events, actions and the user-facing notice lexicon
//! - [`storage`]: persistent `redb` store backend
//! - [`sweeper`]: background purge of expired entries
//! - [`config`]: command-line and environment configuration
//! - [`console`]: line-oriented driver used by the binary

pub mod action;
pub mod config;
pub mod console;
pub mod error;
pub mod service;
pub mod storage;
pub mod sweeper;

pub use action::{Actor, Contact, Notice, RelayAction, RelayEvent};
pub use config::ServerConfig;
pub use error::ServerError;
pub use service::RelayService;
pub use storage::RedbStore;
pub use sweeper::spawn_sweeper;
