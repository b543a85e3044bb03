//! Batched, retrying mail retrieval over IMAP, with a simple POP3 variant.
//!
//! A [`Retriever`] owns at most one session with the server. Each call connects, searches,
//! fetches in batches, optionally deletes what it handed out, and logs out again. Connection
//! failures along the way are retried with a linear backoff and a fresh connection, up to
//! [`Settings::max_retries`] times; protocol hiccups are retried on the same connection; a
//! refusal from the server is reported at once.
//!
//! # Usage
//!
//! ```no_run
//! use mail_retriever::{Count, FolderOptions, Order, RetrievalOptions, Retriever, Settings, What};
//!
//! let settings = Settings {
//!     address: "imap.example.com".to_string(),
//!     port: 993,
//!     enable_ssl: true,
//!     user_name: Some("alice".to_string()),
//!     password: Some("secret".to_string()),
//!     ..Settings::default()
//! };
//! let mut retriever = Retriever::new(settings);
//!
//! // The ten newest messages, newest first, without marking them seen.
//! let options = RetrievalOptions {
//!     what: What::Last,
//!     order: Order::Desc,
//!     read_only: true,
//!     ..RetrievalOptions::default()
//! };
//! for message in retriever.find(&options)? {
//!     let parsed = message.parse()?;
//!     println!("{}: {:?}", message.uid(), parsed.headers.len());
//! }
//!
//! // Everything in the archive, a hundred at a time, deleted once all batches went through.
//! let options = RetrievalOptions {
//!     mailbox: "Archive".to_string(),
//!     count: Count::All,
//!     delete_after_find: true,
//!     ..RetrievalOptions::default()
//! };
//! retriever.find_in_batches(&options, |batch| println!("{} messages", batch.len()))?;
//!
//! // Every ordinary folder with its counters.
//! for folder in retriever.find_folders(&FolderOptions::default())? {
//!     println!("{} ({} unseen)", folder.name(), folder.unseen());
//! }
//! # Ok::<(), mail_retriever::Error>(())
//! ```
//!
//! # Ordering
//!
//! `what` picks the lowest ([`What::First`]) or highest ([`What::Last`]) matching UIDs, and
//! `count` how many of them. Streaming calls hand items out in that selection order. Aggregating
//! calls ([`Retriever::find`], [`Retriever::find_entries`]) return them in `order`.
//!
//! # Logging
//!
//! Retry decisions, reconnects and batch boundaries are logged through the [`log`] facade at
//! `debug` level; UID sets and wire traffic at `trace`.

pub mod cursor;
pub mod error;
mod folders;
pub mod matcher;
pub mod options;
pub mod pop3;
pub mod retry;
mod retriever;
pub mod settings;
pub mod transport;
mod types;
pub mod utf7;
mod utils;

pub use crate::error::{Error, Result};
pub use crate::matcher::{FolderFilter, NamePattern};
pub use crate::options::{Count, FolderOptions, Order, RetrievalOptions, What};
pub use crate::retriever::Retriever;
pub use crate::settings::Settings;
pub use crate::types::*;

#[cfg(any(test, feature = "test_helpers"))]
pub mod testing;

#[cfg(test)]
mod mock_stream;
