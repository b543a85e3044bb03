use chrono::{DateTime, FixedOffset};

use super::{Uid, UidValidity};

/// A lightweight handle on a remote message, built from its headers only.
///
/// An `Entry` is cheap to fetch: no body is transferred. It carries enough to find the message
/// again (`folder`, `uid_validity`, `uid`) and a [`fingerprint`](Entry::fingerprint) that stays
/// stable across folders and validity epochs, for deduplication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub(crate) folder: String,
    pub(crate) uid_validity: UidValidity,
    pub(crate) uid: Uid,
    pub(crate) flags: Vec<String>,
    pub(crate) size: u32,
    pub(crate) date: Option<DateTime<FixedOffset>>,
    pub(crate) message_id: Option<String>,
}

impl Entry {
    /// The folder the message was found in.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// The folder's `UIDVALIDITY` at retrieval time.
    pub fn uid_validity(&self) -> UidValidity {
        self.uid_validity
    }

    /// The message's UID within [`uid_validity`](Entry::uid_validity).
    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// Flags set on the message, e.g. `\Seen`.
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// The `RFC822.SIZE` of the message.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The server's `INTERNALDATE` for the message.
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.date
    }

    /// The `Message-ID` header value, if the message has one.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Hex MD5 digest over size, timestamp and message id.
    ///
    /// Two entries with the same fingerprint are almost certainly the same message, even when
    /// they live in different folders or were retrieved under different validity epochs.
    pub fn fingerprint(&self) -> String {
        let timestamp = self.date.map(|d| d.timestamp()).unwrap_or_default();
        let input = format!(
            "{}-{}-{}",
            self.size,
            timestamp,
            self.message_id.as_deref().unwrap_or_default()
        );
        format!("{:x}", md5::compute(input.as_bytes()))
    }
}
