//! Options accepted by the retrieval operations.

use crate::cursor::UidSpec;
use crate::error::{Error, Result};
use crate::matcher::FolderFilter;

/// Which end of the matching messages to take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum What {
    /// The lowest UIDs.
    #[default]
    First,
    /// The highest UIDs.
    Last,
}

/// The order results are returned in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Order {
    /// Oldest (lowest UID) first.
    #[default]
    Asc,
    /// Newest (highest UID) first.
    Desc,
}

/// How many results to take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Count {
    /// Everything that matches.
    All,
    /// At most this many.
    Limit(usize),
}

impl Count {
    /// Returns true when exactly one result was asked for.
    pub fn is_single(&self) -> bool {
        *self == Count::Limit(1)
    }
}

impl Default for Count {
    fn default() -> Self {
        Count::Limit(10)
    }
}

impl From<usize> for Count {
    fn from(n: usize) -> Self {
        Count::Limit(n)
    }
}

/// Default number of messages fetched per round-trip.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Options for message and entry retrieval.
///
/// ```
/// # use mail_retriever::{Count, Order, RetrievalOptions, What};
/// let options = RetrievalOptions {
///     what: What::Last,
///     count: Count::Limit(2),
///     order: Order::Desc,
///     ..RetrievalOptions::default()
/// };
/// assert_eq!(options.mailbox, "INBOX");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalOptions {
    /// The mailbox to search. Defaults to `INBOX`.
    pub mailbox: String,
    /// Take the first or the last matching messages. Defaults to [`What::First`].
    pub what: What,
    /// Result order. Defaults to [`Order::Asc`].
    pub order: Order,
    /// How many messages to take. Defaults to 10.
    pub count: Count,
    /// Raw `SEARCH` keys. Defaults to `ALL`. Ignored when `uid` is set.
    pub keys: String,
    /// Structured UID criteria, taking precedence over `keys`.
    pub uid: Option<UidSpec>,
    /// Open the mailbox with `EXAMINE` instead of `SELECT`; messages are not marked seen.
    pub read_only: bool,
    /// Delete retrieved messages once every batch has been handed out.
    pub delete_after_find: bool,
    /// Messages per fetch round-trip.
    pub batch_size: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        RetrievalOptions {
            mailbox: "INBOX".to_string(),
            what: What::First,
            order: Order::Asc,
            count: Count::default(),
            keys: "ALL".to_string(),
            uid: None,
            read_only: false,
            delete_after_find: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl RetrievalOptions {
    /// Options for the given mailbox with everything else at its default.
    pub fn mailbox(mailbox: impl Into<String>) -> Self {
        RetrievalOptions {
            mailbox: mailbox.into(),
            ..RetrievalOptions::default()
        }
    }

    /// Check the options and resolve the search criteria once, before any I/O.
    pub(crate) fn normalize(&self) -> Result<Normalized> {
        if self.batch_size == 0 {
            return Err(Error::InvalidOption("batch_size must be at least 1".into()));
        }
        if self.read_only && self.delete_after_find {
            return Err(Error::InvalidOption(
                "delete_after_find needs a read-write mailbox".into(),
            ));
        }
        if self.mailbox.trim().is_empty() {
            return Err(Error::InvalidOption("mailbox must not be empty".into()));
        }
        let criteria = match &self.uid {
            Some(uid) => uid.to_criteria()?,
            None if self.keys.trim().is_empty() => "ALL".to_string(),
            None => self.keys.trim().to_string(),
        };
        Ok(Normalized {
            mailbox: self.mailbox.clone(),
            criteria,
            what: self.what,
            order: self.order,
            count: self.count,
            read_only: self.read_only,
            delete_after_find: self.delete_after_find,
            batch_size: self.batch_size,
        })
    }
}

/// Validated options with the search criteria resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Normalized {
    pub(crate) mailbox: String,
    pub(crate) criteria: String,
    pub(crate) what: What,
    pub(crate) order: Order,
    pub(crate) count: Count,
    pub(crate) read_only: bool,
    pub(crate) delete_after_find: bool,
    pub(crate) batch_size: usize,
}

impl Normalized {
    /// Whether an aggregated result must be reversed to honor `order`.
    ///
    /// Identifiers are handed out lowest-first for `First` and highest-first for `Last`.
    pub(crate) fn needs_reversal(&self) -> bool {
        matches!(
            (self.what, self.order),
            (What::Last, Order::Asc) | (What::First, Order::Desc)
        )
    }
}

/// Options for folder discovery.
#[derive(Clone, Debug)]
pub struct FolderOptions {
    /// Only list folders whose name starts with this prefix. Empty lists the whole tree.
    pub prefix: String,
    /// List subscribed folders only (`LSUB`).
    pub subscribed: bool,
    /// Include/exclude rules. Defaults to everything but special-purpose folders.
    pub filter: FolderFilter,
    /// How many folders to return. Defaults to all.
    pub count: Count,
}

impl Default for FolderOptions {
    fn default() -> Self {
        FolderOptions {
            prefix: String::new(),
            subscribed: false,
            filter: FolderFilter::default(),
            count: Count::All,
        }
    }
}

impl FolderOptions {
    /// Options that list every folder admitted by `filter`.
    pub fn filtered(filter: FolderFilter) -> Self {
        FolderOptions {
            filter,
            ..FolderOptions::default()
        }
    }

    /// The `LIST` wildcard pattern for the prefix, in modified UTF-7.
    pub(crate) fn pattern(&self) -> String {
        format!("{}*", crate::utf7::encode(&self.prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = RetrievalOptions::default();
        assert_eq!(options.mailbox, "INBOX");
        assert_eq!(options.count, Count::Limit(10));
        assert_eq!(options.what, What::First);
        assert_eq!(options.order, Order::Asc);
        assert_eq!(options.keys, "ALL");
        assert!(!options.delete_after_find);
    }

    #[test]
    fn uid_takes_precedence_over_keys() {
        let options = RetrievalOptions {
            keys: "UNSEEN".to_string(),
            uid: Some(UidSpec::Single(42)),
            ..RetrievalOptions::default()
        };
        assert_eq!(options.normalize().unwrap().criteria, "UID 42");
    }

    #[test]
    fn blank_keys_search_everything() {
        let options = RetrievalOptions {
            keys: "  ".to_string(),
            ..RetrievalOptions::default()
        };
        assert_eq!(options.normalize().unwrap().criteria, "ALL");
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        let zero = RetrievalOptions {
            batch_size: 0,
            ..RetrievalOptions::default()
        };
        assert!(matches!(zero.normalize(), Err(Error::InvalidOption(_))));

        let read_only_delete = RetrievalOptions {
            read_only: true,
            delete_after_find: true,
            ..RetrievalOptions::default()
        };
        assert!(matches!(
            read_only_delete.normalize(),
            Err(Error::InvalidOption(_))
        ));
    }

    #[test]
    fn reversal_table() {
        let normalized = |what, order| {
            RetrievalOptions {
                what,
                order,
                ..RetrievalOptions::default()
            }
            .normalize()
            .unwrap()
            .needs_reversal()
        };
        assert!(!normalized(What::First, Order::Asc));
        assert!(normalized(What::First, Order::Desc));
        assert!(normalized(What::Last, Order::Asc));
        assert!(!normalized(What::Last, Order::Desc));
    }

    #[test]
    fn folder_pattern_encodes_prefix() {
        assert_eq!(FolderOptions::default().pattern(), "*");
        let options = FolderOptions {
            prefix: "Entwürfe/".to_string(),
            ..FolderOptions::default()
        };
        assert_eq!(options.pattern(), "Entw&APw-rfe/*");
    }
}
