//! This module contains the value types produced by retrieval.

/// From section [2.3.1.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.1).
///
/// A 32-bit value assigned to each message, which when used with the unique identifier validity
/// value forms a 64-bit value that will not refer to any other message in the mailbox or any
/// subsequent mailbox with the same name forever. Unique identifiers are assigned in a strictly
/// ascending fashion in the mailbox, but are not necessarily contiguous.
///
/// A `Uid` is only meaningful together with the folder it came from and that folder's
/// [`UidValidity`]. Once the validity changes, every previously retrieved `Uid` is stale.
pub type Uid = u32;

/// From section [2.3.1.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.1).
///
/// The unique identifier validity value is sent in a `UIDVALIDITY` response code at mailbox
/// selection time. If unique identifiers from an earlier session fail to persist in this session,
/// the unique identifier validity value will be greater than the one used in the earlier session.
pub type UidValidity = u32;

mod entry;
pub use self::entry::Entry;

mod folder;
pub use self::folder::Folder;

mod found;
pub use self::found::Found;

mod message;
pub(crate) use self::message::message_id;
pub use self::message::Message;

/// Normalize a flag or mailbox attribute for comparison: no leading backslash, lower case.
///
/// `\Noselect`, `Noselect` and `NOSELECT` all normalize to `noselect`.
pub(crate) fn normalize_flag(flag: &str) -> String {
    flag.trim().trim_start_matches('\\').to_lowercase()
}
