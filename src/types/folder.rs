use super::{normalize_flag, Uid, UidValidity};

/// A mailbox discovered by a `LIST` or `LSUB` command, annotated with its `STATUS` counters.
///
/// Folders are created per discovery call and never change afterwards. Two folders with the same
/// [`name`](Folder::name) and [`uid_validity`](Folder::uid_validity) describe the same mailbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Folder {
    pub(crate) name: String,
    pub(crate) raw_name: String,
    pub(crate) delimiter: Option<String>,
    pub(crate) attributes: Vec<String>,
    pub(crate) messages: u32,
    pub(crate) unseen: u32,
    pub(crate) uid_validity: Option<UidValidity>,
    pub(crate) uid_next: Option<Uid>,
}

impl Folder {
    /// The mailbox name, decoded from modified UTF-7.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The mailbox name as the server reported it. This is the form to hand back to the server.
    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    /// The hierarchy delimiter is a character used to delimit levels of hierarchy in a mailbox
    /// name. `None` means that no hierarchy exists; the name is a "flat" name.
    pub fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    /// Attributes of this mailbox without their leading backslash, e.g. `Noselect` or `Drafts`.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Returns true if the mailbox carries `attribute`, compared case-insensitively.
    pub fn has_attribute(&self, attribute: &str) -> bool {
        let wanted = normalize_flag(attribute);
        self.attributes.iter().any(|a| normalize_flag(a) == wanted)
    }

    /// Number of messages in the mailbox.
    pub fn messages(&self) -> u32 {
        self.messages
    }

    /// Number of messages without the `\Seen` flag.
    pub fn unseen(&self) -> u32 {
        self.unseen
    }

    /// The current `UIDVALIDITY` of the mailbox.
    pub fn uid_validity(&self) -> Option<UidValidity> {
        self.uid_validity
    }

    /// The UID the next message delivered to this mailbox is predicted to get.
    pub fn uid_next(&self) -> Option<Uid> {
        self.uid_next
    }
}
