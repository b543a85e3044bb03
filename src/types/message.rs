use chrono::{DateTime, FixedOffset};
use mailparse::{MailHeaderMap, ParsedMail};

use super::{Uid, UidValidity};
use crate::error::Result;

/// A complete message, fetched with its full RFC 2822 payload.
///
/// The raw bytes are kept as received; [`parse`](Message::parse) is the one place they are turned
/// into a structured MIME tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub(crate) raw: Vec<u8>,
    pub(crate) folder: String,
    pub(crate) uid_validity: UidValidity,
    pub(crate) uid: Uid,
    pub(crate) flags: Vec<String>,
    pub(crate) size: u32,
    pub(crate) date: Option<DateTime<FixedOffset>>,
}

impl Message {
    /// The raw payload as sent by the server.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Consume the message, returning the raw payload.
    pub fn into_raw(self) -> Vec<u8> {
        self.raw
    }

    /// The folder the message was found in.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// The folder's `UIDVALIDITY` at retrieval time.
    pub fn uid_validity(&self) -> UidValidity {
        self.uid_validity
    }

    /// The message's UID within [`uid_validity`](Message::uid_validity). For POP3 messages this
    /// is the message number within the session.
    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// Flags set on the message, e.g. `\Seen`. Always empty for POP3.
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// The size of the message as reported by the server.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The server's `INTERNALDATE` for the message.
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.date
    }

    /// Parse the payload into a MIME tree.
    pub fn parse(&self) -> Result<ParsedMail<'_>> {
        Ok(mailparse::parse_mail(&self.raw)?)
    }

    /// The `Message-ID` header value, if present.
    pub fn message_id(&self) -> Option<String> {
        message_id(&self.raw)
    }
}

/// Pull the `Message-ID` out of a header block (or a full message).
pub(crate) fn message_id(raw: &[u8]) -> Option<String> {
    let (headers, _) = mailparse::parse_headers(raw).ok()?;
    headers
        .get_first_value("Message-ID")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}
