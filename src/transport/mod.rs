//! The session transport boundary.
//!
//! A [`Connector`] opens authenticated sessions; a [`Transport`] is one live session. Everything
//! the retrieval engine knows about the server arrives through these two traits, and every
//! failure leaves them as a [`TransportError`], which is what the retry machinery classifies.
//!
//! [`ImapConnector`] implements both on top of the `imap` crate. Tests use the scripted
//! implementation in [`testing`](crate::testing).

use std::io::{Read, Write};
use std::net::TcpStream;

use chrono::{DateTime, FixedOffset};
use log::debug;
use native_tls::TlsConnector;

use crate::error::TransportError;
use crate::settings::Settings;
use crate::types::{Uid, UidValidity};

mod imap;
pub use self::imap::{ImapConnector, ImapTransport};

/// A byte stream a session can run over: plain TCP or TLS.
pub trait MailStream: Read + Write + Send {}

impl<T> MailStream for T where T: Read + Write + Send {}

/// Connect to the server named in `settings`, wrapping the connection in TLS if asked to.
pub(crate) fn open_stream(settings: &Settings) -> Result<Box<dyn MailStream>, TransportError> {
    debug!(
        "connecting to {}:{} (ssl: {})",
        settings.address, settings.port, settings.enable_ssl
    );
    let tcp = TcpStream::connect((settings.address.as_str(), settings.port))?;
    if !settings.enable_ssl {
        return Ok(Box::new(tcp));
    }
    let ssl_conn = TlsConnector::builder()
        .danger_accept_invalid_certs(settings.accept_invalid_certs)
        .danger_accept_invalid_hostnames(settings.accept_invalid_certs)
        .build()?;
    Ok(Box::new(ssl_conn.connect(&settings.address, tcp)?))
}

/// A name returned by a `LIST` or `LSUB` command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedFolder {
    /// The name as sent by the server, still in modified UTF-7.
    pub name: String,
    /// The hierarchy delimiter, if the server has a hierarchy.
    pub delimiter: Option<String>,
    /// Name attributes without their leading backslash, e.g. `Noselect`.
    pub attributes: Vec<String>,
}

/// Counters reported by `SELECT`, `EXAMINE` or `STATUS`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of unseen messages, when reported.
    pub unseen: Option<u32>,
    /// The mailbox's `UIDVALIDITY`, when reported.
    pub uid_validity: Option<UidValidity>,
    /// The mailbox's `UIDNEXT`, when reported.
    pub uid_next: Option<Uid>,
}

/// One message's attributes from a `UID FETCH` response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchedMessage {
    /// The message UID.
    pub uid: Uid,
    /// Flags, as the server spells them (`\Seen`, `$Forwarded`, ...).
    pub flags: Vec<String>,
    /// `RFC822.SIZE`.
    pub size: u32,
    /// `INTERNALDATE`.
    pub internal_date: Option<DateTime<FixedOffset>>,
    /// The header section, if it was requested.
    pub header: Option<Vec<u8>>,
    /// The full message, if it was requested.
    pub body: Option<Vec<u8>>,
}

/// A live, authenticated session with a mailbox server.
///
/// Commands are issued strictly one after the other. Implementations never retry on their own;
/// they report every failure as a [`TransportError`].
pub trait Transport {
    /// `LIST` (or `LSUB` when `subscribed`) under `reference` with the given wildcard `pattern`.
    fn list(
        &mut self,
        reference: &str,
        pattern: &str,
        subscribed: bool,
    ) -> Result<Vec<ListedFolder>, TransportError>;

    /// `STATUS` of a mailbox for the given data items, e.g. `(MESSAGES UNSEEN)`.
    fn status(&mut self, mailbox: &str, items: &str) -> Result<MailboxStatus, TransportError>;

    /// `SELECT` a mailbox, or `EXAMINE` it when `read_only`.
    fn select(&mut self, mailbox: &str, read_only: bool) -> Result<MailboxStatus, TransportError>;

    /// `UID SEARCH` with raw search criteria. The order of the result is unspecified.
    fn uid_search(&mut self, criteria: &str) -> Result<Vec<Uid>, TransportError>;

    /// `UID FETCH` the given UID set with a fetch query such as `(UID FLAGS BODY.PEEK[])`.
    fn uid_fetch(&mut self, uid_set: &str, query: &str)
        -> Result<Vec<FetchedMessage>, TransportError>;

    /// `UID STORE` the given UID set, e.g. `+FLAGS.SILENT (\Deleted)`.
    fn uid_store(&mut self, uid_set: &str, query: &str) -> Result<(), TransportError>;

    /// `EXPUNGE` the selected mailbox.
    fn expunge(&mut self) -> Result<(), TransportError>;

    /// `LOGOUT` and close the connection.
    fn logout(&mut self) -> Result<(), TransportError>;
}

/// Opens authenticated sessions.
pub trait Connector {
    /// The session type this connector produces.
    type Transport: Transport;

    /// Connect to the server named in `settings` and authenticate.
    fn connect(&mut self, settings: &Settings) -> Result<Self::Transport, TransportError>;
}
