use std::fmt;

use imap::types::{Fetch, Name};
use imap::Authenticator;
use imap_proto::NameAttribute;
use log::{debug, trace};

use super::{open_stream, Connector, FetchedMessage, ListedFolder, MailStream, MailboxStatus, Transport};
use crate::error::{TransportError, TransportErrorKind};
use crate::settings::Settings;
use crate::types::Uid;

type ImapSession = imap::Session<Box<dyn MailStream>>;

/// Opens IMAP sessions over TCP, optionally wrapped in TLS.
///
/// The connection is established, the greeting read, and then the client logs in with `LOGIN`
/// or authenticates with the SASL mechanism named in [`Settings::authentication`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ImapConnector;

impl Connector for ImapConnector {
    type Transport = ImapTransport;

    fn connect(&mut self, settings: &Settings) -> Result<ImapTransport, TransportError> {
        let stream = open_stream(settings)?;
        let mut client = imap::Client::new(stream);
        client.read_greeting().map_err(convert)?;
        let session = authenticate(client, settings)?;
        debug!("authenticated to {}", settings.address);
        Ok(ImapTransport { session })
    }
}

fn authenticate(
    client: imap::Client<Box<dyn MailStream>>,
    settings: &Settings,
) -> Result<ImapSession, TransportError> {
    let user = settings.user_name.as_deref().unwrap_or_default();
    let secret = settings.password.as_deref().unwrap_or_default();
    let mechanism = settings
        .authentication
        .as_deref()
        .map(|m| m.to_ascii_uppercase());

    let result = match mechanism.as_deref() {
        None | Some("LOGIN") => client.login(user, secret),
        Some("PLAIN") => client.authenticate("PLAIN", &Plain { user, secret }),
        Some("XOAUTH2") => client.authenticate(
            "XOAUTH2",
            &XOAuth2 {
                user,
                access_token: secret,
            },
        ),
        Some(other) => {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                format!("unsupported authentication mechanism {}", other),
            ))
        }
    };
    result.map_err(|(err, _client)| convert(err))
}

/// SASL `PLAIN` ([RFC 4616](https://tools.ietf.org/html/rfc4616)).
struct Plain<'a> {
    user: &'a str,
    secret: &'a str,
}

impl Authenticator for Plain<'_> {
    type Response = String;

    fn process(&self, _challenge: &[u8]) -> Self::Response {
        format!("\0{}\0{}", self.user, self.secret)
    }
}

/// Google's and Microsoft's `XOAUTH2`.
struct XOAuth2<'a> {
    user: &'a str,
    access_token: &'a str,
}

impl Authenticator for XOAuth2<'_> {
    type Response = String;

    fn process(&self, _challenge: &[u8]) -> Self::Response {
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.user, self.access_token
        )
    }
}

/// A live IMAP session.
pub struct ImapTransport {
    session: ImapSession,
}

impl fmt::Debug for ImapTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapTransport").finish_non_exhaustive()
    }
}

impl Transport for ImapTransport {
    fn list(
        &mut self,
        reference: &str,
        pattern: &str,
        subscribed: bool,
    ) -> Result<Vec<ListedFolder>, TransportError> {
        let names = if subscribed {
            self.session.lsub(Some(reference), Some(pattern))
        } else {
            self.session.list(Some(reference), Some(pattern))
        }
        .map_err(convert)?;
        Ok(names.iter().map(listed).collect())
    }

    fn status(&mut self, mailbox: &str, items: &str) -> Result<MailboxStatus, TransportError> {
        let mailbox = self.session.status(mailbox, items).map_err(convert)?;
        Ok(status(&mailbox))
    }

    fn select(&mut self, mailbox: &str, read_only: bool) -> Result<MailboxStatus, TransportError> {
        let mailbox = if read_only {
            self.session.examine(mailbox)
        } else {
            self.session.select(mailbox)
        }
        .map_err(convert)?;
        Ok(status(&mailbox))
    }

    fn uid_search(&mut self, criteria: &str) -> Result<Vec<Uid>, TransportError> {
        let uids = self.session.uid_search(criteria).map_err(convert)?;
        Ok(uids.into_iter().collect())
    }

    fn uid_fetch(
        &mut self,
        uid_set: &str,
        query: &str,
    ) -> Result<Vec<FetchedMessage>, TransportError> {
        let fetches = self.session.uid_fetch(uid_set, query).map_err(convert)?;
        Ok(fetches.iter().filter_map(fetched).collect())
    }

    fn uid_store(&mut self, uid_set: &str, query: &str) -> Result<(), TransportError> {
        self.session.uid_store(uid_set, query).map_err(convert)?;
        Ok(())
    }

    fn expunge(&mut self) -> Result<(), TransportError> {
        self.session.expunge().map_err(convert)?;
        Ok(())
    }

    fn logout(&mut self) -> Result<(), TransportError> {
        self.session.logout().map_err(convert)
    }
}

fn listed(name: &Name<'_>) -> ListedFolder {
    ListedFolder {
        name: name.name().to_string(),
        delimiter: name.delimiter().map(str::to_string),
        attributes: name
            .attributes()
            .iter()
            .map(attribute_name)
            .filter(|a| !a.is_empty())
            .collect(),
    }
}

fn attribute_name(attribute: &NameAttribute<'_>) -> String {
    let name = match attribute {
        NameAttribute::NoInferiors => "Noinferiors",
        NameAttribute::NoSelect => "Noselect",
        NameAttribute::Marked => "Marked",
        NameAttribute::Unmarked => "Unmarked",
        NameAttribute::All => "All",
        NameAttribute::Archive => "Archive",
        NameAttribute::Drafts => "Drafts",
        NameAttribute::Flagged => "Flagged",
        NameAttribute::Junk => "Junk",
        NameAttribute::Sent => "Sent",
        NameAttribute::Trash => "Trash",
        NameAttribute::Extension(s) => &**s,
        #[allow(unreachable_patterns)]
        _ => "",
    };
    name.trim_start_matches('\\').to_string()
}

fn status(mailbox: &imap::types::Mailbox) -> MailboxStatus {
    MailboxStatus {
        exists: mailbox.exists,
        unseen: mailbox.unseen,
        uid_validity: mailbox.uid_validity,
        uid_next: mailbox.uid_next,
    }
}

fn fetched(fetch: &Fetch) -> Option<FetchedMessage> {
    let uid = match fetch.uid {
        Some(uid) => uid,
        None => {
            trace!("skipping FETCH for message {} without UID", fetch.message);
            return None;
        }
    };
    Some(FetchedMessage {
        uid,
        flags: fetch
            .flags()
            .into_iter()
            .map(|flag| flag.to_string())
            .collect(),
        size: fetch.size.unwrap_or_default(),
        internal_date: fetch.internal_date(),
        header: fetch.header().map(<[u8]>::to_vec),
        body: fetch.body().map(<[u8]>::to_vec),
    })
}

fn convert(err: imap::Error) -> TransportError {
    let message = err.to_string();
    let kind = match err {
        imap::Error::Io(e) => return e.into(),
        imap::Error::Tls(_) | imap::Error::TlsHandshake(_) => TransportErrorKind::Tls,
        imap::Error::ConnectionLost => TransportErrorKind::ConnectionAborted,
        imap::Error::Bye(_) => TransportErrorKind::Bye,
        imap::Error::Bad(_) => TransportErrorKind::Bad,
        imap::Error::No(_) => TransportErrorKind::No,
        imap::Error::Parse(_) => TransportErrorKind::Parse,
        imap::Error::Validate(_) | imap::Error::Append => TransportErrorKind::Other,
        _ => TransportErrorKind::Unexpected,
    };
    TransportError::new(kind, message)
}
