//! A scripted, in-memory mail server for exercising retrieval without a network.
//!
//! Enable the `test_helpers` feature to use it from downstream tests:
//!
//! ```toml
//! [dev-dependencies]
//! mail-retriever = { version = "0.1", features = ["test_helpers"] }
//! ```
//!
//! A [`ScriptedConnector`] is a cheap handle onto shared server state; clone it before handing it
//! to a retriever and keep the clone to queue failures and inspect what was sent.
//!
//! ```
//! use mail_retriever::testing::ScriptedConnector;
//! use mail_retriever::{RetrievalOptions, Retriever, Settings};
//!
//! let server = ScriptedConnector::new();
//! server.mailbox("INBOX", 7, [1, 2, 3]);
//! let mut retriever = Retriever::with_connector(Settings::default(), server.clone());
//! let found = retriever.find(&RetrievalOptions::default()).unwrap();
//! assert_eq!(found.len(), 3);
//! assert_eq!(server.logouts(), 1);
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use chrono::DateTime;

use crate::error::{TransportError, TransportErrorKind};
use crate::settings::Settings;
use crate::transport::{Connector, FetchedMessage, ListedFolder, MailboxStatus, Transport};
use crate::types::{Uid, UidValidity};

/// The commands failures can be queued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    /// Opening a session.
    Connect,
    /// `LIST` and `LSUB`.
    List,
    /// `STATUS`.
    Status,
    /// `SELECT` and `EXAMINE`.
    Select,
    /// `UID SEARCH`.
    Search,
    /// `UID FETCH`.
    Fetch,
    /// `UID STORE`.
    Store,
    /// `EXPUNGE`.
    Expunge,
    /// `LOGOUT`.
    Logout,
}

#[derive(Clone, Debug)]
struct StoredMessage {
    raw: Vec<u8>,
    flags: Vec<String>,
    date: i64,
}

#[derive(Clone, Debug)]
struct StoredMailbox {
    name: String,
    attributes: Vec<String>,
    subscribed: bool,
    uid_validity: UidValidity,
    messages: BTreeMap<Uid, StoredMessage>,
}

#[derive(Debug, Default)]
struct Server {
    mailboxes: Vec<StoredMailbox>,
    failures: HashMap<Step, VecDeque<TransportError>>,
    search_result: Option<Vec<Uid>>,
    validity_changes: Vec<(u64, String, UidValidity)>,
    commands: Vec<String>,
    connect_attempts: usize,
    connects: u64,
    logouts: usize,
}

impl Server {
    fn mailbox(&self, name: &str) -> Option<&StoredMailbox> {
        self.mailboxes.iter().find(|m| m.name == name)
    }

    fn mailbox_mut(&mut self, name: &str) -> Option<&mut StoredMailbox> {
        self.mailboxes.iter_mut().find(|m| m.name == name)
    }

    fn take_failure(&mut self, step: Step) -> Result<(), TransportError> {
        match self.failures.get_mut(&step).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Builds the raw RFC 822 text the scripted server stores for `uid`.
pub fn sample_message(uid: Uid) -> Vec<u8> {
    format!(
        "Message-ID: <{uid}@example.com>\r\n\
         From: sender@example.com\r\n\
         Subject: message {uid}\r\n\
         \r\n\
         body of message {uid}\r\n"
    )
    .into_bytes()
}

/// Opens [`ScriptedTransport`]s onto one shared in-memory server.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    server: Rc<RefCell<Server>>,
}

impl ScriptedConnector {
    /// An empty server.
    pub fn new() -> Self {
        ScriptedConnector::default()
    }

    /// Add a mailbox holding [`sample_message`]s under the given UIDs.
    pub fn mailbox(&self, name: &str, uid_validity: UidValidity, uids: impl IntoIterator<Item = Uid>) {
        let messages = uids
            .into_iter()
            .map(|uid| {
                let message = StoredMessage {
                    raw: sample_message(uid),
                    flags: Vec::new(),
                    date: 1_600_000_000 + i64::from(uid),
                };
                (uid, message)
            })
            .collect();
        self.server.borrow_mut().mailboxes.push(StoredMailbox {
            name: name.to_string(),
            attributes: Vec::new(),
            subscribed: false,
            uid_validity,
            messages,
        });
    }

    /// Add an empty mailbox carrying the given `LIST` attributes.
    pub fn folder(&self, name: &str, attributes: &[&str]) {
        self.mailbox(name, 1, []);
        if let Some(mailbox) = self.server.borrow_mut().mailbox_mut(name) {
            mailbox.attributes = attributes.iter().map(|a| a.to_string()).collect();
        }
    }

    /// Mark a mailbox as subscribed, so `LSUB` reports it.
    pub fn subscribe(&self, name: &str) {
        if let Some(mailbox) = self.server.borrow_mut().mailbox_mut(name) {
            mailbox.subscribed = true;
        }
    }

    /// Set flags on a stored message.
    pub fn set_flags(&self, mailbox: &str, uid: Uid, flags: &[&str]) {
        if let Some(message) = self
            .server
            .borrow_mut()
            .mailbox_mut(mailbox)
            .and_then(|m| m.messages.get_mut(&uid))
        {
            message.flags = flags.iter().map(|f| f.to_string()).collect();
        }
    }

    /// Make the next command of the given kind fail with `err`. Failures queue up per kind.
    pub fn fail(&self, step: Step, err: TransportError) {
        self.server
            .borrow_mut()
            .failures
            .entry(step)
            .or_default()
            .push_back(err);
    }

    /// Answer every `UID SEARCH` with these UIDs, in this order, whatever mailbox is selected.
    pub fn search_result(&self, uids: Vec<Uid>) {
        self.server.borrow_mut().search_result = Some(uids);
    }

    /// Recreate `mailbox` with a new validity when session number `connect` is opened.
    pub fn change_validity_on_connect(&self, connect: u64, mailbox: &str, uid_validity: UidValidity) {
        self.server
            .borrow_mut()
            .validity_changes
            .push((connect, mailbox.to_string(), uid_validity));
    }

    /// UIDs currently stored in `mailbox`.
    pub fn uids(&self, mailbox: &str) -> Vec<Uid> {
        self.server
            .borrow()
            .mailbox(mailbox)
            .map(|m| m.messages.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Flags currently stored on a message.
    pub fn flags(&self, mailbox: &str, uid: Uid) -> Vec<String> {
        self.server
            .borrow()
            .mailbox(mailbox)
            .and_then(|m| m.messages.get(&uid))
            .map(|m| m.flags.clone())
            .unwrap_or_default()
    }

    /// Every command received so far, failed ones included, e.g. `UID FETCH 1:3 (UID FLAGS)`.
    pub fn commands(&self) -> Vec<String> {
        self.server.borrow().commands.clone()
    }

    /// Commands received so far that start with `prefix`.
    pub fn commands_starting_with(&self, prefix: &str) -> Vec<String> {
        self.server
            .borrow()
            .commands
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// How many connects were attempted, failed ones included.
    pub fn connect_attempts(&self) -> usize {
        self.server.borrow().connect_attempts
    }

    /// How many sessions were opened.
    pub fn connects(&self) -> u64 {
        self.server.borrow().connects
    }

    /// How many sessions were logged out.
    pub fn logouts(&self) -> usize {
        self.server.borrow().logouts
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    fn connect(&mut self, _settings: &Settings) -> Result<ScriptedTransport, TransportError> {
        let mut server = self.server.borrow_mut();
        server.connect_attempts += 1;
        server.take_failure(Step::Connect)?;
        server.connects += 1;
        let connects = server.connects;
        let changes: Vec<(String, UidValidity)> = server
            .validity_changes
            .iter()
            .filter(|(at, _, _)| *at == connects)
            .map(|(_, name, validity)| (name.clone(), *validity))
            .collect();
        for (name, validity) in changes {
            if let Some(mailbox) = server.mailbox_mut(&name) {
                mailbox.uid_validity = validity;
            }
        }
        Ok(ScriptedTransport {
            server: Rc::clone(&self.server),
            selected: None,
            read_only: false,
        })
    }
}

/// One session with the scripted server. Selection state is per session, like a real server.
#[derive(Debug)]
pub struct ScriptedTransport {
    server: Rc<RefCell<Server>>,
    selected: Option<String>,
    read_only: bool,
}

impl ScriptedTransport {
    fn command(&self, step: Step, command: String) -> Result<(), TransportError> {
        let mut server = self.server.borrow_mut();
        server.commands.push(command);
        server.take_failure(step)
    }

    fn selected(&self) -> Result<String, TransportError> {
        self.selected
            .clone()
            .ok_or_else(|| TransportError::new(TransportErrorKind::Bad, "no mailbox selected"))
    }
}

fn status_of(mailbox: &StoredMailbox) -> MailboxStatus {
    MailboxStatus {
        exists: mailbox.messages.len() as u32,
        unseen: Some(
            mailbox
                .messages
                .values()
                .filter(|m| !m.flags.iter().any(|f| f == "\\Seen"))
                .count() as u32,
        ),
        uid_validity: Some(mailbox.uid_validity),
        uid_next: Some(mailbox.messages.keys().last().map_or(1, |uid| uid + 1)),
    }
}

fn no_such_mailbox(name: &str) -> TransportError {
    TransportError::new(TransportErrorKind::No, format!("no such mailbox {}", name))
}

/// Parse a sequence set such as `1:3,7,9:*`, with `*` standing for `max`.
fn parse_uid_set(set: &str, max: Uid) -> Vec<(Uid, Uid)> {
    let bound = |s: &str| {
        if s == "*" {
            Some(max)
        } else {
            s.parse().ok()
        }
    };
    set.split(',')
        .filter_map(|part| match part.split_once(':') {
            Some((a, b)) => {
                let (a, b) = (bound(a)?, bound(b)?);
                Some((a.min(b), a.max(b)))
            }
            None => bound(part).map(|uid| (uid, uid)),
        })
        .collect()
}

fn in_set(ranges: &[(Uid, Uid)], uid: Uid) -> bool {
    ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&uid))
}

fn header_of(raw: &[u8]) -> Vec<u8> {
    match raw.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(end) => raw[..end + 4].to_vec(),
        None => raw.to_vec(),
    }
}

impl Transport for ScriptedTransport {
    fn list(
        &mut self,
        reference: &str,
        pattern: &str,
        subscribed: bool,
    ) -> Result<Vec<ListedFolder>, TransportError> {
        let verb = if subscribed { "LSUB" } else { "LIST" };
        self.command(Step::List, format!("{} \"{}\" {}", verb, reference, pattern))?;
        let prefix = pattern.trim_end_matches('*');
        let server = self.server.borrow();
        Ok(server
            .mailboxes
            .iter()
            .filter(|m| !subscribed || m.subscribed)
            .filter(|m| {
                if pattern.ends_with('*') {
                    m.name.starts_with(prefix)
                } else {
                    m.name == pattern
                }
            })
            .map(|m| ListedFolder {
                name: m.name.clone(),
                delimiter: Some("/".to_string()),
                attributes: m.attributes.clone(),
            })
            .collect())
    }

    fn status(&mut self, mailbox: &str, items: &str) -> Result<MailboxStatus, TransportError> {
        self.command(Step::Status, format!("STATUS {} {}", mailbox, items))?;
        let server = self.server.borrow();
        server
            .mailbox(mailbox)
            .map(status_of)
            .ok_or_else(|| no_such_mailbox(mailbox))
    }

    fn select(&mut self, mailbox: &str, read_only: bool) -> Result<MailboxStatus, TransportError> {
        let verb = if read_only { "EXAMINE" } else { "SELECT" };
        self.command(Step::Select, format!("{} {}", verb, mailbox))?;
        let status = {
            let server = self.server.borrow();
            server
                .mailbox(mailbox)
                .map(status_of)
                .ok_or_else(|| no_such_mailbox(mailbox))?
        };
        self.selected = Some(mailbox.to_string());
        self.read_only = read_only;
        Ok(status)
    }

    fn uid_search(&mut self, criteria: &str) -> Result<Vec<Uid>, TransportError> {
        self.command(Step::Search, format!("UID SEARCH {}", criteria))?;
        if let Some(uids) = self.server.borrow().search_result.clone() {
            return Ok(uids);
        }
        let selected = self.selected()?;
        let server = self.server.borrow();
        let mailbox = server
            .mailbox(&selected)
            .ok_or_else(|| no_such_mailbox(&selected))?;
        let max = mailbox.messages.keys().last().copied().unwrap_or(0);
        let criteria = criteria.trim();
        let matching = mailbox.messages.iter().filter(|(uid, message)| {
            let seen = message.flags.iter().any(|f| f == "\\Seen");
            match criteria.split_once(' ') {
                Some(("UID", set)) => in_set(&parse_uid_set(set, max), **uid),
                _ if criteria.eq_ignore_ascii_case("UNSEEN") => !seen,
                _ if criteria.eq_ignore_ascii_case("SEEN") => seen,
                _ => true,
            }
        });
        // servers do not promise any order; answer highest first
        Ok(matching.map(|(uid, _)| *uid).rev().collect())
    }

    fn uid_fetch(
        &mut self,
        uid_set: &str,
        query: &str,
    ) -> Result<Vec<FetchedMessage>, TransportError> {
        self.command(Step::Fetch, format!("UID FETCH {} {}", uid_set, query))?;
        let selected = self.selected()?;
        let marks_seen = query.contains("BODY[]") && !self.read_only;
        let mut server = self.server.borrow_mut();
        let mailbox = server
            .mailbox_mut(&selected)
            .ok_or_else(|| no_such_mailbox(&selected))?;
        let max = mailbox.messages.keys().last().copied().unwrap_or(0);
        let ranges = parse_uid_set(uid_set, max);
        let mut fetched = Vec::new();
        for (uid, message) in mailbox.messages.iter_mut() {
            if !in_set(&ranges, *uid) {
                continue;
            }
            if marks_seen && !message.flags.iter().any(|f| f == "\\Seen") {
                message.flags.push("\\Seen".to_string());
            }
            fetched.push(FetchedMessage {
                uid: *uid,
                flags: message.flags.clone(),
                size: message.raw.len() as u32,
                internal_date: DateTime::from_timestamp(message.date, 0).map(|d| d.fixed_offset()),
                header: query
                    .contains("[HEADER]")
                    .then(|| header_of(&message.raw)),
                body: (query.contains("BODY[]") || query.contains("BODY.PEEK[]"))
                    .then(|| message.raw.clone()),
            });
        }
        Ok(fetched)
    }

    fn uid_store(&mut self, uid_set: &str, query: &str) -> Result<(), TransportError> {
        self.command(Step::Store, format!("UID STORE {} {}", uid_set, query))?;
        let selected = self.selected()?;
        if self.read_only {
            return Err(TransportError::new(TransportErrorKind::No, "mailbox is read-only"));
        }
        let flag = query
            .split_once('(')
            .map(|(_, rest)| rest.trim_end_matches(')').trim().to_string())
            .unwrap_or_default();
        let mut server = self.server.borrow_mut();
        let mailbox = server
            .mailbox_mut(&selected)
            .ok_or_else(|| no_such_mailbox(&selected))?;
        let max = mailbox.messages.keys().last().copied().unwrap_or(0);
        let ranges = parse_uid_set(uid_set, max);
        let removing = query.trim_start().starts_with('-');
        for (uid, message) in mailbox.messages.iter_mut() {
            if !in_set(&ranges, *uid) {
                continue;
            }
            if removing {
                message.flags.retain(|f| *f != flag);
            } else if !message.flags.contains(&flag) {
                message.flags.push(flag.clone());
            }
        }
        Ok(())
    }

    fn expunge(&mut self) -> Result<(), TransportError> {
        self.command(Step::Expunge, "EXPUNGE".to_string())?;
        let selected = self.selected()?;
        let mut server = self.server.borrow_mut();
        if let Some(mailbox) = server.mailbox_mut(&selected) {
            mailbox
                .messages
                .retain(|_, m| !m.flags.iter().any(|f| f == "\\Deleted"));
        }
        Ok(())
    }

    fn logout(&mut self) -> Result<(), TransportError> {
        self.command(Step::Logout, "LOGOUT".to_string())?;
        self.server.borrow_mut().logouts += 1;
        self.selected = None;
        Ok(())
    }
}
