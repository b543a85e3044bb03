//! Batched message and entry retrieval.

use std::collections::HashMap;

use log::{debug, trace, warn};

use crate::cursor::{batches, select_uids};
use crate::error::{Error, Result};
use crate::options::{Count, Normalized, RetrievalOptions, What};
use crate::retry::{Controller, Session};
use crate::settings::Settings;
use crate::transport::{Connector, FetchedMessage, ImapConnector, Transport};
use crate::types::{message_id, Entry, Found, Message, Uid, UidValidity};
use crate::utf7;
use crate::utils::uid_set;

const MARK_DELETED: &str = "+FLAGS.SILENT (\\Deleted)";
const UNMARK_DELETED: &str = "-FLAGS.SILENT (\\Deleted)";

/// Retrieves messages, entries and folders from one account.
///
/// Every public call takes the session for its own duration: it connects on first use, retries
/// and reconnects as its [`Settings`] allow, and logs out before returning, whether it succeeded
/// or not.
///
/// ```no_run
/// use mail_retriever::{Count, Order, RetrievalOptions, Retriever, Settings, What};
///
/// let mut settings = Settings::new("imap.example.com", 993);
/// settings.enable_ssl = true;
/// settings.user_name = Some("alice".into());
/// settings.password = Some("secret".into());
///
/// let mut retriever = Retriever::new(settings);
/// let options = RetrievalOptions {
///     what: What::Last,
///     count: Count::Limit(20),
///     order: Order::Desc,
///     read_only: true,
///     ..RetrievalOptions::default()
/// };
/// retriever.find_each(&options, |message| {
///     println!("{} {:?}", message.uid(), message.message_id());
/// })?;
/// # Ok::<(), mail_retriever::Error>(())
/// ```
pub struct Retriever<C: Connector = ImapConnector> {
    pub(crate) controller: Controller<C>,
}

impl Retriever<ImapConnector> {
    /// A retriever talking IMAP to the server named in `settings`.
    pub fn new(settings: Settings) -> Self {
        Retriever::with_connector(settings, ImapConnector)
    }
}

impl<C: Connector> Retriever<C> {
    /// A retriever that opens its sessions with `connector`.
    pub fn with_connector(settings: Settings, connector: C) -> Self {
        Retriever {
            controller: Controller::new(settings, connector),
        }
    }

    /// The settings this retriever connects with.
    pub fn settings(&self) -> &Settings {
        self.controller.settings()
    }

    /// Find messages, either all of them in one [`Found`] or, for `count: 1`, just the one.
    ///
    /// The result is in `options.order`.
    pub fn find(&mut self, options: &RetrievalOptions) -> Result<Found<Message>> {
        self.aggregate(options)
    }

    /// Hand each message to `on_message` as soon as its batch has been fetched.
    ///
    /// Messages arrive in selection order: lowest UID first for [`What::First`], highest first
    /// for [`What::Last`].
    pub fn find_each<F>(&mut self, options: &RetrievalOptions, mut on_message: F) -> Result<()>
    where
        F: FnMut(Message),
    {
        let options = options.normalize()?;
        self.retrieve(&options, |batch: Vec<Message>| {
            batch.into_iter().for_each(&mut on_message)
        })
    }

    /// Hand messages to `on_batch` one fetched batch at a time.
    ///
    /// With `delete_after_find`, every handed-out batch is marked `\Deleted` and the marks are
    /// expunged once, after the last batch. If anything fails before then, no message is
    /// deleted.
    pub fn find_in_batches<F>(&mut self, options: &RetrievalOptions, on_batch: F) -> Result<()>
    where
        F: FnMut(Vec<Message>),
    {
        let options = options.normalize()?;
        self.retrieve(&options, on_batch)
    }

    /// Like [`find`](Self::find), but fetches headers only.
    pub fn find_entries(&mut self, options: &RetrievalOptions) -> Result<Found<Entry>> {
        self.aggregate(options)
    }

    /// Like [`find_each`](Self::find_each), but fetches headers only.
    pub fn find_each_entry<F>(&mut self, options: &RetrievalOptions, mut on_entry: F) -> Result<()>
    where
        F: FnMut(Entry),
    {
        let options = options.normalize()?;
        self.retrieve(&options, |batch: Vec<Entry>| {
            batch.into_iter().for_each(&mut on_entry)
        })
    }

    /// Like [`find_in_batches`](Self::find_in_batches), but fetches headers only.
    ///
    /// Entries are lookups; `delete_after_find` is rejected.
    pub fn find_entries_in_batches<F>(&mut self, options: &RetrievalOptions, on_batch: F) -> Result<()>
    where
        F: FnMut(Vec<Entry>),
    {
        let options = options.normalize()?;
        self.retrieve(&options, on_batch)
    }

    /// Delete every message in `mailbox`, returning how many there were.
    pub fn delete_all(&mut self, mailbox: &str) -> Result<usize> {
        let mut lease = self.controller.lease();
        let mut cursor = Cursor::new(mailbox, false);
        let result = delete_all(&mut lease, &mut cursor);
        if result.is_err() {
            cursor.unmark(&mut lease);
        }
        result
    }

    fn aggregate<T: Fetchable>(&mut self, options: &RetrievalOptions) -> Result<Found<T>> {
        let options = options.normalize()?;
        let mut items: Vec<T> = Vec::new();
        self.retrieve(&options, |batch: Vec<T>| items.extend(batch))?;
        if options.needs_reversal() {
            items.reverse();
        }
        Ok(Found::collapse(items, options.count.is_single()))
    }

    fn retrieve<T, F>(&mut self, options: &Normalized, on_batch: F) -> Result<()>
    where
        T: Fetchable,
        F: FnMut(Vec<T>),
    {
        if options.delete_after_find && !T::DELETABLE {
            return Err(Error::InvalidOption(
                "delete_after_find is not supported for entries".into(),
            ));
        }

        let mut lease = self.controller.lease();
        let mut cursor = Cursor::new(&options.mailbox, options.read_only);
        let result = retrieve(&mut lease, &mut cursor, options, on_batch);
        if result.is_err() {
            cursor.unmark(&mut lease);
        }
        result
    }
}

fn retrieve<C, T, F>(
    controller: &mut Controller<C>,
    cursor: &mut Cursor,
    options: &Normalized,
    mut on_batch: F,
) -> Result<()>
where
    C: Connector,
    T: Fetchable,
    F: FnMut(Vec<T>),
{
    let found = controller.run(|session| {
        cursor.ensure_selected(session)?;
        Ok(session.uid_search(&options.criteria)?)
    })?;
    let uids = select_uids(found, options.what, options.count);
    debug!(
        "{}: {} message(s) selected for {:?}",
        options.mailbox,
        uids.len(),
        options.criteria
    );
    trace!("selected uids: {:?}", uids);

    let query = T::query(options.read_only);
    for (n, batch) in batches(&uids, options.batch_size).enumerate() {
        let set = uid_set(batch);
        debug!("batch {}: {} message(s)", n + 1, batch.len());
        let fetched = controller.run(|session| {
            cursor.ensure_selected(session)?;
            Ok(session.uid_fetch(&set, query)?)
        })?;
        on_batch(cursor.assemble(batch, fetched));

        if options.delete_after_find {
            controller.run(|session| {
                cursor.ensure_selected(session)?;
                session.uid_store(&set, MARK_DELETED)?;
                Ok(())
            })?;
            cursor.marked.extend_from_slice(batch);
        }
    }

    if !cursor.marked.is_empty() {
        controller.run(|session| {
            cursor.ensure_selected(session)?;
            Ok(session.expunge()?)
        })?;
        debug!(
            "expunged {} message(s) from {}",
            cursor.marked.len(),
            options.mailbox
        );
        cursor.marked.clear();
    }
    Ok(())
}

fn delete_all<C: Connector>(controller: &mut Controller<C>, cursor: &mut Cursor) -> Result<usize> {
    let uids = controller.run(|session| {
        cursor.ensure_selected(session)?;
        Ok(session.uid_search("ALL")?)
    })?;
    let uids = select_uids(uids, What::First, Count::All);
    if uids.is_empty() {
        debug!("{} is already empty", cursor.mailbox);
        return Ok(0);
    }

    let set = uid_set(&uids);
    controller.run(|session| {
        cursor.ensure_selected(session)?;
        session.uid_store(&set, MARK_DELETED)?;
        Ok(())
    })?;
    cursor.marked = uids;
    controller.run(|session| {
        cursor.ensure_selected(session)?;
        Ok(session.expunge()?)
    })?;
    let deleted = cursor.marked.len();
    debug!("deleted {} messages from {}", deleted, cursor.mailbox);
    cursor.marked.clear();
    Ok(deleted)
}

/// What a retrieval produces from one fetched message.
pub(crate) trait Fetchable: Sized {
    /// Whether retrieved items may be deleted afterwards.
    const DELETABLE: bool;

    /// The `UID FETCH` query.
    fn query(read_only: bool) -> &'static str;

    /// Build an item, or `None` if the server left out a part the item needs.
    fn from_fetch(fetched: FetchedMessage, folder: &str, uid_validity: UidValidity) -> Option<Self>;
}

impl Fetchable for Message {
    const DELETABLE: bool = true;

    fn query(read_only: bool) -> &'static str {
        // BODY[] sets \Seen, BODY.PEEK[] does not
        if read_only {
            "(UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[])"
        } else {
            "(UID FLAGS RFC822.SIZE INTERNALDATE BODY[])"
        }
    }

    fn from_fetch(fetched: FetchedMessage, folder: &str, uid_validity: UidValidity) -> Option<Self> {
        Some(Message {
            raw: fetched.body?,
            folder: folder.to_string(),
            uid_validity,
            uid: fetched.uid,
            flags: fetched.flags,
            size: fetched.size,
            date: fetched.internal_date,
        })
    }
}

impl Fetchable for Entry {
    const DELETABLE: bool = false;

    fn query(_read_only: bool) -> &'static str {
        "(UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[HEADER])"
    }

    fn from_fetch(fetched: FetchedMessage, folder: &str, uid_validity: UidValidity) -> Option<Self> {
        let message_id = fetched.header.as_deref().and_then(message_id);
        Some(Entry {
            folder: folder.to_string(),
            uid_validity,
            uid: fetched.uid,
            flags: fetched.flags,
            size: fetched.size,
            date: fetched.internal_date,
            message_id,
        })
    }
}

/// Where one call is in its mailbox, and what it has marked there so far.
struct Cursor {
    mailbox: String,
    encoded: String,
    read_only: bool,
    uid_validity: Option<UidValidity>,
    /// Session the mailbox was last selected on. Zero before the first selection.
    epoch: u64,
    marked: Vec<Uid>,
}

impl Cursor {
    fn new(mailbox: &str, read_only: bool) -> Self {
        Cursor {
            mailbox: mailbox.to_string(),
            encoded: utf7::encode(mailbox),
            read_only,
            uid_validity: None,
            epoch: 0,
            marked: Vec::new(),
        }
    }

    /// Select the mailbox if this session has not seen it yet.
    ///
    /// On a new session the validity must match what the call started with, and marks from
    /// earlier batches are set again before anything else happens.
    fn ensure_selected<T: Transport>(&mut self, session: &mut Session<T>) -> Result<()> {
        if session.epoch() == self.epoch {
            return Ok(());
        }
        let first = self.epoch == 0;
        let status = session.select(&self.encoded, self.read_only)?;
        match (self.uid_validity, status.uid_validity) {
            (Some(expected), Some(found)) if expected != found => {
                return Err(Error::UidValidityChanged {
                    mailbox: self.mailbox.clone(),
                    expected,
                    found,
                });
            }
            (None, found) => self.uid_validity = found,
            _ => {}
        }
        if !first {
            debug!("reselected {} on session {}", self.mailbox, session.epoch());
        }
        if !self.marked.is_empty() {
            let mut marked = self.marked.clone();
            marked.sort_unstable();
            debug!("marking {} message(s) deleted again", marked.len());
            session.uid_store(&uid_set(&marked), MARK_DELETED)?;
        }
        self.epoch = session.epoch();
        Ok(())
    }

    /// Take back the `\Deleted` marks of a call that failed before its expunge.
    ///
    /// Best effort: a failure here is logged, and the caller still sees the error that failed
    /// the call.
    fn unmark<C: Connector>(&mut self, controller: &mut Controller<C>) {
        if self.marked.is_empty() {
            return;
        }
        let mut marked = self.marked.clone();
        marked.sort_unstable();
        let set = uid_set(&marked);
        let result = controller.run(|session| {
            self.ensure_selected(session)?;
            session.uid_store(&set, UNMARK_DELETED)?;
            Ok(())
        });
        match result {
            Ok(()) => {
                debug!("unmarked {} message(s) in {}", marked.len(), self.mailbox);
                self.marked.clear();
            }
            Err(e) => warn!("could not unmark {} in {}: {}", set, self.mailbox, e),
        }
    }

    /// Turn a fetch response into items, in the batch's order.
    fn assemble<T: Fetchable>(&self, batch: &[Uid], fetched: Vec<FetchedMessage>) -> Vec<T> {
        let uid_validity = self.uid_validity.unwrap_or_default();
        let mut by_uid: HashMap<Uid, FetchedMessage> =
            fetched.into_iter().map(|f| (f.uid, f)).collect();
        batch
            .iter()
            .filter_map(|uid| match by_uid.remove(uid) {
                Some(fetched) => T::from_fetch(fetched, &self.mailbox, uid_validity),
                None => {
                    debug!("message {} vanished before it could be fetched", uid);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::UidSpec;
    use crate::error::{TransportError, TransportErrorKind};
    use crate::options::Order;
    use crate::testing::{ScriptedConnector, Step};

    fn retriever(server: &ScriptedConnector) -> Retriever<ScriptedConnector> {
        let settings = Settings {
            retry_delay_ms: 0,
            ..Settings::default()
        };
        Retriever::with_connector(settings, server.clone())
    }

    fn uids<T>(items: &[T], uid: impl Fn(&T) -> Uid) -> Vec<Uid> {
        items.iter().map(uid).collect()
    }

    fn reset() -> TransportError {
        TransportError::new(TransportErrorKind::ConnectionReset, "reset by peer")
    }

    #[test]
    fn last_two_descending_in_single_batches() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, 101..=105);
        let options = RetrievalOptions {
            what: What::Last,
            count: Count::Limit(2),
            batch_size: 1,
            order: Order::Desc,
            ..RetrievalOptions::default()
        };

        let mut seen = Vec::new();
        retriever(&server)
            .find_in_batches(&options, |batch| seen.push(uids(&batch, Message::uid)))
            .unwrap();
        assert_eq!(seen, [vec![105], vec![104]]);

        let found = retriever(&server).find(&options).unwrap().into_vec();
        assert_eq!(uids(&found, Message::uid), [105, 104]);
        assert!(found.iter().all(|m| m.uid_validity() == 7 && m.folder() == "INBOX"));
    }

    #[test]
    fn aggregate_reversal() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, 101..=105);
        let mut retriever = retriever(&server);
        let find = |r: &mut Retriever<ScriptedConnector>, what: What, order: Order| {
            let options = RetrievalOptions {
                what,
                order,
                count: Count::Limit(3),
                ..RetrievalOptions::default()
            };
            uids(&r.find(&options).unwrap().into_vec(), Message::uid)
        };
        assert_eq!(find(&mut retriever, What::Last, Order::Asc), [103, 104, 105]);
        assert_eq!(find(&mut retriever, What::First, Order::Asc), [101, 102, 103]);
        assert_eq!(find(&mut retriever, What::First, Order::Desc), [103, 102, 101]);
    }

    #[test]
    fn single_result_collapses() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, [1, 2]);
        let options = RetrievalOptions {
            count: Count::Limit(1),
            ..RetrievalOptions::default()
        };
        match retriever(&server).find(&options).unwrap() {
            Found::One(message) => assert_eq!(message.uid(), 1),
            other => panic!("expected one message, got {:?}", other),
        }

        let options = RetrievalOptions {
            count: Count::Limit(1),
            keys: "UNSEEN".to_string(),
            ..RetrievalOptions::default()
        };
        server.set_flags("INBOX", 1, &["\\Seen"]);
        server.set_flags("INBOX", 2, &["\\Seen"]);
        let found = retriever(&server).find(&options).unwrap();
        assert!(matches!(found, Found::Many(ref v) if v.is_empty()));
    }

    #[test]
    fn read_only_peeks_and_read_write_marks_seen() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, [1]);
        let options = RetrievalOptions {
            read_only: true,
            ..RetrievalOptions::default()
        };
        retriever(&server).find(&options).unwrap();
        assert_eq!(server.commands_starting_with("EXAMINE").len(), 1);
        assert!(server.flags("INBOX", 1).is_empty());

        retriever(&server).find(&RetrievalOptions::default()).unwrap();
        assert_eq!(server.flags("INBOX", 1), ["\\Seen"]);
    }

    #[test]
    fn entries_carry_message_ids() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 3, [10, 11]);
        let entries = retriever(&server)
            .find_entries(&RetrievalOptions::default())
            .unwrap()
            .into_vec();
        assert_eq!(entries[0].message_id(), Some("<10@example.com>"));
        assert_eq!(entries[1].uid(), 11);
        assert!(server
            .commands_starting_with("UID FETCH")
            .iter()
            .all(|c| c.ends_with("BODY.PEEK[HEADER])")));
    }

    #[test]
    fn entries_refuse_to_delete() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 3, [10]);
        let options = RetrievalOptions {
            delete_after_find: true,
            ..RetrievalOptions::default()
        };
        let result = retriever(&server).find_entries_in_batches(&options, |_| {});
        assert!(matches!(result, Err(Error::InvalidOption(_))));
        assert_eq!(server.connects(), 0);
    }

    #[test]
    fn delete_after_find_expunges_once() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, 1..=5);
        let options = RetrievalOptions {
            batch_size: 2,
            count: Count::All,
            delete_after_find: true,
            ..RetrievalOptions::default()
        };
        let mut batches = 0;
        retriever(&server)
            .find_in_batches(&options, |_| batches += 1)
            .unwrap();
        assert_eq!(batches, 3);
        assert_eq!(server.commands_starting_with("UID STORE").len(), 3);
        assert_eq!(server.commands_starting_with("EXPUNGE").len(), 1);
        assert!(server.uids("INBOX").is_empty());
    }

    #[test]
    fn failed_batch_deletes_nothing() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, 1..=4);
        let options = RetrievalOptions {
            batch_size: 2,
            delete_after_find: true,
            ..RetrievalOptions::default()
        };
        let mut batches = 0;
        let result = retriever(&server).find_in_batches(&options, |_| {
            batches += 1;
            // the first batch goes through, the second fetch is refused
            server.fail(Step::Fetch, TransportError::new(TransportErrorKind::No, "refused"));
        });
        assert_eq!(batches, 1);
        assert!(matches!(result, Err(Error::Server(_))));
        assert_eq!(server.uids("INBOX"), [1, 2, 3, 4]);
        assert!(server.commands_starting_with("EXPUNGE").is_empty());
    }

    fn is_marked(server: &ScriptedConnector, uid: Uid) -> bool {
        server.flags("INBOX", uid).iter().any(|f| f == "\\Deleted")
    }

    #[test]
    fn failed_call_takes_back_its_marks() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, 1..=4);
        let options = RetrievalOptions {
            batch_size: 1,
            count: Count::All,
            delete_after_find: true,
            ..RetrievalOptions::default()
        };
        let result = retriever(&server).find_in_batches(&options, |_| {
            server.fail(Step::Fetch, TransportError::new(TransportErrorKind::No, "refused"));
        });
        assert!(matches!(result, Err(Error::Server(_))));
        assert!(!is_marked(&server, 1));
        assert_eq!(
            server.commands_starting_with("UID STORE"),
            [
                "UID STORE 1 +FLAGS.SILENT (\\Deleted)",
                "UID STORE 1 -FLAGS.SILENT (\\Deleted)",
            ]
        );

        // a later call only expunges what it handed out itself
        let options = RetrievalOptions {
            count: Count::Limit(1),
            delete_after_find: true,
            ..RetrievalOptions::default()
        };
        let found = retriever(&server).find(&options).unwrap();
        assert!(matches!(found, Found::One(ref m) if m.uid() == 1));
        assert_eq!(server.uids("INBOX"), [2, 3, 4]);
    }

    #[test]
    fn reconnect_during_expunge_remarks_and_expunges_once_more() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, 1..=4);
        server.fail(Step::Expunge, reset());
        let options = RetrievalOptions {
            batch_size: 2,
            delete_after_find: true,
            ..RetrievalOptions::default()
        };
        retriever(&server).find_in_batches(&options, |_| {}).unwrap();

        assert_eq!(server.connects(), 2);
        assert_eq!(
            server.commands_starting_with("UID STORE"),
            [
                "UID STORE 1:2 +FLAGS.SILENT (\\Deleted)",
                "UID STORE 3:4 +FLAGS.SILENT (\\Deleted)",
                "UID STORE 1:4 +FLAGS.SILENT (\\Deleted)",
            ]
        );
        let commands = server.commands();
        let tail: Vec<&str> = commands[commands.len() - 4..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            [
                "SELECT INBOX",
                "UID STORE 1:4 +FLAGS.SILENT (\\Deleted)",
                "EXPUNGE",
                "LOGOUT"
            ]
        );
        assert_eq!(server.commands_starting_with("EXPUNGE").len(), 2);
        assert!(server.uids("INBOX").is_empty());
        assert_eq!(server.logouts(), 1);
    }

    #[test]
    fn uid_criteria_reach_the_search() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, 1..=6);
        let mut retriever = retriever(&server);

        let options = RetrievalOptions {
            uid: Some(UidSpec::from(2..=4)),
            count: Count::All,
            ..RetrievalOptions::default()
        };
        let found = retriever.find(&options).unwrap().into_vec();
        assert_eq!(uids(&found, Message::uid), [2, 3, 4]);

        let options = RetrievalOptions {
            uid: Some(UidSpec::Bounded {
                from: Some(5),
                to: None,
            }),
            count: Count::All,
            ..RetrievalOptions::default()
        };
        let found = retriever.find(&options).unwrap().into_vec();
        assert_eq!(uids(&found, Message::uid), [5, 6]);

        assert_eq!(
            server.commands_starting_with("UID SEARCH"),
            ["UID SEARCH UID 2,3,4", "UID SEARCH UID 5:*"]
        );
    }

    #[test]
    fn reconnect_reselects_and_remarks() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, 1..=4);
        let options = RetrievalOptions {
            batch_size: 2,
            delete_after_find: true,
            ..RetrievalOptions::default()
        };
        let mut retriever = retriever(&server);
        let mut fetches = 0;
        let mut seen = Vec::new();
        retriever
            .find_in_batches(&options, |batch| {
                fetches += 1;
                if fetches == 1 {
                    // the connection drops while the second batch is being fetched
                    server.fail(Step::Fetch, reset());
                }
                seen.extend(uids(&batch, Message::uid));
            })
            .unwrap();

        assert_eq!(seen, [1, 2, 3, 4]);
        assert_eq!(server.connects(), 2);
        assert_eq!(server.commands_starting_with("SELECT INBOX").len(), 2);
        assert_eq!(
            server.commands_starting_with("UID STORE"),
            [
                "UID STORE 1:2 +FLAGS.SILENT (\\Deleted)",
                "UID STORE 1:2 +FLAGS.SILENT (\\Deleted)",
                "UID STORE 3:4 +FLAGS.SILENT (\\Deleted)",
            ]
        );
        assert!(server.uids("INBOX").is_empty());
        assert_eq!(server.logouts(), 1);
    }

    #[test]
    fn validity_change_aborts_without_deleting() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, 1..=4);
        server.change_validity_on_connect(2, "INBOX", 8);
        let options = RetrievalOptions {
            batch_size: 2,
            delete_after_find: true,
            ..RetrievalOptions::default()
        };
        let mut fetches = 0;
        let result = retriever(&server).find_in_batches(&options, |_| {
            fetches += 1;
            if fetches == 1 {
                server.fail(Step::Fetch, reset());
            }
        });
        match result {
            Err(Error::UidValidityChanged {
                expected, found, ..
            }) => assert_eq!((expected, found), (7, 8)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(server.uids("INBOX").len(), 4);
        assert_eq!(server.logouts(), 1);
    }

    #[test]
    fn delete_all_marks_everything_and_expunges_once() {
        let server = ScriptedConnector::new();
        server.mailbox("Trash", 2, [3, 4, 5, 9]);
        assert_eq!(retriever(&server).delete_all("Trash").unwrap(), 4);
        assert!(server.uids("Trash").is_empty());
        assert_eq!(
            server.commands_starting_with("UID STORE"),
            ["UID STORE 3:5,9 +FLAGS.SILENT (\\Deleted)"]
        );
        assert_eq!(server.commands_starting_with("EXPUNGE").len(), 1);

        assert_eq!(retriever(&server).delete_all("Trash").unwrap(), 0);
        assert_eq!(server.commands_starting_with("EXPUNGE").len(), 1);
    }

    #[test]
    fn refused_delete_all_leaves_no_marks() {
        let server = ScriptedConnector::new();
        server.mailbox("Trash", 2, [1, 2]);
        server.fail(Step::Expunge, TransportError::new(TransportErrorKind::No, "quota"));
        let result = retriever(&server).delete_all("Trash");
        assert!(matches!(result, Err(Error::Server(_))));
        assert_eq!(server.uids("Trash"), [1, 2]);
        assert!(server.flags("Trash", 1).is_empty());
        assert_eq!(
            server.commands_starting_with("UID STORE"),
            [
                "UID STORE 1:2 +FLAGS.SILENT (\\Deleted)",
                "UID STORE 1:2 -FLAGS.SILENT (\\Deleted)",
            ]
        );
    }

    #[test]
    fn mailbox_names_are_encoded() {
        let server = ScriptedConnector::new();
        server.mailbox("Entw&APw-rfe", 1, [1]);
        let found = retriever(&server)
            .find(&RetrievalOptions::mailbox("Entwürfe"))
            .unwrap()
            .into_vec();
        assert_eq!(found[0].folder(), "Entwürfe");
        assert_eq!(server.commands_starting_with("SELECT")[0], "SELECT Entw&APw-rfe");
    }

    #[test]
    fn every_call_logs_out() {
        let server = ScriptedConnector::new();
        server.mailbox("INBOX", 7, [1]);
        let mut retriever = retriever(&server);
        retriever.find(&RetrievalOptions::default()).unwrap();
        retriever.find_each(&RetrievalOptions::default(), |_| {}).unwrap();
        let missing = retriever.find(&RetrievalOptions::mailbox("Nope"));
        assert!(matches!(missing, Err(Error::Server(_))));
        assert_eq!(server.connects(), 3);
        assert_eq!(server.logouts(), 3);
    }
}
