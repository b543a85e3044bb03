//! Retrieval over POP3.
//!
//! POP3 has no folders, no flags and no server-side search, so a [`Pop3Retriever`] is much
//! simpler than its IMAP counterpart: every call opens one session, lists the maildrop, retrieves
//! what was asked for, and quits. There is no retry and no batching. Deletions are committed by
//! `QUIT` at the very end of a call; if anything fails first, the connection is dropped without
//! `QUIT` and the server forgets the deletions.

use std::io::{Read, Write};

use log::debug;
use mailparse::ParsedMail;

use crate::error::Result;
use crate::options::{Count, RetrievalOptions, What};
use crate::settings::Settings;
use crate::transport::{open_stream, MailStream};
use crate::types::{message_id, Found};

mod client;
pub use self::client::{Listing, Pop3Client};

/// A message retrieved over POP3.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pop3Message {
    number: u32,
    uid: Option<String>,
    raw: Vec<u8>,
}

impl Pop3Message {
    /// The message number it had in the session it was retrieved in.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The `UIDL` id, stable across sessions, if the server reports one.
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// The message as received.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Parse the message.
    pub fn parse(&self) -> Result<ParsedMail<'_>> {
        Ok(mailparse::parse_mail(&self.raw)?)
    }

    /// The `Message-ID` header, if there is one.
    pub fn message_id(&self) -> Option<String> {
        message_id(&self.raw)
    }
}

/// Retrieves messages from a POP3 maildrop.
///
/// Honors `what`, `count`, `order` and `delete_after_find` of [`RetrievalOptions`] the same way
/// [`Retriever`](crate::Retriever) does; the mailbox, search and batch options do not apply.
#[derive(Clone, Debug)]
pub struct Pop3Retriever {
    settings: Settings,
}

impl Pop3Retriever {
    /// A retriever for the maildrop named in `settings`.
    pub fn new(settings: Settings) -> Self {
        Pop3Retriever { settings }
    }

    /// The settings this retriever connects with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Retrieve messages, collapsing a single result for `count: 1`.
    pub fn find(&mut self, options: &RetrievalOptions) -> Result<Found<Pop3Message>> {
        let mut client = self.open()?;
        let found = find(&mut client, options)?;
        client.quit()?;
        Ok(found)
    }

    /// Hand each message to `on_message` as soon as it has been retrieved.
    pub fn find_each<F>(&mut self, options: &RetrievalOptions, on_message: F) -> Result<()>
    where
        F: FnMut(Pop3Message),
    {
        let mut client = self.open()?;
        find_each(&mut client, options, on_message)?;
        client.quit()
    }

    /// Delete every message in the maildrop, returning how many there were.
    pub fn delete_all(&mut self) -> Result<usize> {
        let mut client = self.open()?;
        let deleted = delete_all(&mut client)?;
        client.quit()?;
        Ok(deleted)
    }

    fn open(&self) -> Result<Pop3Client<Box<dyn MailStream>>> {
        let mut client = Pop3Client::new(open_stream(&self.settings)?);
        client.read_greeting()?;
        let user = self.settings.user_name.as_deref().unwrap_or_default();
        let password = self.settings.password.as_deref().unwrap_or_default();
        client.login(user, password)?;
        debug!("logged in to {}", self.settings.address);
        Ok(client)
    }
}

fn find<T: Read + Write>(
    client: &mut Pop3Client<T>,
    options: &RetrievalOptions,
) -> Result<Found<Pop3Message>> {
    let normalized = options.normalize()?;
    let mut messages = Vec::new();
    find_each(client, options, |m| messages.push(m))?;
    if normalized.needs_reversal() {
        messages.reverse();
    }
    Ok(Found::collapse(messages, options.count.is_single()))
}

fn find_each<T, F>(client: &mut Pop3Client<T>, options: &RetrievalOptions, mut on_message: F) -> Result<()>
where
    T: Read + Write,
    F: FnMut(Pop3Message),
{
    options.normalize()?;
    let mut listings = client.list()?;
    // a previous session may have been cut off after DELE
    client.rset()?;
    if options.what == What::Last {
        listings.reverse();
    }
    if let Count::Limit(n) = options.count {
        listings.truncate(n);
    }
    debug!("retrieving {} message(s)", listings.len());

    for listing in listings {
        let raw = client.retr(listing.number)?;
        let number = listing.number;
        on_message(Pop3Message {
            number,
            uid: listing.uid,
            raw,
        });
        if options.delete_after_find {
            client.dele(number)?;
        }
    }
    Ok(())
}

fn delete_all<T: Read + Write>(client: &mut Pop3Client<T>) -> Result<usize> {
    let listings = client.list()?;
    for listing in &listings {
        client.dele(listing.number)?;
    }
    debug!("marked {} message(s) for deletion", listings.len());
    Ok(listings.len())
}
