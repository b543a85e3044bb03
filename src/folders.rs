//! Folder discovery.

use log::{debug, trace};

use crate::error::Result;
use crate::options::{Count, FolderOptions};
use crate::retriever::Retriever;
use crate::transport::{Connector, ListedFolder, MailboxStatus, Transport};
use crate::types::{normalize_flag, Folder, Found};
use crate::utf7;

const STATUS_ITEMS: &str = "(MESSAGES UNSEEN UIDVALIDITY UIDNEXT)";

impl<C: Connector> Retriever<C> {
    /// List folders matching `options`, each with its current counters.
    ///
    /// With `count: 1` and a single match, the folder is returned on its own.
    ///
    /// ```no_run
    /// use mail_retriever::matcher::NamePattern;
    /// use mail_retriever::{FolderOptions, Retriever, Settings};
    ///
    /// let mut retriever = Retriever::new(Settings::new("imap.example.com", 143));
    /// let mut options = FolderOptions::default();
    /// options.filter.include = vec![NamePattern::glob("Archive/*")?];
    /// for folder in retriever.find_folders(&options)? {
    ///     println!("{}: {} unseen", folder.name(), folder.unseen());
    /// }
    /// # Ok::<(), mail_retriever::Error>(())
    /// ```
    pub fn find_folders(&mut self, options: &FolderOptions) -> Result<Found<Folder>> {
        let mut folders = Vec::new();
        self.find_each_folder(options, |folder| folders.push(folder))?;
        Ok(Found::collapse(folders, options.count.is_single()))
    }

    /// Hand each matching folder to `on_folder` as soon as its status is known.
    pub fn find_each_folder<F>(&mut self, options: &FolderOptions, mut on_folder: F) -> Result<()>
    where
        F: FnMut(Folder),
    {
        let pattern = options.pattern();
        let mut lease = self.controller.lease();
        let listed = lease.run(|session| Ok(session.list("", &pattern, options.subscribed)?))?;
        debug!("{} folder(s) listed under {:?}", listed.len(), pattern);

        let mut taken = 0;
        for listed in listed {
            if let Count::Limit(limit) = options.count {
                if taken >= limit {
                    break;
                }
            }
            let name = utf7::decode(&listed.name);
            if !options.filter.matches(&name, &listed.attributes) {
                trace!("skipping {}", name);
                continue;
            }
            let status = if is_selectable(&listed) {
                lease.run(|session| Ok(session.status(&listed.name, STATUS_ITEMS)?))?
            } else {
                MailboxStatus::default()
            };
            on_folder(folder(name, listed, status));
            taken += 1;
        }
        Ok(())
    }
}

fn is_selectable(listed: &ListedFolder) -> bool {
    !listed
        .attributes
        .iter()
        .any(|a| normalize_flag(a) == "noselect" || normalize_flag(a) == "nonexistent")
}

fn folder(name: String, listed: ListedFolder, status: MailboxStatus) -> Folder {
    Folder {
        name,
        raw_name: listed.name,
        delimiter: listed.delimiter,
        attributes: listed.attributes,
        messages: status.exists,
        unseen: status.unseen.unwrap_or_default(),
        uid_validity: status.uid_validity,
        uid_next: status.uid_next,
    }
}
