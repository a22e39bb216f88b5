/*
 * vSMTP mail transfer agent
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
*/
use crate::{ListLock, LockError, MailingList, Pending};
use anyhow::Context;
use listd_config::Config;

const CONFIG_FILENAME: &str = "config.json";
const LOCK_FILENAME: &str = "lock";
const PENDING_FILENAME: &str = "pending.json";
const DIGEST_FILENAME: &str = "digest.mbox";

/// The directory holding one sub directory per list.
#[derive(Debug, Clone)]
pub struct ListStore {
    dirpath: std::path::PathBuf,
    lock_timeout: std::time::Duration,
    lock_lifetime: std::time::Duration,
    pending_lifetime: std::time::Duration,
}

impl ListStore {
    ///
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            dirpath: config.server.lists.dirpath.clone(),
            lock_timeout: config.server.lists.lock_timeout,
            lock_lifetime: config.server.lists.lock_lifetime,
            pending_lifetime: config.server.pending.lifetime,
        }
    }

    /// Directory of the list `name`.
    #[must_use]
    pub fn list_dirpath(&self, name: &str) -> std::path::PathBuf {
        self.dirpath.join(name)
    }

    /// The mbox accumulating the posts of the next digest.
    #[must_use]
    pub fn digest_path(&self, name: &str) -> std::path::PathBuf {
        self.list_dirpath(name).join(DIGEST_FILENAME)
    }

    ///
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.list_dirpath(name).join(CONFIG_FILENAME).is_file()
    }

    /// Names of every list, sorted.
    ///
    /// # Errors
    ///
    /// * the lists directory could not be read
    pub fn names(&self) -> anyhow::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dirpath) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("Failed to read '{}'", self.dirpath.display()))
            }
        };

        let mut names = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| self.exists(name))
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    /// Read the state of a list.
    ///
    /// # Errors
    ///
    /// * the list does not exist
    /// * the state could not be parsed
    pub fn load(&self, name: &str) -> anyhow::Result<MailingList> {
        let path = self.list_dirpath(name).join(CONFIG_FILENAME);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("No such list: `{name}` ('{}')", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse '{}'", path.display()))
    }

    /// Persist the state of a list atomically.
    ///
    /// # Errors
    ///
    /// * the state could not be serialized or written
    pub fn save(&self, list: &MailingList) -> anyhow::Result<()> {
        let dirpath = self.list_dirpath(&list.name);
        std::fs::create_dir_all(&dirpath)
            .with_context(|| format!("Failed to create '{}'", dirpath.display()))?;

        let content = serde_json::to_vec_pretty(list)?;
        listd_common::utils::atomic_write(&dirpath.join(CONFIG_FILENAME), &content)
    }

    /// Persist a new list.
    ///
    /// # Errors
    ///
    /// * a list with the same name exists
    /// * see [`ListStore::save`]
    pub fn create(&self, list: &MailingList) -> anyhow::Result<()> {
        if self.exists(&list.name) {
            anyhow::bail!("List `{}` already exists", list.name);
        }
        self.save(list)?;
        tracing::info!(list = %list.name, "List created.");
        Ok(())
    }

    /// Take the lock of a list with the configured timeout.
    ///
    /// # Errors
    ///
    /// * see [`ListLock::acquire`]
    pub fn lock(&self, name: &str) -> Result<ListLock, LockError> {
        ListLock::acquire(
            self.list_dirpath(name).join(LOCK_FILENAME),
            self.lock_timeout,
            self.lock_lifetime,
        )
    }

    /// The pending confirmations of a list.
    #[must_use]
    pub fn pending(&self, name: &str) -> Pending {
        Pending::new(
            self.list_dirpath(name).join(PENDING_FILENAME),
            self.pending_lifetime,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Member;
    use pretty_assertions::assert_eq;

    #[test]
    fn create_load_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = ListStore::new(&listd_test::config::local_test(dir.path()));

        let mut list = MailingList::new("test", "lists.testserver.com");
        list.add_member(Member::new("alice@example.com"));
        store.create(&list).unwrap();
        assert!(store.create(&list).is_err());

        list.post_id = 42;
        store.save(&list).unwrap();
        assert_eq!(store.load("test").unwrap(), list);

        store
            .save(&MailingList::new("other", "lists.testserver.com"))
            .unwrap();
        std::fs::create_dir_all(store.list_dirpath("not-a-list")).unwrap();
        assert_eq!(store.names().unwrap(), vec!["other", "test"]);
    }

    #[test]
    fn unknown_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = ListStore::new(&listd_test::config::local_test(dir.path()));

        assert!(!store.exists("nope"));
        assert!(store.names().unwrap().is_empty());
        assert!(store
            .load("nope")
            .unwrap_err()
            .to_string()
            .starts_with("No such list: `nope`"));
    }

    #[test]
    fn lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = ListStore::new(&listd_test::config::local_test(dir.path()));
        store
            .create(&MailingList::new("test", "lists.testserver.com"))
            .unwrap();

        let lock = store.lock("test").unwrap();
        assert!(matches!(
            store.lock("test").unwrap_err(),
            LockError::Timeout { .. }
        ));
        drop(lock);
        assert!(store.lock("test").is_ok());
    }
}
