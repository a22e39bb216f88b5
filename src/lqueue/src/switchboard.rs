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
use crate::{codec, EntryId, Extension, Slice};
use anyhow::Context;
use listd_common::{metadata::keys, utils, Mail, Metadata, QueueName};
use listd_config::{field::FieldServerQueues, Config};

/// Name of the directory of the spool holding quarantined entries.
pub const BAD_DIRNAME: &str = "bad";

/// Number of crash recoveries after which an entry is quarantined.
pub const MAX_BAK_COUNT: u32 = 3;

/// Added to colliding timestamps so that every entry gets its own rank.
const DELTA: f64 = 0.001;

/// Removes the dequeue lock when dropped.
struct LockGuard {
    path: std::path::PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), %error, "Failed to release lock.");
        }
    }
}

/// Owner of one queue directory of the spool.
#[derive(Debug)]
pub struct Switchboard {
    queue: QueueName,
    dirpath: std::path::PathBuf,
    bad_dirpath: std::path::PathBuf,
    slice: Slice,
    settings: FieldServerQueues,
}

impl Switchboard {
    /// Open a queue to produce entries, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// * the directories could not be created
    pub fn open(config: &Config, queue: QueueName) -> anyhow::Result<Self> {
        let this = Self {
            queue,
            dirpath: config.queue_dirpath(queue),
            bad_dirpath: config.server.queues.dirpath.join(BAD_DIRNAME),
            slice: Slice::whole(),
            settings: config.server.queues.clone(),
        };

        for dir in [&this.dirpath, &this.bad_dirpath] {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("could not create `{queue}` directory at `{}`", dir.display())
            })?;
        }

        Ok(this)
    }

    /// Open a queue on behalf of the runner draining `slice` of it, putting
    /// back the entries a previous runner left in process.
    ///
    /// # Errors
    ///
    /// * see [`Switchboard::open`] and [`Switchboard::recover_backup_files`]
    pub fn open_and_recover(
        config: &Config,
        queue: QueueName,
        slice: Slice,
    ) -> anyhow::Result<Self> {
        let mut this = Self::open(config, queue)?;
        this.slice = slice;
        let recovered = this.recover_backup_files()?;
        if recovered != 0 {
            tracing::info!(queue = %queue, %slice, recovered, "Entries recovered.");
        }
        Ok(this)
    }

    ///
    #[must_use]
    pub const fn queue(&self) -> QueueName {
        self.queue
    }

    ///
    #[must_use]
    pub fn dirpath(&self) -> &std::path::Path {
        &self.dirpath
    }

    ///
    #[must_use]
    pub fn bad_dirpath(&self) -> &std::path::Path {
        &self.bad_dirpath
    }

    ///
    #[must_use]
    pub const fn slice(&self) -> Slice {
        self.slice
    }

    /// Path of the file holding `id` in the given state.
    #[must_use]
    pub fn entry_path(&self, id: &EntryId, extension: Extension) -> std::path::PathBuf {
        match extension {
            Extension::Psv => self.bad_dirpath.join(id.filename(extension)),
            Extension::Pck | Extension::Bak => self.dirpath.join(id.filename(extension)),
        }
    }

    fn lock_path(&self, id: &EntryId) -> std::path::PathBuf {
        self.dirpath.join(format!("{}.lock", id.filename(Extension::Pck)))
    }

    /// Modification time of the queue directory.
    ///
    /// # Errors
    ///
    /// * the metadata of the directory could not be read
    pub fn mtime(&self) -> std::io::Result<std::time::SystemTime> {
        std::fs::metadata(&self.dirpath)?.modified()
    }

    /// Persist a new entry. Volatile keys (starting with `_`) are dropped and
    /// `received_time` defaults to now.
    ///
    /// The entry becomes visible to [`Switchboard::files`] only once it is
    /// completely written.
    ///
    /// # Errors
    ///
    /// * the entry could not be serialized
    /// * the file could not be written, synced or renamed
    pub fn enqueue(&self, mail: &Mail, metadata: &Metadata) -> anyhow::Result<EntryId> {
        let now = utils::now_epoch();
        let mut metadata = metadata.persistent();
        if !metadata.contains(keys::RECEIVED_TIME) {
            metadata.insert(keys::RECEIVED_TIME, now);
        }

        let content = codec::encode(mail, &metadata)?;
        let id = EntryId::generate(&content, now, metadata.listname().unwrap_or_default());

        utils::atomic_write(&self.entry_path(&id, Extension::Pck), &content)
            .with_context(|| format!("Failed to enqueue `{id}` in `{}`", self.queue))?;

        tracing::debug!(queue = %self.queue, %id, "Entry enqueued.");
        Ok(id)
    }

    fn lock(&self, id: &EntryId) -> anyhow::Result<Option<LockGuard>> {
        let path = self.lock_path(id);

        for _ in 0..=self.settings.dequeue_lock_retries {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    let guard = LockGuard { path };
                    std::io::Write::write_all(&mut file, std::process::id().to_string().as_bytes())?;
                    return Ok(Some(guard));
                }
                Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                    if utils::file_age(&path).map_or(false, |age| age > self.settings.lock_lifetime)
                    {
                        tracing::warn!(queue = %self.queue, %id, "Breaking stale lock.");
                        if let Err(error) = std::fs::remove_file(&path) {
                            tracing::warn!(%error, "Failed to break lock.");
                        }
                        continue;
                    }
                    std::thread::sleep(self.settings.dequeue_lock_sleep);
                }
                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("Failed to create lock '{}'", path.display()))
                }
            }
        }

        Ok(None)
    }

    /// Take the responsibility of an entry. Returns `None` if another process
    /// holds it, if it does not exist anymore or if it cannot be read or
    /// decoded (it is quarantined then).
    ///
    /// The entry stays on disk as `<id>.bak` until [`Switchboard::finish`].
    ///
    /// # Errors
    ///
    /// * the filesystem failed
    pub fn dequeue(&self, id: &EntryId) -> anyhow::Result<Option<(Mail, Metadata)>> {
        let Some(_lock) = self.lock(id)? else {
            tracing::debug!(queue = %self.queue, %id, "Entry locked by another process.");
            return Ok(None);
        };

        let pck = self.entry_path(id, Extension::Pck);
        let bak = self.entry_path(id, Extension::Bak);
        match std::fs::rename(&pck, &bak) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error).with_context(|| format!("Failed to dequeue '{}'", pck.display()))
            }
        }

        let content = match std::fs::read(&bak) {
            Ok(content) => content,
            Err(error) => {
                tracing::error!(queue = %self.queue, %id, %error, "Unreadable entry, quarantined.");
                self.finish(id, true)?;
                return Ok(None);
            }
        };

        match codec::decode(&content) {
            Ok((mail, mut metadata)) => {
                metadata.insert(keys::FILEBASE, id.as_str());
                Ok(Some((mail, metadata)))
            }
            Err(error) => {
                tracing::error!(queue = %self.queue, %id, %error, "Undecodable entry, quarantined.");
                self.finish(id, true)?;
                Ok(None)
            }
        }
    }

    /// Release an entry returned by [`Switchboard::dequeue`], deleting it or,
    /// with `preserve`, moving it to the bad directory.
    ///
    /// # Errors
    ///
    /// * the file could not be removed or moved
    pub fn finish(&self, id: &EntryId, preserve: bool) -> anyhow::Result<()> {
        let bak = self.entry_path(id, Extension::Bak);
        if preserve {
            let psv = self.entry_path(id, Extension::Psv);
            std::fs::rename(&bak, &psv).with_context(|| {
                format!("Failed to preserve '{}' as '{}'", bak.display(), psv.display())
            })?;
            tracing::warn!(queue = %self.queue, %id, "Entry preserved in the bad directory.");
        } else {
            std::fs::remove_file(&bak)
                .with_context(|| format!("Failed to remove '{}'", bak.display()))?;
        }
        Ok(())
    }

    fn quarantine(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let stem = path
            .file_stem()
            .unwrap_or_else(|| path.as_os_str())
            .to_string_lossy();
        let psv = self.bad_dirpath.join(format!("{stem}.{}", Extension::Psv));

        tracing::warn!(queue = %self.queue, from = %path.display(), to = %psv.display(), "Quarantining file.");
        std::fs::rename(path, &psv).with_context(|| {
            format!("Failed to quarantine '{}' as '{}'", path.display(), psv.display())
        })
    }

    fn recover_one(&self, id: &EntryId, now: f64) -> anyhow::Result<bool> {
        let bak = self.entry_path(id, Extension::Bak);

        if now - id.timestamp() > self.settings.max_item_lifetime.as_secs_f64() {
            tracing::warn!(queue = %self.queue, %id, "Entry exceeded its lifetime.");
            self.quarantine(&bak)?;
            return Ok(false);
        }

        let content = match std::fs::read(&bak) {
            Ok(content) => content,
            Err(error) => {
                tracing::error!(queue = %self.queue, %id, %error, "Unreadable backup.");
                self.quarantine(&bak)?;
                return Ok(false);
            }
        };
        let (mail, mut metadata) = match codec::decode(&content) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::error!(queue = %self.queue, %id, %error, "Undecodable backup.");
                self.quarantine(&bak)?;
                return Ok(false);
            }
        };

        let count = metadata.bak_count() + 1;
        metadata.insert(keys::BAK_COUNT, count);
        let mut history = metadata
            .get_as::<Vec<serde_json::Value>>(keys::RECOVERY_HISTORY)
            .unwrap_or_default();
        history.push(serde_json::json!({
            "time": now,
            "pid": std::process::id(),
            "count": count,
        }));
        metadata.insert(keys::RECOVERY_HISTORY, history);

        utils::atomic_write(&bak, &codec::encode(&mail, &metadata)?)?;

        if count >= MAX_BAK_COUNT {
            tracing::error!(queue = %self.queue, %id, count, "Entry recovered too many times.");
            self.quarantine(&bak)?;
            return Ok(false);
        }

        let pck = self.entry_path(id, Extension::Pck);
        std::fs::rename(&bak, &pck).with_context(|| {
            format!("Failed to restore '{}' as '{}'", bak.display(), pck.display())
        })?;
        Ok(true)
    }

    fn remove_orphans(&self) -> anyhow::Result<()> {
        for entry in std::fs::read_dir(&self.dirpath)
            .with_context(|| format!("Failed to list '{}'", self.dirpath.display()))?
        {
            let path = entry?.path();
            let orphan = matches!(
                path.extension().and_then(std::ffi::OsStr::to_str),
                Some("tmp" | "lock")
            );
            if orphan
                && utils::file_age(&path).map_or(false, |age| age > self.settings.lock_lifetime)
            {
                tracing::warn!(queue = %self.queue, path = %path.display(), "Removing orphan file.");
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove '{}'", path.display()))?;
            }
        }
        Ok(())
    }

    /// Put back in the queue the entries of the slice left as `.bak` by a
    /// runner that died. Returns the number of entries restored.
    ///
    /// Entries older than `max_item_lifetime`, unreadable, undecodable, or
    /// recovered [`MAX_BAK_COUNT`] times are quarantined instead. A backup that
    /// cannot be handled at all is logged and left in place.
    ///
    /// # Errors
    ///
    /// * the filesystem failed
    pub fn recover_backup_files(&self) -> anyhow::Result<usize> {
        let now = utils::now_epoch();
        let mut recovered = 0;
        for id in self.files(Extension::Bak)? {
            match self.recover_one(&id, now) {
                Ok(true) => recovered += 1,
                Ok(false) => {}
                Err(error) => {
                    tracing::error!(queue = %self.queue, %id, error = format!("{error:#}"), "Failed to recover the backup.");
                }
            }
        }
        self.remove_orphans()?;
        Ok(recovered)
    }

    /// Ids of the entries of the slice with the given extension, oldest first.
    /// Files whose name is not an entry id are quarantined.
    ///
    /// # Errors
    ///
    /// * the directory could not be read
    pub fn files(&self, extension: Extension) -> anyhow::Result<Vec<EntryId>> {
        let mut ranked = std::collections::BTreeMap::<u64, EntryId>::new();

        for entry in std::fs::read_dir(&self.dirpath)
            .with_context(|| format!("Failed to list '{}'", self.dirpath.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(std::ffi::OsStr::to_str) != Some(extension.to_string().as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(std::ffi::OsStr::to_str) else {
                self.quarantine(&path)?;
                continue;
            };
            let id = match stem.parse::<EntryId>() {
                Ok(id) => id,
                Err(error) => {
                    tracing::warn!(queue = %self.queue, %error, "Invalid entry name.");
                    self.quarantine(&path)?;
                    continue;
                }
            };
            if !self.slice.contains(&id) {
                continue;
            }

            // non negative floats are ordered like their bits
            let mut key = id.timestamp();
            while ranked.contains_key(&key.to_bits()) {
                key += DELTA;
            }
            ranked.insert(key.to_bits(), id);
        }

        Ok(ranked.into_values().collect())
    }

    /// Read an entry without taking its responsibility.
    ///
    /// # Errors
    ///
    /// * the file could not be read or decoded
    pub fn read(&self, id: &EntryId, extension: Extension) -> anyhow::Result<(Mail, Metadata)> {
        let path = self.entry_path(id, extension);
        let content =
            std::fs::read(&path).with_context(|| format!("Failed to read '{}'", path.display()))?;
        codec::decode(&content).with_context(|| format!("Failed to decode '{}'", path.display()))
    }

    /// Delete a ready entry.
    ///
    /// # Errors
    ///
    /// * the entry is held by a runner
    /// * the file could not be removed
    pub fn remove(&self, id: &EntryId) -> anyhow::Result<()> {
        let _lock = self
            .lock(id)?
            .ok_or_else(|| anyhow::anyhow!("Entry `{id}` is locked by another process"))?;

        let pck = self.entry_path(id, Extension::Pck);
        std::fs::remove_file(&pck).with_context(|| format!("Failed to remove '{}'", pck.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listd_test::{config::local_test, mail::local_mail};
    use pretty_assertions::assert_eq;

    fn names(dir: &std::path::Path) -> Vec<String> {
        let mut out = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        out.sort();
        out
    }

    fn write_bak(queue: &Switchboard, metadata: &Metadata) -> EntryId {
        let id = queue.enqueue(&local_mail(), metadata).unwrap();
        std::fs::rename(
            queue.entry_path(&id, Extension::Pck),
            queue.entry_path(&id, Extension::Bak),
        )
        .unwrap();
        id
    }

    #[test]
    fn enqueue_dequeue_finish() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());
        let queue = Switchboard::open(&config, QueueName::In).unwrap();

        let metadata = Metadata::for_list("test")
            .with(keys::TOLIST, true)
            .with("_volatile", 1);
        let id = queue.enqueue(&local_mail(), &metadata).unwrap();
        assert_eq!(names(queue.dirpath()), vec![id.filename(Extension::Pck)]);

        let (mail, metadata) = queue.dequeue(&id).unwrap().unwrap();
        assert_eq!(mail, local_mail());
        assert_eq!(metadata.listname(), Some("test"));
        assert!(metadata.flag(keys::TOLIST));
        assert!(!metadata.contains("_volatile"));
        assert_eq!(metadata.get_str(keys::FILEBASE), Some(id.as_str()));
        assert!(metadata.get_f64(keys::RECEIVED_TIME).is_some());
        assert_eq!(names(queue.dirpath()), vec![id.filename(Extension::Bak)]);

        queue.finish(&id, false).unwrap();
        assert!(names(queue.dirpath()).is_empty());
    }

    #[test]
    fn received_time_is_kept() {
        let root = tempfile::tempdir().unwrap();
        let queue = Switchboard::open(&local_test(root.path()), QueueName::Out).unwrap();

        let id = queue
            .enqueue(
                &local_mail(),
                &Metadata::for_list("test").with(keys::RECEIVED_TIME, 42.5),
            )
            .unwrap();
        let (_, metadata) = queue.read(&id, Extension::Pck).unwrap();
        assert_eq!(metadata.get_f64(keys::RECEIVED_TIME), Some(42.5));
    }

    #[test]
    fn dequeue_twice() {
        let root = tempfile::tempdir().unwrap();
        let queue = Switchboard::open(&local_test(root.path()), QueueName::In).unwrap();
        let id = queue.enqueue(&local_mail(), &Metadata::for_list("test")).unwrap();

        assert!(queue.dequeue(&id).unwrap().is_some());
        assert!(queue.dequeue(&id).unwrap().is_none());
    }

    #[test]
    fn concurrent_dequeue_single_winner() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());
        let queue = Switchboard::open(&config, QueueName::In).unwrap();
        let id = queue.enqueue(&local_mail(), &Metadata::for_list("test")).unwrap();

        let winners = std::thread::scope(|scope| {
            let handles = (0..8)
                .map(|_| {
                    let config = &config;
                    let id = &id;
                    scope.spawn(move || {
                        Switchboard::open(config, QueueName::In)
                            .unwrap()
                            .dequeue(id)
                            .unwrap()
                            .is_some()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count()
        });

        assert_eq!(winners, 1);
    }

    #[test]
    fn truncated_entry_is_quarantined() {
        let root = tempfile::tempdir().unwrap();
        let queue = Switchboard::open(&local_test(root.path()), QueueName::In).unwrap();
        let id = queue.enqueue(&local_mail(), &Metadata::for_list("test")).unwrap();

        let pck = queue.entry_path(&id, Extension::Pck);
        let content = std::fs::read(&pck).unwrap();
        std::fs::write(&pck, &content[..content.len() / 2]).unwrap();

        assert!(queue.dequeue(&id).unwrap().is_none());
        assert!(names(queue.dirpath()).is_empty());
        assert_eq!(
            names(queue.bad_dirpath()),
            vec![id.filename(Extension::Psv)]
        );
    }

    #[test]
    fn finish_preserve() {
        let root = tempfile::tempdir().unwrap();
        let queue = Switchboard::open(&local_test(root.path()), QueueName::Out).unwrap();
        let id = queue.enqueue(&local_mail(), &Metadata::for_list("test")).unwrap();

        queue.dequeue(&id).unwrap().unwrap();
        queue.finish(&id, true).unwrap();

        assert!(names(queue.dirpath()).is_empty());
        assert!(queue.entry_path(&id, Extension::Psv).exists());
    }

    #[test]
    fn stale_lock_is_broken() {
        let root = tempfile::tempdir().unwrap();
        let mut config = local_test(root.path());
        config.server.queues.lock_lifetime = std::time::Duration::ZERO;
        let queue = Switchboard::open(&config, QueueName::In).unwrap();
        let id = queue.enqueue(&local_mail(), &Metadata::for_list("test")).unwrap();

        std::fs::write(queue.lock_path(&id), b"1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        assert!(queue.dequeue(&id).unwrap().is_some());
        assert!(!queue.lock_path(&id).exists());
    }

    #[test]
    fn held_lock_gives_up() {
        let root = tempfile::tempdir().unwrap();
        let queue = Switchboard::open(&local_test(root.path()), QueueName::In).unwrap();
        let id = queue.enqueue(&local_mail(), &Metadata::for_list("test")).unwrap();

        std::fs::write(queue.lock_path(&id), b"1").unwrap();

        assert!(queue.dequeue(&id).unwrap().is_none());
        assert!(queue.entry_path(&id, Extension::Pck).exists());
    }

    #[test]
    fn files_are_ordered() {
        let root = tempfile::tempdir().unwrap();
        let queue = Switchboard::open(&local_test(root.path()), QueueName::In).unwrap();

        let digest = "0123456789abcdef0123456789abcdef0123456";
        for name in [
            format!("30.0+{digest}0.pck"),
            format!("10.0+{digest}1.pck"),
            format!("20.0+{digest}2.pck"),
            format!("10.0+{digest}3.pck"),
            format!("15.0+{digest}4.bak"),
        ] {
            std::fs::write(queue.dirpath().join(name), b"").unwrap();
        }

        let files = queue.files(Extension::Pck).unwrap();
        let timestamps = files.iter().map(EntryId::timestamp).collect::<Vec<_>>();
        assert_eq!(files.len(), 4);
        assert_eq!(timestamps[0], 10.0);
        assert_eq!(timestamps[2], 20.0);
        assert_eq!(timestamps[3], 30.0);
        assert_eq!(queue.files(Extension::Bak).unwrap().len(), 1);
    }

    #[test]
    fn invalid_names_are_quarantined() {
        let root = tempfile::tempdir().unwrap();
        let queue = Switchboard::open(&local_test(root.path()), QueueName::In).unwrap();

        std::fs::write(queue.dirpath().join("garbage.pck"), b"").unwrap();
        std::fs::write(queue.dirpath().join("notes.txt"), b"").unwrap();

        assert!(queue.files(Extension::Pck).unwrap().is_empty());
        assert_eq!(names(queue.dirpath()), vec!["notes.txt".to_string()]);
        assert_eq!(names(queue.bad_dirpath()), vec!["garbage.psv".to_string()]);
    }

    #[test]
    fn files_of_a_slice() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());
        let queue = Switchboard::open(&config, QueueName::In).unwrap();

        let low = format!("1.0+{}", "1".repeat(40));
        let high = format!("1.0+{}", "e".repeat(40));
        for id in [&low, &high] {
            std::fs::write(queue.dirpath().join(format!("{id}.pck")), b"").unwrap();
        }

        let first = Switchboard::open_and_recover(&config, QueueName::In, Slice::new(0, 2).unwrap())
            .unwrap()
            .files(Extension::Pck)
            .unwrap();
        let second =
            Switchboard::open_and_recover(&config, QueueName::In, Slice::new(1, 2).unwrap())
                .unwrap()
                .files(Extension::Pck)
                .unwrap();

        assert_eq!(first, vec![low.parse().unwrap()]);
        assert_eq!(second, vec![high.parse().unwrap()]);
    }

    #[test]
    fn recover_increments_count() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());
        let producer = Switchboard::open(&config, QueueName::Out).unwrap();
        let id = write_bak(&producer, &Metadata::for_list("test"));

        let runner = Switchboard::open_and_recover(&config, QueueName::Out, Slice::whole()).unwrap();
        assert_eq!(runner.files(Extension::Pck).unwrap(), vec![id.clone()]);

        let (_, metadata) = runner.dequeue(&id).unwrap().unwrap();
        assert_eq!(metadata.bak_count(), 1);
        assert_eq!(
            metadata
                .get_as::<Vec<serde_json::Value>>(keys::RECOVERY_HISTORY)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn quarantine_after_max_bak_count() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());
        let producer = Switchboard::open(&config, QueueName::Out).unwrap();
        let id = write_bak(&producer, &Metadata::for_list("test"));

        for _ in 1..MAX_BAK_COUNT {
            let runner =
                Switchboard::open_and_recover(&config, QueueName::Out, Slice::whole()).unwrap();
            // the runner dies while processing
            assert!(runner.dequeue(&id).unwrap().is_some());
        }

        let runner = Switchboard::open_and_recover(&config, QueueName::Out, Slice::whole()).unwrap();
        assert!(runner.files(Extension::Pck).unwrap().is_empty());
        assert!(runner.files(Extension::Bak).unwrap().is_empty());

        let (_, metadata) = runner.read(&id, Extension::Psv).unwrap();
        assert_eq!(metadata.bak_count(), MAX_BAK_COUNT);
    }

    #[test]
    fn expired_backup_is_quarantined() {
        let root = tempfile::tempdir().unwrap();
        let mut config = local_test(root.path());
        config.server.queues.max_item_lifetime = std::time::Duration::from_secs(60);
        let producer = Switchboard::open(&config, QueueName::Out).unwrap();

        let id = format!("1000.0+{}", "a".repeat(40)).parse::<EntryId>().unwrap();
        std::fs::write(
            producer.entry_path(&id, Extension::Bak),
            codec::encode(&local_mail(), &Metadata::for_list("test")).unwrap(),
        )
        .unwrap();

        let runner = Switchboard::open_and_recover(&config, QueueName::Out, Slice::whole()).unwrap();
        assert!(runner.files(Extension::Pck).unwrap().is_empty());
        assert!(runner.entry_path(&id, Extension::Psv).exists());
    }

    #[test]
    fn orphans_are_removed() {
        let root = tempfile::tempdir().unwrap();
        let mut config = local_test(root.path());
        config.server.queues.lock_lifetime = std::time::Duration::ZERO;
        let producer = Switchboard::open(&config, QueueName::Out).unwrap();

        let digest = "b".repeat(40);
        std::fs::write(producer.dirpath().join(format!("1.0+{digest}.pck.tmp")), b"half").unwrap();
        std::fs::write(producer.dirpath().join(format!("1.0+{digest}.pck.lock")), b"1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        Switchboard::open_and_recover(&config, QueueName::Out, Slice::whole()).unwrap();
        assert!(names(producer.dirpath()).is_empty());
    }

    #[test]
    fn unreadable_entry_is_quarantined() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());
        let queue = Switchboard::open(&config, QueueName::In).unwrap();

        let id = format!("1.0+{}", "a".repeat(40)).parse::<EntryId>().unwrap();
        std::fs::create_dir(queue.entry_path(&id, Extension::Pck)).unwrap();

        assert!(queue.dequeue(&id).unwrap().is_none());
        assert!(queue.entry_path(&id, Extension::Psv).exists());
        assert!(names(queue.dirpath()).is_empty());
    }

    #[test]
    fn unreadable_backup_is_quarantined() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());
        let producer = Switchboard::open(&config, QueueName::Out).unwrap();
        let id = producer.enqueue(&local_mail(), &Metadata::for_list("test")).unwrap();
        std::fs::remove_file(producer.entry_path(&id, Extension::Pck)).unwrap();
        std::fs::create_dir(producer.entry_path(&id, Extension::Bak)).unwrap();
        let good = write_bak(&producer, &Metadata::for_list("test"));

        let runner = Switchboard::open_and_recover(&config, QueueName::Out, Slice::whole()).unwrap();
        assert_eq!(runner.files(Extension::Pck).unwrap(), vec![good]);
        assert!(runner.entry_path(&id, Extension::Psv).exists());
    }

    #[test]
    fn interrupted_enqueue_is_invisible() {
        let root = tempfile::tempdir().unwrap();
        let mut config = local_test(root.path());
        let producer = Switchboard::open(&config, QueueName::In).unwrap();

        let tmp = producer
            .dirpath()
            .join(format!("{}.pck.tmp", EntryId::generate(b"half", 1.0, "test")));
        std::fs::write(&tmp, b"LSTQ\x00").unwrap();

        assert!(producer.files(Extension::Pck).unwrap().is_empty());
        assert!(!names(producer.dirpath()).iter().any(|name| name.ends_with(".pck")));

        Switchboard::open_and_recover(&config, QueueName::In, Slice::whole()).unwrap();
        assert!(tmp.exists());

        config.server.queues.lock_lifetime = std::time::Duration::ZERO;
        std::thread::sleep(std::time::Duration::from_millis(20));
        let runner = Switchboard::open_and_recover(&config, QueueName::In, Slice::whole()).unwrap();
        assert!(!tmp.exists());
        assert!(runner.files(Extension::Pck).unwrap().is_empty());
    }

    #[test]
    fn producer_does_not_recover() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());
        let producer = Switchboard::open(&config, QueueName::Out).unwrap();
        let id = write_bak(&producer, &Metadata::for_list("test"));

        Switchboard::open(&config, QueueName::Out).unwrap();
        assert!(producer.entry_path(&id, Extension::Bak).exists());
    }
}
