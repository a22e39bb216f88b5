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
//! Bounces found by the runners are not scored right away: they are
//! appended to a per process spool, registered in batch under the lock of
//! each list.

use anyhow::Context;
use itertools::Itertools;
use listd_common::Mail;
use listd_config::Config;
use listd_mlist::{Bouncer, ListStore, LockError, Outbox};

pub mod scan;

/// A bounce of `address`, a member of `listname`, received on `day`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BounceEvent {
    ///
    pub listname: String,
    ///
    pub address: String,
    ///
    pub day: time::Date,
    /// the bounce itself, or the message which failed.
    pub message: Mail,
}

/// Append-only file of [`BounceEvent`], one JSON document per line.
#[derive(Debug, Clone)]
pub struct EventSpool {
    path: std::path::PathBuf,
}

impl EventSpool {
    ///
    #[must_use]
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The spool of the current process in `data_dir`.
    #[must_use]
    pub fn for_process(data_dir: &std::path::Path) -> Self {
        Self::new(data_dir.join(format!("bounce-events-{:05}.pck", std::process::id())))
    }

    ///
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append events, flushed to disk before returning.
    ///
    /// # Errors
    ///
    /// * the spool could not be written
    pub fn queue(&self, events: &[BounceEvent]) -> anyhow::Result<()> {
        use std::io::Write;

        if events.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut lines = String::new();
        for event in events {
            lines.push_str(&serde_json::to_string(event)?);
            lines.push('\n');
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open '{}'", self.path.display()))?;
        file.write_all(lines.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Read and remove every event of the spool. Malformed lines are dropped.
    ///
    /// # Errors
    ///
    /// * the spool could not be read or removed
    pub fn take(&self) -> anyhow::Result<Vec<BounceEvent>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("Failed to read '{}'", self.path.display()))
            }
        };
        std::fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove '{}'", self.path.display()))?;

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                serde_json::from_str(line)
                    .map_err(|error| {
                        tracing::warn!(spool = %self.path.display(), %error, "Malformed bounce event dropped.");
                    })
                    .ok()
            })
            .collect())
    }
}

/// Periodic registration of the events of a spool.
pub struct Registrar {
    spool: EventSpool,
    store: ListStore,
    every: std::time::Duration,
    last: std::time::Instant,
    verp_probes: bool,
}

impl Registrar {
    /// A registrar of the spool of the current process.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_spool(config, EventSpool::for_process(&config.server.data_dir))
    }

    ///
    #[must_use]
    pub fn with_spool(config: &Config, spool: EventSpool) -> Self {
        Self {
            spool,
            store: ListStore::new(config),
            every: config.server.bounce.register_every,
            last: std::time::Instant::now(),
            verp_probes: config.server.bounce.verp_probes,
        }
    }

    ///
    #[must_use]
    pub const fn spool(&self) -> &EventSpool {
        &self.spool
    }

    /// Register the events if `register_every` elapsed since the last time.
    ///
    /// # Errors
    ///
    /// * see [`Registrar::register`]
    pub fn tick(&mut self, outbox: &dyn Outbox) -> anyhow::Result<usize> {
        if self.last.elapsed() < self.every {
            return Ok(0);
        }
        self.last = std::time::Instant::now();
        self.register(outbox)
    }

    /// Score every event of the spool, the notices are sent to `outbox`.
    /// The events of a list which cannot be locked are put back in the spool.
    ///
    /// # Errors
    ///
    /// * the spool could not be read or written back
    pub fn register(&self, outbox: &dyn Outbox) -> anyhow::Result<usize> {
        let events = self.spool.take()?;
        if events.is_empty() {
            return Ok(0);
        }

        let mut registered = 0;
        for (listname, events) in events
            .into_iter()
            .into_group_map_by(|event| event.listname.clone())
        {
            match self.register_list(&listname, &events, outbox) {
                Ok(Some(count)) => registered += count,
                Ok(None) => {
                    tracing::info!(list = %listname, count = events.len(), "List locked, bounce events put back.");
                    self.spool.queue(&events)?;
                }
                Err(error) => {
                    tracing::error!(list = %listname, error = format!("{error:#}"), "Failed to register bounces.");
                    self.spool.queue(&events)?;
                }
            }
        }
        Ok(registered)
    }

    fn register_list(
        &self,
        listname: &str,
        events: &[BounceEvent],
        outbox: &dyn Outbox,
    ) -> anyhow::Result<Option<usize>> {
        if !self.store.exists(listname) {
            tracing::warn!(list = %listname, count = events.len(), "Bounce events for an unknown list dropped.");
            return Ok(Some(0));
        }
        let _lock = match self.store.lock(listname) {
            Ok(lock) => lock,
            Err(LockError::Timeout { .. }) => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let mut list = self.store.load(listname)?;
        let pending = self.store.pending(listname);
        let mut bouncer = Bouncer::new(&mut list, &pending, outbox, self.verp_probes);
        for event in events {
            bouncer.register_bounce(&event.address, &event.message, 1.0, event.day)?;
        }
        self.store.save(&list)?;
        Ok(Some(events.len()))
    }
}
