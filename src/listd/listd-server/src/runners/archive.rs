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
use crate::runner::Dispose;
use listd_common::{mbox, Mail, Metadata};
use listd_config::Config;
use listd_mlist::{ListStore, LockError};

/// Appends the posts of the `archive` queue to the mbox of their list, then
/// hands them to the external archiver if one is configured.
pub struct ArchiveRunner {
    config: Config,
    store: ListStore,
    children: Vec<std::process::Child>,
}

impl ArchiveRunner {
    ///
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            store: ListStore::new(config),
            children: vec![],
        }
    }

    /// Path of the mbox archive of a list.
    #[must_use]
    pub fn mbox_path(&self, listname: &str) -> std::path::PathBuf {
        self.config
            .server
            .archive
            .dirpath
            .join(format!("{listname}.mbox"))
    }

    fn spawn_archiver(&mut self, command: &str, listname: &str, mail: &Mail) -> anyhow::Result<()> {
        use std::io::Write;

        let command = command.replace("{listname}", listname);
        let mut child = std::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(std::process::Stdio::piped())
            .spawn()?;
        tracing::debug!(list = %listname, %command, pid = child.id(), "Archiver started.");

        let stdin = child.stdin.take();
        self.children.push(child);

        if let Some(mut stdin) = stdin {
            stdin.write_all(mail.to_string().as_bytes())?;
        }
        Ok(())
    }
}

impl Dispose for ArchiveRunner {
    fn dispose(&mut self, mail: &mut Mail, metadata: &mut Metadata) -> anyhow::Result<bool> {
        let listname = metadata.listname().unwrap_or_default().to_string();

        let _lock = match self.store.lock(&listname) {
            Ok(lock) => lock,
            Err(LockError::Timeout { .. }) => return Ok(true),
            Err(error) => return Err(error.into()),
        };

        let path = self.mbox_path(&listname);
        std::fs::create_dir_all(&self.config.server.archive.dirpath)?;
        let size = mbox::append(&path, mail)?;
        tracing::debug!(list = %listname, mbox = %path.display(), size, "Post archived.");

        if let Some(command) = self.config.server.archive.external_command.clone() {
            if let Err(error) = self.spawn_archiver(&command, &listname, mail) {
                tracing::error!(list = %listname, %command, error = format!("{error:#}"), "External archiver failed.");
            }
        }
        Ok(false)
    }

    fn take_children(&mut self) -> Vec<std::process::Child> {
        std::mem::take(&mut self.children)
    }
}
