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
use super::Every;
use crate::{
    digest,
    pipeline::{HandlerContext, HandlerId, Registry, POST_PIPELINE, VIRGIN_PIPELINE},
    runner::Dispose,
};
use listd_common::{metadata::keys, Mail, Metadata, QueueName};
use listd_config::Config;
use listd_mlist::{ListStore, LockError};
use lqueue::Switchboard;

/// Runs the pipeline of the posts (`in` queue) or of the messages generated
/// by the server (`virgin` queue), under the lock of the list.
pub struct PipelineRunner {
    config: Config,
    store: ListStore,
    registry: Registry,
    pipeline: &'static [HandlerId],
    fasttrack: bool,
    virgin: Switchboard,
    out: Switchboard,
    archive: Switchboard,
    digests: Option<Every>,
}

impl PipelineRunner {
    fn new(
        config: &Config,
        pipeline: &'static [HandlerId],
        fasttrack: bool,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            config: config.clone(),
            store: ListStore::new(config),
            registry: Registry::default(),
            pipeline,
            fasttrack,
            virgin: Switchboard::open(config, QueueName::Virgin)?,
            out: Switchboard::open(config, QueueName::Out)?,
            archive: Switchboard::open(config, QueueName::Archive)?,
            digests: None,
        })
    }

    /// The runner of the posts.
    ///
    /// # Errors
    ///
    /// * the queues could not be opened
    pub fn incoming(config: &Config) -> anyhow::Result<Self> {
        Self::new(config, POST_PIPELINE, false)
    }

    /// The runner of the generated messages, also sending the pending
    /// digests every `digest.send_every`.
    ///
    /// # Errors
    ///
    /// * the queues could not be opened
    pub fn virgin(config: &Config) -> anyhow::Result<Self> {
        let mut this = Self::new(config, VIRGIN_PIPELINE, true)?;
        this.digests = config.server.digest.send_every.map(Every::new);
        Ok(this)
    }
}

impl Dispose for PipelineRunner {
    fn dispose(&mut self, mail: &mut Mail, metadata: &mut Metadata) -> anyhow::Result<bool> {
        let listname = metadata.listname().unwrap_or_default().to_string();

        let _lock = match self.store.lock(&listname) {
            Ok(lock) => lock,
            Err(LockError::Timeout { .. }) => {
                tracing::debug!(list = %listname, "List locked, entry requeued.");
                return Ok(true);
            }
            Err(error) => return Err(error.into()),
        };
        let mut list = self.store.load(&listname)?;

        if self.fasttrack {
            metadata.insert(keys::FASTTRACK, true);
        }
        let pending = self.store.pending(&listname);
        let mut ctx = HandlerContext {
            config: &self.config,
            store: &self.store,
            pending: &pending,
            virgin: &self.virgin,
            out: &self.out,
            archive: &self.archive,
        };

        let disposition = self
            .registry
            .dispatch(&mut ctx, &mut list, mail, metadata, self.pipeline)?;
        tracing::debug!(list = %listname, ?disposition, "Pipeline done.");

        self.store.save(&list)?;
        Ok(false)
    }

    fn do_periodic(&mut self) -> anyhow::Result<()> {
        if self.digests.as_mut().map_or(false, Every::due) {
            let sent = digest::send_all_pending(
                &self.store,
                &self.config.server.digest,
                &self.virgin,
                None,
            )?;
            if sent != 0 {
                tracing::info!(lists = sent, "Pending digests sent.");
            }
        }
        Ok(())
    }
}
