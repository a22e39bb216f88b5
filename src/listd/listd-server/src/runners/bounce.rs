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
    bounce::{scan, BounceEvent, Registrar},
    runner::Dispose,
};
use listd_common::{utils, Mail, Metadata, QueueName};
use listd_config::Config;
use listd_mlist::{notice, Bouncer, ListStore, LockError, MailingList, Outbox, PendingOp};
use lqueue::Switchboard;

/// Processes the `bounces` queue: probe bounces disable their member, the
/// other recognized bounces are spooled as events for the [`Registrar`].
pub struct BounceRunner {
    config: Config,
    store: ListStore,
    virgin: Switchboard,
    registrar: Registrar,
    disabled_check: Every,
}

impl BounceRunner {
    /// # Errors
    ///
    /// * the `virgin` queue could not be opened
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            config: config.clone(),
            store: ListStore::new(config),
            virgin: Switchboard::open(config, QueueName::Virgin)?,
            registrar: Registrar::new(config),
            disabled_check: Every::new(config.server.bounce.disabled_check_every),
        })
    }

    /// `Some(true)` if the probe was handled, `Some(false)` if the list is
    /// locked.
    fn probe(&self, list: &MailingList, token: &str) -> anyhow::Result<Option<bool>> {
        let pending = self.store.pending(&list.name);
        if !matches!(
            pending.pend_confirm(token, false)?,
            Some(PendingOp::Probe { .. })
        ) {
            return Ok(None);
        }

        let _lock = match self.store.lock(&list.name) {
            Ok(lock) => lock,
            Err(LockError::Timeout { .. }) => return Ok(Some(false)),
            Err(error) => return Err(error.into()),
        };
        let mut list = self.store.load(&list.name)?;
        Bouncer::new(
            &mut list,
            &pending,
            &self.virgin,
            self.config.server.bounce.verp_probes,
        )
        .probe_bounce(token)?;
        self.store.save(&list)?;
        Ok(Some(true))
    }

    fn check_disabled(&self) -> anyhow::Result<()> {
        let today = utils::today();
        for listname in self.store.names()? {
            let _lock = match self.store.lock(&listname) {
                Ok(lock) => lock,
                Err(LockError::Timeout { .. }) => {
                    tracing::debug!(list = %listname, "List locked, disabled members checked next time.");
                    continue;
                }
                Err(error) => return Err(error.into()),
            };
            let mut list = self.store.load(&listname)?;
            let pending = self.store.pending(&listname);
            let processed = Bouncer::new(
                &mut list,
                &pending,
                &self.virgin,
                self.config.server.bounce.verp_probes,
            )
            .process_disabled(today)?;
            if processed != 0 {
                tracing::info!(list = %listname, members = processed, "Disabled members notified.");
                self.store.save(&list)?;
            }
        }
        Ok(())
    }
}

impl Dispose for BounceRunner {
    fn dispose(&mut self, mail: &mut Mail, metadata: &mut Metadata) -> anyhow::Result<bool> {
        let listname = metadata.listname().unwrap_or_default();
        if !self.store.exists(listname) {
            tracing::warn!(list = %listname, "Bounce for an unknown list ignored.");
            return Ok(false);
        }
        let list = self.store.load(listname)?;
        if !list.bounce.processing {
            return Ok(false);
        }

        if let Some(token) = scan::probe_token(&list, mail) {
            match self.probe(&list, &token)? {
                Some(true) => return Ok(false),
                Some(false) => return Ok(true),
                None => tracing::debug!(list = %list.name, %token, "Not a probe token."),
            }
        }

        let mut addresses = scan::verp(&list, mail).into_iter().collect::<Vec<_>>();
        if addresses.is_empty() {
            addresses = scan::dsn(mail);
        }

        if addresses.is_empty() {
            tracing::info!(
                list = %list.name,
                message_id = mail.message_id().unwrap_or("n/a"),
                "Bounce not recognized."
            );
            if list.bounce.unrecognized_goes_to_list_owner {
                let (notice, metadata) = notice::unrecognized_bounce(&list, mail);
                self.virgin.send(&notice, &metadata)?;
            }
            return Ok(false);
        }

        let day = utils::today();
        let events = addresses
            .into_iter()
            .map(|address| BounceEvent {
                listname: list.name.clone(),
                address,
                day,
                message: mail.clone(),
            })
            .collect::<Vec<_>>();
        self.registrar.spool().queue(&events)?;
        Ok(false)
    }

    fn do_periodic(&mut self) -> anyhow::Result<()> {
        self.registrar.tick(&self.virgin)?;
        if self.disabled_check.due() {
            self.check_disabled()?;
        }
        Ok(())
    }

    fn cleanup(&mut self) -> anyhow::Result<()> {
        self.registrar.register(&self.virgin).map(|_| ())
    }
}
