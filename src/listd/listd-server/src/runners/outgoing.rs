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
use crate::{
    bounce::{BounceEvent, Registrar},
    delivery::{self, Transport, TransportError},
    runner::Dispose,
};
use listd_common::{metadata::keys, utils, Mail, Metadata, QueueName};
use listd_config::Config;
use listd_mlist::{Bouncer, ListStore, LockError};
use lqueue::Switchboard;

/// Delivers the `out` queue. Permanent failures become bounce events,
/// temporary ones go to the `retry` queue.
pub struct OutgoingRunner {
    config: Config,
    store: ListStore,
    transport: Box<dyn Transport>,
    retry: Switchboard,
    virgin: Switchboard,
    registrar: Registrar,
    unreachable: bool,
}

impl OutgoingRunner {
    /// # Errors
    ///
    /// * the queues could not be opened
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::with_transport(config, delivery::from_config(&config.server.delivery.transport))
    }

    /// # Errors
    ///
    /// * the queues could not be opened
    pub fn with_transport(config: &Config, transport: Box<dyn Transport>) -> anyhow::Result<Self> {
        Ok(Self {
            config: config.clone(),
            store: ListStore::new(config),
            transport,
            retry: Switchboard::open(config, QueueName::Retry)?,
            virgin: Switchboard::open(config, QueueName::Virgin)?,
            registrar: Registrar::new(config),
            unreachable: false,
        })
    }

    /// The failures of a probe disable its recipient right away.
    fn probe_failed(&self, listname: &str, token: &str) -> anyhow::Result<bool> {
        let _lock = match self.store.lock(listname) {
            Ok(lock) => lock,
            Err(LockError::Timeout { .. }) => return Ok(false),
            Err(error) => return Err(error.into()),
        };
        let mut list = self.store.load(listname)?;
        let pending = self.store.pending(listname);
        Bouncer::new(
            &mut list,
            &pending,
            &self.virgin,
            self.config.server.bounce.verp_probes,
        )
        .probe_bounce(token)?;
        self.store.save(&list)?;
        Ok(true)
    }

    fn schedule_retry(
        &self,
        mail: &Mail,
        metadata: &mut Metadata,
        failures: Vec<String>,
        now: f64,
    ) -> anyhow::Result<()> {
        let delivery = &self.config.server.delivery;
        let count = failures.len();

        let deliver_until = match (
            metadata.get_as::<usize>(keys::LAST_RECIP_COUNT),
            metadata.get_f64(keys::DELIVER_UNTIL),
        ) {
            (Some(last), Some(until)) if last == count => {
                if now > until {
                    tracing::warn!(
                        list = metadata.listname().unwrap_or_default(),
                        message_id = mail.message_id().unwrap_or("n/a"),
                        recipients = ?failures,
                        "Retry period exceeded, message discarded."
                    );
                    return Ok(());
                }
                until
            }
            _ => now + delivery.retry_period.as_secs_f64(),
        };

        metadata.insert(keys::LAST_RECIP_COUNT, count);
        metadata.insert(keys::DELIVER_UNTIL, deliver_until);
        metadata.insert(keys::DELIVER_AFTER, now + delivery.retry_wait.as_secs_f64());
        metadata.set_recips(failures);
        self.retry.enqueue(mail, metadata)?;
        Ok(())
    }
}

impl Dispose for OutgoingRunner {
    fn dispose(&mut self, mail: &mut Mail, metadata: &mut Metadata) -> anyhow::Result<bool> {
        let now = utils::now_epoch();
        if metadata.get_f64(keys::DELIVER_AFTER).map_or(false, |after| after > now) {
            return Ok(true);
        }
        let listname = metadata.listname().unwrap_or_default().to_string();
        let list = self.store.load(&listname)?;

        let report = match delivery::deliver(
            &*self.transport,
            &list,
            mail,
            metadata,
            self.config.server.delivery.max_recipients,
        ) {
            Ok(report) => {
                if std::mem::take(&mut self.unreachable) {
                    tracing::info!("Mail transport reachable again.");
                }
                report
            }
            Err(error @ TransportError::Connection(_)) => {
                if !self.unreachable {
                    tracing::error!(%error, "Mail transport unreachable, deliveries suspended.");
                    self.unreachable = true;
                }
                return Ok(true);
            }
            Err(error) => return Err(error.into()),
        };

        if !report.permanent.is_empty() {
            match metadata.get_str(keys::PROBE_TOKEN) {
                Some(token) => {
                    if !self.probe_failed(&listname, token)? {
                        return Ok(true);
                    }
                }
                None => {
                    let day = utils::today();
                    let events = report
                        .permanent
                        .iter()
                        .map(|address| BounceEvent {
                            listname: listname.clone(),
                            address: address.clone(),
                            day,
                            message: mail.clone(),
                        })
                        .collect::<Vec<_>>();
                    self.registrar.spool().queue(&events)?;
                }
            }
        }

        if !report.temporary.is_empty() {
            self.schedule_retry(mail, metadata, report.temporary, now)?;
        }
        Ok(false)
    }

    fn do_periodic(&mut self) -> anyhow::Result<()> {
        self.registrar.tick(&self.virgin).map(|_| ())
    }

    fn cleanup(&mut self) -> anyhow::Result<()> {
        self.registrar.register(&self.virgin).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::tests::Recorder;
    use listd_mlist::{MailingList, Member, PendingOp};
    use lqueue::Extension;
    use pretty_assertions::assert_eq;

    fn setup(root: &std::path::Path) -> Config {
        let config = listd_test::config::local_test(root);
        let mut list = MailingList::new("test", "lists.testserver.com");
        for address in ["ok@domain.tld", "gone@domain.tld", "later@domain.tld"] {
            list.add_member(Member::new(address));
        }
        ListStore::new(&config).create(&list).unwrap();
        config
    }

    fn post(recips: &[&str]) -> (Mail, Metadata) {
        let mut metadata = Metadata::for_list("test").with(keys::TOLIST, true);
        metadata.set_recips(recips.iter().map(ToString::to_string).collect());
        (listd_test::mail::local_post("test", "ok@domain.tld", "hello"), metadata)
    }

    #[test]
    fn outcomes_are_dispatched() {
        let root = tempfile::tempdir().unwrap();
        let mut config = setup(root.path());
        config.server.delivery.max_recipients = 1;
        let mut runner = OutgoingRunner::with_transport(&config, Box::<Recorder>::default()).unwrap();

        let (mut mail, mut metadata) = post(&["ok@domain.tld", "gone@domain.tld", "later@domain.tld"]);
        assert!(!runner.dispose(&mut mail, &mut metadata).unwrap());

        let retried = runner.retry.files(Extension::Pck).unwrap();
        assert_eq!(retried.len(), 1);
        let (_, retry) = runner.retry.read(&retried[0], Extension::Pck).unwrap();
        assert_eq!(retry.recips(), Some(vec!["later@domain.tld".to_string()]));
        assert_eq!(retry.get_as::<usize>(keys::LAST_RECIP_COUNT), Some(1));
        assert!(retry.get_f64(keys::DELIVER_AFTER).unwrap() > utils::now_epoch());

        runner.cleanup().unwrap();
        let list = ListStore::new(&config).load("test").unwrap();
        assert!(list.bounce_info("gone@domain.tld").is_some());
        assert!(list.bounce_info("later@domain.tld").is_none());
    }

    #[test]
    fn retry_period_exceeded() {
        let root = tempfile::tempdir().unwrap();
        let config = setup(root.path());
        let mut runner = OutgoingRunner::with_transport(&config, Box::<Recorder>::default()).unwrap();

        let (mut mail, mut metadata) = post(&["later@domain.tld"]);
        metadata.insert(keys::LAST_RECIP_COUNT, 1);
        metadata.insert(keys::DELIVER_UNTIL, utils::now_epoch() - 1.0);
        assert!(!runner.dispose(&mut mail, &mut metadata).unwrap());
        assert!(runner.retry.files(Extension::Pck).unwrap().is_empty());

        let (mut mail, mut metadata) = post(&["later@domain.tld"]);
        metadata.insert(keys::LAST_RECIP_COUNT, 2);
        metadata.insert(keys::DELIVER_UNTIL, utils::now_epoch() - 1.0);
        assert!(!runner.dispose(&mut mail, &mut metadata).unwrap());
        assert_eq!(runner.retry.files(Extension::Pck).unwrap().len(), 1);
    }

    #[test]
    fn deferred_and_unreachable_requeue() {
        let root = tempfile::tempdir().unwrap();
        let config = setup(root.path());
        let transport = Recorder {
            unreachable: true,
            ..Recorder::default()
        };
        let mut runner = OutgoingRunner::with_transport(&config, Box::new(transport)).unwrap();

        let (mut mail, mut metadata) = post(&["ok@domain.tld"]);
        metadata.insert(keys::DELIVER_AFTER, utils::now_epoch() + 60.0);
        assert!(runner.dispose(&mut mail, &mut metadata).unwrap());

        metadata.remove(keys::DELIVER_AFTER);
        assert!(runner.dispose(&mut mail, &mut metadata).unwrap());
        assert!(runner.unreachable);
    }

    #[test]
    fn failed_probe_disables() {
        let root = tempfile::tempdir().unwrap();
        let config = setup(root.path());
        let store = ListStore::new(&config);
        let token = store
            .pending("test")
            .pend_new(PendingOp::Probe {
                address: "gone@domain.tld".to_string(),
                message: listd_test::mail::local_mail(),
            })
            .unwrap();
        let mut runner = OutgoingRunner::with_transport(&config, Box::<Recorder>::default()).unwrap();

        let (mut mail, mut metadata) = post(&["gone@domain.tld"]);
        metadata.insert(keys::PROBE_TOKEN, token.as_str());
        assert!(!runner.dispose(&mut mail, &mut metadata).unwrap());

        let list = store.load("test").unwrap();
        assert_eq!(
            list.delivery_status("gone@domain.tld"),
            Some(listd_common::DeliveryStatus::ByBounce)
        );
        assert!(!runner.registrar.spool().path().exists());
    }
}
