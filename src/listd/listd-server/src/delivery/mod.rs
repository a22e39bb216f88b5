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
//! Delivery of the messages of the `out` queue.

use listd_common::{metadata::keys, Mail, Metadata};
use listd_mlist::MailingList;

mod transport;

pub use transport::{from_config, Directory, Sendmail, Transport, TransportError};

/// Outcome of a delivery, per recipient.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    ///
    pub delivered: Vec<String>,
    /// failed, may succeed later.
    pub temporary: Vec<String>,
    /// failed for good.
    pub permanent: Vec<String>,
}

/// Deliver a message to the `recips` of its metadata.
///
/// With the `verp` flag each recipient gets its own copy, sent with an
/// envelope sender encoding its address. Otherwise the recipients are sent
/// in batches of `max_recipients`.
///
/// # Errors
///
/// * the transport could not be reached for the first batch, nothing was
///   delivered
pub fn deliver(
    transport: &dyn Transport,
    list: &MailingList,
    mail: &Mail,
    metadata: &Metadata,
    max_recipients: usize,
) -> Result<DeliveryReport, TransportError> {
    let recips = metadata.recips().unwrap_or_default();
    let content = mail.to_string();

    let batches = if metadata.flag(keys::VERP) {
        recips
            .iter()
            .map(|recipient| (list.verp_address(recipient), vec![recipient.clone()]))
            .collect::<Vec<_>>()
    } else {
        let sender = metadata
            .get_str(keys::ENVSENDER)
            .map_or_else(|| list.bounces_address(), str::to_string);
        recips
            .chunks(max_recipients.max(1))
            .map(|chunk| (sender.clone(), chunk.to_vec()))
            .collect()
    };

    let mut report = DeliveryReport::default();
    for (index, (sender, recipients)) in batches.into_iter().enumerate() {
        match transport.send(&sender, &recipients, &content) {
            Ok(()) => report.delivered.extend(recipients),
            Err(error @ TransportError::Connection(_)) if index == 0 => return Err(error),
            Err(TransportError::Permanent(reason)) => {
                tracing::info!(list = %list.name, ?recipients, %reason, "Permanent delivery failure.");
                report.permanent.extend(recipients);
            }
            Err(TransportError::Temporary(reason) | TransportError::Connection(reason)) => {
                tracing::info!(list = %list.name, ?recipients, %reason, "Temporary delivery failure.");
                report.temporary.extend(recipients);
            }
        }
    }

    tracing::debug!(
        list = %list.name,
        message_id = mail.message_id().unwrap_or("n/a"),
        delivered = report.delivered.len(),
        temporary = report.temporary.len(),
        permanent = report.permanent.len(),
        "Delivery done."
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Records the envelopes, failing the recipients by their local part.
    #[derive(Default)]
    pub struct Recorder {
        pub envelopes: std::cell::RefCell<Vec<(String, Vec<String>)>>,
        pub unreachable: bool,
    }

    impl Transport for Recorder {
        fn send(
            &self,
            sender: &str,
            recipients: &[String],
            _: &str,
        ) -> Result<(), TransportError> {
            if self.unreachable {
                return Err(TransportError::Connection("refused".to_string()));
            }
            self.envelopes
                .borrow_mut()
                .push((sender.to_string(), recipients.to_vec()));
            if recipients.iter().any(|r| r.starts_with("gone")) {
                return Err(TransportError::Permanent("no such user".to_string()));
            }
            if recipients.iter().any(|r| r.starts_with("later")) {
                return Err(TransportError::Temporary("mailbox full".to_string()));
            }
            Ok(())
        }
    }

    fn metadata(recips: &[&str]) -> Metadata {
        let mut metadata = Metadata::for_list("test");
        metadata.set_recips(recips.iter().map(ToString::to_string).collect());
        metadata
    }

    #[test]
    fn batches() {
        let list = MailingList::new("test", "lists.testserver.com");
        let transport = Recorder::default();
        let report = deliver(
            &transport,
            &list,
            &listd_test::mail::local_mail(),
            &metadata(&["a@x.tld", "b@x.tld", "gone@x.tld"]),
            2,
        )
        .unwrap();

        assert_eq!(
            *transport.envelopes.borrow(),
            vec![
                (
                    "test-bounces@lists.testserver.com".to_string(),
                    vec!["a@x.tld".to_string(), "b@x.tld".to_string()]
                ),
                (
                    "test-bounces@lists.testserver.com".to_string(),
                    vec!["gone@x.tld".to_string()]
                ),
            ]
        );
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.permanent, vec!["gone@x.tld".to_string()]);
    }

    #[test]
    fn verp() {
        let list = MailingList::new("test", "lists.testserver.com");
        let transport = Recorder::default();
        let report = deliver(
            &transport,
            &list,
            &listd_test::mail::local_mail(),
            &metadata(&["a@x.tld", "later@y.tld"]).with(keys::VERP, true),
            100,
        )
        .unwrap();

        assert_eq!(
            transport
                .envelopes
                .borrow()
                .iter()
                .map(|(sender, _)| sender.as_str())
                .collect::<Vec<_>>(),
            vec![
                "test-bounces+a=x.tld@lists.testserver.com",
                "test-bounces+later=y.tld@lists.testserver.com"
            ]
        );
        assert_eq!(report.temporary, vec!["later@y.tld".to_string()]);
    }

    #[test]
    fn unreachable() {
        let list = MailingList::new("test", "lists.testserver.com");
        let transport = Recorder {
            unreachable: true,
            ..Recorder::default()
        };
        assert!(matches!(
            deliver(&transport, &list, &listd_test::mail::local_mail(), &metadata(&["a@x.tld"]), 10),
            Err(TransportError::Connection(_))
        ));
    }
}
