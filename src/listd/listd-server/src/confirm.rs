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
use listd_common::{metadata::keys, QueueName};
use listd_config::Config;
use listd_mlist::{notice, Bouncer, DigestFormat, ListStore, Member, Outbox, PendingOp};
use lqueue::Switchboard;

/// What a confirmation cookie did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmed {
    ///
    Subscribed(String),
    ///
    Unsubscribed(String),
    ///
    AddressChanged {
        ///
        old: String,
        ///
        new: String,
    },
    /// The held post was sent back to the `in` queue, approved.
    Released {
        ///
        reason: String,
    },
    /// The delivery of the member was enabled again.
    ReEnabled(String),
    /// The cookie is unknown, expired, or does not apply to the list.
    Unknown,
}

impl std::fmt::Display for Confirmed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribed(address) => write!(f, "{address} subscribed"),
            Self::Unsubscribed(address) => write!(f, "{address} unsubscribed"),
            Self::AddressChanged { old, new } => write!(f, "{old} changed to {new}"),
            Self::Released { reason } => write!(f, "held post released ({reason})"),
            Self::ReEnabled(address) => write!(f, "delivery of {address} re-enabled"),
            Self::Unknown => f.write_str("unknown or expired cookie"),
        }
    }
}

/// Apply the operation pending under `cookie` for `listname`.
///
/// # Errors
///
/// * the list does not exist or could not be locked
/// * the pending database or the queues failed
pub fn confirm(config: &Config, listname: &str, cookie: &str) -> anyhow::Result<Confirmed> {
    let store = ListStore::new(config);
    if !store.exists(listname) {
        anyhow::bail!("list `{listname}` does not exist");
    }
    let _lock = store.lock(listname)?;
    let mut list = store.load(listname)?;
    let pending = store.pending(listname);
    let virgin = Switchboard::open(config, QueueName::Virgin)?;

    let Some(op) = pending.pend_confirm(cookie, false)? else {
        return Ok(Confirmed::Unknown);
    };

    let confirmed = match op {
        PendingOp::ReEnable { .. } => {
            let address = Bouncer::new(
                &mut list,
                &pending,
                &virgin,
                config.server.bounce.verp_probes,
            )
            .confirm_reenable(cookie)?;
            address.map_or(Confirmed::Unknown, Confirmed::ReEnabled)
        }
        PendingOp::Probe { .. } => {
            pending.pend_repend(cookie, op)?;
            anyhow::bail!("cookie `{cookie}` identifies a probe, it cannot be confirmed");
        }
        op => {
            pending.pend_confirm(cookie, true)?;
            apply(config, &mut list, &virgin, op)?
        }
    };

    store.save(&list)?;
    tracing::info!(list = %listname, %cookie, outcome = %confirmed, "Cookie confirmed.");
    Ok(confirmed)
}

fn apply(
    config: &Config,
    list: &mut listd_mlist::MailingList,
    virgin: &Switchboard,
    op: PendingOp,
) -> anyhow::Result<Confirmed> {
    Ok(match op {
        PendingOp::Subscription {
            address,
            realname,
            digest,
        } => {
            let mut member = Member::new(&address);
            member.realname = realname;
            if digest && list.digest.digestable {
                member = member.with_digest(DigestFormat::default());
            }
            list.add_member(member);
            let (mail, metadata) = notice::user_notification(
                list,
                &address,
                &list.request_address(),
                &format!("Welcome to the {} mailing list", list.name),
                &format!(
                    "Your address {address} is now subscribed to the {} mailing list.\nTo post, write to {}.\n",
                    list.name,
                    list.posting_address()
                ),
            );
            virgin.send(&mail, &metadata)?;
            Confirmed::Subscribed(address)
        }
        PendingOp::Unsubscription { address } => {
            if list.remove_member(&address).is_none() {
                return Ok(Confirmed::Unknown);
            }
            let (mail, metadata) = notice::goodbye(list, &address);
            virgin.send(&mail, &metadata)?;
            Confirmed::Unsubscribed(address)
        }
        PendingOp::ChangeOfAddress { old, new } => {
            let Some(mut member) = list.remove_member(&old) else {
                return Ok(Confirmed::Unknown);
            };
            member.address = new.clone();
            list.add_member(member);
            Confirmed::AddressChanged { old, new }
        }
        PendingOp::HeldMessage {
            reason,
            message,
            mut metadata,
        } => {
            metadata.insert(keys::APPROVED, true);
            Switchboard::open(config, QueueName::In)?.enqueue(&message, &metadata)?;
            Confirmed::Released { reason }
        }
        PendingOp::ReEnable { .. } | PendingOp::Probe { .. } => Confirmed::Unknown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use listd_common::{DeliveryStatus, Metadata};
    use listd_mlist::MailingList;
    use lqueue::Extension;
    use pretty_assertions::assert_eq;

    fn setup(root: &std::path::Path) -> (Config, ListStore) {
        let config = listd_test::config::local_test(root);
        let store = ListStore::new(&config);
        let mut list = MailingList::new("test", "lists.testserver.com");
        list.add_member(Member::new("user@domain.tld"));
        store.create(&list).unwrap();
        (config, store)
    }

    fn pend(store: &ListStore, op: PendingOp) -> String {
        store.pending("test").pend_new(op).unwrap()
    }

    fn notices(config: &Config) -> usize {
        Switchboard::open(config, QueueName::Virgin)
            .unwrap()
            .files(Extension::Pck)
            .unwrap()
            .len()
    }

    #[test]
    fn membership() {
        let root = tempfile::tempdir().unwrap();
        let (config, store) = setup(root.path());

        let cookie = pend(
            &store,
            PendingOp::Subscription {
                address: "New@Domain.tld".to_string(),
                realname: Some("New".to_string()),
                digest: false,
            },
        );
        assert_eq!(
            confirm(&config, "test", &cookie).unwrap(),
            Confirmed::Subscribed("New@Domain.tld".to_string())
        );
        assert_eq!(confirm(&config, "test", &cookie).unwrap(), Confirmed::Unknown);

        let cookie = pend(
            &store,
            PendingOp::ChangeOfAddress {
                old: "user@domain.tld".to_string(),
                new: "moved@domain.tld".to_string(),
            },
        );
        confirm(&config, "test", &cookie).unwrap();

        let cookie = pend(
            &store,
            PendingOp::Unsubscription {
                address: "new@domain.tld".to_string(),
            },
        );
        assert_eq!(
            confirm(&config, "test", &cookie).unwrap(),
            Confirmed::Unsubscribed("new@domain.tld".to_string())
        );

        let list = store.load("test").unwrap();
        assert_eq!(
            list.members.keys().collect::<Vec<_>>(),
            vec!["moved@domain.tld"]
        );
        assert_eq!(notices(&config), 2);
    }

    #[test]
    fn held_post_released() {
        let root = tempfile::tempdir().unwrap();
        let (config, store) = setup(root.path());
        let cookie = pend(
            &store,
            PendingOp::HeldMessage {
                reason: "Post by non-member".to_string(),
                message: listd_test::mail::local_post("test", "other@domain.tld", "held"),
                metadata: Metadata::for_list("test"),
            },
        );

        assert_eq!(
            confirm(&config, "test", &cookie).unwrap(),
            Confirmed::Released {
                reason: "Post by non-member".to_string()
            }
        );
        let incoming = Switchboard::open(&config, QueueName::In).unwrap();
        let ids = incoming.files(Extension::Pck).unwrap();
        assert_eq!(ids.len(), 1);
        let (_, metadata) = incoming.read(&ids[0], Extension::Pck).unwrap();
        assert!(metadata.flag(keys::APPROVED));
    }

    #[test]
    fn reenable() {
        let root = tempfile::tempdir().unwrap();
        let (config, store) = setup(root.path());
        let mut list = store.load("test").unwrap();
        list.set_delivery_status("user@domain.tld", DeliveryStatus::ByBounce);
        store.save(&list).unwrap();

        let cookie = pend(
            &store,
            PendingOp::ReEnable {
                listname: "test".to_string(),
                address: "user@domain.tld".to_string(),
            },
        );
        assert_eq!(
            confirm(&config, "test", &cookie).unwrap(),
            Confirmed::ReEnabled("user@domain.tld".to_string())
        );
        assert_eq!(
            store.load("test").unwrap().delivery_status("user@domain.tld"),
            Some(DeliveryStatus::Enabled)
        );
    }

    #[test]
    fn probe_is_not_confirmable() {
        let root = tempfile::tempdir().unwrap();
        let (config, store) = setup(root.path());
        let cookie = pend(
            &store,
            PendingOp::Probe {
                address: "user@domain.tld".to_string(),
                message: listd_test::mail::local_mail(),
            },
        );
        assert!(confirm(&config, "test", &cookie).is_err());
        assert!(store.pending("test").pend_confirm(&cookie, false).unwrap().is_some());
        assert!(confirm(&config, "ghost", &cookie).is_err());
    }
}
