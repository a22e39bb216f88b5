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
#![allow(clippy::unnecessary_wraps)]

use super::{Disposition, HandlerContext};
use crate::digest;
use listd_common::{metadata::keys, utils, Mail, Metadata};
use listd_mlist::MailingList;

/// Add the post to the digest of the list, sending the digests once the
/// accumulated size reaches the threshold.
pub fn to_digest(
    ctx: &mut HandlerContext<'_>,
    list: &mut MailingList,
    mail: &mut Mail,
    metadata: &mut Metadata,
) -> anyhow::Result<Disposition> {
    if metadata.flag(keys::ISDIGEST) || !list.digest.digestable {
        return Ok(Disposition::Continue);
    }
    let mbox = ctx.store.digest_path(&list.name);
    digest::accumulate(list, &mbox, mail, &ctx.config.server.digest, ctx.virgin)?;
    Ok(Disposition::Continue)
}

pub fn to_archive(
    ctx: &mut HandlerContext<'_>,
    list: &mut MailingList,
    mail: &mut Mail,
    metadata: &mut Metadata,
) -> anyhow::Result<Disposition> {
    if !list.posting.archive
        || metadata.flag(keys::ISDIGEST)
        || mail.get_header("X-No-Archive").is_some()
        || mail.get_header("X-Archive").map_or(false, |value| {
            value.trim().eq_ignore_ascii_case("no")
        })
    {
        return Ok(Disposition::Continue);
    }
    ctx.archive.send(mail, &Metadata::for_list(&list.name))?;
    Ok(Disposition::Continue)
}

pub fn after_delivery(
    _: &mut HandlerContext<'_>,
    list: &mut MailingList,
    _: &mut Mail,
    _: &mut Metadata,
) -> anyhow::Result<Disposition> {
    list.last_post_time = Some(utils::now_epoch());
    list.post_id += 1;
    Ok(Disposition::Continue)
}

/// Hand the message over to the outgoing runner.
pub fn to_outgoing(
    ctx: &mut HandlerContext<'_>,
    list: &mut MailingList,
    mail: &mut Mail,
    metadata: &mut Metadata,
) -> anyhow::Result<Disposition> {
    let mut metadata = metadata.clone();
    metadata.remove(keys::PIPELINE);

    if !metadata.flag(keys::FASTTRACK) {
        metadata.insert(keys::TOLIST, true);
        if !metadata.contains(keys::VERP) {
            metadata.insert(
                keys::VERP,
                ctx.config.server.delivery.verp || list.posting.verp_delivery,
            );
        }
    }
    ctx.out.send(mail, &metadata)?;
    Ok(Disposition::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{list, Fixture};
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case::default(None, true, 1)]
    #[case::no_archive(Some(("X-No-Archive", "yes")), true, 0)]
    #[case::archive_no(Some(("X-Archive", "No")), true, 0)]
    #[case::disabled(None, false, 0)]
    fn archiving(#[case] header: Option<(&str, &str)>, #[case] enabled: bool, #[case] expected: usize) {
        let fixture = Fixture::new();
        let mut list = list();
        list.posting.archive = enabled;
        let mut mail = listd_test::mail::local_post("test", "user@domain.tld", "hi");
        if let Some((name, value)) = header {
            mail.set_header(name, value);
        }

        to_archive(&mut fixture.ctx(), &mut list, &mut mail, &mut Metadata::for_list("test")).unwrap();
        assert_eq!(fixture.archive.len(), expected);
    }

    #[test]
    fn verp_from_list_settings() {
        let fixture = Fixture::new();
        let mut list = list();
        list.posting.verp_delivery = true;
        let mut mail = listd_test::mail::local_post("test", "user@domain.tld", "hi");
        let mut metadata = Metadata::for_list("test");
        metadata.set_pipeline(vec![]);

        to_outgoing(&mut fixture.ctx(), &mut list, &mut mail, &mut metadata).unwrap();
        let (_, queued) = fixture.out.take().remove(0);
        assert!(queued.flag(keys::VERP));
        assert!(queued.flag(keys::TOLIST));
        assert!(!queued.contains(keys::PIPELINE));
    }

    #[test]
    fn post_counter() {
        let fixture = Fixture::new();
        let mut list = list();
        after_delivery(&mut fixture.ctx(), &mut list, &mut Mail::default(), &mut Metadata::new()).unwrap();
        assert_eq!(list.post_id, 2);
        assert!(list.last_post_time.is_some());
    }
}
