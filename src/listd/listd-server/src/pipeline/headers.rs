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
use listd_common::{metadata::keys, Mail, Metadata};
use listd_mlist::MailingList;

/// Recipients of a post: the enabled members not receiving digests.
/// Recipients set upstream are kept.
pub fn calc_recips(
    _: &mut HandlerContext<'_>,
    list: &mut MailingList,
    _: &mut Mail,
    metadata: &mut Metadata,
) -> anyhow::Result<Disposition> {
    if metadata.contains(keys::RECIPS) {
        return Ok(Disposition::Continue);
    }
    metadata.set_recips(
        list.regular_recipients()
            .map(|member| member.address.clone())
            .collect(),
    );
    Ok(Disposition::Continue)
}

fn prefixed_subject(prefix: &str, subject: Option<&str>) -> String {
    let subject = subject.map(str::trim).unwrap_or_default();
    let trimmed = prefix.trim();
    if subject.contains(trimmed) {
        return subject.to_string();
    }
    if subject.is_empty() {
        format!("{prefix}(no subject)")
    } else {
        format!("{prefix}{subject}")
    }
}

/// Decorate the message with the list headers. Messages generated by the
/// server are only tagged with the list identity.
pub fn cook_headers(
    _: &mut HandlerContext<'_>,
    list: &mut MailingList,
    mail: &mut Mail,
    metadata: &mut Metadata,
) -> anyhow::Result<Disposition> {
    mail.set_header("X-BeenThere", &list.posting_address());
    mail.set_header("List-Id", &list.list_id());

    if metadata.flag(keys::FASTTRACK) {
        return Ok(Disposition::Continue);
    }

    if let Some(prefix) = &list.posting.subject_prefix {
        let prefix = prefix.replace("%d", &list.post_id.to_string());
        let subject = prefixed_subject(&prefix, mail.subject());
        mail.set_header("Subject", &subject);
    }

    if mail.get_header("Precedence").is_none() {
        mail.set_header("Precedence", "list");
    }
    mail.set_header("Sender", &list.bounces_address());
    mail.set_header("Errors-To", &list.bounces_address());

    let request = list.request_address();
    mail.set_header("List-Post", &format!("<mailto:{}>", list.posting_address()));
    mail.set_header("List-Help", &format!("<mailto:{request}?subject=help>"));
    mail.set_header(
        "List-Subscribe",
        &format!("<mailto:{request}?subject=subscribe>"),
    );
    mail.set_header(
        "List-Unsubscribe",
        &format!("<mailto:{request}?subject=unsubscribe>"),
    );
    Ok(Disposition::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{list, Fixture};
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case("[test] ", Some("hello"), "[test] hello")]
    #[case("[test] ", Some("Re: [test] hello"), "Re: [test] hello")]
    #[case("[test] ", None, "[test] (no subject)")]
    #[case("[test %d] ", Some("hello"), "[test 12] hello")]
    fn subject_prefix(#[case] prefix: &str, #[case] subject: Option<&str>, #[case] expected: &str) {
        let fixture = Fixture::new();
        let mut list = list();
        list.post_id = 12;
        list.posting.subject_prefix = Some(prefix.to_string());
        let mut mail = listd_test::mail::local_post("test", "user@domain.tld", "x");
        mail.remove_header("Subject");
        if let Some(subject) = subject {
            mail.set_header("Subject", subject);
        }

        cook_headers(&mut fixture.ctx(), &mut list, &mut mail, &mut Metadata::for_list("test")).unwrap();
        assert_eq!(mail.subject(), Some(expected));
    }

    #[test]
    fn list_headers() {
        let fixture = Fixture::new();
        let mut list = list();
        let mut mail = listd_test::mail::local_post("test", "user@domain.tld", "hello");

        cook_headers(&mut fixture.ctx(), &mut list, &mut mail, &mut Metadata::for_list("test")).unwrap();
        assert_eq!(mail.get_header("Precedence"), Some("list"));
        assert_eq!(mail.get_header("X-BeenThere"), Some("test@lists.testserver.com"));
        assert_eq!(mail.get_header("List-Post"), Some("<mailto:test@lists.testserver.com>"));
        assert_eq!(mail.get_header("Sender"), Some("test-bounces@lists.testserver.com"));
    }

    #[test]
    fn recipients_given_upstream_are_kept() {
        let fixture = Fixture::new();
        let mut list = list();
        let mut metadata = Metadata::for_list("test");
        metadata.set_recips(vec!["someone@domain.tld".to_string()]);

        calc_recips(&mut fixture.ctx(), &mut list, &mut Mail::default(), &mut metadata).unwrap();
        assert_eq!(metadata.recips(), Some(vec!["someone@domain.tld".to_string()]));

        let mut list = list;
        list.set_delivery_status("other@domain.tld", listd_common::DeliveryStatus::ByUser);
        let mut metadata = Metadata::for_list("test");
        calc_recips(&mut fixture.ctx(), &mut list, &mut Mail::default(), &mut metadata).unwrap();
        assert_eq!(metadata.recips(), Some(vec!["user@domain.tld".to_string()]));
    }
}
