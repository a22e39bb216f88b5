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
//! Find who a bounce is about.

use listd_common::{mail::parse_address_list, Body, Mail};
use listd_mlist::MailingList;

/// Headers where the MTAs put the envelope recipient of a bounce.
const RECIPIENT_HEADERS: [&str; 4] = ["To", "Delivered-To", "Envelope-To", "Apparently-To"];

/// The part after `<list>-bounces+` in the local part of the first recipient
/// header address of the list.
fn tagged_locals(list: &MailingList, mail: &Mail) -> Vec<String> {
    let prefix = format!("{}-bounces+", list.name);
    RECIPIENT_HEADERS
        .iter()
        .flat_map(|name| mail.get_all_headers(name))
        .flat_map(parse_address_list)
        .filter_map(|address| {
            let local = address.local_part().to_string();
            local
                .get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(&prefix))
                .map(|_| local[prefix.len()..].to_string())
        })
        .collect()
}

/// The member address encoded in a VERP bounce address
/// `<list>-bounces+<local>=<domain>@<host>`.
#[must_use]
pub fn verp(list: &MailingList, mail: &Mail) -> Option<String> {
    tagged_locals(list, mail).into_iter().find_map(|tag| {
        let (local, domain) = tag.rsplit_once('=')?;
        (!local.is_empty() && !domain.is_empty()).then(|| format!("{local}@{domain}"))
    })
}

/// The token of a probe bounce `<list>-bounces+<40 hex digits>@<host>`.
#[must_use]
pub fn probe_token(list: &MailingList, mail: &Mail) -> Option<String> {
    tagged_locals(list, mail)
        .into_iter()
        .find(|tag| tag.len() == 40 && tag.chars().all(|c| c.is_ascii_hexdigit()))
        .map(|tag| tag.to_lowercase())
}

fn collect_delivery_status<'a>(mail: &'a Mail, out: &mut Vec<&'a str>) {
    match &mail.body {
        Body::Text(text) if mail.content_type().0 == "message/delivery-status" => out.push(text),
        Body::Multipart { parts, .. } => {
            for part in parts {
                collect_delivery_status(part, out);
            }
        }
        _ => {}
    }
}

/// The failed recipients of a delivery status notification (RFC 3464).
#[must_use]
pub fn dsn(mail: &Mail) -> Vec<String> {
    let mut reports = vec![];
    collect_delivery_status(mail, &mut reports);

    let mut failed = Vec::<String>::new();
    for report in reports {
        for block in report.split("\n\n") {
            let mut action = None;
            let mut recipient = None;
            for line in block.lines() {
                let Some((name, value)) = line.split_once(':') else {
                    continue;
                };
                match name.trim().to_ascii_lowercase().as_str() {
                    "action" => action = Some(value.trim().to_ascii_lowercase()),
                    "final-recipient" => recipient = Some(value.trim().to_string()),
                    "original-recipient" if recipient.is_none() => {
                        recipient = Some(value.trim().to_string());
                    }
                    _ => {}
                }
            }

            let (Some(action), Some(recipient)) = (action, recipient) else {
                continue;
            };
            if action != "failed" {
                continue;
            }
            let address = recipient
                .split_once(';')
                .map_or(recipient.as_str(), |(_, address)| address)
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string();
            if !address.is_empty() && !failed.iter().any(|known| known.eq_ignore_ascii_case(&address)) {
                failed.push(address);
            }
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn list() -> MailingList {
        MailingList::new("test", "lists.testserver.com")
    }

    fn bounce_to(header: &str, to: &str) -> Mail {
        Mail::text(
            vec![
                ("From".to_string(), "MAILER-DAEMON@mx.domain.tld".to_string()),
                (header.to_string(), to.to_string()),
            ],
            "bounced\n",
        )
    }

    #[rstest::rstest]
    #[case("To", "test-bounces+user=domain.tld@lists.testserver.com", Some("user@domain.tld"))]
    #[case("Delivered-To", "<Test-Bounces+a.b=c.d@lists.testserver.com>", Some("a.b@c.d"))]
    #[case("To", "other-bounces+user=domain.tld@lists.testserver.com", None)]
    #[case("To", "test-bounces@lists.testserver.com", None)]
    #[case("To", "test-bounces+=domain.tld@lists.testserver.com", None)]
    fn verp_addresses(#[case] header: &str, #[case] to: &str, #[case] expected: Option<&str>) {
        assert_eq!(verp(&list(), &bounce_to(header, to)).as_deref(), expected);
    }

    #[test]
    fn probe_tokens() {
        let token = "0123456789abcdef0123456789abcdef01234567";
        let mail = bounce_to("To", &format!("test-bounces+{token}@lists.testserver.com"));
        assert_eq!(probe_token(&list(), &mail).as_deref(), Some(token));
        assert_eq!(verp(&list(), &mail), None);

        let mail = bounce_to("To", "test-bounces+user=domain.tld@lists.testserver.com");
        assert_eq!(probe_token(&list(), &mail), None);
    }

    #[test]
    fn delivery_status() {
        let mail = listd_test::mail::local_dsn("test-bounces@lists.testserver.com", "gone@domain.tld");
        assert_eq!(dsn(&mail), vec!["gone@domain.tld".to_string()]);

        let reparsed = Mail::parse(&mail.to_string()).unwrap();
        assert_eq!(dsn(&reparsed), vec!["gone@domain.tld".to_string()]);
    }

    #[test]
    fn delayed_is_not_failed() {
        let status = Mail::text(
            vec![("Content-Type".to_string(), "message/delivery-status".to_string())],
            "Reporting-MTA: dns; mx\n\n\
             Final-Recipient: rfc822; <late@domain.tld>\nAction: delayed\n\n\
             Original-Recipient: rfc822; gone@domain.tld\nAction: Failed\n\n\
             Final-Recipient: rfc822; gone@domain.tld\nAction: failed\n",
        );
        let mail = Mail::multipart("report", vec![], vec![status]);
        assert_eq!(dsn(&mail), vec!["gone@domain.tld".to_string()]);
    }
}
