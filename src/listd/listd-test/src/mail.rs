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
use listd_common::Mail;

fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// A plain text post from `sender` to `listname`.
#[must_use]
pub fn local_post(listname: &str, sender: &str, subject: &str) -> Mail {
    Mail::text(
        headers(&[
            ("From", sender),
            ("To", &format!("{listname}@lists.testserver.com")),
            ("Subject", subject),
            ("Message-ID", &format!("<{subject}@testserver.com>").replace(' ', ".")),
            ("Date", "Fri, 04 Mar 2022 05:06:07 +0000"),
        ]),
        "Be happy!\n",
    )
}

/// The message used when the content does not matter.
#[must_use]
pub fn local_mail() -> Mail {
    Mail::text(
        headers(&[
            ("From", "NoBody <nobody@domain.tld>"),
            ("Reply-To", "Yuin <yuin@domain.tld>"),
            ("To", "Hei <hei@domain.tld>"),
            ("Subject", "Happy new year"),
        ]),
        "Be happy!\n",
    )
}

/// A delivery status notification reporting a permanent failure for `recipient`.
#[must_use]
pub fn local_dsn(to: &str, recipient: &str) -> Mail {
    let human = Mail::text(
        headers(&[("Content-Type", "text/plain")]),
        "Delivery to the following recipient failed permanently.\n",
    );
    let status = Mail::text(
        headers(&[("Content-Type", "message/delivery-status")]),
        &format!(
            "Reporting-MTA: dns; mx.domain.tld\n\nFinal-Recipient: rfc822; {recipient}\nAction: failed\nStatus: 5.1.1\n"
        ),
    );
    let mut dsn = Mail::multipart(
        "report",
        headers(&[
            ("From", "MAILER-DAEMON@mx.domain.tld"),
            ("To", to),
            ("Subject", "Undelivered Mail Returned to Sender"),
        ]),
        vec![human, status],
    );
    if let Some((_, value)) = dsn
        .headers
        .0
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Type"))
    {
        *value = value.replacen(
            "multipart/report;",
            "multipart/report; report-type=delivery-status;",
            1,
        );
    }
    dsn
}
