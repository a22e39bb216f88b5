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
use super::Issue;
use listd_common::Mail;

fn text_part(description: &str, text: &str) -> Mail {
    Mail::text(
        vec![
            (
                "Content-Type".to_string(),
                "text/plain; charset=\"us-ascii\"".to_string(),
            ),
            ("Content-Description".to_string(), description.to_string()),
        ],
        text,
    )
}

/// `multipart/mixed` digest: masthead, optional header, table of contents,
/// the posts in a `multipart/digest` part, optional footer.
pub fn build(issue: &Issue<'_>, messages: &[Mail]) -> Mail {
    let mut parts = vec![text_part(&issue.id(), &issue.masthead())];

    if let Some(header) = &issue.list.digest.header {
        parts.push(text_part("Digest Header", header));
    }
    parts.push(text_part(
        &format!("Today's Topics ({} messages)", messages.len()),
        &issue.toc(messages),
    ));
    parts.push(Mail::multipart(
        "digest",
        vec![],
        messages.iter().cloned().map(Mail::rfc822).collect(),
    ));
    if let Some(footer) = &issue.list.digest.footer {
        parts.push(text_part("Digest Footer", footer));
    }

    Mail::multipart("mixed", issue.headers(), parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use listd_mlist::MailingList;
    use pretty_assertions::assert_eq;

    #[test]
    fn layout() {
        let mut list = MailingList::new("test", "lists.testserver.com");
        list.digest.footer = Some("bye\n".to_string());
        let issue = Issue {
            list: &list,
            volume: 2,
            number: 5,
        };
        let messages = vec![
            listd_test::mail::local_post("test", "a@domain.tld", "one"),
            listd_test::mail::local_post("test", "b@domain.tld", "two"),
        ];

        let digest = build(&issue, &messages);
        assert_eq!(digest.subject(), Some("test Digest, Vol 2, Issue 5"));
        assert_eq!(digest.get_header("From"), Some("test-request@lists.testserver.com"));

        let descriptions = digest
            .parts()
            .iter()
            .map(|part| part.get_header("Content-Description").unwrap_or("-"))
            .collect::<Vec<_>>();
        assert_eq!(
            descriptions,
            vec![
                "test Digest, Vol 2, Issue 5",
                "Today's Topics (2 messages)",
                "-",
                "Digest Footer"
            ]
        );

        let reparsed = Mail::parse(&digest.to_string()).unwrap();
        assert_eq!(reparsed.parts()[2].parts().len(), 2);
    }
}
