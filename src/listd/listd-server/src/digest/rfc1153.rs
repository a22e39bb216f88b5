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

const SEPARATOR_70: &str =
    "----------------------------------------------------------------------";
const SEPARATOR_30: &str = "------------------------------";

/// Plain text digest following RFC 1153.
pub fn build(issue: &Issue<'_>, messages: &[Mail], kept_headers: &[String]) -> Mail {
    let mut text = issue.masthead();
    text.push('\n');

    if let Some(header) = &issue.list.digest.header {
        text.push_str(header);
        if !header.ends_with('\n') {
            text.push('\n');
        }
        text.push('\n');
    }

    text.push_str(&issue.toc(messages));
    text.push('\n');
    text.push_str(SEPARATOR_70);
    text.push_str("\n\n");

    for (index, message) in messages.iter().enumerate() {
        text.push_str(&format!("Message: {}\n", index + 1));
        for name in kept_headers {
            for value in message.get_all_headers(name) {
                text.push_str(&format!("{name}: {value}\n"));
            }
        }
        text.push('\n');

        let content = message
            .text_content()
            .unwrap_or("[Non-text content of the message omitted]\n");
        text.push_str(content);
        if !content.ends_with('\n') {
            text.push('\n');
        }
        text.push('\n');
        text.push_str(SEPARATOR_30);
        text.push_str("\n\n");
    }

    if let Some(footer) = &issue.list.digest.footer {
        text.push_str(footer);
        if !footer.ends_with('\n') {
            text.push('\n');
        }
        text.push('\n');
        text.push_str(SEPARATOR_30);
        text.push_str("\n\n");
    }

    let signoff = format!("End of {}", issue.id());
    text.push_str(&format!("{signoff}\n{}\n", "*".repeat(signoff.len())));

    let mut headers = issue.headers();
    headers.push((
        "Content-Type".to_string(),
        "text/plain; charset=\"us-ascii\"".to_string(),
    ));
    headers.push(("MIME-Version".to_string(), "1.0".to_string()));
    Mail::text(headers, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use listd_mlist::MailingList;
    use pretty_assertions::assert_eq;

    #[test]
    fn messages_with_kept_headers() {
        let list = MailingList::new("test", "lists.testserver.com");
        let issue = Issue {
            list: &list,
            volume: 1,
            number: 3,
        };
        let mut post = listd_test::mail::local_post("test", "a@domain.tld", "one");
        post.set_header("X-Mailer", "none");

        let digest = build(
            &issue,
            &[post],
            &["From".to_string(), "Subject".to_string()],
        );
        let text = digest.text_content().unwrap();
        let message = text
            .split_once(&format!("{SEPARATOR_70}\n\n"))
            .unwrap()
            .1;

        assert_eq!(
            message,
            "Message: 1\n\
             From: a@domain.tld\n\
             Subject: one\n\
             \n\
             Be happy!\n\
             \n\
             ------------------------------\n\
             \n\
             End of test Digest, Vol 1, Issue 3\n\
             **********************************\n"
        );
    }
}
