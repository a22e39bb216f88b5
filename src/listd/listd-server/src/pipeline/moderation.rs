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
use listd_common::{mail::parse_address_list, metadata::keys, Body, Mail, Metadata};
use listd_mlist::{MailingList, NonmemberAction};

const APPROVAL_HEADERS: [&str; 3] = ["Approved", "Approve", "X-Approved"];

/// Headers asking for reading receipts or carrying a password.
const CLEANSED_HEADERS: [&str; 8] = [
    "Approved",
    "Approve",
    "X-Approved",
    "Urgent",
    "Return-Receipt-To",
    "Disposition-Notification-To",
    "X-Confirm-Reading-To",
    "X-PMRQC",
];

/// The first non blank line of a text body, if it is an approval line.
fn body_approval(mail: &Mail) -> Option<String> {
    let Body::Text(text) = &mail.body else {
        return None;
    };
    let line = text.lines().find(|line| !line.trim().is_empty())?;
    let (name, value) = line.split_once(':')?;
    APPROVAL_HEADERS
        .iter()
        .any(|header| header.eq_ignore_ascii_case(name.trim()))
        .then(|| value.trim().to_string())
}

fn strip_body_approval(mail: &mut Mail) {
    if let Body::Text(text) = &mut mail.body {
        let mut lines = text.lines().skip_while(|line| line.trim().is_empty());
        lines.next();
        let rest = lines
            .skip_while(|line| line.trim().is_empty())
            .map(|line| format!("{line}\n"))
            .collect::<String>();
        *text = rest;
    }
}

/// A valid moderator password in an approval header, or in the first line of
/// the body, marks the post as approved. The password is removed.
pub fn approve(
    _: &mut HandlerContext<'_>,
    list: &mut MailingList,
    mail: &mut Mail,
    metadata: &mut Metadata,
) -> anyhow::Result<Disposition> {
    let from_header = APPROVAL_HEADERS
        .iter()
        .find_map(|name| mail.get_header(name).map(str::to_string));

    let password = match from_header {
        Some(password) => {
            for name in APPROVAL_HEADERS {
                mail.remove_header(name);
            }
            Some(password)
        }
        None => body_approval(mail).map(|password| {
            strip_body_approval(mail);
            password
        }),
    };

    if let Some(password) = password {
        if list.check_mod_password(&password) {
            metadata.insert(keys::APPROVED, true);
        } else {
            tracing::info!(list = %list.name, "Post with a bad approval password.");
        }
    }
    Ok(Disposition::Continue)
}

pub fn emergency(
    _: &mut HandlerContext<'_>,
    list: &mut MailingList,
    _: &mut Mail,
    metadata: &mut Metadata,
) -> anyhow::Result<Disposition> {
    Ok(if list.posting.emergency && !metadata.flag(keys::APPROVED) {
        Disposition::Hold("Emergency hold of all list traffic is active".to_string())
    } else {
        Disposition::Continue
    })
}

/// Apply the non member policy.
pub fn moderate(
    _: &mut HandlerContext<'_>,
    list: &mut MailingList,
    mail: &mut Mail,
    metadata: &mut Metadata,
) -> anyhow::Result<Disposition> {
    if metadata.flag(keys::APPROVED) {
        return Ok(Disposition::Continue);
    }
    let sender = mail.sender().map(|address| address.email);
    if sender.as_deref().map_or(false, |sender| {
        list.is_member(sender) || list.is_owner(sender) || list.is_moderator(sender)
    }) {
        return Ok(Disposition::Continue);
    }

    Ok(match list.posting.nonmember_action {
        NonmemberAction::Accept => Disposition::Continue,
        NonmemberAction::Hold => {
            Disposition::Hold("Post by non-member to a members-only list".to_string())
        }
        NonmemberAction::Reject => Disposition::Reject(format!(
            "You are not allowed to post to the {} mailing list, and your message has\n\
             been automatically rejected.\n",
            list.name
        )),
        NonmemberAction::Discard => Disposition::Discard,
    })
}

/// Hold the posts too big or with too many recipients.
pub fn hold(
    _: &mut HandlerContext<'_>,
    list: &mut MailingList,
    mail: &mut Mail,
    metadata: &mut Metadata,
) -> anyhow::Result<Disposition> {
    if metadata.flag(keys::APPROVED) {
        return Ok(Disposition::Continue);
    }
    let posting = &list.posting;

    let recipients = mail
        .get_all_headers("To")
        .into_iter()
        .chain(mail.get_all_headers("Cc"))
        .map(|value| parse_address_list(value).len())
        .sum::<usize>();
    if posting.max_num_recipients != 0 && recipients >= posting.max_num_recipients {
        return Ok(Disposition::Hold(format!(
            "Too many recipients to the message: {recipients}"
        )));
    }

    let size = mail.size() as u64;
    if posting.max_message_size_kb != 0 && size > posting.max_message_size_kb * 1024 {
        return Ok(Disposition::Hold(format!(
            "Message body is too big: {size} bytes with a limit of {} KB",
            posting.max_message_size_kb
        )));
    }
    Ok(Disposition::Continue)
}

pub fn cleanse(
    _: &mut HandlerContext<'_>,
    _: &mut MailingList,
    mail: &mut Mail,
    _: &mut Metadata,
) -> anyhow::Result<Disposition> {
    for name in CLEANSED_HEADERS {
        mail.remove_header(name);
    }
    Ok(Disposition::Continue)
}
