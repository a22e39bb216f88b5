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
//! Messages generated on behalf of a list. Each builder returns the message
//! and the metadata to queue it with.

use crate::MailingList;
use listd_common::{metadata::keys, utils, BounceInfo, DeliveryStatus, Mail, Metadata};

fn header(name: &str, value: impl Into<String>) -> (String, String) {
    (name.to_string(), value.into())
}

fn date_header() -> (String, String) {
    header(
        "Date",
        time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc2822)
            .unwrap_or_default(),
    )
}

fn message_id(list: &MailingList) -> (String, String) {
    header(
        "Message-ID",
        format!(
            "<listd.{:.6}.{}.{}@{}>",
            utils::now_epoch(),
            fastrand::u32(..),
            list.name,
            list.host
        ),
    )
}

/// `From`, `To`, `Subject`, `Date` and a fresh `Message-ID`.
#[must_use]
pub fn envelope(list: &MailingList, to: &str, from: &str, subject: &str) -> Vec<(String, String)> {
    vec![
        header("From", from),
        header("To", to),
        header("Subject", subject),
        date_header(),
        message_id(list),
    ]
}

fn with_attachment(headers: Vec<(String, String)>, text: &str, attached: &Mail) -> Mail {
    Mail::multipart(
        "mixed",
        headers,
        vec![
            Mail::text(
                vec![header("Content-Type", "text/plain; charset=\"us-ascii\"")],
                text,
            ),
            Mail::rfc822(attached.clone()),
        ],
    )
}

fn user_metadata(list: &MailingList, recipient: &str) -> Metadata {
    let mut metadata = Metadata::for_list(&list.name);
    metadata.set_recips(vec![recipient.to_string()]);
    metadata
}

fn owner_metadata(list: &MailingList) -> Metadata {
    let mut recips = list.owner_recipients();
    recips.extend(list.moderators.iter().cloned());
    let mut metadata = Metadata::for_list(&list.name).with(keys::ENVSENDER, list.bounces_address());
    metadata.set_recips(recips);
    metadata
}

/// A text message to one user, sent with `Precedence: bulk`.
#[must_use]
pub fn user_notification(
    list: &MailingList,
    recipient: &str,
    sender: &str,
    subject: &str,
    text: &str,
) -> (Mail, Metadata) {
    let mut headers = envelope(list, recipient, sender, subject);
    headers.push(header("Precedence", "bulk"));
    (Mail::text(headers, text), user_metadata(list, recipient))
}

/// A text message to the owners and moderators of the list.
#[must_use]
pub fn owner_notification(list: &MailingList, subject: &str, text: &str) -> (Mail, Metadata) {
    let mut headers = envelope(
        list,
        &list.owner_address(),
        &list.request_address(),
        subject,
    );
    headers.push(header("Precedence", "bulk"));
    headers.push(header("X-List-Administrivia", "yes"));
    (Mail::text(headers, text), owner_metadata(list))
}

/// Tell the owners the bounce score of `member` changed, or that the member
/// was disabled, with the bounce attached.
#[must_use]
pub fn bounce_action(
    list: &MailingList,
    member: &str,
    did: &str,
    bounce: &Mail,
) -> (Mail, Metadata) {
    let text = format!(
        "This is a bounce action notice from the {list} mailing list:\n\
         \n\
         \x20   List:       {list}\n\
         \x20   Member:     {member}\n\
         \x20   Action:     Subscription {did}.\n\
         \x20   Reason:     Excessive or fatal bounces.\n\
         \n\
         The triggering bounce notice is attached below.\n",
        list = list.name,
    );
    let mut headers = envelope(
        list,
        &list.owner_address(),
        &list.request_address(),
        "Bounce action notification",
    );
    headers.push(header("Precedence", "bulk"));
    headers.push(header("X-List-Administrivia", "yes"));

    (with_attachment(headers, &text, bounce), owner_metadata(list))
}

/// Ask a disabled member to re-enable its delivery. The subject carries the
/// cookie so that a plain reply confirms.
#[must_use]
pub fn disabled(
    list: &MailingList,
    member: &str,
    status: DeliveryStatus,
    info: &BounceInfo,
    cookie: &str,
) -> (Mail, Metadata) {
    let reason = match status {
        DeliveryStatus::ByBounce => format!(
            "due to excessive bounces. The last bounce received from you was dated {}",
            info.date
        ),
        DeliveryStatus::ByUser => "by yourself".to_string(),
        DeliveryStatus::ByAdmin => "by the list administrator".to_string(),
        DeliveryStatus::Enabled | DeliveryStatus::Unknown => "for unknown reasons".to_string(),
    };
    let text = format!(
        "Your membership in the mailing list {list} has been disabled {reason}.\n\
         You will not get any more messages from this list until you re-enable\n\
         your membership. You will receive {left} more reminders like this\n\
         before your membership in the list is deleted.\n\
         \n\
         To re-enable your membership, you can simply respond to this message\n\
         (leaving the Subject: line intact).\n\
         \n\
         If you have any questions or problems, you can contact the list owner at\n\
         \n\
         \x20   {owner}\n",
        list = list.name,
        left = info.noticesleft,
        owner = list.owner_address(),
    );

    let headers = envelope(
        list,
        member,
        &list.request_address(),
        &format!("confirm {cookie}"),
    );
    (Mail::text(headers, &text), user_metadata(list, member))
}

/// A probe to `member`, whose bounce is attributed by `token` only.
#[must_use]
pub fn probe(list: &MailingList, member: &str, token: &str, bounce: &Mail) -> (Mail, Metadata) {
    let probe_address = list.probe_address(token);
    let text = format!(
        "This is a probe message. You can ignore this message.\n\
         \n\
         The {list} mailing list has received a number of bounces from you,\n\
         indicating that there may be a problem delivering messages to {member}.\n\
         A sample is attached below. Please examine this message to make sure\n\
         there are no problems with your email address.\n\
         \n\
         You don't need to do anything to remain an enabled member of the list.\n\
         \n\
         If you have any questions or problems, you can contact the list owner at\n\
         \n\
         \x20   {owner}\n",
        list = list.name,
        owner = list.owner_address(),
    );
    let mut headers = envelope(
        list,
        member,
        &probe_address,
        &format!("{} mailing list probe message", list.name),
    );
    headers.push(header("Precedence", "bulk"));

    let metadata = user_metadata(list, member)
        .with(keys::ENVSENDER, probe_address)
        .with(keys::VERP, false)
        .with(keys::PROBE_TOKEN, token);
    (with_attachment(headers, &text, bounce), metadata)
}

/// Tell the owners a member was removed.
#[must_use]
pub fn removal(list: &MailingList, member: &str, reason: &str) -> (Mail, Metadata) {
    owner_notification(
        list,
        &format!("{} unsubscribe notification", list.name),
        &format!("{member} has been removed from {} ({reason}).\n", list.name),
    )
}

/// Tell a removed member.
#[must_use]
pub fn goodbye(list: &MailingList, member: &str) -> (Mail, Metadata) {
    user_notification(
        list,
        member,
        &list.request_address(),
        &format!("You have been unsubscribed from the {} mailing list", list.name),
        &format!(
            "Your address {member} has been removed from the {} mailing list.\n",
            list.name
        ),
    )
}

/// Tell the sender its post waits for a moderator.
#[must_use]
pub fn hold_to_sender(
    list: &MailingList,
    sender: &str,
    subject: &str,
    reason: &str,
) -> (Mail, Metadata) {
    user_notification(
        list,
        sender,
        &list.owner_address(),
        &format!("Your message to {} awaits moderator approval", list.name),
        &format!(
            "Your mail to '{list}' with the subject\n\
             \n\
             \x20   {subject}\n\
             \n\
             Is being held until the list moderator can review it for approval.\n\
             \n\
             The reason it is being held:\n\
             \n\
             \x20   {reason}\n\
             \n\
             Either the message will get posted to the list, or you will receive\n\
             notification of the moderator's decision.\n",
            list = list.name,
        ),
    )
}

/// Ask the moderators to review a held post.
#[must_use]
pub fn hold_to_owner(
    list: &MailingList,
    sender: &str,
    reason: &str,
    cookie: &str,
    held: &Mail,
) -> (Mail, Metadata) {
    let text = format!(
        "As list administrator, your authorization is requested for the\n\
         following mailing list posting:\n\
         \n\
         \x20   List:    {list}\n\
         \x20   From:    {sender}\n\
         \x20   Subject: {subject}\n\
         \x20   Reason:  {reason}\n\
         \n\
         To approve or deny the request, confirm the cookie\n\
         \n\
         \x20   {cookie}\n",
        list = list.name,
        subject = held.subject().unwrap_or("(no subject)"),
    );
    let mut headers = envelope(
        list,
        &list.owner_address(),
        &list.request_address(),
        &format!("{} post from {sender} requires approval", list.name),
    );
    headers.push(header("Precedence", "bulk"));
    headers.push(header("X-List-Administrivia", "yes"));

    (with_attachment(headers, &text, held), owner_metadata(list))
}

/// Return a rejected post to its sender with the reason.
#[must_use]
pub fn reject(
    list: &MailingList,
    sender: &str,
    notice: &str,
    original: &Mail,
) -> (Mail, Metadata) {
    let mut headers = envelope(
        list,
        sender,
        &list.owner_address(),
        original.subject().unwrap_or("(no subject)"),
    );
    headers.push(header("Precedence", "bulk"));
    (
        with_attachment(headers, notice, original),
        user_metadata(list, sender),
    )
}

/// Forward a bounce nobody could be found in to the owners.
#[must_use]
pub fn unrecognized_bounce(list: &MailingList, bounce: &Mail) -> (Mail, Metadata) {
    let mut headers = envelope(
        list,
        &list.owner_address(),
        &list.request_address(),
        "Uncaught bounce notification",
    );
    headers.push(header("Precedence", "bulk"));
    headers.push(header("X-List-Administrivia", "yes"));
    (
        with_attachment(
            headers,
            "The attached message was received as a bounce, but either the bounce\n\
             format was not recognized, or no member addresses could be extracted\n\
             from it.\n",
            bounce,
        ),
        owner_metadata(list),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn list() -> MailingList {
        let mut list = MailingList::new("test", "lists.example.com");
        list.owners = vec!["owner@example.com".to_string()];
        list.moderators = vec!["moderator@example.com".to_string()];
        list
    }

    #[test]
    fn to_owner() {
        let (mail, metadata) = owner_notification(&list(), "hello", "world");
        assert_eq!(mail.get_header("To"), Some("test-owner@lists.example.com"));
        assert_eq!(mail.get_header("From"), Some("test-request@lists.example.com"));
        assert_eq!(mail.get_header("X-List-Administrivia"), Some("yes"));
        assert!(mail.message_id().is_some());
        assert_eq!(
            metadata.recips().unwrap(),
            vec!["owner@example.com", "moderator@example.com"]
        );
        assert_eq!(
            metadata.get_str(keys::ENVSENDER),
            Some("test-bounces@lists.example.com")
        );
    }

    #[test]
    fn disabled_has_no_precedence() {
        let info = BounceInfo::new(5.0, time::macros::date!(2022 - 03 - 04), 2);
        let (mail, metadata) = disabled(
            &list(),
            "alice@example.com",
            DeliveryStatus::ByBounce,
            &info,
            "abc",
        );
        assert_eq!(mail.subject(), Some("confirm abc"));
        assert_eq!(mail.get_header("Precedence"), None);
        assert!(mail.text_content().unwrap().contains("2022-03-04"));
        assert!(mail.text_content().unwrap().contains("receive 2 more"));
        assert_eq!(metadata.recips().unwrap(), vec!["alice@example.com"]);
    }

    #[test]
    fn probe_is_verp_encoded() {
        let bounce = Mail::text(vec![header("Subject", "failure")], "failed");
        let (mail, metadata) = probe(&list(), "alice@example.com", "0123", &bounce);

        assert_eq!(
            mail.get_header("From"),
            Some("test-bounces+0123@lists.example.com")
        );
        assert_eq!(mail.parts().len(), 2);
        assert_eq!(mail.parts()[1].body, listd_common::Body::Message(Box::new(bounce)));
        assert_eq!(
            metadata.get_str(keys::ENVSENDER),
            Some("test-bounces+0123@lists.example.com")
        );
        assert_eq!(metadata.get_str(keys::PROBE_TOKEN), Some("0123"));
        assert!(!metadata.flag(keys::VERP));
    }

    #[test]
    fn reject_keeps_subject() {
        let original = Mail::text(vec![header("Subject", "my post")], "content");
        let (mail, metadata) = reject(&list(), "bob@example.com", "too big", &original);
        assert_eq!(mail.subject(), Some("my post"));
        assert_eq!(mail.parts()[0].text_content(), Some("too big\n"));
        assert_eq!(metadata.recips().unwrap(), vec!["bob@example.com"]);
    }
}
