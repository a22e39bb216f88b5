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
//! Digests: the posts of a list accumulated in a mailbox and sent as one
//! message, in a MIME form and in a plain text form (RFC 1153).

use anyhow::Context;
use listd_common::{mbox, metadata::keys, utils, Mail, Metadata};
use listd_config::field::FieldServerDigest;
use listd_mlist::{
    DigestFormat, DigestSettings, ListStore, LockError, MailingList, Outbox, VolumeFrequency,
};

mod mime;
mod rfc1153;

/// One issue of the digest of a list.
pub(crate) struct Issue<'a> {
    pub list: &'a MailingList,
    pub volume: u32,
    pub number: u32,
}

impl Issue<'_> {
    pub fn id(&self) -> String {
        format!(
            "{} Digest, Vol {}, Issue {}",
            self.list.name, self.volume, self.number
        )
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = listd_mlist::notice::envelope(
            self.list,
            &self.list.posting_address(),
            &self.list.request_address(),
            &self.id(),
        );
        headers.push(("Reply-To".to_string(), self.list.posting_address()));
        headers
    }

    pub fn masthead(&self) -> String {
        format!(
            "Send {name} mailing list submissions to\n\
             \t{posting}\n\
             \n\
             To subscribe or unsubscribe via email, send a message with subject or\n\
             body 'help' to\n\
             \t{request}\n\
             \n\
             You can reach the person managing the list at\n\
             \t{owner}\n\
             \n\
             When replying, please edit your Subject line so it is more specific\n\
             than \"Re: Contents of {name} digest...\"\n",
            name = self.list.name,
            posting = self.list.posting_address(),
            request = self.list.request_address(),
            owner = self.list.owner_address(),
        )
    }

    /// The table of contents shared by both forms.
    pub fn toc(&self, messages: &[Mail]) -> String {
        let mut out = String::from("Today's Topics:\n\n");
        for (index, message) in messages.iter().enumerate() {
            let subject = self.toc_subject(message);
            let author = message
                .sender()
                .map(|address| format!(" ({})", address.name.unwrap_or(address.email)))
                .unwrap_or_default();

            let mut lines = wrap(&format!("{:2}. {subject}", index + 1), 65);
            match lines.last_mut() {
                _ if author.is_empty() => {}
                Some(last) if last.chars().count() + author.chars().count() <= 70 => {
                    last.push_str(&author);
                }
                _ => lines.push(author.trim_start().to_string()),
            }

            for (n, line) in lines.iter().enumerate() {
                if n == 0 {
                    out.push_str(&format!("  {line}\n"));
                } else {
                    out.push_str(&format!("      {}\n", line.trim_start()));
                }
            }
        }
        out
    }

    fn toc_subject(&self, message: &Mail) -> String {
        let subject = message
            .subject()
            .map(|subject| subject.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|subject| !subject.is_empty())
            .unwrap_or_else(|| "(no subject)".to_string());

        match self
            .list
            .posting
            .subject_prefix
            .as_deref()
            .map(|prefix| prefix.replace("%d", "").trim().to_string())
        {
            Some(prefix) if !prefix.is_empty() && subject.contains(&prefix) => subject
                .replacen(&prefix, "", 1)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
            _ => subject,
        }
    }
}

/// Greedy word wrap keeping the leading indentation, words longer than
/// `width` stay on their own line. Widths are counted in characters.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let words = text.trim_start();
    let mut lines = vec![];
    let mut current = text[..text.len() - words.len()].to_string();
    let mut columns = current.chars().count();
    let mut empty = true;
    for word in words.split(' ').filter(|word| !word.is_empty()) {
        let word_columns = word.chars().count();
        if !empty && columns + 1 + word_columns > width {
            lines.push(std::mem::take(&mut current));
            columns = 0;
            empty = true;
        }
        if !empty {
            current.push(' ');
            columns += 1;
        }
        current.push_str(word);
        columns += word_columns;
        empty = false;
    }
    lines.push(current);
    lines
}

/// Identifies the period of `date` for the volume frequency.
fn period(frequency: VolumeFrequency, date: time::OffsetDateTime) -> (i32, u32) {
    match frequency {
        VolumeFrequency::Yearly => (date.year(), 0),
        VolumeFrequency::Monthly => (date.year(), u32::from(u8::from(date.month()))),
        VolumeFrequency::Quarterly => (date.year(), (u32::from(u8::from(date.month())) - 1) / 3),
        VolumeFrequency::Weekly => {
            let (year, week, _) = date.to_iso_week_date();
            (year, u32::from(week))
        }
        VolumeFrequency::Daily => (date.year(), u32::from(date.ordinal())),
    }
}

/// Start a new volume if the period of the last digest is over.
fn bump_volume(digest: &mut DigestSettings, now: time::OffsetDateTime) {
    let Some(last) = digest.last_sent.and_then(utils::epoch_to_datetime) else {
        return;
    };
    if period(digest.volume_frequency, last) != period(digest.volume_frequency, now) {
        digest.volume += 1;
        digest.next_issue = 1;
    }
}

/// Append `mail` to the digest mailbox of `list`, sending the digests when
/// the mailbox reaches the size threshold. Returns `true` if sent.
///
/// # Errors
///
/// * the mailbox could not be written or read
/// * the digests could not be queued
pub fn accumulate(
    list: &mut MailingList,
    mbox_path: &std::path::Path,
    mail: &Mail,
    settings: &FieldServerDigest,
    outbox: &dyn Outbox,
) -> anyhow::Result<bool> {
    if let Some(parent) = mbox_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let size = mbox::append(mbox_path, mail)?;
    tracing::debug!(list = %list.name, size, "Post added to the digest.");

    if size < list.digest.size_threshold_kb * 1024 {
        return Ok(false);
    }
    send_digests(list, mbox_path, settings, outbox)?;
    Ok(true)
}

/// Send the digests of `list` whatever the size of the mailbox, if it holds
/// at least one message. Returns `true` if sent.
///
/// # Errors
///
/// * see [`accumulate`]
/// * the mailbox holds an entry that cannot be parsed, it is left untouched
pub fn send_pending(
    list: &mut MailingList,
    mbox_path: &std::path::Path,
    settings: &FieldServerDigest,
    outbox: &dyn Outbox,
) -> anyhow::Result<bool> {
    match std::fs::metadata(mbox_path) {
        Ok(metadata) if metadata.len() != 0 => {
            send_digests(list, mbox_path, settings, outbox)?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(error) => {
            Err(error).with_context(|| format!("Failed to stat '{}'", mbox_path.display()))
        }
    }
}

/// Send the pending digests of `only`, or of every list sending its digests
/// periodically. Returns the number of lists whose digests were sent.
///
/// # Errors
///
/// * a list could not be loaded or saved
/// * see [`send_pending`]
pub fn send_all_pending(
    store: &ListStore,
    settings: &FieldServerDigest,
    outbox: &dyn Outbox,
    only: Option<&str>,
) -> anyhow::Result<usize> {
    let names = match only {
        Some(name) => vec![name.to_string()],
        None => store.names()?,
    };

    let mut sent = 0;
    for name in names {
        let _lock = match store.lock(&name) {
            Ok(lock) => lock,
            Err(LockError::Timeout { .. }) if only.is_none() => {
                tracing::info!(list = %name, "List locked, digests not sent.");
                continue;
            }
            Err(error) => return Err(error.into()),
        };
        let mut list = store.load(&name)?;
        if only.is_none() && !list.digest.send_periodic {
            continue;
        }
        if send_pending(&mut list, &store.digest_path(&name), settings, outbox)? {
            store.save(&list)?;
            sent += 1;
        }
    }
    Ok(sent)
}

fn send_digests(
    list: &mut MailingList,
    mbox_path: &std::path::Path,
    settings: &FieldServerDigest,
    outbox: &dyn Outbox,
) -> anyhow::Result<()> {
    let messages = mbox::read_all(mbox_path)?;
    let now = time::OffsetDateTime::now_utc();
    bump_volume(&mut list.digest, now);

    if !messages.is_empty() {
        let issue = Issue {
            list: &*list,
            volume: list.digest.volume,
            number: list.digest.next_issue,
        };
        let digests = [
            (DigestFormat::Mime, mime::build(&issue, &messages)),
            (
                DigestFormat::Plain,
                rfc1153::build(&issue, &messages, &settings.plain_kept_headers),
            ),
        ];

        for (format, digest) in digests {
            let recips = list
                .digest_recipients(format)
                .map(|member| member.address.clone())
                .collect::<Vec<_>>();
            if recips.is_empty() {
                continue;
            }
            tracing::info!(
                list = %list.name, %format, recipients = recips.len(),
                messages = messages.len(), issue = %issue.id(),
                "Sending digest."
            );
            let mut metadata = Metadata::for_list(&list.name).with(keys::ISDIGEST, true);
            metadata.set_recips(recips);
            outbox.send(&digest, &metadata)?;
        }
    }

    std::fs::remove_file(mbox_path)
        .with_context(|| format!("Failed to remove '{}'", mbox_path.display()))?;

    list.digest.next_issue += 1;
    list.digest.last_sent = Some(utils::now_epoch());
    Ok(())
}
