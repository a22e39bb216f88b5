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
use crate::Mail;
use anyhow::Context;
use std::io::Write;

const ASCTIME: &[time::format_description::FormatItem<'_>] = time::macros::format_description!(
    "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
);

/// The envelope line opening a message in a mailbox.
///
/// # Errors
///
/// * the date could not be formatted
pub fn from_line(mail: &Mail, date: time::OffsetDateTime) -> anyhow::Result<String> {
    let sender = mail
        .sender()
        .map_or_else(|| "MAILER-DAEMON".to_string(), |address| address.email);
    Ok(format!("From {sender} {}", date.format(ASCTIME)?))
}

fn quote(line: &str) -> std::borrow::Cow<'_, str> {
    if line.trim_start_matches('>').starts_with("From ") {
        std::borrow::Cow::Owned(format!(">{line}"))
    } else {
        std::borrow::Cow::Borrowed(line)
    }
}

fn unquote(line: &str) -> &str {
    match line.strip_prefix('>') {
        Some(rest) if rest.trim_start_matches('>').starts_with("From ") => rest,
        _ => line,
    }
}

/// Serialize one message the way it is stored in a mailbox.
///
/// # Errors
///
/// * see [`from_line`]
pub fn to_mbox_entry(mail: &Mail, date: time::OffsetDateTime) -> anyhow::Result<String> {
    let mut out = from_line(mail, date)?;
    out.push('\n');
    for line in mail.to_string().lines() {
        out.push_str(&quote(line));
        out.push('\n');
    }
    out.push('\n');
    Ok(out)
}

/// Append a message to the mailbox at `path`, creating it if needed.
/// The data is flushed to disk before returning the new size of the file.
///
/// # Errors
///
/// * the file could not be opened, written or synced
pub fn append(path: &std::path::Path, mail: &Mail) -> anyhow::Result<u64> {
    let entry = to_mbox_entry(mail, time::OffsetDateTime::now_utc())?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open mailbox '{}'", path.display()))?;

    file.write_all(entry.as_bytes())
        .with_context(|| format!("Failed to append to mailbox '{}'", path.display()))?;
    file.sync_data()?;

    Ok(file.metadata()?.len())
}

/// Split the content of a mailbox into messages.
///
/// # Errors
///
/// * an entry cannot be parsed, nothing is returned then
pub fn parse(content: &str) -> anyhow::Result<Vec<Mail>> {
    let mut raw_messages: Vec<Vec<&str>> = vec![];
    let mut previous_blank = true;

    for line in content.lines() {
        if previous_blank && line.starts_with("From ") {
            raw_messages.push(vec![]);
        } else if let Some(current) = raw_messages.last_mut() {
            current.push(unquote(line));
        }
        previous_blank = line.is_empty();
    }

    raw_messages
        .into_iter()
        .enumerate()
        .map(|(index, mut lines)| {
            // separator blank line
            if lines.last().map_or(false, |l| l.is_empty()) {
                lines.pop();
            }
            let mut raw = lines.join("\n");
            raw.push('\n');
            Mail::parse(&raw).with_context(|| format!("Mailbox entry {} cannot be parsed", index + 1))
        })
        .collect()
}

/// Read every message of the mailbox at `path`.
///
/// # Errors
///
/// * the file could not be read
/// * an entry cannot be parsed, see [`parse`]
pub fn read_all(path: &std::path::Path) -> anyhow::Result<Vec<Mail>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mailbox '{}'", path.display()))?;
    parse(&content).with_context(|| format!("Invalid mailbox '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mail(subject: &str, body: &str) -> Mail {
        Mail::text(
            [
                ("From".to_string(), "Jane <jane@doe.com>".to_string()),
                ("Subject".to_string(), subject.to_string()),
            ],
            body,
        )
    }

    #[test]
    fn envelope_line() {
        let date = time::macros::datetime!(2022-03-04 05:06:07 UTC);
        assert_eq!(
            from_line(&mail("s", "b"), date).unwrap(),
            "From jane@doe.com Fri Mar  4 05:06:07 2022"
        );
    }

    #[test]
    fn from_quoting() {
        let date = time::macros::datetime!(2022-03-04 05:06:07 UTC);
        let entry = to_mbox_entry(&mail("s", "hello\n\nFrom here\n>From there\n"), date).unwrap();

        assert!(entry.contains("\n>From here\n>>From there\n"));
        assert_eq!(
            parse(&entry).unwrap(),
            vec![mail("s", "hello\n\nFrom here\n>From there\n")]
        );
    }

    #[test]
    fn invalid_entry_fails_the_whole_mailbox() {
        let date = time::macros::datetime!(2022-03-04 05:06:07 UTC);
        let content = format!(
            "{}From MAILER-DAEMON Fri Mar  4 05:06:07 2022\nnot a header\n\nbody\n\n",
            to_mbox_entry(&mail("s", "b"), date).unwrap()
        );

        let error = parse(&content).unwrap_err();
        assert_eq!(error.to_string(), "Mailbox entry 2 cannot be parsed");
    }

    #[test]
    fn append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digest.mbox");

        let first = append(&path, &mail("one", "first body")).unwrap();
        let second = append(&path, &mail("two", "second body")).unwrap();
        assert!(second > first);

        let messages = read_all(&path).unwrap();
        assert_eq!(
            messages.iter().map(|m| m.subject()).collect::<Vec<_>>(),
            vec![Some("one"), Some("two")]
        );
        assert_eq!(messages[1].text_content(), Some("second body\n"));
    }
}
