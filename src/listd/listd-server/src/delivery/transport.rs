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
use listd_config::field::DeliveryTransport;

/// Failure of a transport for a batch of recipients.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// the transport could not be reached at all.
    #[error("cannot reach the mail transport: {0}")]
    Connection(String),
    /// the batch may succeed later.
    #[error("temporary failure: {0}")]
    Temporary(String),
    /// the batch will never succeed.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

/// Hand a message over to the next hop.
pub trait Transport {
    /// Deliver `content` to `recipients` with the envelope `sender`.
    ///
    /// # Errors
    ///
    /// * see [`TransportError`]
    fn send(&self, sender: &str, recipients: &[String], content: &str)
        -> Result<(), TransportError>;
}

/// Pipe the message to a sendmail compatible program.
pub struct Sendmail {
    path: std::path::PathBuf,
    args: Vec<String>,
}

// sysexits.h
const EX_DATAERR: i32 = 65;
const EX_NOUSER: i32 = 67;
const EX_NOHOST: i32 = 68;
const EX_UNAVAILABLE: i32 = 69;

impl Sendmail {
    ///
    #[must_use]
    pub fn new(path: impl Into<std::path::PathBuf>, args: Vec<String>) -> Self {
        Self {
            path: path.into(),
            args,
        }
    }
}

impl Transport for Sendmail {
    fn send(
        &self,
        sender: &str,
        recipients: &[String],
        content: &str,
    ) -> Result<(), TransportError> {
        use std::io::Write;

        let mut child = std::process::Command::new(&self.path)
            .args(&self.args)
            .arg("-f")
            .arg(sender)
            .arg("--")
            .args(recipients)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|error| {
                TransportError::Connection(format!("{}: {error}", self.path.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(error) = stdin.write_all(content.as_bytes()) {
                tracing::warn!(%error, "Failed to write the message to the transport.");
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|error| TransportError::Temporary(error.to_string()))?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        match output.status.code() {
            Some(0) => Ok(()),
            Some(EX_DATAERR | EX_NOUSER | EX_NOHOST | EX_UNAVAILABLE) => {
                Err(TransportError::Permanent(format!("{}: {stderr}", output.status)))
            }
            // EX_TEMPFAIL, unknown codes and signals
            _ => {
                Err(TransportError::Temporary(format!("{}: {stderr}", output.status)))
            }
        }
    }
}

/// Write each delivery as a file of a directory, the envelope in the first
/// headers.
pub struct Directory {
    dirpath: std::path::PathBuf,
}

impl Directory {
    ///
    #[must_use]
    pub fn new(dirpath: impl Into<std::path::PathBuf>) -> Self {
        Self {
            dirpath: dirpath.into(),
        }
    }
}

impl Transport for Directory {
    fn send(
        &self,
        sender: &str,
        recipients: &[String],
        content: &str,
    ) -> Result<(), TransportError> {
        std::fs::create_dir_all(&self.dirpath)
            .map_err(|error| TransportError::Connection(error.to_string()))?;

        let filename = format!(
            "{:.6}-{:08x}.eml",
            listd_common::utils::now_epoch(),
            fastrand::u32(..)
        );
        let envelope = format!(
            "X-Envelope-From: <{sender}>\nX-Envelope-To: {}\n",
            recipients.join(", ")
        );
        listd_common::utils::atomic_write(
            &self.dirpath.join(filename),
            format!("{envelope}{content}").as_bytes(),
        )
        .map_err(|error| TransportError::Temporary(format!("{error:#}")))
    }
}

/// The transport described by the configuration.
#[must_use]
pub fn from_config(transport: &DeliveryTransport) -> Box<dyn Transport> {
    match transport {
        DeliveryTransport::Sendmail { path, args } => Box::new(Sendmail::new(path, args.clone())),
        DeliveryTransport::Directory { dirpath } => Box::new(Directory::new(dirpath)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn script(root: &std::path::Path, code: i32) -> Sendmail {
        let path = root.join("sendmail.sh");
        std::fs::write(&path, format!("#!/bin/sh\ncat > /dev/null\nexit {code}\n")).unwrap();
        Sendmail::new("/bin/sh", vec![path.display().to_string()])
    }

    #[rstest::rstest]
    #[case(0, "ok")]
    #[case(75, "temporary")]
    #[case(67, "permanent")]
    #[case(1, "temporary")]
    fn sendmail_exit_codes(#[case] code: i32, #[case] expected: &str) {
        let root = tempfile::tempdir().unwrap();
        let outcome = script(root.path(), code).send(
            "list-bounces@lists.testserver.com",
            &["user@domain.tld".to_string()],
            "Subject: hi\n\nhi\n",
        );
        let got = match outcome {
            Ok(()) => "ok",
            Err(TransportError::Temporary(_)) => "temporary",
            Err(TransportError::Permanent(_)) => "permanent",
            Err(TransportError::Connection(_)) => "connection",
        };
        assert_eq!(got, expected);
    }

    #[test]
    fn missing_sendmail() {
        let outcome = Sendmail::new("/nonexistent/sendmail", vec![]).send("a@b.c", &[], "");
        assert!(matches!(outcome, Err(TransportError::Connection(_))));
    }

    #[test]
    fn directory() {
        let root = tempfile::tempdir().unwrap();
        let transport = Directory::new(root.path().join("out"));
        transport
            .send(
                "test-bounces@lists.testserver.com",
                &["a@domain.tld".to_string(), "b@domain.tld".to_string()],
                "Subject: hi\n\nhi\n",
            )
            .unwrap();

        let files = std::fs::read_dir(root.path().join("out"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect::<Vec<_>>();
        assert_eq!(files.len(), 1);
        assert_eq!(
            std::fs::read_to_string(&files[0]).unwrap(),
            "X-Envelope-From: <test-bounces@lists.testserver.com>\n\
             X-Envelope-To: a@domain.tld, b@domain.tld\n\
             Subject: hi\n\nhi\n"
        );
    }
}
