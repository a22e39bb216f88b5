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
use crate::{cli::args::{Commands, MessageShowFormat}, EntryId, Extension, Switchboard};

impl Commands {
    pub(crate) fn message_show<OUT: std::io::Write>(
        queue: &Switchboard,
        id: &EntryId,
        format: &MessageShowFormat,
        output: &mut OUT,
    ) -> anyhow::Result<()> {
        let extension = [Extension::Pck, Extension::Bak]
            .into_iter()
            .find(|ext| queue.entry_path(id, *ext).exists())
            .ok_or_else(|| anyhow::anyhow!("Entry `{id}` does not exist in `{}`", queue.queue()))?;

        let (mail, metadata) = queue.read(id, extension)?;

        output.write_fmt(format_args!(
            "Metadata:\n{}\n",
            serde_json::to_string_pretty(&metadata)?
        ))?;

        output.write_all(b"Message:\n")?;

        output.write_all(
            match format {
                MessageShowFormat::Eml => mail.to_string(),
                MessageShowFormat::Json => serde_json::to_string_pretty(&mail)?,
            }
            .as_bytes(),
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listd_common::{metadata::keys, Metadata, QueueName};
    use listd_test::{config::local_test, mail::local_mail};

    fn setup(root: &std::path::Path) -> (Switchboard, EntryId) {
        let queue = Switchboard::open(&local_test(root), QueueName::Retry).unwrap();
        let id = queue
            .enqueue(
                &local_mail(),
                &Metadata::for_list("test").with(keys::RECEIVED_TIME, 1.5),
            )
            .unwrap();
        (queue, id)
    }

    #[test]
    fn show_json() {
        let root = tempfile::tempdir().unwrap();
        let (queue, id) = setup(root.path());

        let mut output = vec![];
        Commands::message_show(&queue, &id, &MessageShowFormat::Json, &mut output).unwrap();

        pretty_assertions::assert_eq!(
            std::str::from_utf8(&output).unwrap(),
            r#"Metadata:
{
  "listname": "test",
  "received_time": 1.5
}
Message:
{
  "headers": [
    [
      "From",
      "NoBody <nobody@domain.tld>"
    ],
    [
      "Reply-To",
      "Yuin <yuin@domain.tld>"
    ],
    [
      "To",
      "Hei <hei@domain.tld>"
    ],
    [
      "Subject",
      "Happy new year"
    ]
  ],
  "body": {
    "Text": "Be happy!\n"
  }
}"#
        );
    }

    #[test]
    fn show_eml() {
        let root = tempfile::tempdir().unwrap();
        let (queue, id) = setup(root.path());

        let mut output = vec![];
        Commands::message_show(&queue, &id, &MessageShowFormat::Eml, &mut output).unwrap();

        pretty_assertions::assert_eq!(
            std::str::from_utf8(&output).unwrap(),
            [
                "Metadata:\n",
                "{\n  \"listname\": \"test\",\n  \"received_time\": 1.5\n}\n",
                "Message:\n",
                local_mail().to_string().as_str(),
            ]
            .concat()
        );
    }

    #[test]
    fn missing() {
        let root = tempfile::tempdir().unwrap();
        let (queue, id) = setup(root.path());
        queue.remove(&id).unwrap();

        let mut output = vec![];
        assert!(
            Commands::message_show(&queue, &id, &MessageShowFormat::Json, &mut output).is_err()
        );
    }
}
