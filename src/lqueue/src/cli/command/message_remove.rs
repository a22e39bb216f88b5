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
use crate::{cli::args::Commands, EntryId, Extension, Switchboard};

impl Commands {
    pub(crate) fn message_remove<OUT: std::io::Write, IN: std::io::Read>(
        queue: &Switchboard,
        id: &EntryId,
        confirmed: bool,
        output: &mut OUT,
        mut input: IN,
    ) -> anyhow::Result<()> {
        if !queue.entry_path(id, Extension::Pck).exists() {
            anyhow::bail!("Entry `{id}` does not exist in `{}`", queue.queue())
        }

        output.write_fmt(format_args!(
            "Removing entry '{id}' in queue: '{}'\n",
            queue.queue()
        ))?;

        if !confirmed {
            output.write_all(b"Confirm ? [y|yes] ")?;
            output.flush()?;

            let buf = &mut [0u8; 1];
            input.read(buf)?;

            if buf[0] != b'y' {
                output.write_all(b"Canceled\n")?;
                return Ok(());
            }
        }

        queue.remove(id)?;
        output.write_all(b"File removed\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listd_common::{Metadata, QueueName};
    use listd_test::{config::local_test, mail::local_mail};

    fn setup(root: &std::path::Path) -> (Switchboard, EntryId) {
        let queue = Switchboard::open(&local_test(root), QueueName::In).unwrap();
        let id = queue
            .enqueue(&local_mail(), &Metadata::for_list("test"))
            .unwrap();
        (queue, id)
    }

    #[test]
    fn confirmed() {
        let root = tempfile::tempdir().unwrap();
        let (queue, id) = setup(root.path());
        let mut output = vec![];

        Commands::message_remove(&queue, &id, true, &mut output, std::io::Cursor::new(vec![]))
            .unwrap();

        assert!(!queue.entry_path(&id, Extension::Pck).exists());
        pretty_assertions::assert_eq!(
            std::str::from_utf8(&output).unwrap(),
            format!("Removing entry '{id}' in queue: 'in'\nFile removed\n")
        );
    }

    #[test]
    fn not_confirmed() {
        let root = tempfile::tempdir().unwrap();
        let (queue, id) = setup(root.path());
        let mut output = vec![];

        Commands::message_remove(
            &queue,
            &id,
            false,
            &mut output,
            std::io::Cursor::new(b"yes\n" as &[u8]),
        )
        .unwrap();

        assert!(!queue.entry_path(&id, Extension::Pck).exists());
        pretty_assertions::assert_eq!(
            std::str::from_utf8(&output).unwrap(),
            format!("Removing entry '{id}' in queue: 'in'\nConfirm ? [y|yes] File removed\n")
        );
    }

    #[test]
    fn canceled() {
        let root = tempfile::tempdir().unwrap();
        let (queue, id) = setup(root.path());
        let mut output = vec![];

        Commands::message_remove(
            &queue,
            &id,
            false,
            &mut output,
            std::io::Cursor::new(b"no\n" as &[u8]),
        )
        .unwrap();

        assert!(queue.entry_path(&id, Extension::Pck).exists());
        pretty_assertions::assert_eq!(
            std::str::from_utf8(&output).unwrap(),
            format!("Removing entry '{id}' in queue: 'in'\nConfirm ? [y|yes] Canceled\n")
        );
    }
}
