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
use crate::{cli::args::Commands, Switchboard};
use anyhow::Context;
use listd_common::{metadata::keys, Mail, Metadata, QueueName};
use listd_config::Config;

impl Commands {
    pub(crate) fn inject<OUT: std::io::Write>(
        config: &Config,
        queue: QueueName,
        listname: &str,
        raw: &str,
        output: &mut OUT,
    ) -> anyhow::Result<()> {
        if !config.list_dirpath(listname).is_dir() {
            anyhow::bail!("No such list: `{listname}`")
        }

        let mail = Mail::parse(raw).context("The message cannot be parsed")?;
        let metadata = Metadata::for_list(listname).with(keys::TOLIST, true);

        let id = Switchboard::open(config, queue)?.enqueue(&mail, &metadata)?;
        output.write_fmt(format_args!("Injected as '{id}' in '{queue}'\n"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Extension;
    use listd_test::config::local_test;

    const RAW: &str = "From: a@domain.tld\r\nTo: test@lists.testserver.com\r\nSubject: hi\r\n\r\nhello\r\n";

    #[test]
    fn injected() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());
        std::fs::create_dir_all(config.list_dirpath("test")).unwrap();

        let mut output = vec![];
        Commands::inject(&config, QueueName::In, "test", RAW, &mut output).unwrap();

        let queue = Switchboard::open(&config, QueueName::In).unwrap();
        let ids = queue.files(Extension::Pck).unwrap();
        assert_eq!(ids.len(), 1);

        let (mail, metadata) = queue.read(&ids[0], Extension::Pck).unwrap();
        assert_eq!(mail.subject(), Some("hi"));
        assert_eq!(metadata.listname(), Some("test"));
        assert!(metadata.flag(keys::TOLIST));
        pretty_assertions::assert_eq!(
            std::str::from_utf8(&output).unwrap(),
            format!("Injected as '{}' in 'in'\n", ids[0])
        );
    }

    #[test]
    fn unknown_list() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());

        let mut output = vec![];
        let error = Commands::inject(&config, QueueName::In, "nope", RAW, &mut output).unwrap_err();
        assert_eq!(error.to_string(), "No such list: `nope`");
    }

    #[test]
    fn unparsable() {
        let root = tempfile::tempdir().unwrap();
        let config = local_test(root.path());
        std::fs::create_dir_all(config.list_dirpath("test")).unwrap();

        let mut output = vec![];
        assert!(Commands::inject(&config, QueueName::In, "test", "  \n", &mut output).is_err());
    }
}
