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
use crate::EntryId;
use listd_common::QueueName;

///
#[non_exhaustive]
#[derive(clap::Parser)]
#[cfg_attr(test, derive(Debug, PartialEq, Eq))]
#[clap(about, author)]
pub struct Args {
    /// Print the version and exit.
    #[clap(short, long, action)]
    pub version: bool,

    /// Path of the listd configuration file (toml format)
    #[clap(short, long, action)]
    pub config: Option<String>,

    ///
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

///
#[non_exhaustive]
#[derive(clap::Subcommand)]
#[cfg_attr(test, derive(Debug, PartialEq, Eq))]
pub enum Commands {
    /// Show the content of the given queue(s)
    Show {
        /// List of queues to print
        #[clap(value_parser)]
        queues: Vec<QueueName>,
        /// Character to print if the field is empty
        #[clap(short, long, action, default_value = "0")]
        empty_token: char,
    },
    /// Operate action to a given entry
    Msg {
        /// Queue holding the entry
        #[clap(value_parser)]
        queue: QueueName,
        /// ID of the concerned entry
        #[clap(value_parser)]
        id: EntryId,
        ///
        #[clap(subcommand)]
        command: MessageCommand,
    },
    /// Move every entry of the shunt queue back to the queue it failed in
    Unshunt {},
    /// Put a message read from a file (or stdin) in a queue
    Inject {
        /// Destination queue
        #[clap(short, long, value_parser, default_value = "in")]
        queue: QueueName,
        /// Name of the list receiving the message
        #[clap(short, long, value_parser)]
        list: String,
        /// File containing the raw message, stdin if absent
        #[clap(value_parser)]
        file: Option<std::path::PathBuf>,
    },
}

///
#[non_exhaustive]
#[derive(Clone, clap::Subcommand)]
#[cfg_attr(test, derive(Debug, PartialEq, Eq))]
pub enum MessageCommand {
    /// Print the content of the entry
    Show {
        /// Format of the output
        #[clap(value_enum, value_parser, default_value = "json")]
        format: MessageShowFormat,
    },
    /// Remove the entry from the filesystem
    Remove {
        /// If true, do not ask to confirm the deletion
        #[clap(short, long, value_parser)]
        yes: bool,
    },
}

///
#[non_exhaustive]
#[derive(Clone, clap::ValueEnum)]
#[cfg_attr(test, derive(Debug, PartialEq, Eq))]
pub enum MessageShowFormat {
    /// Message as a raw RFC 5322 text
    Eml,
    /// Message as its JSON tree
    Json,
}
