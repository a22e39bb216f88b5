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
use listd_common::RunnerKind;
use lqueue::Slice;

///
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

    /// Also write the logs to stdout
    #[clap(long, action)]
    pub stdout: bool,

    ///
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

///
#[derive(clap::Subcommand)]
#[cfg_attr(test, derive(Debug, PartialEq, Eq))]
pub enum Commands {
    /// Start the runners configured in `server.runners` and supervise them
    Master {
        /// Stay in the foreground
        #[clap(long, action)]
        no_daemon: bool,
    },
    /// Run a single runner process
    Run {
        /// Kind of the runner
        #[clap(short, long, value_parser)]
        runner: RunnerKind,
        /// Part of the queue handled by this process, `<index>/<count>`
        #[clap(short, long, value_parser, default_value = "0/1")]
        slice: Slice,
        /// Process the queue once and exit
        #[clap(long, action)]
        once: bool,
    },
    /// Show the loaded config (as serialized json format)
    ConfigShow,
    /// Show the difference between the loaded config and the default one
    ConfigDiff,
    /// Send the pending digests
    Senddigests {
        /// Only this list, even if its periodic digests are off
        #[clap(short, long, value_parser)]
        list: Option<String>,
    },
    /// Apply the operation waiting for a confirmation cookie
    Confirm {
        /// Name of the list
        #[clap(value_parser)]
        list: String,
        /// The cookie sent in the confirmation request
        #[clap(value_parser)]
        cookie: String,
    },
}
