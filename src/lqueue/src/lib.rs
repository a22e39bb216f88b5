//! lQueue: the listd's durable queues
//!
//! Every stage of the pipeline reads its work from a directory of the spool
//! and writes its output to another one. A [`Switchboard`] owns one of these
//! directories:
//!
//! ```shell
//! $> tree -L 2 /var/spool/listd
//! /var/spool/listd
//! ├── archive                # messages to append to the archives
//! ├── bad                    # quarantined entries (`<id>.psv`)
//! ├── bounces                # bounce notifications
//! ├── in                     # posts waiting for the pipeline
//! │   ├── <id>.pck           # * ready entry
//! │   ├── <id>.bak           # * entry being processed
//! │   ├── <id>.pck.lock      # * dequeue lock
//! │   └── <id>.pck.tmp       # * entry being written
//! ├── out                    # messages ready for delivery
//! ├── retry                  # temporary delivery failures
//! ├── shunt                  # entries whose processing failed
//! └── virgin                 # internally generated messages
//! ```

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

#![doc(html_no_source)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
//
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
//
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::module_name_repetitions)]
//
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Module containing the Command Line Interpreter
pub mod cli {
    ///
    pub mod args;
    ///
    pub mod execute;
    mod command {
        pub mod inject;
        pub mod message_remove;
        pub mod message_show;
        pub mod show;
        pub mod unshunt;
    }
}

/// Binary layout of the entry files.
pub mod codec;

mod entry;
mod slice;
mod switchboard;

pub use entry::{EntryId, EntryIdError, Extension};
pub use slice::{Slice, SliceError};
pub use switchboard::{Switchboard, BAD_DIRNAME, MAX_BAK_COUNT};
