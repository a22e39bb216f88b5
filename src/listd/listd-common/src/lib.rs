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

//! listd common definition

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
//
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::undocumented_unsafe_blocks)]
//
#![allow(clippy::missing_const_for_fn)] // see https://github.com/rust-lang/rust-clippy/issues/9271
#![allow(clippy::module_name_repetitions)]

/// The email representation carried by the queues.
pub mod mail {
    mod address;
    mod message;
    mod parser;

    pub use address::{parse_address, parse_address_list, Address};
    pub use message::{split_parameters, Body, Mail, MailHeaders};
    pub use parser::ParseError;
}

pub use mail::{Address, Body, Mail, MailHeaders};

/// Metadata attached to every queue entry.
pub mod metadata;
pub use metadata::Metadata;

/// Reading and writing mailbox files.
pub mod mbox;

/// Names of the queues and of the runners draining them.
pub mod queue;
pub use queue::{QueueName, RunnerKind};

/// Member delivery status and bounce bookkeeping.
pub mod status;
pub use status::{BounceInfo, DeliveryStatus};

/// abstraction of the libc
pub mod libc_abstraction;

/// filesystem and time helpers.
pub mod utils;

#[doc(hidden)]
#[macro_export]
macro_rules! collection {
    // map-like
    ($($k:expr => $v:expr),* $(,)?) => {{
        use std::iter::{Iterator, IntoIterator};
        Iterator::collect(IntoIterator::into_iter([$(($k, $v),)*]))
    }};
    // set-like
    ($($v:expr),* $(,)?) => {{
        use std::iter::{Iterator, IntoIterator};
        Iterator::collect(IntoIterator::into_iter([$($v,)*]))
    }};
}
