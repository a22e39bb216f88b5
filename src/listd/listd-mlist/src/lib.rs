//! listd mailing lists
//!
//! The state of a list lives in its directory under `server.lists.dirpath`:
//!
//! ```shell
//! $> tree /var/lib/listd/lists/<name>
//! ├── config.json            # settings and members, see [`MailingList`]
//! ├── digest.mbox            # posts of the next digest
//! ├── lock                   # held while a process updates the list
//! └── pending.json           # confirmation cookies, see [`Pending`]
//! ```
//!
//! A process holding the [`ListLock`] of a list is the only one allowed to
//! update these files. The [`Bouncer`] scores the bounces of the members and
//! disables or removes the addresses that keep failing.

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

mod bouncer;
mod lock;
mod mlist;
mod outbox;
mod pending;
mod store;

pub mod notice;

pub use bouncer::Bouncer;
pub use lock::{ListLock, LockError};
pub use mlist::{
    password_digest, BounceSettings, DigestFormat, DigestSettings, MailingList, Member,
    NonmemberAction, PostingSettings, VolumeFrequency,
};
pub use outbox::{MemoryOutbox, Outbox};
pub use pending::{Pending, PendingError, PendingOp};
pub use store::ListStore;
