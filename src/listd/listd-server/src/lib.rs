//! listd runners
//!
//! Each [`RunnerKind`] drains one queue of the spool. A [`Runner`] dequeues
//! the entries of its slice and hands them to a [`runner::Dispose`]
//! implementation:
//!
//! * `incoming` runs the posting [`pipeline`] of the lists,
//! * `virgin` runs the short pipeline of the messages generated by listd,
//! * `outgoing` delivers through a [`delivery::Transport`], `retry` brings the
//!   deferred deliveries back,
//! * `bounce` scores the bounces of the members,
//! * `archive` appends the posts to the mbox of their list.
//!
//! The [`master::Master`] starts one process per configured slice.

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

pub mod bounce;
pub mod delivery;
pub mod digest;
pub mod master;
pub mod pipeline;
pub mod runner;
pub mod runners;

mod confirm;

pub use confirm::{confirm, Confirmed};
pub use runner::{CircuitBreaker, Runner, StopHandle};

use listd_common::RunnerKind;
use listd_config::Config;
use lqueue::Slice;

/// Run the slice `slice` of the runner `kind` until stopped, or for a single
/// pass with `once`.
///
/// # Errors
///
/// * the queues could not be opened
/// * the runner aborted, see [`Runner::run`]
pub fn start_runner(
    config: &Config,
    kind: RunnerKind,
    slice: Slice,
    once: bool,
    stop: StopHandle,
) -> anyhow::Result<()> {
    let dispose = runners::dispose_for(config, kind)?;
    let mut runner = Runner::new(config, kind, slice, dispose, stop)?;
    if once {
        let count = runner.run_once()?;
        tracing::info!(%kind, %slice, count, "Single pass done.");
        Ok(())
    } else {
        runner.run()
    }
}
