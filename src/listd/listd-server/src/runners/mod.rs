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
//! The [`Dispose`] implementation of each [`RunnerKind`].

use crate::runner::Dispose;
use listd_common::RunnerKind;
use listd_config::Config;

mod archive;
mod bounce;
mod incoming;
mod outgoing;
mod retry;

pub use archive::ArchiveRunner;
pub use bounce::BounceRunner;
pub use incoming::PipelineRunner;
pub use outgoing::OutgoingRunner;
pub use retry::RetryRunner;

/// Fires once per period, the first time a full period after creation.
#[derive(Debug)]
pub(crate) struct Every {
    every: std::time::Duration,
    last: std::time::Instant,
}

impl Every {
    pub(crate) fn new(every: std::time::Duration) -> Self {
        Self {
            every,
            last: std::time::Instant::now(),
        }
    }

    pub(crate) fn due(&mut self) -> bool {
        if self.last.elapsed() < self.every {
            return false;
        }
        self.last = std::time::Instant::now();
        true
    }
}

/// Build the disposer of a runner kind.
///
/// # Errors
///
/// * the queues used by the runner could not be opened
pub fn dispose_for(config: &Config, kind: RunnerKind) -> anyhow::Result<Box<dyn Dispose>> {
    Ok(match kind {
        RunnerKind::Incoming => Box::new(PipelineRunner::incoming(config)?),
        RunnerKind::Virgin => Box::new(PipelineRunner::virgin(config)?),
        RunnerKind::Outgoing => Box::new(OutgoingRunner::new(config)?),
        RunnerKind::Retry => Box::new(RetryRunner::new(config)?),
        RunnerKind::Bounce => Box::new(BounceRunner::new(config)?),
        RunnerKind::Archive => Box::new(ArchiveRunner::new(config)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every() {
        let mut every = Every::new(std::time::Duration::from_millis(20));
        assert!(!every.due());
        std::thread::sleep(std::time::Duration::from_millis(25));
        assert!(every.due());
        assert!(!every.due());

        let mut always = Every::new(std::time::Duration::ZERO);
        assert!(always.due());
        assert!(always.due());
    }

    #[test]
    fn every_kind_has_a_disposer() {
        let root = tempfile::tempdir().unwrap();
        let config = listd_test::config::local_test(root.path());
        for kind in <RunnerKind as strum::IntoEnumIterator>::iter() {
            assert!(dispose_for(&config, kind).is_ok(), "{kind}");
        }
    }
}
