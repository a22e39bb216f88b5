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
use crate::runner::Dispose;
use listd_common::{metadata::keys, utils, Mail, Metadata, QueueName};
use listd_config::Config;
use lqueue::Switchboard;

/// Moves the entries of the `retry` queue back to `out` once their
/// `deliver_after` time has passed.
pub struct RetryRunner {
    out: Switchboard,
}

impl RetryRunner {
    /// # Errors
    ///
    /// * the `out` queue could not be opened
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            out: Switchboard::open(config, QueueName::Out)?,
        })
    }
}

impl Dispose for RetryRunner {
    fn dispose(&mut self, mail: &mut Mail, metadata: &mut Metadata) -> anyhow::Result<bool> {
        let due = metadata
            .get_f64(keys::DELIVER_AFTER)
            .map_or(true, |after| after <= utils::now_epoch());
        if !due {
            return Ok(true);
        }
        self.out.enqueue(mail, metadata)?;
        Ok(false)
    }
}
