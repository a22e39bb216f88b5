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
use super::args::{Commands, MessageCommand};
use crate::Switchboard;
use listd_common::QueueName;
use listd_config::Config;

impl Commands {
    /// Execute the lQueue command
    ///
    /// # Errors
    pub fn execute(self, config: &Config) -> anyhow::Result<()> {
        match self {
            Self::Show {
                queues,
                empty_token,
            } => Self::show(
                if queues.is_empty() {
                    <QueueName as strum::IntoEnumIterator>::iter().collect::<Vec<_>>()
                } else {
                    queues
                },
                config,
                empty_token,
                &mut std::io::stdout(),
            ),
            Self::Msg { queue, id, command } => {
                let queue = Switchboard::open(config, queue)?;
                match command {
                    MessageCommand::Show { format } => {
                        Self::message_show(&queue, &id, &format, &mut std::io::stdout())
                    }
                    MessageCommand::Remove { yes } => Self::message_remove(
                        &queue,
                        &id,
                        yes,
                        &mut std::io::stdout(),
                        std::io::stdin(),
                    ),
                }
            }
            Self::Unshunt {} => Self::unshunt(config, &mut std::io::stdout()),
            Self::Inject { queue, list, file } => {
                let raw = match file {
                    Some(path) => std::fs::read_to_string(&path).map_err(|error| {
                        anyhow::anyhow!("Cannot read '{}': {error}", path.display())
                    })?,
                    None => std::io::read_to_string(std::io::stdin())?,
                };
                Self::inject(config, queue, &list, &raw, &mut std::io::stdout())
            }
        }
    }
}
