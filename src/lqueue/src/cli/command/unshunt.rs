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
use crate::{cli::args::Commands, Extension, Switchboard};
use listd_common::{metadata::keys, QueueName};
use listd_config::Config;

impl Commands {
    pub(crate) fn unshunt<OUT: std::io::Write>(
        config: &Config,
        output: &mut OUT,
    ) -> anyhow::Result<()> {
        let shunt = Switchboard::open(config, QueueName::Shunt)?;
        let mut destinations = std::collections::HashMap::<QueueName, Switchboard>::new();

        for id in shunt.files(Extension::Pck)? {
            let Some((mail, mut metadata)) = shunt.dequeue(&id)? else {
                continue;
            };
            let queue = metadata
                .remove(keys::WHICHQ)
                .and_then(|q| serde_json::from_value::<QueueName>(q).ok())
                .unwrap_or(QueueName::In);

            let destination = match destinations.entry(queue) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(Switchboard::open(config, queue)?)
                }
            };

            match destination.enqueue(&mail, &metadata) {
                Ok(new_id) => {
                    shunt.finish(&id, false)?;
                    tracing::info!(%id, %new_id, %queue, "Entry unshunted.");
                    output.write_fmt(format_args!("Entry '{id}' moved back to '{queue}'\n"))?;
                }
                Err(error) => {
                    shunt.finish(&id, true)?;
                    return Err(error.context(format!("Failed to unshunt `{id}`")));
                }
            }
        }

        Ok(())
    }
}
