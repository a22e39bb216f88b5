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
use super::{wants::WantsValidate, with::Builder};
use crate::{
    config::field::{FieldServer, FieldServerLogs},
    Config,
};

impl Builder<WantsValidate> {
    /// Produce the configuration.
    ///
    /// # Errors
    ///
    /// * the values are not consistent, see [`Config::from_toml`]
    pub fn validate(self) -> anyhow::Result<Config> {
        let extra = self.state;
        let data_dir = extra.parent;
        let archive = data_dir.parent;
        let bounce = archive.parent;
        let delivery = bounce.parent;
        let lists = delivery.parent;
        let runner = lists.parent;
        let queues = runner.parent;
        let logs = queues.parent;
        let srv = logs.parent;

        Config::ensure(Config {
            version_requirement: srv.version_requirement,
            server: FieldServer {
                name: logs.name,
                data_dir: extra.data_dir,
                logs: FieldServerLogs {
                    filename: queues.filename,
                    level: queues.level,
                    system: queues.system,
                },
                queues: runner.queues,
                runner: lists.runner,
                runners: extra.runners,
                lists: delivery.lists,
                delivery: bounce.delivery,
                bounce: archive.bounce,
                pending: extra.pending,
                digest: extra.digest,
                archive: data_dir.archive,
                master: extra.master,
            },
        })
    }
}
