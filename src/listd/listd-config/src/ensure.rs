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
use crate::Config;

impl Config {
    pub(crate) fn ensure(config: Self) -> anyhow::Result<Self> {
        let runner = &config.server.runner;
        anyhow::ensure!(
            !runner.sleep_min.is_zero() && runner.sleep_min <= runner.sleep_max,
            "Runner sleep must be positive and `sleep_min` <= `sleep_max`, got {:?} and {:?}",
            runner.sleep_min,
            runner.sleep_max
        );
        anyhow::ensure!(
            runner.breaker_errors != 0,
            "Runner `breaker_errors` cannot be set to 0"
        );

        let mut kinds = std::collections::HashSet::new();
        for i in &config.server.runners {
            anyhow::ensure!(i.slices != 0, "Runner '{}' has 0 slices", i.kind);
            anyhow::ensure!(kinds.insert(i.kind), "Runner '{}' is duplicated", i.kind);
        }

        anyhow::ensure!(
            config.server.delivery.max_recipients != 0,
            "Delivery `max_recipients` cannot be set to 0"
        );
        anyhow::ensure!(
            !config.server.name.is_empty(),
            "The site name cannot be empty"
        );

        Ok(config)
    }
}
