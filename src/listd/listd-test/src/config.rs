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
use listd_config::Config;

/// Get a config for local test, every directory living under `root`.
///
/// Deliveries are written to `<root>/outgoing` and the runners poll fast.
///
/// # Panics
///
/// * config cannot be built
#[must_use]
pub fn local_test(root: &std::path::Path) -> Config {
    Config::builder()
        .with_current_version()
        .with_server_name("lists.testserver.com")
        .with_logs_settings(root.join("listd.log"), &[])
        .with_spool_settings(
            root.join("spool"),
            3,
            std::time::Duration::from_millis(10),
            std::time::Duration::from_secs(300),
            std::time::Duration::from_secs(7 * 24 * 60 * 60),
        )
        .with_runner_settings(
            std::time::Duration::from_millis(10),
            std::time::Duration::from_millis(80),
            10,
            std::time::Duration::from_secs(60),
        )
        .with_lists_settings(
            root.join("lists"),
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(300),
        )
        .with_directory_delivery(root.join("outgoing"))
        .with_default_bounce()
        .with_archive_settings(root.join("archives"), None)
        .with_data_dirpath(root.join("data"))
        .validate()
        .unwrap()
}
