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
use anyhow::Context;
use listd_config::Config;
use lqueue::cli::args::Args;

fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();

    if args.version {
        println!("{} v{}", clap::crate_name!(), clap::crate_version!());
        return Ok(());
    }

    if let Some(command) = args.command {
        let config = args.config.as_ref().map_or_else(
            || Ok(Config::default()),
            |path| {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Cannot read file '{path}'"))
                    .and_then(|content| Config::from_toml(&content))
                    .context("Cannot parse the configuration")
            },
        )?;

        command.execute(&config)
    } else {
        anyhow::bail!("no commands where specified")
    }
}
