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
use clap::{crate_name, crate_version};
use listd::{Args, Commands};
use listd_common::{libc_abstraction::daemon, QueueName};
use listd_config::Config;
use listd_mlist::ListStore;
use listd_server::{digest, master::Master, StopHandle};

fn main() {
    if let Err(err) = try_main() {
        let error = format!("listd terminating error: '{err}'");

        eprintln!("{error}");
        tracing::error!(error);
        err.chain().skip(1).for_each(|cause| {
            let reason = format!("because: {cause}");

            eprintln!("{reason}");
            tracing::error!(reason);
        });
        std::process::exit(1);
    }
}

fn master(args: &Args, config: &Config, no_daemon: bool) -> anyhow::Result<()> {
    let program = std::env::current_exe().context("Cannot find the listd executable")?;
    let mut forwarded = vec![];
    if let Some(path) = &args.config {
        let path = std::fs::canonicalize(path)
            .with_context(|| format!("Cannot resolve the path '{path}'"))?;
        forwarded.extend(["-c".into(), path.into_os_string()]);
    }
    if args.stdout {
        forwarded.push("--stdout".into());
    }

    if !no_daemon {
        daemon(false, args.stdout)?;
    }

    let stop = StopHandle::new();
    stop.install_signals()?;
    Master::new(config, program, forwarded, stop)?.run()
}

fn try_main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();

    if args.version {
        println!("{} v{}", crate_name!(), crate_version!());
        return Ok(());
    }

    let config = args.config.as_ref().map_or_else(
        || Ok(Config::default()),
        |config| {
            std::fs::read_to_string(config)
                .context(format!("Cannot read file '{config}'"))
                .and_then(|f| Config::from_toml(&f).context("File contains format error"))
                .context("Cannot parse the configuration")
        },
    )?;

    let Some(command) = &args.command else {
        anyhow::bail!("no commands where specified")
    };

    match command {
        Commands::ConfigShow => {
            let stringified = serde_json::to_string_pretty(&config)?;
            println!("Loaded configuration: {stringified}");
            return Ok(());
        }
        Commands::ConfigDiff => {
            let loaded_config = serde_json::to_string_pretty(&config)?;
            let default_config = serde_json::to_string_pretty(&Config::default())?;
            for diff in diff::lines(&default_config, &loaded_config) {
                match diff {
                    diff::Result::Left(left) => println!("-\x1b[0;31m{left}\x1b[0m"),
                    diff::Result::Both(same, _) => println!(" {same}"),
                    diff::Result::Right(right) => println!("+\x1b[0;32m{right}\x1b[0m"),
                }
            }
            return Ok(());
        }
        _ => {}
    }

    listd::tracing_subscriber::initialize(&args, &config)?;

    tracing::info!(
        server = ?config.server.logs.filename,
        syslog = config
            .server
            .logs
            .system
            .as_ref()
            .map_or_else(|| "None".to_string(), ToString::to_string),
        "listd logs initialized: ",
    );

    match command {
        Commands::Master { no_daemon } => master(&args, &config, *no_daemon),
        Commands::Run {
            runner,
            slice,
            once,
        } => {
            let stop = StopHandle::new();
            stop.install_signals()?;
            listd_server::start_runner(&config, *runner, *slice, *once, stop)
        }
        Commands::Senddigests { list } => {
            let store = ListStore::new(&config);
            let virgin = lqueue::Switchboard::open(&config, QueueName::Virgin)?;
            let sent =
                digest::send_all_pending(&store, &config.server.digest, &virgin, list.as_deref())?;
            println!("{sent} digest(s) sent");
            Ok(())
        }
        Commands::Confirm { list, cookie } => {
            let outcome = listd_server::confirm(&config, list, cookie)?;
            println!("{list}: {outcome}");
            Ok(())
        }
        Commands::ConfigShow | Commands::ConfigDiff => Ok(()),
    }
}
