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
//! Supervision of the runner processes.

use crate::runner::StopHandle;
use listd_common::{libc_abstraction, RunnerKind};
use listd_config::Config;
use lqueue::Slice;

struct Supervised {
    kind: RunnerKind,
    slice: Slice,
    process: std::process::Child,
    restarts: u32,
}

/// Starts one process per configured runner slice and restarts the ones
/// exiting abnormally, at most `master.max_restarts` times each.
pub struct Master {
    program: std::path::PathBuf,
    args: Vec<std::ffi::OsString>,
    slices: Vec<(RunnerKind, Slice)>,
    max_restarts: u32,
    stop: StopHandle,
    poll: std::time::Duration,
}

impl Master {
    /// Each runner is started as `<program> <args..> run --runner <kind> --slice <i/n>`.
    ///
    /// # Errors
    ///
    /// * a configured slice count is invalid
    pub fn new(
        config: &Config,
        program: impl Into<std::path::PathBuf>,
        args: Vec<std::ffi::OsString>,
        stop: StopHandle,
    ) -> anyhow::Result<Self> {
        let mut slices = vec![];
        for runner in &config.server.runners {
            for index in 0..runner.slices {
                slices.push((runner.kind, Slice::new(index, runner.slices)?));
            }
        }
        Ok(Self {
            program: program.into(),
            args,
            slices,
            max_restarts: config.server.master.max_restarts,
            stop,
            poll: std::time::Duration::from_secs(1),
        })
    }

    fn spawn(&self, kind: RunnerKind, slice: Slice) -> anyhow::Result<std::process::Child> {
        let child = std::process::Command::new(&self.program)
            .args(&self.args)
            .args(["run", "--runner", &kind.to_string(), "--slice", &slice.to_string()])
            .spawn()?;
        tracing::info!(%kind, %slice, pid = child.id(), "Runner started.");
        Ok(child)
    }

    /// Supervise until the stop flag is raised or every runner exited.
    /// `SIGTERM` is forwarded to the runners still alive, then they are
    /// waited for.
    ///
    /// # Errors
    ///
    /// * a runner could not be started
    /// * a runner exhausted its restarts
    #[tracing::instrument(name = "master", skip_all)]
    pub fn run(&self) -> anyhow::Result<()> {
        let mut children = Vec::with_capacity(self.slices.len());
        for (kind, slice) in &self.slices {
            children.push(Supervised {
                kind: *kind,
                slice: *slice,
                process: self.spawn(*kind, *slice)?,
                restarts: 0,
            });
        }
        let mut exhausted = vec![];

        while !children.is_empty() && !self.stop.is_stopped() {
            let mut alive = Vec::with_capacity(children.len());
            for mut child in children {
                let status = match child.process.try_wait() {
                    Ok(None) => {
                        alive.push(child);
                        continue;
                    }
                    Ok(Some(status)) => status,
                    Err(error) => {
                        tracing::error!(kind = %child.kind, slice = %child.slice, %error, "Runner lost.");
                        continue;
                    }
                };

                if status.success() || self.stop.is_stopped() {
                    tracing::info!(kind = %child.kind, slice = %child.slice, %status, "Runner exited.");
                } else if child.restarts < self.max_restarts {
                    tracing::warn!(kind = %child.kind, slice = %child.slice, %status, restarts = child.restarts + 1, "Runner died, restarting.");
                    child.process = self.spawn(child.kind, child.slice)?;
                    child.restarts += 1;
                    alive.push(child);
                } else {
                    tracing::error!(kind = %child.kind, slice = %child.slice, %status, "Runner died too many times, giving up.");
                    exhausted.push(format!("{}[{}]", child.kind, child.slice));
                }
            }
            children = alive;
            self.stop.sleep(self.poll);
        }

        for child in &children {
            if let Err(error) = libc_abstraction::kill(child.process.id(), signal_hook::consts::SIGTERM) {
                tracing::warn!(kind = %child.kind, slice = %child.slice, error = format!("{error:#}"), "Failed to stop runner.");
            }
        }
        for mut child in children {
            match child.process.wait() {
                Ok(status) => tracing::info!(kind = %child.kind, slice = %child.slice, %status, "Runner stopped."),
                Err(error) => tracing::warn!(kind = %child.kind, slice = %child.slice, %error, "Failed to wait for runner."),
            }
        }

        if exhausted.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("runners exhausted their restarts: {}", exhausted.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn master(root: &std::path::Path, script: &str, max_restarts: u32, stop: StopHandle) -> Master {
        let mut config = listd_test::config::local_test(root);
        config.server.runners = vec![listd_config::field::FieldRunner {
            kind: RunnerKind::Outgoing,
            slices: 2,
        }];
        config.server.master.max_restarts = max_restarts;
        let mut master = Master::new(
            &config,
            "/bin/sh",
            vec!["-c".into(), script.into(), "listd".into()],
            stop,
        )
        .unwrap();
        master.poll = std::time::Duration::from_millis(20);
        master
    }

    #[test]
    fn slices() {
        let root = tempfile::tempdir().unwrap();
        let master = master(root.path(), "exit 0", 0, StopHandle::new());
        assert_eq!(
            master
                .slices
                .iter()
                .map(|(kind, slice)| format!("{kind} {slice}"))
                .collect::<Vec<_>>(),
            vec!["outgoing 0/2", "outgoing 1/2"]
        );
        master.run().unwrap();
    }

    #[test]
    fn restarts_are_bounded() {
        let root = tempfile::tempdir().unwrap();
        let log = root.path().join("starts");
        let master = master(
            root.path(),
            &format!("echo \"$@\" >> {}; exit 3", log.display()),
            2,
            StopHandle::new(),
        );

        assert!(master.run().is_err());
        let starts = std::fs::read_to_string(&log).unwrap();
        assert_eq!(starts.lines().count(), 6);
        assert_eq!(
            starts.lines().filter(|line| line.ends_with("--slice 1/2")).count(),
            3
        );
    }

    #[test]
    fn stop_terminates_the_runners() {
        let root = tempfile::tempdir().unwrap();
        let stop = StopHandle::new();
        let master = master(root.path(), "exec sleep 30", 0, stop.clone());

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(200));
            stop.stop();
        });
        let started = std::time::Instant::now();
        master.run().unwrap();
        stopper.join().unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
