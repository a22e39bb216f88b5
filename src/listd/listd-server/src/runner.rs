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
//! The loop of a runner process, draining one slice of a queue.

use anyhow::Context;
use listd_common::{metadata::keys, Mail, Metadata, QueueName, RunnerKind};
use listd_config::{field::FieldServerRunner, Config};
use lqueue::{EntryId, Extension, Slice, Switchboard};

/// What a runner does with the entries of its queue.
pub trait Dispose {
    /// Handle one entry. `Ok(true)` puts it back in the queue as a new entry.
    ///
    /// # Errors
    ///
    /// * the entry cannot be handled, it is shunted
    fn dispose(&mut self, mail: &mut Mail, metadata: &mut Metadata) -> anyhow::Result<bool>;

    /// Called after each pass over the queue, and after each idle sleep.
    ///
    /// # Errors
    ///
    /// * the periodic job failed, it counts in the circuit breaker
    fn do_periodic(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once when the runner stops.
    ///
    /// # Errors
    ///
    /// * the cleanup failed
    fn cleanup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Child processes started by the last calls, handed over for reaping.
    fn take_children(&mut self) -> Vec<std::process::Child> {
        vec![]
    }
}

/// Shared stop flag, raised by `SIGTERM` and `SIGINT`.
#[derive(Debug, Default, Clone)]
pub struct StopHandle(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl StopHandle {
    const SLEEP_SLICE: std::time::Duration = std::time::Duration::from_millis(100);

    ///
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag on `SIGTERM` and `SIGINT`.
    ///
    /// # Errors
    ///
    /// * the signal handlers could not be registered
    pub fn install_signals(&self) -> anyhow::Result<()> {
        let mut signals = signal_hook::iterator::Signals::new([
            // Send by `systemctl stop` (and then sending `SIGKILL`)
            signal_hook::consts::SIGTERM,
            // Ctrl+C on a terminal
            signal_hook::consts::SIGINT,
        ])?;
        let this = self.clone();
        std::thread::spawn(move || {
            for signal in signals.forever() {
                tracing::warn!(signal, "Stopping the runner.");
                this.stop();
            }
        });
        Ok(())
    }

    ///
    pub fn stop(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    ///
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Sleep for `duration` unless the flag is raised meanwhile.
    /// Returns `false` if the sleep was interrupted.
    pub fn sleep(&self, duration: std::time::Duration) -> bool {
        let deadline = std::time::Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(std::cmp::min(deadline - now, Self::SLEEP_SLICE));
        }
    }
}

/// Idle sleep doubling from `min` to `max`.
#[derive(Debug)]
struct Backoff {
    min: std::time::Duration,
    max: std::time::Duration,
    current: std::time::Duration,
}

impl Backoff {
    const fn new(min: std::time::Duration, max: std::time::Duration) -> Self {
        Self {
            min,
            max,
            current: min,
        }
    }

    fn reset(&mut self) {
        self.current = self.min;
    }

    fn next(&mut self) -> std::time::Duration {
        let out = self.current;
        self.current = std::cmp::min(self.current * 2, self.max);
        out
    }
}

/// Trips when `errors` errors are recorded within `window`.
#[derive(Debug)]
pub struct CircuitBreaker {
    errors: usize,
    window: std::time::Duration,
    history: std::collections::VecDeque<std::time::Instant>,
}

impl CircuitBreaker {
    ///
    #[must_use]
    pub fn new(errors: usize, window: std::time::Duration) -> Self {
        Self {
            errors,
            window,
            history: std::collections::VecDeque::new(),
        }
    }

    /// Record an error at `now`, returns `true` if the breaker trips.
    pub fn record(&mut self, now: std::time::Instant) -> bool {
        self.history.push_back(now);
        while let Some(oldest) = self.history.front() {
            if now.duration_since(*oldest) > self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }
        self.history.len() >= self.errors
    }
}

/// The loop draining one slice of a queue.
pub struct Runner {
    kind: RunnerKind,
    switchboard: Switchboard,
    shunt: Switchboard,
    dispose: Box<dyn Dispose>,
    settings: FieldServerRunner,
    stop: StopHandle,
    children: Vec<std::process::Child>,
    breaker: CircuitBreaker,
}

impl Runner {
    /// Open the queue of `kind`, recovering the entries left in process.
    ///
    /// # Errors
    ///
    /// * the queues could not be opened
    pub fn new(
        config: &Config,
        kind: RunnerKind,
        slice: Slice,
        dispose: Box<dyn Dispose>,
        stop: StopHandle,
    ) -> anyhow::Result<Self> {
        let settings = config.server.runner.clone();
        Ok(Self {
            kind,
            switchboard: Switchboard::open_and_recover(config, kind.queue(), slice)?,
            shunt: Switchboard::open(config, QueueName::Shunt)?,
            dispose,
            breaker: CircuitBreaker::new(settings.breaker_errors, settings.breaker_window),
            settings,
            stop,
            children: vec![],
        })
    }

    /// Loop until the stop flag is raised.
    ///
    /// # Errors
    ///
    /// * too many errors within the breaker window
    #[tracing::instrument(name = "runner", skip_all, fields(kind = %self.kind, slice = %self.switchboard.slice()))]
    pub fn run(&mut self) -> anyhow::Result<()> {
        tracing::info!("Runner started.");

        let result = self.main_loop();
        self.shutdown();

        match &result {
            Ok(()) => tracing::info!("Runner stopped."),
            Err(error) => tracing::error!(error = format!("{error:#}"), "Runner aborted."),
        }
        result
    }

    /// A single pass over the queue.
    ///
    /// # Errors
    ///
    /// * see [`Runner::run`]
    pub fn run_once(&mut self) -> anyhow::Result<usize> {
        let result = self.one_loop().and_then(|count| {
            self.periodic()?;
            Ok(count)
        });
        self.shutdown();
        result
    }

    fn main_loop(&mut self) -> anyhow::Result<()> {
        let mut backoff = Backoff::new(self.settings.sleep_min, self.settings.sleep_max);
        let mut snapshot: Option<(std::time::SystemTime, std::time::Instant)> = None;

        while !self.stop.is_stopped() {
            let idle = snapshot.map_or(false, |(mtime, pass)| {
                self.switchboard.mtime().ok() == Some(mtime)
                    && pass.elapsed() < self.settings.sleep_max
            });

            if idle {
                self.stop.sleep(backoff.next());
            } else {
                if let Some((mtime, _)) = snapshot {
                    if self.switchboard.mtime().ok() != Some(mtime) {
                        backoff.reset();
                    }
                }
                let count = self.one_loop()?;
                tracing::trace!(count, "Pass over the queue done.");
                snapshot = self
                    .switchboard
                    .mtime()
                    .ok()
                    .map(|mtime| (mtime, std::time::Instant::now()));
            }

            self.periodic()?;
        }
        Ok(())
    }

    fn periodic(&mut self) -> anyhow::Result<()> {
        if let Err(error) = self.dispose.do_periodic() {
            tracing::error!(error = format!("{error:#}"), "Periodic job failed.");
            self.record_error()?;
        }
        Ok(())
    }

    fn record_error(&mut self) -> anyhow::Result<()> {
        if self.breaker.record(std::time::Instant::now()) {
            anyhow::bail!(
                "{} errors within {:?}, stopping the `{}` runner",
                self.settings.breaker_errors,
                self.settings.breaker_window,
                self.kind
            );
        }
        Ok(())
    }

    /// Errors are logged and counted per entry, only the breaker ends the pass early.
    fn one_loop(&mut self) -> anyhow::Result<usize> {
        let ids = match self.switchboard.files(Extension::Pck) {
            Ok(ids) => ids,
            Err(error) => {
                tracing::error!(error = format!("{error:#}"), "Failed to list the queue.");
                self.record_error()?;
                return Ok(0);
            }
        };

        let mut count = 0;
        for id in ids {
            if self.stop.is_stopped() {
                break;
            }
            let (mut mail, mut metadata) = match self.switchboard.dequeue(&id) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(error) => {
                    tracing::error!(%id, error = format!("{error:#}"), "Failed to dequeue the entry.");
                    self.record_error()?;
                    continue;
                }
            };
            count += 1;
            self.process(&id, &mut mail, &mut metadata)?;
            self.reap(false);
        }
        Ok(count)
    }

    fn finish(&mut self, id: &EntryId, preserve: bool) -> anyhow::Result<()> {
        if let Err(error) = self.switchboard.finish(id, preserve) {
            tracing::error!(%id, error = format!("{error:#}"), "Failed to finish the entry.");
            self.record_error()?;
        }
        Ok(())
    }

    fn handle(&mut self, mail: &mut Mail, metadata: &mut Metadata) -> anyhow::Result<()> {
        if metadata.listname().is_none() {
            anyhow::bail!("entry without `{}`", keys::LISTNAME);
        }
        if self.dispose.dispose(mail, metadata)? {
            self.switchboard
                .enqueue(mail, metadata)
                .context("Failed to requeue the entry")?;
        }
        Ok(())
    }

    fn process(
        &mut self,
        id: &EntryId,
        mail: &mut Mail,
        metadata: &mut Metadata,
    ) -> anyhow::Result<()> {
        let Err(error) = self.handle(mail, metadata) else {
            return self.finish(id, false);
        };

        tracing::error!(
            %id,
            list = metadata.listname().unwrap_or("n/a"),
            message_id = mail.message_id().unwrap_or("n/a"),
            sender = %mail.sender().map_or_else(|| "n/a".to_string(), |address| address.email),
            error = format!("{error:#}"),
            "Failed to process the entry."
        );

        metadata.insert(keys::WHICHQ, self.switchboard.queue().to_string());
        let preserve = match self.shunt.enqueue(mail, metadata) {
            Ok(shunted) => {
                tracing::warn!(%id, %shunted, "Entry shunted.");
                false
            }
            Err(error) => {
                tracing::error!(%id, error = format!("{error:#}"), "Failed to shunt the entry.");
                true
            }
        };
        self.finish(id, preserve)?;
        self.record_error()
    }

    fn reap(&mut self, block: bool) {
        self.children.extend(self.dispose.take_children());
        self.children.retain_mut(|child| {
            let pid = child.id();
            let status = if block {
                child.wait().map(Some)
            } else {
                child.try_wait()
            };
            match status {
                Ok(None) => true,
                Ok(Some(status)) if status.success() => false,
                Ok(Some(status)) => {
                    tracing::warn!(pid, %status, "Child process failed.");
                    false
                }
                Err(error) => {
                    tracing::warn!(pid, %error, "Failed to wait for a child process.");
                    false
                }
            }
        });
    }

    fn shutdown(&mut self) {
        if let Err(error) = self.dispose.cleanup() {
            tracing::error!(error = format!("{error:#}"), "Cleanup failed.");
        }
        self.reap(true);
    }
}
