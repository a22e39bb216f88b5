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
//! Initialization of the log layers: file, stdout and system logger.

use crate::Args;
use listd_config::field::{FieldServerLogSystem, SyslogFormat, SyslogSocket};
use listd_config::Config;

struct SyslogWriter {
    logger: either::Either<
        syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>,
        syslog::Logger<syslog::LoggerBackend, syslog::Formatter5424>,
    >,
}

impl std::io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let message = std::str::from_utf8(buf).unwrap_or("utf-8 error").to_owned();
        match self.logger {
            either::Either::Left(ref mut logger) => syslog::LogFormat::format(
                &logger.formatter,
                &mut logger.backend,
                syslog::Severity::LOG_WARNING,
                message,
            ),
            either::Either::Right(ref mut logger) => syslog::LogFormat::format(
                &logger.formatter,
                &mut logger.backend,
                syslog::Severity::LOG_WARNING,
                (0, std::collections::HashMap::new(), message),
            ),
        }
        .map(|_| buf.len())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        either::for_both!(&mut self.logger, logger => logger.backend.flush())
    }
}

struct MakeSyslogWriter {
    format: SyslogFormat,
    socket: SyslogSocket,
}

impl MakeSyslogWriter {
    fn connect(&self) -> syslog::Result<SyslogWriter> {
        let rfc3164 = || syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            ..Default::default()
        };
        let rfc5424 = || syslog::Formatter5424 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            ..Default::default()
        };

        let logger = match (self.format, &self.socket) {
            (SyslogFormat::Rfc3164, SyslogSocket::Udp { local, server }) => {
                either::Left(syslog::udp(rfc3164(), local, server)?)
            }
            (SyslogFormat::Rfc3164, SyslogSocket::Tcp { server }) => {
                either::Left(syslog::tcp(rfc3164(), server)?)
            }
            (SyslogFormat::Rfc3164, SyslogSocket::Unix { path: Some(path) }) => {
                either::Left(syslog::unix_custom(rfc3164(), path)?)
            }
            (SyslogFormat::Rfc3164, SyslogSocket::Unix { path: None }) => {
                either::Left(syslog::unix(rfc3164())?)
            }
            (SyslogFormat::Rfc5424, SyslogSocket::Udp { local, server }) => {
                either::Right(syslog::udp(rfc5424(), local, server)?)
            }
            (SyslogFormat::Rfc5424, SyslogSocket::Tcp { server }) => {
                either::Right(syslog::tcp(rfc5424(), server)?)
            }
            (SyslogFormat::Rfc5424, SyslogSocket::Unix { path: Some(path) }) => {
                either::Right(syslog::unix_custom(rfc5424(), path)?)
            }
            (SyslogFormat::Rfc5424, SyslogSocket::Unix { path: None }) => {
                either::Right(syslog::unix(rfc5424())?)
            }
        };
        Ok(SyslogWriter { logger })
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for MakeSyslogWriter {
    type Writer = tracing_subscriber::fmt::writer::OptionalWriter<SyslogWriter>;

    fn make_writer(&self) -> Self::Writer {
        match self.connect() {
            Ok(writer) => tracing_subscriber::fmt::writer::OptionalWriter::some(writer),
            Err(e) => {
                eprintln!("{e}");
                tracing_subscriber::fmt::writer::OptionalWriter::none()
            }
        }
    }
}

#[cfg(debug_assertions)]
macro_rules! get_fmt {
    () => {
        tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(false)
            .with_target(true)
            .with_ansi(false)
    };
}

#[cfg(not(debug_assertions))]
macro_rules! get_fmt {
    () => {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_thread_ids(false)
            .with_target(false)
            .with_ansi(false)
    };
}

/// Initialize the tracing subsystem.
///
/// # Errors
///
/// * The logs path in the configuration file are invalid.
/// * Failed to initialize the tracing subsystem.
pub fn initialize(args: &Args, config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{
        fmt::writer::MakeWriterExt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
    };

    let server_logs = &config.server.logs.filename;

    let writer_backend = if let (Some(directory), Some(file_name)) = (
        server_logs.parent(),
        server_logs.file_name().and_then(std::ffi::OsStr::to_str),
    ) {
        tracing_appender::rolling::never(directory, file_name)
    } else {
        anyhow::bail!(
            "filepath for server logs at {server_logs:?} does not have a parent or is not valid"
        )
    };

    let subscriber = tracing_subscriber::registry()
        .with({
            let mut e = tracing_subscriber::EnvFilter::default();
            for i in &config.server.logs.level {
                e = e.add_directive(i.clone());
            }
            e
        })
        .with(get_fmt!().with_writer(writer_backend));

    if let Some(system_log_config) = &config.server.logs.system {
        match &system_log_config {
            FieldServerLogSystem::Syslogd {
                level,
                format,
                socket,
            } => {
                let subscriber = subscriber.with(
                    get_fmt!()
                        .with_writer(
                            MakeSyslogWriter {
                                format: *format,
                                socket: socket.clone(),
                            }
                            .with_max_level(*level),
                        )
                        .without_time(),
                );

                if args.stdout {
                    subscriber
                        .with(get_fmt!().with_writer(std::io::stdout).with_ansi(true))
                        .try_init()
                } else {
                    subscriber.try_init()
                }
            }
            FieldServerLogSystem::Journald { level } => {
                let level = *level;
                let subscriber = subscriber.with(
                    tracing_journald::layer()
                        .map_err(|e| anyhow::anyhow!("{e}"))?
                        .with_filter(tracing_subscriber::filter::filter_fn(move |i| {
                            *i.level() <= level
                        })),
                );

                if args.stdout {
                    subscriber
                        .with(get_fmt!().with_writer(std::io::stdout).with_ansi(true))
                        .try_init()
                } else {
                    subscriber.try_init()
                }
            }
        }
    } else if args.stdout {
        subscriber
            .with(get_fmt!().with_writer(std::io::stdout).with_ansi(true))
            .try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| anyhow::anyhow!("{e}"))
}
