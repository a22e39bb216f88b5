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

/// This structure contains all the field to configure the runners and the tools.
///
/// This structure will be loaded from a configuration file `-c, --config`
/// argument of the programs. See [`crate::Config::from_toml`].
///
/// All field are optional and defaulted if missing.
///
/// You can also use the builder [`Config::builder`] to create an instance
/// programmatically.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// listd's version requirement to parse this configuration file.
    pub version_requirement: semver::VersionReq,
    /// see [`field::FieldServer`]
    #[serde(default)]
    pub server: field::FieldServer,
}

/// The inner field of the listd's configuration.
#[allow(clippy::module_name_repetitions)]
pub mod field {
    use listd_common::RunnerKind;

    /// This structure contains all the field to configure the site.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServer {
        /// Name of the site.
        ///
        /// Used as the host of the lists created without one and in the
        /// `Message-ID` of the generated messages.
        #[serde(default = "FieldServer::hostname")]
        pub name: String,
        /// Directory of the runtime data (bounce events spool, ...).
        #[serde(default = "FieldServer::default_data_dir")]
        pub data_dir: std::path::PathBuf,
        /// see [`FieldServerLogs`]
        #[serde(default)]
        pub logs: FieldServerLogs,
        /// see [`FieldServerQueues`]
        #[serde(default)]
        pub queues: FieldServerQueues,
        /// see [`FieldServerRunner`]
        #[serde(default)]
        pub runner: FieldServerRunner,
        /// Runner processes started by the master.
        #[serde(default = "FieldServer::default_runners")]
        pub runners: Vec<FieldRunner>,
        /// see [`FieldServerLists`]
        #[serde(default)]
        pub lists: FieldServerLists,
        /// see [`FieldServerDelivery`]
        #[serde(default)]
        pub delivery: FieldServerDelivery,
        /// see [`FieldServerBounce`]
        #[serde(default)]
        pub bounce: FieldServerBounce,
        /// see [`FieldServerPending`]
        #[serde(default)]
        pub pending: FieldServerPending,
        /// see [`FieldServerDigest`]
        #[serde(default)]
        pub digest: FieldServerDigest,
        /// see [`FieldServerArchive`]
        #[serde(default)]
        pub archive: FieldServerArchive,
        /// see [`FieldServerMaster`]
        #[serde(default)]
        pub master: FieldServerMaster,
    }

    /// The field related to the logs.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServerLogs {
        /// Filepath of the logs, shared by every process.
        #[serde(default = "FieldServerLogs::default_filename")]
        pub filename: std::path::PathBuf,
        /// Customize the log level of the different part of the program.
        ///
        /// See <https://docs.rs/tracing-subscriber/0.3.15/tracing_subscriber/filter/struct.EnvFilter.html>
        #[serde(
            default = "FieldServerLogs::default_level",
            serialize_with = "crate::parser::tracing_directive::serialize",
            deserialize_with = "crate::parser::tracing_directive::deserialize"
        )]
        pub level: Vec<tracing_subscriber::filter::Directive>,
        /// see [`FieldServerLogSystem`]
        pub system: Option<FieldServerLogSystem>,
    }

    ///
    #[derive(
        Debug,
        Default,
        Copy,
        Clone,
        PartialEq,
        Eq,
        strum::Display,
        strum::EnumString,
        serde_with::DeserializeFromStr,
        serde_with::SerializeDisplay,
    )]
    pub enum SyslogFormat {
        ///
        #[default]
        #[strum(serialize = "3164")]
        Rfc3164,
        ///
        #[strum(serialize = "5424")]
        Rfc5424,
    }

    /// Configure how the logs are sent to the system log.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields, tag = "type", rename_all = "lowercase")]
    pub enum SyslogSocket {
        /// Send logs using udp.
        Udp {
            /// Local address for the UDP stream.
            #[serde(default = "SyslogSocket::default_udp_local")]
            local: std::net::SocketAddr,
            /// Remote address for the UDP stream.
            #[serde(default = "SyslogSocket::default_udp_server")]
            server: std::net::SocketAddr,
        },
        /// Send logs using tcp.
        Tcp {
            ///
            #[serde(default = "SyslogSocket::default_tcp_server")]
            server: std::net::SocketAddr,
        },
        /// Send logs using a unix socket with a custom path.
        Unix {
            /// Path to the unix socket.
            path: Option<std::path::PathBuf>,
        },
    }

    /// The configuration of the `system logging module`.
    ///
    /// The implementation is backended for `syslogd` or `journald`.
    #[serde_with::serde_as]
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, strum::Display)]
    #[serde(deny_unknown_fields, tag = "backend", rename_all = "lowercase")]
    pub enum FieldServerLogSystem {
        /// Parameters for the `syslogd` backend.
        Syslogd {
            ///
            #[serde_as(as = "serde_with::DisplayFromStr")]
            level: tracing::Level,
            ///
            #[serde(default)]
            format: SyslogFormat,
            ///
            #[serde(default)]
            socket: SyslogSocket,
        },
        ///
        Journald {
            ///
            #[serde_as(as = "serde_with::DisplayFromStr")]
            level: tracing::Level,
        },
    }

    /// The configuration of the spool.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServerQueues {
        /// Path of the spool folder.
        ///
        /// ```shell
        /// $> tree -L 1 /var/spool/listd
        /// /var/spool/listd
        /// ├── archive      # messages to append to the archives
        /// ├── bad          # quarantined entries (.psv)
        /// ├── bounces      # bounce notifications
        /// ├── in           # posts waiting for the pipeline
        /// ├── out          # messages ready for delivery
        /// ├── retry        # temporary delivery failures
        /// ├── shunt        # entries whose processing failed
        /// └── virgin       # internally generated messages
        /// ```
        #[serde(default = "FieldServerQueues::default_dirpath")]
        pub dirpath: std::path::PathBuf,
        /// Number of attempts to take the lock of an entry before skipping it.
        #[serde(default = "FieldServerQueues::default_dequeue_lock_retries")]
        pub dequeue_lock_retries: u32,
        /// Sleep between two attempts to take the lock of an entry.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerQueues::default_dequeue_lock_sleep")]
        pub dequeue_lock_sleep: std::time::Duration,
        /// Age after which a lock file is considered abandoned.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerQueues::default_lock_lifetime")]
        pub lock_lifetime: std::time::Duration,
        /// Entries found in process at startup and older than this are quarantined.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerQueues::default_max_item_lifetime")]
        pub max_item_lifetime: std::time::Duration,
    }

    /// The behavior of the runner loop.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServerRunner {
        /// First sleep when the queue is idle.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerRunner::default_sleep_min")]
        pub sleep_min: std::time::Duration,
        /// The idle sleep doubles up to this value, a pass is forced after it.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerRunner::default_sleep_max")]
        pub sleep_max: std::time::Duration,
        /// Number of errors stopping the runner ...
        #[serde(default = "FieldServerRunner::default_breaker_errors")]
        pub breaker_errors: usize,
        /// ... within this window.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerRunner::default_breaker_window")]
        pub breaker_window: std::time::Duration,
    }

    /// One runner kind started by the master.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldRunner {
        /// the kind of runner.
        pub kind: RunnerKind,
        /// Number of processes sharing the queue, by hash slices.
        #[serde(default = "FieldRunner::default_slices")]
        pub slices: u32,
    }

    /// Storage of the lists.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServerLists {
        /// One sub directory per list.
        #[serde(default = "FieldServerLists::default_dirpath")]
        pub dirpath: std::path::PathBuf,
        /// Maximum wait to acquire a list lock.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerLists::default_lock_timeout")]
        pub lock_timeout: std::time::Duration,
        /// Age after which a list lock is considered abandoned.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerLists::default_lock_lifetime")]
        pub lock_lifetime: std::time::Duration,
    }

    /// How the messages leave the site.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields, tag = "type", rename_all = "lowercase")]
    pub enum DeliveryTransport {
        /// Pipe the messages to a sendmail compatible program.
        Sendmail {
            /// Path of the program.
            #[serde(default = "DeliveryTransport::default_sendmail_path")]
            path: std::path::PathBuf,
            /// Extra arguments given before the envelope.
            #[serde(default)]
            args: Vec<String>,
        },
        /// Write one file per envelope in a directory.
        Directory {
            /// The output directory.
            dirpath: std::path::PathBuf,
        },
    }

    /// The delivery of the messages.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServerDelivery {
        /// see [`DeliveryTransport`]
        #[serde(default)]
        pub transport: DeliveryTransport,
        /// Delay before retrying a temporary failure.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerDelivery::default_retry_wait")]
        pub retry_wait: std::time::Duration,
        /// Temporary failures are retried during this period.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerDelivery::default_retry_period")]
        pub retry_period: std::time::Duration,
        /// Maximum number of recipients in one envelope.
        #[serde(default = "FieldServerDelivery::default_max_recipients")]
        pub max_recipients: usize,
        /// Deliver every post with one envelope per recipient.
        #[serde(default)]
        pub verp: bool,
    }

    /// The bounce processing.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServerBounce {
        /// Period of registration of the bounce events.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerBounce::default_register_every")]
        pub register_every: std::time::Duration,
        /// Send a probe instead of disabling the member when the threshold is reached.
        #[serde(default)]
        pub verp_probes: bool,
        /// Period of the check of the disabled members for pending notices.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerBounce::default_disabled_check_every")]
        pub disabled_check_every: std::time::Duration,
    }

    /// The pending confirmations.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServerPending {
        /// Lifetime of a pending confirmation.
        #[serde(with = "humantime_serde")]
        #[serde(default = "FieldServerPending::default_lifetime")]
        pub lifetime: std::time::Duration,
    }

    /// The digests.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServerDigest {
        /// Headers kept for each message of the plain text digest.
        #[serde(default = "FieldServerDigest::default_plain_kept_headers")]
        pub plain_kept_headers: Vec<String>,
        /// Period of the send of the pending digests by the virgin runner,
        /// for the lists asking for it. Disabled if missing.
        #[serde(default, with = "humantime_serde")]
        pub send_every: Option<std::time::Duration>,
    }

    /// The archives.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServerArchive {
        /// Directory of the mailboxes, one `<list>.mbox` per list.
        #[serde(default = "FieldServerArchive::default_dirpath")]
        pub dirpath: std::path::PathBuf,
        /// Shell command receiving each archived message on its standard input.
        ///
        /// `{listname}` is replaced by the name of the list.
        pub external_command: Option<String>,
    }

    /// The master process.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldServerMaster {
        /// Number of restarts of a failing runner before giving up on it.
        #[serde(default = "FieldServerMaster::default_max_restarts")]
        pub max_restarts: u32,
    }
}
