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
use crate::{
    config::field::{
        DeliveryTransport, FieldRunner, FieldServer, FieldServerArchive, FieldServerBounce,
        FieldServerDelivery, FieldServerDigest, FieldServerLists, FieldServerLogs,
        FieldServerMaster, FieldServerPending, FieldServerQueues, FieldServerRunner,
        SyslogSocket,
    },
    Config,
};
use listd_common::RunnerKind;

const fn minutes(count: u64) -> std::time::Duration {
    std::time::Duration::from_secs(count * 60)
}

const fn days(count: u64) -> std::time::Duration {
    std::time::Duration::from_secs(count * 24 * 60 * 60)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version_requirement: Self::default_version_requirement(),
            server: FieldServer::default(),
        }
    }
}

impl Config {
    /// `>=1.0.0, <2.0.0`
    pub(crate) fn default_version_requirement() -> semver::VersionReq {
        let comparator = |op, major| semver::Comparator {
            op,
            major,
            minor: Some(0),
            patch: Some(0),
            pre: semver::Prerelease::EMPTY,
        };
        semver::VersionReq {
            comparators: vec![
                comparator(semver::Op::GreaterEq, 1),
                comparator(semver::Op::Less, 2),
            ],
        }
    }
}

impl Default for FieldServer {
    fn default() -> Self {
        Self {
            name: Self::hostname(),
            data_dir: Self::default_data_dir(),
            logs: FieldServerLogs::default(),
            queues: FieldServerQueues::default(),
            runner: FieldServerRunner::default(),
            runners: Self::default_runners(),
            lists: FieldServerLists::default(),
            delivery: FieldServerDelivery::default(),
            bounce: FieldServerBounce::default(),
            pending: FieldServerPending::default(),
            digest: FieldServerDigest::default(),
            archive: FieldServerArchive::default(),
            master: FieldServerMaster::default(),
        }
    }
}

impl FieldServer {
    pub(crate) fn hostname() -> String {
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string())
    }

    pub(crate) fn default_data_dir() -> std::path::PathBuf {
        "/var/lib/listd/data".into()
    }

    pub(crate) fn default_runners() -> Vec<FieldRunner> {
        <RunnerKind as strum::IntoEnumIterator>::iter()
            .map(|kind| FieldRunner {
                kind,
                slices: FieldRunner::default_slices(),
            })
            .collect()
    }
}

impl Default for FieldServerLogs {
    fn default() -> Self {
        Self {
            filename: Self::default_filename(),
            level: Self::default_level(),
            system: None,
        }
    }
}

impl FieldServerLogs {
    pub(crate) fn default_filename() -> std::path::PathBuf {
        "/var/log/listd/listd.log".into()
    }

    pub(crate) fn default_level() -> Vec<tracing_subscriber::filter::Directive> {
        vec![tracing_subscriber::filter::LevelFilter::WARN.into()]
    }
}

impl Default for SyslogSocket {
    fn default() -> Self {
        Self::Unix { path: None }
    }
}

impl SyslogSocket {
    pub(crate) const fn default_udp_local() -> std::net::SocketAddr {
        std::net::SocketAddr::V4(std::net::SocketAddrV4::new(
            std::net::Ipv4Addr::LOCALHOST,
            0,
        ))
    }

    pub(crate) const fn default_udp_server() -> std::net::SocketAddr {
        std::net::SocketAddr::V4(std::net::SocketAddrV4::new(
            std::net::Ipv4Addr::LOCALHOST,
            514,
        ))
    }

    pub(crate) const fn default_tcp_server() -> std::net::SocketAddr {
        std::net::SocketAddr::V4(std::net::SocketAddrV4::new(
            std::net::Ipv4Addr::LOCALHOST,
            601,
        ))
    }
}

impl Default for FieldServerQueues {
    fn default() -> Self {
        Self {
            dirpath: Self::default_dirpath(),
            dequeue_lock_retries: Self::default_dequeue_lock_retries(),
            dequeue_lock_sleep: Self::default_dequeue_lock_sleep(),
            lock_lifetime: Self::default_lock_lifetime(),
            max_item_lifetime: Self::default_max_item_lifetime(),
        }
    }
}

impl FieldServerQueues {
    pub(crate) fn default_dirpath() -> std::path::PathBuf {
        "/var/spool/listd".into()
    }

    pub(crate) const fn default_dequeue_lock_retries() -> u32 {
        3
    }

    pub(crate) const fn default_dequeue_lock_sleep() -> std::time::Duration {
        std::time::Duration::from_millis(100)
    }

    pub(crate) const fn default_lock_lifetime() -> std::time::Duration {
        minutes(5)
    }

    pub(crate) const fn default_max_item_lifetime() -> std::time::Duration {
        days(7)
    }
}

impl Default for FieldServerRunner {
    fn default() -> Self {
        Self {
            sleep_min: Self::default_sleep_min(),
            sleep_max: Self::default_sleep_max(),
            breaker_errors: Self::default_breaker_errors(),
            breaker_window: Self::default_breaker_window(),
        }
    }
}

impl FieldServerRunner {
    pub(crate) const fn default_sleep_min() -> std::time::Duration {
        std::time::Duration::from_secs(1)
    }

    pub(crate) const fn default_sleep_max() -> std::time::Duration {
        std::time::Duration::from_secs(32)
    }

    pub(crate) const fn default_breaker_errors() -> usize {
        10
    }

    pub(crate) const fn default_breaker_window() -> std::time::Duration {
        std::time::Duration::from_secs(60)
    }
}

impl FieldRunner {
    pub(crate) const fn default_slices() -> u32 {
        1
    }
}

impl Default for FieldServerLists {
    fn default() -> Self {
        Self {
            dirpath: Self::default_dirpath(),
            lock_timeout: Self::default_lock_timeout(),
            lock_lifetime: Self::default_lock_lifetime(),
        }
    }
}

impl FieldServerLists {
    pub(crate) fn default_dirpath() -> std::path::PathBuf {
        "/var/lib/listd/lists".into()
    }

    pub(crate) const fn default_lock_timeout() -> std::time::Duration {
        std::time::Duration::from_secs(10)
    }

    pub(crate) const fn default_lock_lifetime() -> std::time::Duration {
        minutes(5)
    }
}

impl Default for DeliveryTransport {
    fn default() -> Self {
        Self::Sendmail {
            path: Self::default_sendmail_path(),
            args: vec![],
        }
    }
}

impl DeliveryTransport {
    pub(crate) fn default_sendmail_path() -> std::path::PathBuf {
        "/usr/sbin/sendmail".into()
    }
}

impl Default for FieldServerDelivery {
    fn default() -> Self {
        Self {
            transport: DeliveryTransport::default(),
            retry_wait: Self::default_retry_wait(),
            retry_period: Self::default_retry_period(),
            max_recipients: Self::default_max_recipients(),
            verp: false,
        }
    }
}

impl FieldServerDelivery {
    pub(crate) const fn default_retry_wait() -> std::time::Duration {
        minutes(15)
    }

    pub(crate) const fn default_retry_period() -> std::time::Duration {
        days(5)
    }

    pub(crate) const fn default_max_recipients() -> usize {
        500
    }
}

impl Default for FieldServerBounce {
    fn default() -> Self {
        Self {
            register_every: Self::default_register_every(),
            verp_probes: false,
            disabled_check_every: Self::default_disabled_check_every(),
        }
    }
}

impl FieldServerBounce {
    pub(crate) const fn default_register_every() -> std::time::Duration {
        minutes(15)
    }

    pub(crate) const fn default_disabled_check_every() -> std::time::Duration {
        days(1)
    }
}

impl Default for FieldServerPending {
    fn default() -> Self {
        Self {
            lifetime: Self::default_lifetime(),
        }
    }
}

impl FieldServerPending {
    pub(crate) const fn default_lifetime() -> std::time::Duration {
        days(3)
    }
}

impl Default for FieldServerDigest {
    fn default() -> Self {
        Self {
            plain_kept_headers: Self::default_plain_kept_headers(),
            send_every: None,
        }
    }
}

impl FieldServerDigest {
    pub(crate) fn default_plain_kept_headers() -> Vec<String> {
        [
            "Date",
            "From",
            "Subject",
            "To",
            "Cc",
            "Message-ID",
            "Keywords",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }
}

impl Default for FieldServerArchive {
    fn default() -> Self {
        Self {
            dirpath: Self::default_dirpath(),
            external_command: None,
        }
    }
}

impl FieldServerArchive {
    pub(crate) fn default_dirpath() -> std::path::PathBuf {
        "/var/lib/listd/archives".into()
    }
}

impl Default for FieldServerMaster {
    fn default() -> Self {
        Self {
            max_restarts: Self::default_max_restarts(),
        }
    }
}

impl FieldServerMaster {
    pub(crate) const fn default_max_restarts() -> u32 {
        10
    }
}
