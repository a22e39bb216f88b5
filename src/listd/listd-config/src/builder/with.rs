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
use super::wants::{
    WantsServer, WantsServerArchive, WantsServerBounce, WantsServerDataDir, WantsServerDelivery,
    WantsServerLists, WantsServerLogs, WantsServerQueues, WantsServerRunner, WantsValidate,
    WantsVersion,
};
use crate::{
    field::{
        DeliveryTransport, FieldRunner, FieldServer, FieldServerArchive, FieldServerBounce,
        FieldServerDelivery, FieldServerDigest, FieldServerLists, FieldServerLogs,
        FieldServerMaster, FieldServerPending, FieldServerQueues, FieldServerRunner,
    },
    Config,
};
use anyhow::Context;
use listd_common::RunnerKind;

///
pub struct Builder<State> {
    pub(crate) state: State,
}

impl Builder<WantsVersion> {
    /// Use a version requirement satisfied by the current version.
    #[must_use]
    pub fn with_current_version(self) -> Builder<WantsServer> {
        Builder::<WantsServer> {
            state: WantsServer {
                parent: self.state,
                version_requirement: Config::default_version_requirement(),
            },
        }
    }

    /// # Errors
    ///
    /// * `version_requirement` is not valid format
    pub fn with_version_str(
        self,
        version_requirement: &str,
    ) -> anyhow::Result<Builder<WantsServer>> {
        semver::VersionReq::parse(version_requirement)
            .with_context(|| format!("version is not valid: '{version_requirement}'"))
            .map(|version_requirement| Builder::<WantsServer> {
                state: WantsServer {
                    parent: self.state,
                    version_requirement,
                },
            })
    }
}

impl Builder<WantsServer> {
    ///
    #[must_use]
    pub fn with_hostname(self) -> Builder<WantsServerLogs> {
        self.with_server_name(&FieldServer::hostname())
    }

    ///
    #[must_use]
    pub fn with_server_name(self, name: &str) -> Builder<WantsServerLogs> {
        Builder::<WantsServerLogs> {
            state: WantsServerLogs {
                parent: self.state,
                name: name.to_string(),
            },
        }
    }
}

impl Builder<WantsServerLogs> {
    ///
    #[must_use]
    pub fn with_default_logs(self) -> Builder<WantsServerQueues> {
        self.with_logs_settings(
            FieldServerLogs::default_filename(),
            &FieldServerLogs::default_level(),
        )
    }

    ///
    #[must_use]
    pub fn with_logs_settings(
        self,
        filename: impl Into<std::path::PathBuf>,
        level: &[tracing_subscriber::filter::Directive],
    ) -> Builder<WantsServerQueues> {
        Builder::<WantsServerQueues> {
            state: WantsServerQueues {
                parent: self.state,
                filename: filename.into(),
                level: level.to_vec(),
                system: None,
            },
        }
    }
}

impl Builder<WantsServerQueues> {
    ///
    #[must_use]
    pub fn with_default_spool(self) -> Builder<WantsServerRunner> {
        self.with_spool_dirpath(FieldServerQueues::default_dirpath())
    }

    ///
    #[must_use]
    pub fn with_spool_dirpath(
        self,
        dirpath: impl Into<std::path::PathBuf>,
    ) -> Builder<WantsServerRunner> {
        self.with_spool_settings(
            dirpath,
            FieldServerQueues::default_dequeue_lock_retries(),
            FieldServerQueues::default_dequeue_lock_sleep(),
            FieldServerQueues::default_lock_lifetime(),
            FieldServerQueues::default_max_item_lifetime(),
        )
    }

    ///
    #[must_use]
    pub fn with_spool_settings(
        self,
        dirpath: impl Into<std::path::PathBuf>,
        dequeue_lock_retries: u32,
        dequeue_lock_sleep: std::time::Duration,
        lock_lifetime: std::time::Duration,
        max_item_lifetime: std::time::Duration,
    ) -> Builder<WantsServerRunner> {
        Builder::<WantsServerRunner> {
            state: WantsServerRunner {
                parent: self.state,
                queues: FieldServerQueues {
                    dirpath: dirpath.into(),
                    dequeue_lock_retries,
                    dequeue_lock_sleep,
                    lock_lifetime,
                    max_item_lifetime,
                },
            },
        }
    }
}

impl Builder<WantsServerRunner> {
    ///
    #[must_use]
    pub fn with_default_runner(self) -> Builder<WantsServerLists> {
        self.with_runner_settings(
            FieldServerRunner::default_sleep_min(),
            FieldServerRunner::default_sleep_max(),
            FieldServerRunner::default_breaker_errors(),
            FieldServerRunner::default_breaker_window(),
        )
    }

    ///
    #[must_use]
    pub fn with_runner_settings(
        self,
        sleep_min: std::time::Duration,
        sleep_max: std::time::Duration,
        breaker_errors: usize,
        breaker_window: std::time::Duration,
    ) -> Builder<WantsServerLists> {
        Builder::<WantsServerLists> {
            state: WantsServerLists {
                parent: self.state,
                runner: FieldServerRunner {
                    sleep_min,
                    sleep_max,
                    breaker_errors,
                    breaker_window,
                },
            },
        }
    }
}

impl Builder<WantsServerLists> {
    ///
    #[must_use]
    pub fn with_default_lists(self) -> Builder<WantsServerDelivery> {
        self.with_lists_dirpath(FieldServerLists::default_dirpath())
    }

    ///
    #[must_use]
    pub fn with_lists_dirpath(
        self,
        dirpath: impl Into<std::path::PathBuf>,
    ) -> Builder<WantsServerDelivery> {
        self.with_lists_settings(
            dirpath,
            FieldServerLists::default_lock_timeout(),
            FieldServerLists::default_lock_lifetime(),
        )
    }

    ///
    #[must_use]
    pub fn with_lists_settings(
        self,
        dirpath: impl Into<std::path::PathBuf>,
        lock_timeout: std::time::Duration,
        lock_lifetime: std::time::Duration,
    ) -> Builder<WantsServerDelivery> {
        Builder::<WantsServerDelivery> {
            state: WantsServerDelivery {
                parent: self.state,
                lists: FieldServerLists {
                    dirpath: dirpath.into(),
                    lock_timeout,
                    lock_lifetime,
                },
            },
        }
    }
}

impl Builder<WantsServerDelivery> {
    ///
    #[must_use]
    pub fn with_default_delivery(self) -> Builder<WantsServerBounce> {
        self.with_delivery_transport(DeliveryTransport::default())
    }

    ///
    #[must_use]
    pub fn with_directory_delivery(
        self,
        dirpath: impl Into<std::path::PathBuf>,
    ) -> Builder<WantsServerBounce> {
        self.with_delivery_transport(DeliveryTransport::Directory {
            dirpath: dirpath.into(),
        })
    }

    ///
    #[must_use]
    pub fn with_delivery_transport(self, transport: DeliveryTransport) -> Builder<WantsServerBounce> {
        self.with_delivery_settings(
            transport,
            FieldServerDelivery::default_retry_wait(),
            FieldServerDelivery::default_retry_period(),
            FieldServerDelivery::default_max_recipients(),
            false,
        )
    }

    ///
    #[must_use]
    pub fn with_delivery_settings(
        self,
        transport: DeliveryTransport,
        retry_wait: std::time::Duration,
        retry_period: std::time::Duration,
        max_recipients: usize,
        verp: bool,
    ) -> Builder<WantsServerBounce> {
        Builder::<WantsServerBounce> {
            state: WantsServerBounce {
                parent: self.state,
                delivery: FieldServerDelivery {
                    transport,
                    retry_wait,
                    retry_period,
                    max_recipients,
                    verp,
                },
            },
        }
    }
}

impl Builder<WantsServerBounce> {
    ///
    #[must_use]
    pub fn with_default_bounce(self) -> Builder<WantsServerArchive> {
        self.with_bounce_settings(
            FieldServerBounce::default_register_every(),
            false,
            FieldServerBounce::default_disabled_check_every(),
        )
    }

    ///
    #[must_use]
    pub fn with_bounce_settings(
        self,
        register_every: std::time::Duration,
        verp_probes: bool,
        disabled_check_every: std::time::Duration,
    ) -> Builder<WantsServerArchive> {
        Builder::<WantsServerArchive> {
            state: WantsServerArchive {
                parent: self.state,
                bounce: FieldServerBounce {
                    register_every,
                    verp_probes,
                    disabled_check_every,
                },
            },
        }
    }
}

impl Builder<WantsServerArchive> {
    ///
    #[must_use]
    pub fn with_default_archive(self) -> Builder<WantsServerDataDir> {
        self.with_archive_settings(FieldServerArchive::default_dirpath(), None)
    }

    ///
    #[must_use]
    pub fn with_archive_settings(
        self,
        dirpath: impl Into<std::path::PathBuf>,
        external_command: Option<String>,
    ) -> Builder<WantsServerDataDir> {
        Builder::<WantsServerDataDir> {
            state: WantsServerDataDir {
                parent: self.state,
                archive: FieldServerArchive {
                    dirpath: dirpath.into(),
                    external_command,
                },
            },
        }
    }
}

impl Builder<WantsServerDataDir> {
    ///
    #[must_use]
    pub fn with_default_data_dir(self) -> Builder<WantsValidate> {
        self.with_data_dirpath(FieldServer::default_data_dir())
    }

    ///
    #[must_use]
    pub fn with_data_dirpath(
        self,
        data_dir: impl Into<std::path::PathBuf>,
    ) -> Builder<WantsValidate> {
        Builder::<WantsValidate> {
            state: WantsValidate {
                parent: self.state,
                data_dir: data_dir.into(),
                runners: FieldServer::default_runners(),
                pending: FieldServerPending::default(),
                digest: FieldServerDigest::default(),
                master: FieldServerMaster::default(),
            },
        }
    }
}

impl Builder<WantsValidate> {
    /// Replace the runners started by the master.
    #[must_use]
    pub fn with_runners(mut self, runners: &[(RunnerKind, u32)]) -> Self {
        self.state.runners = runners
            .iter()
            .map(|(kind, slices)| FieldRunner {
                kind: *kind,
                slices: *slices,
            })
            .collect();
        self
    }

    ///
    #[must_use]
    pub fn with_pending_lifetime(mut self, lifetime: std::time::Duration) -> Self {
        self.state.pending.lifetime = lifetime;
        self
    }

    ///
    #[must_use]
    pub fn with_digest_send_every(mut self, period: std::time::Duration) -> Self {
        self.state.digest.send_every = Some(period);
        self
    }

    ///
    #[must_use]
    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.state.master.max_restarts = max_restarts;
        self
    }
}
