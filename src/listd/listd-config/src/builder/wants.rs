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
#![allow(missing_docs)]

use crate::field::{
    FieldRunner, FieldServerArchive, FieldServerBounce, FieldServerDelivery, FieldServerDigest,
    FieldServerLists, FieldServerLogSystem, FieldServerMaster, FieldServerPending,
    FieldServerQueues, FieldServerRunner,
};

pub struct WantsVersion(pub(crate) ());

pub struct WantsServer {
    pub(crate) parent: WantsVersion,
    pub(super) version_requirement: semver::VersionReq,
}

pub struct WantsServerLogs {
    pub(crate) parent: WantsServer,
    pub(super) name: String,
}

pub struct WantsServerQueues {
    pub(crate) parent: WantsServerLogs,
    pub(super) filename: std::path::PathBuf,
    pub(super) level: Vec<tracing_subscriber::filter::Directive>,
    pub(super) system: Option<FieldServerLogSystem>,
}

pub struct WantsServerRunner {
    pub(crate) parent: WantsServerQueues,
    pub(super) queues: FieldServerQueues,
}

pub struct WantsServerLists {
    pub(crate) parent: WantsServerRunner,
    pub(super) runner: FieldServerRunner,
}

pub struct WantsServerDelivery {
    pub(crate) parent: WantsServerLists,
    pub(super) lists: FieldServerLists,
}

pub struct WantsServerBounce {
    pub(crate) parent: WantsServerDelivery,
    pub(super) delivery: FieldServerDelivery,
}

pub struct WantsServerArchive {
    pub(crate) parent: WantsServerBounce,
    pub(super) bounce: FieldServerBounce,
}

pub struct WantsServerDataDir {
    pub(crate) parent: WantsServerArchive,
    pub(super) archive: FieldServerArchive,
}

pub struct WantsValidate {
    pub(crate) parent: WantsServerDataDir,
    pub(super) data_dir: std::path::PathBuf,
    pub(super) runners: Vec<FieldRunner>,
    pub(super) pending: FieldServerPending,
    pub(super) digest: FieldServerDigest,
    pub(super) master: FieldServerMaster,
}
