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
    field::{DeliveryTransport, FieldServerLogSystem},
    Config,
};
use listd_common::RunnerKind;

#[test]
fn minimal() {
    let toml = include_str!("../../../../../demos/config/minimal.toml");
    pretty_assertions::assert_eq!(Config::from_toml(toml).unwrap(), Config::default());
}

#[test]
fn full() {
    let toml = include_str!("../../../../../demos/config/full.toml");

    let mut expected = Config::builder()
        .with_version_str(">=1.0.0, <2.0.0")
        .unwrap()
        .with_server_name("lists.example.com")
        .with_logs_settings(
            "/var/log/listd/listd.log",
            &[
                "warn".parse().unwrap(),
                "lqueue=info".parse().unwrap(),
                "listd_server=debug".parse().unwrap(),
            ],
        )
        .with_spool_settings(
            "/var/spool/listd",
            5,
            std::time::Duration::from_millis(50),
            std::time::Duration::from_secs(600),
            std::time::Duration::from_secs(3 * 24 * 60 * 60),
        )
        .with_runner_settings(
            std::time::Duration::from_millis(500),
            std::time::Duration::from_secs(60),
            20,
            std::time::Duration::from_secs(120),
        )
        .with_lists_settings(
            "/var/lib/listd/lists",
            std::time::Duration::from_secs(30),
            std::time::Duration::from_secs(300),
        )
        .with_delivery_settings(
            DeliveryTransport::Sendmail {
                path: "/usr/sbin/sendmail".into(),
                args: vec!["-oi".to_string()],
            },
            std::time::Duration::from_secs(30 * 60),
            std::time::Duration::from_secs(2 * 24 * 60 * 60),
            100,
            true,
        )
        .with_bounce_settings(
            std::time::Duration::from_secs(5 * 60),
            true,
            std::time::Duration::from_secs(24 * 60 * 60),
        )
        .with_archive_settings(
            "/var/lib/listd/archives",
            Some("/usr/local/bin/archive-indexer {listname}".to_string()),
        )
        .with_data_dirpath("/var/lib/listd/data")
        .with_runners(&[
            (RunnerKind::Incoming, 2),
            (RunnerKind::Outgoing, 4),
            (RunnerKind::Virgin, 1),
            (RunnerKind::Bounce, 1),
        ])
        .with_pending_lifetime(std::time::Duration::from_secs(24 * 60 * 60))
        .with_digest_send_every(std::time::Duration::from_secs(24 * 60 * 60))
        .with_max_restarts(3)
        .validate()
        .unwrap();
    expected.server.logs.system = Some(FieldServerLogSystem::Journald {
        level: tracing::Level::INFO,
    });

    pretty_assertions::assert_eq!(Config::from_toml(toml).unwrap(), expected);
}

#[test]
fn version_requirement_not_fulfilled() {
    let error = Config::from_toml("version_requirement = \">=2.0.0\"").unwrap_err();
    assert!(error.to_string().starts_with("Version requirement not fulfilled"));
}

#[rstest::rstest]
#[case::unknown_field("[server]\nunknown = 1\n")]
#[case::zero_slices("[[server.runners]]\nkind = \"incoming\"\nslices = 0\n")]
#[case::duplicated_runner("[[server.runners]]\nkind = \"retry\"\n[[server.runners]]\nkind = \"retry\"\n")]
#[case::bad_sleep("[server.runner]\nsleep_min = \"1m\"\nsleep_max = \"1s\"\n")]
#[case::bad_kind("[[server.runners]]\nkind = \"nope\"\n")]
fn invalid(#[case] body: &str) {
    let toml = format!("version_requirement = \">=1.0.0\"\n{body}");
    assert!(Config::from_toml(&toml).is_err());
}

#[test]
fn serialize_round_trip() {
    let config = Config::default();
    let json = serde_json::to_string(&config).unwrap();
    pretty_assertions::assert_eq!(serde_json::from_str::<Config>(&json).unwrap(), config);
}

#[test]
fn paths() {
    let config = Config::builder()
        .with_current_version()
        .with_server_name("example.com")
        .with_default_logs()
        .with_spool_dirpath("/tmp/spool")
        .with_default_runner()
        .with_lists_dirpath("/tmp/lists")
        .with_directory_delivery("/tmp/out")
        .with_default_bounce()
        .with_default_archive()
        .with_default_data_dir()
        .validate()
        .unwrap();

    pretty_assertions::assert_eq!(
        config.queue_dirpath(listd_common::QueueName::Shunt),
        std::path::PathBuf::from("/tmp/spool/shunt")
    );
    pretty_assertions::assert_eq!(
        config.list_dirpath("test"),
        std::path::PathBuf::from("/tmp/lists/test")
    );
}
