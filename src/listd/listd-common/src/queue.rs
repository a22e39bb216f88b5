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

/// identifiers for all the queues of the spool.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Copy,
    Clone,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    /// posts waiting for the pipeline.
    In,
    /// messages ready for delivery.
    Out,
    /// messages whose delivery failed temporarily.
    Retry,
    /// bounce notifications.
    Bounces,
    /// internally generated messages.
    Virgin,
    /// messages to append to the archives.
    Archive,
    /// entries whose processing raised an error.
    Shunt,
}

/// Syntax sugar to build the path of a queue or of one of its files.
#[macro_export]
macro_rules! queue_path {
    ($spool_dirpath:expr, $queue:expr) => {
        std::path::PathBuf::from($spool_dirpath).join(format!("{}", $queue))
    };
    ($spool_dirpath:expr, $queue:expr, $filename:expr) => {
        $crate::queue_path!($spool_dirpath, $queue).join($filename)
    };
}

/// The kinds of runner processes.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Copy,
    Clone,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// runs the posting pipeline.
    Incoming,
    /// delivers messages.
    Outgoing,
    /// moves due messages back to delivery.
    Retry,
    /// registers bounces.
    Bounce,
    /// runs the pipeline of internally generated messages.
    Virgin,
    /// appends messages to the archives.
    Archive,
}

impl RunnerKind {
    /// The queue drained by this runner.
    #[must_use]
    pub const fn queue(self) -> QueueName {
        match self {
            Self::Incoming => QueueName::In,
            Self::Outgoing => QueueName::Out,
            Self::Retry => QueueName::Retry,
            Self::Bounce => QueueName::Bounces,
            Self::Virgin => QueueName::Virgin,
            Self::Archive => QueueName::Archive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn names() {
        assert_eq!(QueueName::Bounces.to_string(), "bounces");
        assert_eq!(QueueName::from_str("shunt").unwrap(), QueueName::Shunt);
        assert!(QueueName::from_str("bad").is_err());

        assert_eq!(
            queue_path!("/var/spool/listd", QueueName::In, "1+a.pck"),
            std::path::PathBuf::from("/var/spool/listd/in/1+a.pck")
        );
    }

    #[test]
    fn runner_queue() {
        assert_eq!(
            <RunnerKind as strum::IntoEnumIterator>::iter()
                .map(|kind| kind.queue().to_string())
                .collect::<Vec<_>>(),
            vec!["in", "out", "retry", "bounces", "virgin", "archive"]
        );
        assert_eq!(RunnerKind::from_str("bounce").unwrap(), RunnerKind::Bounce);
    }
}
