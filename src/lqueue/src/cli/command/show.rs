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
use crate::{cli::args::Commands, Extension, Switchboard};
use listd_common::{utils, QueueName};
use listd_config::Config;

type ListName = String;

/// Age in minutes of the entries of one list, bucketed by upper bound.
type MessageByLifetime = std::collections::HashMap<u64, Vec<u64>>;

struct Content {
    dirpath: std::path::PathBuf,
    queue: QueueName,
    exists: bool,
    count: usize,
    error_count: usize,
    result: std::collections::BTreeMap<ListName, MessageByLifetime>,
    empty_token: char,
}

impl Content {
    fn lifetimes() -> Vec<u64> {
        (0..9)
            .scan(5, |state, _| {
                let out = *state;
                *state *= 2;
                Some(out)
            })
            .collect()
    }

    fn add_entry(&mut self, key: &str, mut values: Vec<u64>) {
        let mut out = MessageByLifetime::new();

        for lifetime in Self::lifetimes() {
            let split_index = itertools::partition(&mut values, |age| *age < lifetime);
            let next_values = values.split_off(split_index);

            if !values.is_empty() {
                out.insert(lifetime, values);
            }
            values = next_values;
        }
        out.insert(u64::MAX, values);

        self.result.insert(key.to_string(), out);
    }
}

impl std::fmt::Display for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        macro_rules! token_if_empty {
            ($t:expr, $e:expr) => {
                if $e != 0 {
                    $e.to_string()
                } else {
                    $t.to_string()
                }
            };
        }

        let lifetimes = Self::lifetimes();

        f.write_fmt(format_args!(
            "{:<10} is at '{}/{}' :",
            self.queue.to_string().to_uppercase(),
            self.dirpath.display(),
            self.queue
        ))?;

        if self.count == 0 {
            f.write_str(if self.exists { "\t<EMPTY>" } else { "\t<MISSING>" })?;
        }

        if self.error_count != 0 {
            f.write_fmt(format_args!("\twith {} error", self.error_count))?;
        }

        f.write_str("\n")?;

        if self.result.is_empty() {
            return Ok(());
        }

        f.write_fmt(format_args!("{:>25}", "T"))?;
        for i in &lifetimes {
            f.write_fmt(format_args!("{i:>5}"))?;
        }
        f.write_fmt(format_args!(
            "{max:>5}+",
            max = lifetimes.last().unwrap_or(&0)
        ))?;
        f.write_str("\n")?;

        let sum_where = |lifetime: u64| {
            self.result
                .values()
                .map(|values| values.get(&lifetime).map_or(0, Vec::len))
                .sum::<usize>()
        };
        let total = self
            .result
            .values()
            .flat_map(|values| values.values().map(Vec::len))
            .sum::<usize>();

        f.write_fmt(format_args!(
            "{:>20}{:>5}",
            "TOTAL",
            token_if_empty!(self.empty_token, total)
        ))?;
        for i in &lifetimes {
            f.write_fmt(format_args!(
                "{:>5}",
                token_if_empty!(self.empty_token, sum_where(*i))
            ))?;
        }
        f.write_fmt(format_args!(
            "{:>5}",
            token_if_empty!(self.empty_token, sum_where(u64::MAX))
        ))?;
        f.write_str("\n")?;

        for (key, values) in &self.result {
            f.write_fmt(format_args!(
                "{key:>20}{:>5}",
                token_if_empty!(
                    self.empty_token,
                    values.values().map(Vec::len).sum::<usize>()
                )
            ))?;

            for i in &lifetimes {
                f.write_fmt(format_args!(
                    "{:>5}",
                    token_if_empty!(self.empty_token, values.get(i).map_or(0, Vec::len))
                ))?;
            }
            f.write_fmt(format_args!(
                "{:>5}",
                token_if_empty!(self.empty_token, values.get(&u64::MAX).map_or(0, Vec::len))
            ))?;
            f.write_str("\n")?;
        }

        Ok(())
    }
}

impl Commands {
    pub(crate) fn show<OUT: std::io::Write>(
        queues: Vec<QueueName>,
        config: &Config,
        empty_token: char,
        output: &mut OUT,
    ) -> anyhow::Result<()> {
        let now = utils::now_epoch();

        for queue in queues {
            let mut content = Content {
                dirpath: config.server.queues.dirpath.clone(),
                queue,
                exists: config.queue_dirpath(queue).exists(),
                count: 0,
                error_count: 0,
                result: std::collections::BTreeMap::new(),
                empty_token,
            };

            if content.exists {
                let switchboard = Switchboard::open(config, queue)?;
                let ids = switchboard.files(Extension::Pck)?;
                content.count = ids.len();

                let mut entries = ids
                    .iter()
                    .map(|id| {
                        switchboard.read(id, Extension::Pck).map(|(_, metadata)| {
                            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                            let age = ((now - id.timestamp()).max(0.0) / 60.0) as u64;
                            (metadata.listname().unwrap_or("-").to_string(), age)
                        })
                    })
                    .collect::<Vec<_>>();

                let split_index = itertools::partition(&mut entries, Result::is_ok);
                content.error_count = entries.split_off(split_index).len();

                let mut valid_entries = entries
                    .into_iter()
                    .filter_map(Result::ok)
                    .collect::<Vec<_>>();
                valid_entries.sort_by(|a, b| Ord::cmp(&a.0, &b.0));

                for (key, values) in
                    &itertools::Itertools::group_by(valid_entries.into_iter(), |i| i.0.clone())
                {
                    content.add_entry(&key, values.map(|(_, age)| age).collect());
                }
            }

            output.write_fmt(format_args!("{content}"))?;
        }

        Ok(())
    }
}
