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

/// Keys read or written by the runners.
pub mod keys {
    /// name of the list the entry belongs to (required).
    pub const LISTNAME: &str = "listname";
    /// recipients of the entry.
    pub const RECIPS: &str = "recips";
    /// epoch seconds of the reception.
    pub const RECEIVED_TIME: &str = "received_time";
    /// epoch seconds before which the entry must not be delivered.
    pub const DELIVER_AFTER: &str = "deliver_after";
    /// epoch seconds after which temporary failures are given up.
    pub const DELIVER_UNTIL: &str = "deliver_until";
    /// number of recipients that failed at the previous attempt.
    pub const LAST_RECIP_COUNT: &str = "last_recip_count";
    /// remaining handlers to run.
    pub const PIPELINE: &str = "pipeline";
    /// deliver one copy per recipient with a tagged envelope sender.
    pub const VERP: &str = "verp";
    /// the entry is a digest.
    pub const ISDIGEST: &str = "isdigest";
    /// the entry is a post to the list members.
    pub const TOLIST: &str = "tolist";
    /// envelope sender override.
    pub const ENVSENDER: &str = "envsender";
    /// pending cookie of a probe message.
    pub const PROBE_TOKEN: &str = "probe_token";
    /// the post carries a valid moderator approval.
    pub const APPROVED: &str = "approved";
    /// internally generated message skipping list decoration.
    pub const FASTTRACK: &str = "fasttrack";
    /// queue the entry was shunted from.
    pub const WHICHQ: &str = "whichq";
    /// number of crash recoveries of the entry.
    pub const BAK_COUNT: &str = "_bak_count";
    /// one record per crash recovery.
    pub const RECOVERY_HISTORY: &str = "_recovery_history";
    /// id of the entry while it is processed.
    pub const FILEBASE: &str = "_filebase";
}

/// Flat mapping attached to a queue entry.
///
/// Keys starting with `_` are volatile: they are never written by an enqueue.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Metadata(serde_json::Map<String, serde_json::Value>);

impl Metadata {
    /// Empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata for an entry of `listname`.
    #[must_use]
    pub fn for_list(listname: &str) -> Self {
        Self::new().with(keys::LISTNAME, listname)
    }

    /// Builder style insertion.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Raw access to a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Deserialize a value, `None` if absent or of another type.
    #[must_use]
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    /// Is the key present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate over the entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// A copy without the volatile keys.
    #[must_use]
    pub fn persistent(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// String value of a key.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_json::Value::as_str)
    }

    /// Float value of a key, integers are accepted.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Boolean flag, absent means `false`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.0
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// See [`keys::LISTNAME`].
    #[must_use]
    pub fn listname(&self) -> Option<&str> {
        self.get_str(keys::LISTNAME)
    }

    /// See [`keys::RECIPS`].
    #[must_use]
    pub fn recips(&self) -> Option<Vec<String>> {
        self.get_as(keys::RECIPS)
    }

    /// See [`keys::RECIPS`].
    pub fn set_recips(&mut self, recips: Vec<String>) {
        self.insert(keys::RECIPS, recips);
    }

    /// See [`keys::PIPELINE`].
    #[must_use]
    pub fn pipeline(&self) -> Option<Vec<String>> {
        self.get_as(keys::PIPELINE)
    }

    /// See [`keys::PIPELINE`].
    pub fn set_pipeline(&mut self, pipeline: Vec<String>) {
        self.insert(keys::PIPELINE, pipeline);
    }

    /// See [`keys::BAK_COUNT`].
    #[must_use]
    pub fn bak_count(&self) -> u32 {
        self.get_as(keys::BAK_COUNT).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn persistent_strips_volatile_keys() {
        let metadata = Metadata::for_list("test")
            .with(keys::FILEBASE, "1+abc")
            .with(keys::BAK_COUNT, 2)
            .with(keys::VERP, true);

        assert_eq!(
            metadata.persistent(),
            Metadata::for_list("test").with(keys::VERP, true)
        );
        assert_eq!(metadata.bak_count(), 2);
    }

    #[test]
    fn typed_access() {
        let mut metadata = Metadata::for_list("test").with(keys::DELIVER_AFTER, 12);
        metadata.set_recips(vec!["a@x.com".to_string(), "b@x.com".to_string()]);

        assert_eq!(metadata.listname(), Some("test"));
        assert_eq!(metadata.get_f64(keys::DELIVER_AFTER), Some(12.0));
        assert_eq!(
            metadata.recips(),
            Some(vec!["a@x.com".to_string(), "b@x.com".to_string()])
        );
        assert!(!metadata.flag(keys::ISDIGEST));
        assert_eq!(metadata.pipeline(), None);
    }
}
