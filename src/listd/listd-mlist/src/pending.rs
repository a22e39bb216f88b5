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
use listd_common::{utils, Mail, Metadata};
use sha1::Digest;

/// An operation waiting for a confirmation. The single letter tags are the
/// on-disk names of the kinds.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op")]
pub enum PendingOp {
    ///
    #[serde(rename = "S")]
    Subscription {
        ///
        address: String,
        ///
        realname: Option<String>,
        ///
        digest: bool,
    },
    ///
    #[serde(rename = "U")]
    Unsubscription {
        ///
        address: String,
    },
    ///
    #[serde(rename = "C")]
    ChangeOfAddress {
        ///
        old: String,
        ///
        new: String,
    },
    /// A post waiting for a moderator.
    #[serde(rename = "H")]
    HeldMessage {
        ///
        reason: String,
        ///
        message: Mail,
        ///
        metadata: Metadata,
    },
    /// Re-enable the delivery of a member disabled by bounces.
    #[serde(rename = "E")]
    ReEnable {
        ///
        listname: String,
        ///
        address: String,
    },
    /// A probe sent to a member.
    #[serde(rename = "P")]
    Probe {
        ///
        address: String,
        /// the bounce which triggered the probe.
        message: Mail,
    },
}

/// Errors of the pending database.
#[derive(Debug, thiserror::Error)]
pub enum PendingError {
    ///
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        ///
        path: std::path::PathBuf,
        ///
        source: std::io::Error,
    },
    ///
    #[error("corrupted pending database '{}': {source}", path.display())]
    Corrupted {
        ///
        path: std::path::PathBuf,
        ///
        source: serde_json::Error,
    },
    ///
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Record {
    /// epoch seconds after which the record is forgotten.
    evict: f64,
    #[serde(flatten)]
    op: PendingOp,
}

type Database = std::collections::BTreeMap<String, Record>;

/// Confirmation cookies of one list, persisted as a JSON document.
#[derive(Debug, Clone)]
pub struct Pending {
    path: std::path::PathBuf,
    lifetime: std::time::Duration,
}

impl Pending {
    ///
    #[must_use]
    pub fn new(path: impl Into<std::path::PathBuf>, lifetime: std::time::Duration) -> Self {
        Self {
            path: path.into(),
            lifetime,
        }
    }

    fn load(&self) -> Result<Database, PendingError> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Database::new())
            }
            Err(source) => {
                return Err(PendingError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&content).map_err(|source| PendingError::Corrupted {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, mut db: Database) -> Result<(), PendingError> {
        let now = utils::now_epoch();
        db.retain(|_, record| record.evict > now);

        let content = serde_json::to_vec_pretty(&db).map_err(anyhow::Error::new)?;
        utils::atomic_write(&self.path, &content)?;
        Ok(())
    }

    fn evict_time(&self) -> f64 {
        utils::now_epoch() + self.lifetime.as_secs_f64()
    }

    /// Record `op` and return the cookie which confirms it.
    ///
    /// # Errors
    ///
    /// * the database could not be read or written
    pub fn pend_new(&self, op: PendingOp) -> Result<String, PendingError> {
        let mut db = self.load()?;

        let cookie = loop {
            let seed = format!("{}{}", fastrand::f64(), utils::now_epoch() % 1.0);
            let cookie = format!("{:x}", sha1::Sha1::digest(seed.as_bytes()));
            if !db.contains_key(&cookie) {
                break cookie;
            }
        };

        db.insert(
            cookie.clone(),
            Record {
                evict: self.evict_time(),
                op,
            },
        );
        self.save(db)?;
        Ok(cookie)
    }

    /// The operation confirmed by `cookie`, `None` if unknown or expired.
    /// With `expunge` the record is consumed.
    ///
    /// # Errors
    ///
    /// * the database could not be read or written
    pub fn pend_confirm(
        &self,
        cookie: &str,
        expunge: bool,
    ) -> Result<Option<PendingOp>, PendingError> {
        let mut db = self.load()?;

        let found = if expunge {
            db.remove(cookie)
        } else {
            db.get(cookie).cloned()
        };
        let op = found
            .filter(|record| record.evict > utils::now_epoch())
            .map(|record| record.op);

        if expunge {
            self.save(db)?;
        }
        Ok(op)
    }

    /// Put back an operation under its cookie, with a fresh lifetime.
    ///
    /// # Errors
    ///
    /// * the database could not be read or written
    pub fn pend_repend(&self, cookie: &str, op: PendingOp) -> Result<(), PendingError> {
        let mut db = self.load()?;
        db.insert(
            cookie.to_string(),
            Record {
                evict: self.evict_time(),
                op,
            },
        );
        self.save(db)
    }

    /// Cookies of the records not expired yet.
    ///
    /// # Errors
    ///
    /// * the database could not be read
    pub fn cookies(&self) -> Result<Vec<String>, PendingError> {
        let now = utils::now_epoch();
        Ok(self
            .load()?
            .into_iter()
            .filter(|(_, record)| record.evict > now)
            .map(|(cookie, _)| cookie)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DAY: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

    fn reenable() -> PendingOp {
        PendingOp::ReEnable {
            listname: "test".to_string(),
            address: "alice@example.com".to_string(),
        }
    }

    #[test]
    fn confirm_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let pending = Pending::new(dir.path().join("pending.json"), DAY);

        let cookie = pending.pend_new(reenable()).unwrap();
        assert_eq!(cookie.len(), 40);
        assert!(cookie.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(pending.pend_confirm(&cookie, false).unwrap(), Some(reenable()));
        assert_eq!(pending.pend_confirm(&cookie, true).unwrap(), Some(reenable()));
        assert_eq!(pending.pend_confirm(&cookie, true).unwrap(), None);
        assert!(pending.cookies().unwrap().is_empty());
    }

    #[test]
    fn expired_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let pending = Pending::new(dir.path().join("pending.json"), std::time::Duration::ZERO);

        let cookie = pending.pend_new(reenable()).unwrap();
        assert_eq!(pending.pend_confirm(&cookie, false).unwrap(), None);
        assert_eq!(pending.pend_confirm("unknown", true).unwrap(), None);
    }

    #[test]
    fn repend() {
        let dir = tempfile::tempdir().unwrap();
        let pending = Pending::new(dir.path().join("pending.json"), DAY);

        let cookie = pending.pend_new(reenable()).unwrap();
        let op = pending.pend_confirm(&cookie, true).unwrap().unwrap();
        pending.pend_repend(&cookie, op).unwrap();
        assert_eq!(pending.cookies().unwrap(), vec![cookie]);
    }

    #[test]
    fn on_disk_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        let pending = Pending::new(&path, DAY);

        let cookie = pending
            .pend_new(PendingOp::Probe {
                address: "alice@example.com".to_string(),
                message: Mail::text(vec![], "bounce"),
            })
            .unwrap();

        let db = serde_json::from_str::<serde_json::Value>(
            &std::fs::read_to_string(&path).unwrap(),
        )
        .unwrap();
        assert_eq!(db[&cookie]["op"], "P");
        assert_eq!(db[&cookie]["address"], "alice@example.com");
    }

    #[test]
    fn corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert!(matches!(
            Pending::new(&path, DAY).pend_new(reenable()).unwrap_err(),
            PendingError::Corrupted { .. }
        ));
    }
}
