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
use anyhow::Context;

/// Path of the temporary file used while writing `path`.
#[must_use]
pub fn tmp_path(path: &std::path::Path) -> std::path::PathBuf {
    let mut out = path.as_os_str().to_owned();
    out.push(".tmp");
    out.into()
}

/// Write `content` to `path` so that readers see either the old or the new
/// content: temporary file, fsync, rename.
///
/// # Errors
///
/// * the temporary file could not be written or synced
/// * the rename failed
pub fn atomic_write(path: &std::path::Path, content: &[u8]) -> anyhow::Result<()> {
    let tmp = tmp_path(path);
    {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .with_context(|| format!("Failed to create '{}'", tmp.display()))?;

        std::io::Write::write_all(&mut file, content)
            .with_context(|| format!("Failed to write '{}'", tmp.display()))?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp, path).with_context(|| {
        format!(
            "Failed to rename '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })
}

/// Seconds since the epoch, with sub-second precision.
#[must_use]
pub fn now_epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

/// The current day, in UTC.
#[must_use]
pub fn today() -> time::Date {
    time::OffsetDateTime::now_utc().date()
}

/// Convert an epoch timestamp to a date-time, `None` if out of range.
#[must_use]
pub fn epoch_to_datetime(epoch: f64) -> Option<time::OffsetDateTime> {
    #[allow(clippy::cast_possible_truncation)]
    time::OffsetDateTime::from_unix_timestamp_nanos((epoch * 1e9) as i128).ok()
}

/// Age of a file according to its modification time.
///
/// # Errors
///
/// * the metadata of the file could not be read
pub fn file_age(path: &std::path::Path) -> std::io::Result<std::time::Duration> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(std::time::SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn atomic_write_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn epoch_conversion() {
        assert_eq!(
            epoch_to_datetime(86_400.5).unwrap(),
            time::macros::datetime!(1970-01-02 00:00:00.5 UTC)
        );
        assert!(now_epoch() > 1_600_000_000.0);
    }
}
