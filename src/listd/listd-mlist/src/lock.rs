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

/// Failure to take the lock of a list.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// another process held the lock for longer than the timeout.
    #[error("lock '{}' still held after {timeout:?}", path.display())]
    Timeout {
        ///
        path: std::path::PathBuf,
        ///
        timeout: std::time::Duration,
    },
    ///
    #[error("failed to create lock '{}': {source}", path.display())]
    Io {
        ///
        path: std::path::PathBuf,
        ///
        source: std::io::Error,
    },
}

/// Exclusive access to the state of one list, released when dropped.
#[derive(Debug)]
pub struct ListLock {
    path: std::path::PathBuf,
}

impl ListLock {
    /// Take the lock file at `path`, sleeping between attempts for at most
    /// `timeout`. A lock file older than `lifetime` was left by a dead
    /// process and is broken.
    ///
    /// # Errors
    ///
    /// * [`LockError::Timeout`] when the lock is still held after `timeout`
    /// * [`LockError::Io`] when the lock file could not be created
    pub fn acquire(
        path: impl Into<std::path::PathBuf>,
        timeout: std::time::Duration,
        lifetime: std::time::Duration,
    ) -> Result<Self, LockError> {
        let path = path.into();
        let start = std::time::Instant::now();

        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    let this = Self { path };
                    if let Err(error) = std::io::Write::write_all(
                        &mut file,
                        std::process::id().to_string().as_bytes(),
                    ) {
                        tracing::warn!(%error, "Failed to write lock owner.");
                    }
                    return Ok(this);
                }
                Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                    if listd_common::utils::file_age(&path).map_or(false, |age| age > lifetime) {
                        tracing::warn!(path = %path.display(), "Breaking stale list lock.");
                        if let Err(error) = std::fs::remove_file(&path) {
                            tracing::warn!(%error, "Failed to break lock.");
                        }
                        continue;
                    }
                    if start.elapsed() >= timeout {
                        return Err(LockError::Timeout { path, timeout });
                    }
                    std::thread::sleep(std::time::Duration::from_millis(fastrand::u64(5..50)));
                }
                Err(source) => return Err(LockError::Io { path, source }),
            }
        }
    }

    ///
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for ListLock {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), %error, "Failed to release list lock.");
        }
    }
}
