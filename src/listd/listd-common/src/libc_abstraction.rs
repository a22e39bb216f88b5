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

/// Run a program as a background process
///
/// # Errors
///
/// see daemon(2) ERRORS
pub fn daemon(nochdir: bool, noclose: bool) -> anyhow::Result<()> {
    #[allow(unsafe_code)]
    // SAFETY: ffi call
    match unsafe { libc::daemon(i32::from(nochdir), i32::from(noclose)) } {
        0 => Ok(()),
        _ => Err(anyhow::anyhow!(
            "daemon: '{}'",
            std::io::Error::last_os_error()
        )),
    }
}

/// Send a signal to a process
///
/// # Errors
///
/// * `pid` does not fit in a `pid_t`
/// * see kill(2) ERRORS
pub fn kill(pid: u32, signal: libc::c_int) -> anyhow::Result<()> {
    let pid = libc::pid_t::try_from(pid)?;
    #[allow(unsafe_code)]
    // SAFETY: ffi call
    match unsafe { libc::kill(pid, signal) } {
        0 => Ok(()),
        _ => Err(anyhow::anyhow!(
            "kill: '{}'",
            std::io::Error::last_os_error()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_zero_probes_self() {
        kill(std::process::id(), 0).unwrap();
    }

    #[test]
    fn kill_invalid_pid() {
        assert!(kill(u32::MAX, 0).is_err());
    }
}
