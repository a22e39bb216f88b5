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
use sha1::Digest;

/// Extensions of the files of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Extension {
    /// Entry ready to be dequeued.
    Pck,
    /// Entry being processed by a runner.
    Bak,
    /// Quarantined entry, in the bad directory.
    Psv,
}

/// Error produced when a file name is not an entry id.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid entry id: `{0}`")]
pub struct EntryIdError(pub String);

/// Identifier of a queue entry: `<received time>+<sha1 hex digest>`.
///
/// The timestamp orders the entries of a queue, the digest spreads them
/// across the slices of the runners.
#[derive(Debug, Clone)]
pub struct EntryId {
    raw: String,
    timestamp: f64,
    digest: [u32; 5],
}

impl EntryId {
    /// Fingerprint an entry enqueued at `now`.
    #[must_use]
    pub fn generate(content: &[u8], now: f64, listname: &str) -> Self {
        let mut hasher = sha1::Sha1::new();
        hasher.update(content);
        hasher.update(now.to_string().as_bytes());
        hasher.update(listname.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        let when = format!("{now:.6}");
        Self {
            timestamp: when.parse().unwrap_or(now),
            raw: format!("{when}+{digest}"),
            digest: parse_digest(&digest).unwrap_or_default(),
        }
    }

    /// Epoch seconds embedded in the id.
    #[must_use]
    pub const fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// The digest as a 160 bits big-endian integer, one `u32` per limb.
    #[must_use]
    pub const fn digest(&self) -> &[u32; 5] {
        &self.digest
    }

    ///
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Name of the file holding the entry in the given state.
    #[must_use]
    pub fn filename(&self, extension: Extension) -> String {
        format!("{}.{extension}", self.raw)
    }
}

fn parse_digest(hex: &str) -> Option<[u32; 5]> {
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let mut out = [0; 5];
    for (limb, chunk) in out.iter_mut().zip(hex.as_bytes().chunks(8)) {
        *limb = u32::from_str_radix(std::str::from_utf8(chunk).ok()?, 16).ok()?;
    }
    Some(out)
}

impl std::str::FromStr for EntryId {
    type Err = EntryIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || EntryIdError(s.to_string());

        let (when, digest) = s.split_once('+').ok_or_else(error)?;
        let timestamp = when.parse::<f64>().map_err(|_| error())?;
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(error());
        }

        Ok(Self {
            raw: s.to_string(),
            timestamp,
            digest: parse_digest(digest).ok_or_else(error)?,
        })
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for EntryId {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for EntryId {}

impl std::hash::Hash for EntryId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DIGEST: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn parse() {
        let id = format!("1678886400.5+{DIGEST}").parse::<EntryId>().unwrap();
        assert_eq!(id.timestamp(), 1_678_886_400.5);
        assert_eq!(
            id.digest(),
            &[0x0123_4567, 0x89ab_cdef, 0x0123_4567, 0x89ab_cdef, 0x0123_4567]
        );
        assert_eq!(id.filename(Extension::Bak), format!("1678886400.5+{DIGEST}.bak"));
    }

    #[rstest::rstest]
    #[case::no_separator("1678886400.5")]
    #[case::no_timestamp("+0123456789abcdef0123456789abcdef01234567")]
    #[case::negative("-1+0123456789abcdef0123456789abcdef01234567")]
    #[case::short_digest("1678886400.5+0123")]
    #[case::not_hex("1678886400.5+0123456789abcdef0123456789abcdef0123456z")]
    #[case::garbage("foobar")]
    fn invalid(#[case] input: &str) {
        assert_eq!(
            input.parse::<EntryId>().unwrap_err(),
            EntryIdError(input.to_string())
        );
    }

    #[test]
    fn generate() {
        let first = EntryId::generate(b"content", 1_678_886_400.25, "test");
        let again = EntryId::generate(b"content", 1_678_886_400.25, "test");
        let other_list = EntryId::generate(b"content", 1_678_886_400.25, "other");

        assert_eq!(first, again);
        assert_ne!(first, other_list);
        assert!(first.as_str().starts_with("1678886400.250000+"));
        assert_eq!(first.as_str().parse::<EntryId>().unwrap(), first);
    }
}
