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
//! An entry file is made of a fixed header and two length-prefixed JSON
//! segments:
//!
//! ```text
//! +--------+-------------+------------+-----------+------------+------------+
//! | "LSTQ" | version u16 | length u32 | message   | length u32 | metadata   |
//! +--------+-------------+------------+-----------+------------+------------+
//! ```
//!
//! Integers are big-endian.

use listd_common::{Mail, Metadata};

/// First bytes of every entry file.
pub const MAGIC: &[u8; 4] = b"LSTQ";

/// Schema version written by [`encode`].
pub const VERSION: u16 = 1;

/// Error produced while reading or writing an entry file.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The content ends before the announced length.
    #[error("the entry is truncated")]
    Truncated,
    /// The content does not start with [`MAGIC`].
    #[error("the entry does not start with the expected magic")]
    BadMagic,
    /// The content was written by another version of the schema.
    #[error("unsupported schema version: {0}")]
    UnsupportedVersion(u16),
    /// A segment is not valid JSON for its type.
    #[error("invalid segment: {0}")]
    Json(#[from] serde_json::Error),
    /// A segment does not fit in the length prefix.
    #[error("segment of {0} bytes is too large")]
    TooLarge(usize),
}

fn push_segment(out: &mut Vec<u8>, segment: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(segment.len()).map_err(|_| CodecError::TooLarge(segment.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(segment);
    Ok(())
}

/// Serialize an entry.
///
/// # Errors
///
/// * a segment could not be serialized or is larger than 4 GiB
pub fn encode(mail: &Mail, metadata: &Metadata) -> Result<Vec<u8>, CodecError> {
    let mail = serde_json::to_vec(mail)?;
    let metadata = serde_json::to_vec(metadata)?;

    let mut out = Vec::with_capacity(MAGIC.len() + 2 + 4 + mail.len() + 4 + metadata.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_be_bytes());
    push_segment(&mut out, &mail)?;
    push_segment(&mut out, &metadata)?;
    Ok(out)
}

struct Reader<'a> {
    input: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.input.len() < len {
            return Err(CodecError::Truncated);
        }
        let (head, tail) = self.input.split_at(len);
        self.input = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn segment(&mut self) -> Result<&'a [u8], CodecError> {
        let len = u32::from_be_bytes(self.take_array::<4>()?);
        self.take(usize::try_from(len).map_err(|_| CodecError::Truncated)?)
    }
}

/// Deserialize an entry.
///
/// Bytes following the metadata segment are ignored.
///
/// # Errors
///
/// * see [`CodecError`]
pub fn decode(input: &[u8]) -> Result<(Mail, Metadata), CodecError> {
    let mut reader = Reader { input };

    if &reader.take_array::<4>()? != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = u16::from_be_bytes(reader.take_array::<2>()?);
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let mail = serde_json::from_slice::<Mail>(reader.segment()?)?;
    let metadata = serde_json::from_slice::<Metadata>(reader.segment()?)?;

    Ok((mail, metadata))
}
