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
use crate::EntryId;

/// Error produced when parsing a slice.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SliceError {
    /// Not of the form `<index>/<count>`.
    #[error("expected `<index>/<count>`, got `{0}`")]
    Format(String),
    /// `count` is zero or `index` is not lower than `count`.
    #[error("slice {index} out of {count} is out of range")]
    OutOfRange {
        ///
        index: u32,
        ///
        count: u32,
    },
}

/// One of the `count` equal shares of the digest space, processed by a single
/// runner process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    index: u32,
    count: u32,
}

type Limbs = [u32; 6];

/// `2^160 * numerator / count`, big-endian limbs.
fn scaled(numerator: u32, count: u32) -> Limbs {
    let count = u64::from(count);
    let mut out = [0; 6];
    let mut remainder = 0_u64;
    for (i, limb) in [numerator, 0, 0, 0, 0, 0].into_iter().enumerate() {
        let current = (remainder << 32) | u64::from(limb);
        // remainder < count so the quotient fits in a limb
        #[allow(clippy::cast_possible_truncation)]
        {
            out[i] = (current / count) as u32;
        }
        remainder = current % count;
    }
    out
}

fn decrement(mut value: Limbs) -> Limbs {
    for limb in value.iter_mut().rev() {
        let (next, borrow) = limb.overflowing_sub(1);
        *limb = next;
        if !borrow {
            break;
        }
    }
    value
}

impl Slice {
    /// # Errors
    ///
    /// * `count` is zero or `index >= count`
    pub const fn new(index: u32, count: u32) -> Result<Self, SliceError> {
        if count == 0 || index >= count {
            return Err(SliceError::OutOfRange { index, count });
        }
        Ok(Self { index, count })
    }

    /// The slice covering the whole digest space.
    #[must_use]
    pub const fn whole() -> Self {
        Self { index: 0, count: 1 }
    }

    ///
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    ///
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Inclusive bounds of the slice, as 192 bits big-endian integers.
    fn bounds(self) -> (Limbs, Limbs) {
        (
            scaled(self.index, self.count),
            decrement(scaled(self.index + 1, self.count)),
        )
    }

    /// Does the digest of the entry fall in this slice.
    #[must_use]
    pub fn contains(&self, id: &EntryId) -> bool {
        let digest = id.digest();
        let value: Limbs = [0, digest[0], digest[1], digest[2], digest[3], digest[4]];
        let (lower, upper) = self.bounds();
        lower <= value && value <= upper
    }
}

impl std::str::FromStr for Slice {
    type Err = SliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || SliceError::Format(s.to_string());
        let (index, count) = s.split_once('/').ok_or_else(error)?;
        Self::new(
            index.trim().parse().map_err(|_| error())?,
            count.trim().parse().map_err(|_| error())?,
        )
    }
}

impl std::fmt::Display for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(digest: &str) -> EntryId {
        format!("1.0+{digest}").parse().unwrap()
    }

    #[test]
    fn parse() {
        assert_eq!("1/4".parse::<Slice>().unwrap(), Slice::new(1, 4).unwrap());
        assert_eq!(
            "4/4".parse::<Slice>().unwrap_err(),
            SliceError::OutOfRange { index: 4, count: 4 }
        );
        assert_eq!(
            "1/0".parse::<Slice>().unwrap_err(),
            SliceError::OutOfRange { index: 1, count: 0 }
        );
        assert_eq!(
            "1-4".parse::<Slice>().unwrap_err(),
            SliceError::Format("1-4".to_string())
        );
        assert_eq!(Slice::new(2, 3).unwrap().to_string(), "2/3");
    }

    #[test]
    fn bounds_of_halves() {
        let (lower, upper) = Slice::new(0, 2).unwrap().bounds();
        assert_eq!(lower, [0; 6]);
        assert_eq!(upper, [0, 0x7fff_ffff, u32::MAX, u32::MAX, u32::MAX, u32::MAX]);

        let (lower, upper) = Slice::new(1, 2).unwrap().bounds();
        assert_eq!(lower, [0, 0x8000_0000, 0, 0, 0, 0]);
        assert_eq!(upper, [0, u32::MAX, u32::MAX, u32::MAX, u32::MAX, u32::MAX]);
    }

    #[test]
    fn whole_contains_everything() {
        let whole = Slice::whole();
        assert!(whole.contains(&id("0000000000000000000000000000000000000000")));
        assert!(whole.contains(&id("ffffffffffffffffffffffffffffffffffffffff")));
    }

    #[rstest::rstest]
    #[case("0000000000000000000000000000000000000000", 0)]
    #[case("3fffffffffffffffffffffffffffffffffffffff", 0)]
    #[case("4000000000000000000000000000000000000000", 1)]
    #[case("7fffffffffffffffffffffffffffffffffffffff", 1)]
    #[case("8000000000000000000000000000000000000000", 2)]
    #[case("c000000000000000000000000000000000000000", 3)]
    #[case("ffffffffffffffffffffffffffffffffffffffff", 3)]
    fn quarters(#[case] digest: &str, #[case] expected: u32) {
        let owners = (0..4)
            .filter(|i| Slice::new(*i, 4).unwrap().contains(&id(digest)))
            .collect::<Vec<_>>();
        assert_eq!(owners, vec![expected]);
    }

    #[test]
    fn thirds_partition() {
        let digests = (0..=255_u8)
            .map(|b| format!("{b:02x}{}", "5a".repeat(19)))
            .collect::<Vec<_>>();
        for digest in &digests {
            let owners = (0..3)
                .filter(|i| Slice::new(*i, 3).unwrap().contains(&id(digest)))
                .count();
            assert_eq!(owners, 1, "{digest}");
        }
    }
}
