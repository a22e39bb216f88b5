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

/// Delivery status of a member.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    /// the member receives the posts.
    #[default]
    Enabled,
    /// disabled by the member.
    ByUser,
    /// disabled by a list administrator.
    ByAdmin,
    /// disabled because the address bounces.
    ByBounce,
    /// disabled for an unknown reason.
    Unknown,
}

/// The first `lastnotice` of a fresh record: one day after the epoch.
pub const EPOCH_PLUS_ONE_DAY: time::Date = time::macros::date!(1970 - 01 - 02);

/// Bounce bookkeeping of one member.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BounceInfo {
    /// accumulated weight of the bounces of the episode.
    pub score: f64,
    /// day of the last scored bounce.
    pub date: time::Date,
    /// number of re-enable notices left before removal.
    pub noticesleft: i32,
    /// day of the last re-enable notice.
    pub lastnotice: time::Date,
    /// pending re-enable cookie.
    pub cookie: Option<String>,
}

impl BounceInfo {
    /// A new episode starting with one bounce of `weight`.
    #[must_use]
    pub const fn new(weight: f64, date: time::Date, noticesleft: i32) -> Self {
        Self {
            score: weight,
            date,
            noticesleft,
            lastnotice: EPOCH_PLUS_ONE_DAY,
            cookie: None,
        }
    }

    /// Restart the episode. The pending cookie is kept.
    pub fn reset(&mut self, weight: f64, date: time::Date, noticesleft: i32) {
        self.score = weight;
        self.date = date;
        self.noticesleft = noticesleft;
        self.lastnotice = EPOCH_PLUS_ONE_DAY;
    }
}

impl std::fmt::Display for BounceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "score: {}, last bounce: {}, notices left: {}, last notice: {}, cookie: {}",
            self.score,
            self.date,
            self.noticesleft,
            self.lastnotice,
            self.cookie.as_deref().unwrap_or("none")
        )
    }
}
