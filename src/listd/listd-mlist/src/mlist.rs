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
use listd_common::{utils, BounceInfo, DeliveryStatus};
use sha1::Digest;

/// Form of the digest received by a member.
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
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DigestFormat {
    /// `multipart/digest` of the posts.
    #[default]
    Mime,
    /// RFC 1153 flat text.
    Plain,
}

/// What happens to a post whose sender is not a member.
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
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NonmemberAction {
    ///
    Accept,
    /// wait for a moderator decision.
    #[default]
    Hold,
    /// return a notice to the sender.
    Reject,
    /// drop silently.
    Discard,
}

/// How often the digest volume number is incremented.
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
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VolumeFrequency {
    ///
    Yearly,
    ///
    #[default]
    Monthly,
    ///
    Quarterly,
    ///
    Weekly,
    ///
    Daily,
}

/// A subscriber of a list.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Member {
    /// address, as subscribed.
    pub address: String,
    ///
    #[serde(default)]
    pub realname: Option<String>,
    /// receives the digests instead of the posts.
    #[serde(default)]
    pub digest: bool,
    ///
    #[serde(default)]
    pub digest_format: DigestFormat,
    ///
    #[serde(default)]
    pub delivery_status: DeliveryStatus,
    /// epoch seconds of the last change of `delivery_status`.
    #[serde(default)]
    pub status_changed: Option<f64>,
    ///
    #[serde(default)]
    pub bounce_info: Option<BounceInfo>,
}

impl Member {
    /// A member receiving the posts.
    #[must_use]
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            realname: None,
            digest: false,
            digest_format: DigestFormat::default(),
            delivery_status: DeliveryStatus::Enabled,
            status_changed: None,
            bounce_info: None,
        }
    }

    /// A member receiving the digests in `format`.
    #[must_use]
    pub fn with_digest(mut self, format: DigestFormat) -> Self {
        self.digest = true;
        self.digest_format = format;
        self
    }
}

/// Bounce processing settings of a list.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BounceSettings {
    /// score the bounces of the members.
    pub processing: bool,
    /// score at which a member is disabled.
    pub score_threshold: f64,
    /// a bounce older than this starts a new episode.
    #[serde(with = "humantime_serde")]
    pub info_stale_after: std::time::Duration,
    /// re-enable notices sent before the removal.
    pub you_are_disabled_warnings: i32,
    /// delay between two re-enable notices.
    #[serde(with = "humantime_serde")]
    pub you_are_disabled_warnings_interval: std::time::Duration,
    ///
    pub unrecognized_goes_to_list_owner: bool,
    ///
    pub notify_owner_on_bounce_increment: bool,
    ///
    pub notify_owner_on_disable: bool,
    ///
    pub notify_owner_on_removal: bool,
}

impl Default for BounceSettings {
    fn default() -> Self {
        Self {
            processing: true,
            score_threshold: 5.0,
            info_stale_after: std::time::Duration::from_secs(7 * 24 * 60 * 60),
            you_are_disabled_warnings: 3,
            you_are_disabled_warnings_interval: std::time::Duration::from_secs(7 * 24 * 60 * 60),
            unrecognized_goes_to_list_owner: true,
            notify_owner_on_bounce_increment: false,
            notify_owner_on_disable: true,
            notify_owner_on_removal: true,
        }
    }
}

/// Digest settings and state of a list.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DigestSettings {
    ///
    pub digestable: bool,
    /// size of the accumulated posts triggering a digest, in KiB.
    pub size_threshold_kb: u64,
    ///
    pub volume_frequency: VolumeFrequency,
    ///
    pub volume: u32,
    ///
    pub next_issue: u32,
    /// epoch seconds of the last digest sent.
    pub last_sent: Option<f64>,
    /// send the pending digest periodically even below the threshold.
    pub send_periodic: bool,
    ///
    pub header: Option<String>,
    ///
    pub footer: Option<String>,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            digestable: true,
            size_threshold_kb: 30,
            volume_frequency: VolumeFrequency::Monthly,
            volume: 1,
            next_issue: 1,
            last_sent: None,
            send_periodic: true,
            header: None,
            footer: None,
        }
    }
}

/// Posting policy of a list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PostingSettings {
    /// hold every post not approved.
    pub emergency: bool,
    ///
    pub nonmember_action: NonmemberAction,
    /// 0 means unlimited.
    pub max_message_size_kb: u64,
    /// 0 means unlimited.
    pub max_num_recipients: usize,
    /// `%d` is replaced by the post id.
    pub subject_prefix: Option<String>,
    ///
    pub archive: bool,
    ///
    pub verp_delivery: bool,
}

impl Default for PostingSettings {
    fn default() -> Self {
        Self {
            emergency: false,
            nonmember_action: NonmemberAction::Hold,
            max_message_size_kb: 40,
            max_num_recipients: 10,
            subject_prefix: None,
            archive: true,
            verp_delivery: false,
        }
    }
}

/// A mailing list and its members.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MailingList {
    /// internal name, lower case.
    pub name: String,
    /// domain of the list addresses.
    pub host: String,
    ///
    #[serde(default)]
    pub description: String,
    ///
    #[serde(default)]
    pub owners: Vec<String>,
    ///
    #[serde(default)]
    pub moderators: Vec<String>,
    /// sha1 hex digest of the moderator password.
    #[serde(default)]
    pub mod_password: Option<String>,
    /// keyed by lower case address.
    #[serde(default)]
    pub members: std::collections::BTreeMap<String, Member>,
    ///
    #[serde(default)]
    pub bounce: BounceSettings,
    ///
    #[serde(default)]
    pub digest: DigestSettings,
    ///
    #[serde(default)]
    pub posting: PostingSettings,
    /// id of the next post.
    #[serde(default = "MailingList::first_post_id")]
    pub post_id: u64,
    /// epoch seconds of the last post delivered.
    #[serde(default)]
    pub last_post_time: Option<f64>,
}

/// Digest of a password as stored in [`MailingList::mod_password`].
#[must_use]
pub fn password_digest(password: &str) -> String {
    format!("{:x}", sha1::Sha1::digest(password.as_bytes()))
}

impl MailingList {
    const fn first_post_id() -> u64 {
        1
    }

    /// An empty list with the default settings.
    #[must_use]
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            host: host.to_string(),
            description: String::new(),
            owners: vec![],
            moderators: vec![],
            mod_password: None,
            members: std::collections::BTreeMap::new(),
            bounce: BounceSettings::default(),
            digest: DigestSettings::default(),
            posting: PostingSettings::default(),
            post_id: Self::first_post_id(),
            last_post_time: None,
        }
    }

    /// `<name>@<host>`
    #[must_use]
    pub fn posting_address(&self) -> String {
        format!("{}@{}", self.name, self.host)
    }

    /// `<name>-bounces@<host>`
    #[must_use]
    pub fn bounces_address(&self) -> String {
        format!("{}-bounces@{}", self.name, self.host)
    }

    /// `<name>-owner@<host>`
    #[must_use]
    pub fn owner_address(&self) -> String {
        format!("{}-owner@{}", self.name, self.host)
    }

    /// `<name>-request@<host>`
    #[must_use]
    pub fn request_address(&self) -> String {
        format!("{}-request@{}", self.name, self.host)
    }

    /// Envelope sender attributing a bounce to `recipient`:
    /// `<name>-bounces+<local>=<domain>@<host>`.
    #[must_use]
    pub fn verp_address(&self, recipient: &str) -> String {
        match recipient.rsplit_once('@') {
            Some((local, domain)) => {
                format!("{}-bounces+{local}={domain}@{}", self.name, self.host)
            }
            None => self.bounces_address(),
        }
    }

    /// Envelope sender of a probe: `<name>-bounces+<token>@<host>`.
    #[must_use]
    pub fn probe_address(&self, token: &str) -> String {
        format!("{}-bounces+{token}@{}", self.name, self.host)
    }

    /// `List-Id` value.
    #[must_use]
    pub fn list_id(&self) -> String {
        if self.description.is_empty() {
            format!("<{}.{}>", self.name, self.host)
        } else {
            format!("{} <{}.{}>", self.description, self.name, self.host)
        }
    }

    ///
    #[must_use]
    pub fn is_member(&self, address: &str) -> bool {
        self.members.contains_key(&address.to_lowercase())
    }

    ///
    #[must_use]
    pub fn member(&self, address: &str) -> Option<&Member> {
        self.members.get(&address.to_lowercase())
    }

    ///
    pub fn member_mut(&mut self, address: &str) -> Option<&mut Member> {
        self.members.get_mut(&address.to_lowercase())
    }

    /// Add or replace a member.
    pub fn add_member(&mut self, member: Member) {
        self.members.insert(member.address.to_lowercase(), member);
    }

    ///
    pub fn remove_member(&mut self, address: &str) -> Option<Member> {
        self.members.remove(&address.to_lowercase())
    }

    /// `None` for non members.
    #[must_use]
    pub fn delivery_status(&self, address: &str) -> Option<DeliveryStatus> {
        self.member(address).map(|m| m.delivery_status)
    }

    /// Change the delivery status of a member. Enabling the delivery forgets
    /// the bounce record. Returns `false` for non members.
    pub fn set_delivery_status(&mut self, address: &str, status: DeliveryStatus) -> bool {
        let Some(member) = self.member_mut(address) else {
            return false;
        };
        member.delivery_status = status;
        member.status_changed = Some(utils::now_epoch());
        if status == DeliveryStatus::Enabled {
            member.bounce_info = None;
        }
        true
    }

    ///
    #[must_use]
    pub fn bounce_info(&self, address: &str) -> Option<&BounceInfo> {
        self.member(address).and_then(|m| m.bounce_info.as_ref())
    }

    /// Returns `false` for non members.
    pub fn set_bounce_info(&mut self, address: &str, info: Option<BounceInfo>) -> bool {
        self.member_mut(address)
            .map(|member| member.bounce_info = info)
            .is_some()
    }

    ///
    #[must_use]
    pub fn is_owner(&self, address: &str) -> bool {
        self.owners.iter().any(|o| o.eq_ignore_ascii_case(address))
    }

    ///
    #[must_use]
    pub fn is_moderator(&self, address: &str) -> bool {
        self.moderators.iter().any(|o| o.eq_ignore_ascii_case(address))
    }

    /// Does `password` match the moderator password.
    #[must_use]
    pub fn check_mod_password(&self, password: &str) -> bool {
        self.mod_password
            .as_deref()
            .map_or(false, |digest| digest == password_digest(password.trim()))
    }

    /// Members receiving the posts one by one.
    pub fn regular_recipients(&self) -> impl Iterator<Item = &Member> {
        self.members
            .values()
            .filter(|m| !m.digest && m.delivery_status == DeliveryStatus::Enabled)
    }

    /// Members receiving the digests in `format`.
    pub fn digest_recipients(&self, format: DigestFormat) -> impl Iterator<Item = &Member> {
        self.members.values().filter(move |m| {
            m.digest && m.digest_format == format && m.delivery_status == DeliveryStatus::Enabled
        })
    }

    /// Owners, or the owner alias when the list has none.
    #[must_use]
    pub fn owner_recipients(&self) -> Vec<String> {
        if self.owners.is_empty() {
            vec![self.owner_address()]
        } else {
            self.owners.clone()
        }
    }
}
