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
use crate::{notice, MailingList, Outbox, Pending, PendingOp};
use listd_common::{utils, BounceInfo, DeliveryStatus, Mail};

/// Bounce scoring of the members of one list. The list must be locked by the
/// caller for the lifetime of the bouncer.
pub struct Bouncer<'a> {
    list: &'a mut MailingList,
    pending: &'a Pending,
    outbox: &'a dyn Outbox,
    verp_probes: bool,
}

impl<'a> Bouncer<'a> {
    /// With `verp_probes`, a member reaching the threshold is sent a probe
    /// instead of being disabled right away.
    pub fn new(
        list: &'a mut MailingList,
        pending: &'a Pending,
        outbox: &'a dyn Outbox,
        verp_probes: bool,
    ) -> Self {
        Self {
            list,
            pending,
            outbox,
            verp_probes,
        }
    }

    fn send(&self, (mail, metadata): (Mail, listd_common::Metadata)) -> anyhow::Result<()> {
        self.outbox.send(&mail, &metadata)
    }

    /// Score a bounce of `weight` received on `day` for `member`. At most one
    /// bounce is scored per day.
    ///
    /// # Errors
    ///
    /// * a notice could not be queued
    /// * the pending database failed
    pub fn register_bounce(
        &mut self,
        member: &str,
        bounce: &Mail,
        weight: f64,
        day: time::Date,
    ) -> anyhow::Result<()> {
        let list = self.list.name.clone();
        if !self.list.is_member(member) {
            tracing::info!(%list, %member, "Bounce for a non member, ignored.");
            return Ok(());
        }
        let settings = self.list.bounce.clone();

        let mut first_today = true;
        let mut info = match self.list.bounce_info(member).cloned() {
            None => {
                let info = BounceInfo::new(weight, day, settings.you_are_disabled_warnings);
                self.list.set_bounce_info(member, Some(info.clone()));
                tracing::info!(%list, %member, %day, score = info.score, "First bounce.");
                info
            }
            Some(_) if self.list.delivery_status(member) != Some(DeliveryStatus::Enabled) => {
                tracing::info!(%list, %member, "Residual bounce for a disabled member, ignored.");
                return Ok(());
            }
            Some(info) if info.date == day => {
                first_today = false;
                tracing::info!(%list, %member, %day, "Bounce already scored today.");
                info
            }
            Some(mut info) if day - info.date > settings.info_stale_after => {
                info.reset(weight, day, settings.you_are_disabled_warnings);
                tracing::info!(%list, %member, %day, "Stale bounce info, reset.");
                info
            }
            Some(mut info) => {
                info.score += weight;
                info.date = day;
                tracing::info!(%list, %member, %day, score = info.score, "Bounce score incremented.");
                info
            }
        };

        if info.score >= settings.score_threshold {
            if self.verp_probes {
                tracing::info!(
                    %list, %member, score = info.score, threshold = settings.score_threshold,
                    "Sending a probe."
                );
                self.send_probe(member, bounce)?;
                info.reset(0.0, info.date, info.noticesleft);
            } else {
                return self.disable_bouncing_member(member, info, bounce);
            }
        } else if settings.notify_owner_on_bounce_increment && first_today {
            self.send(notice::bounce_action(
                self.list,
                member,
                "bounce score incremented",
                bounce,
            ))?;
        }

        self.list.set_bounce_info(member, Some(info));
        Ok(())
    }

    /// Disable the delivery of `member` and start the re-enable notices.
    ///
    /// # Errors
    ///
    /// * a notice could not be queued
    /// * the pending database failed
    pub fn disable_bouncing_member(
        &mut self,
        member: &str,
        mut info: BounceInfo,
        bounce: &Mail,
    ) -> anyhow::Result<()> {
        let cookie = self.pending.pend_new(PendingOp::ReEnable {
            listname: self.list.name.clone(),
            address: member.to_string(),
        })?;
        info.cookie = Some(cookie);

        tracing::warn!(
            list = %self.list.name, %member, score = info.score,
            threshold = self.list.bounce.score_threshold,
            "Disabling member after bounces."
        );
        self.list.set_bounce_info(member, Some(info));
        self.list
            .set_delivery_status(member, DeliveryStatus::ByBounce);
        self.send_next_notification(member, utils::today())?;

        if self.list.bounce.notify_owner_on_disable {
            self.send(notice::bounce_action(self.list, member, "disabled", bounce))?;
        }
        Ok(())
    }

    /// Send the next re-enable notice to a disabled member, or remove it once
    /// no notice is left.
    ///
    /// # Errors
    ///
    /// * a notice could not be queued
    /// * the pending database failed
    pub fn send_next_notification(&mut self, member: &str, today: time::Date) -> anyhow::Result<()> {
        let Some(mut info) = self.list.bounce_info(member).cloned() else {
            return Ok(());
        };
        let status = self
            .list
            .delivery_status(member)
            .unwrap_or(DeliveryStatus::Unknown);
        let list = self.list.name.clone();

        if info.noticesleft <= 0 {
            if let Some(removed) = self.list.remove_member(member) {
                if self.list.bounce.notify_owner_on_removal {
                    self.send(notice::removal(self.list, &removed.address, "disabled address"))?;
                }
                self.send(notice::goodbye(self.list, &removed.address))?;
            }
            if let Some(cookie) = &info.cookie {
                self.pending.pend_confirm(cookie, true)?;
            }
            tracing::warn!(%list, %member, reason = %status, "Member removed after exhausting notices.");
            return Ok(());
        }

        let cookie = match info.cookie.clone() {
            Some(cookie) => cookie,
            None => {
                let cookie = self.pending.pend_new(PendingOp::ReEnable {
                    listname: list.clone(),
                    address: member.to_string(),
                })?;
                info.cookie = Some(cookie.clone());
                cookie
            }
        };

        self.send(notice::disabled(self.list, member, status, &info, &cookie))?;
        info.noticesleft -= 1;
        info.lastnotice = today;
        tracing::info!(%list, %member, noticesleft = info.noticesleft, "Re-enable notice sent.");

        self.list.set_bounce_info(member, Some(info));
        Ok(())
    }

    /// Send a probe to `member`, with the bounce attached. A bounce of the
    /// probe disables the member, see [`Bouncer::probe_bounce`].
    ///
    /// # Errors
    ///
    /// * the probe could not be queued
    /// * the pending database failed
    pub fn send_probe(&mut self, member: &str, bounce: &Mail) -> anyhow::Result<()> {
        let token = self.pending.pend_new(PendingOp::Probe {
            address: member.to_string(),
            message: bounce.clone(),
        })?;
        self.send(notice::probe(self.list, member, &token, bounce))
    }

    /// A probe identified by `token` bounced. Returns `false` when the token
    /// is unknown or expired.
    ///
    /// # Errors
    ///
    /// * see [`Bouncer::disable_bouncing_member`]
    pub fn probe_bounce(&mut self, token: &str) -> anyhow::Result<bool> {
        let Some(op) = self.pending.pend_confirm(token, true)? else {
            tracing::info!(list = %self.list.name, %token, "Unknown probe token.");
            return Ok(false);
        };
        let PendingOp::Probe { address, message } = op else {
            tracing::warn!(list = %self.list.name, %token, "Token does not identify a probe.");
            return Ok(false);
        };
        if !self.list.is_member(&address) {
            return Ok(false);
        }

        let info = self.list.bounce_info(&address).cloned().unwrap_or_else(|| {
            BounceInfo::new(0.0, utils::today(), self.list.bounce.you_are_disabled_warnings)
        });
        self.disable_bouncing_member(&address, info, &message)?;
        Ok(true)
    }

    /// Consume a re-enable cookie and enable the member again. Returns the
    /// address of the member.
    ///
    /// # Errors
    ///
    /// * the pending database failed
    pub fn confirm_reenable(&mut self, cookie: &str) -> anyhow::Result<Option<String>> {
        match self.pending.pend_confirm(cookie, true)? {
            Some(PendingOp::ReEnable { listname, address }) if listname == self.list.name => {
                if !self.list.set_delivery_status(&address, DeliveryStatus::Enabled) {
                    return Ok(None);
                }
                tracing::info!(list = %listname, member = %address, "Delivery re-enabled.");
                Ok(Some(address))
            }
            Some(op) => {
                self.pending.pend_repend(cookie, op)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Remind the members disabled by bounces whose last notice is older than
    /// the warnings interval. Returns the number of members processed.
    ///
    /// # Errors
    ///
    /// * see [`Bouncer::send_next_notification`]
    pub fn process_disabled(&mut self, today: time::Date) -> anyhow::Result<usize> {
        let interval = self.list.bounce.you_are_disabled_warnings_interval;
        let due = self
            .list
            .members
            .values()
            .filter(|m| m.delivery_status == DeliveryStatus::ByBounce)
            .filter(|m| {
                m.bounce_info
                    .as_ref()
                    .map_or(false, |info| today - info.lastnotice >= interval)
            })
            .map(|m| m.address.clone())
            .collect::<Vec<_>>();

        for member in &due {
            self.send_next_notification(member, today)?;
        }
        Ok(due.len())
    }
}
