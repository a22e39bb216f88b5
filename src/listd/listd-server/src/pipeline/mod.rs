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
//! The handlers a post goes through before being delivered.
//!
//! The names of the handlers left to run are stored in the `pipeline` key of
//! the metadata, so an entry shunted in the middle of its pipeline resumes at
//! the failing handler once unshunted.

use anyhow::Context;
use listd_common::{metadata::keys, Mail, Metadata};
use listd_config::Config;
use listd_mlist::{notice, ListStore, MailingList, Outbox, Pending, PendingOp};

mod delivery;
mod headers;
mod moderation;

/// Outcome of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// run the next handler.
    Continue,
    /// wait for a moderator, with the reason.
    Hold(String),
    /// drop the message silently.
    Discard,
    /// bounce the message back to its sender with a notice.
    Reject(String),
}

/// Identifiers of the handlers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum HandlerId {
    ///
    Approve,
    ///
    Emergency,
    ///
    Moderate,
    ///
    Hold,
    ///
    Cleanse,
    ///
    CalcRecips,
    ///
    CookHeaders,
    ///
    ToDigest,
    ///
    ToArchive,
    ///
    AfterDelivery,
    ///
    ToOutgoing,
}

/// Handlers run for a post to a list.
pub const POST_PIPELINE: &[HandlerId] = &[
    HandlerId::Approve,
    HandlerId::Moderate,
    HandlerId::Hold,
    HandlerId::Emergency,
    HandlerId::CalcRecips,
    HandlerId::Cleanse,
    HandlerId::CookHeaders,
    HandlerId::ToDigest,
    HandlerId::ToArchive,
    HandlerId::AfterDelivery,
    HandlerId::ToOutgoing,
];

/// Handlers run for a message generated by the server.
pub const VIRGIN_PIPELINE: &[HandlerId] = &[HandlerId::CookHeaders, HandlerId::ToOutgoing];

/// Everything a handler may need besides the message.
pub struct HandlerContext<'a> {
    ///
    pub config: &'a Config,
    ///
    pub store: &'a ListStore,
    /// pending confirmations of the list.
    pub pending: &'a Pending,
    /// queue of the generated messages (notices, digests).
    pub virgin: &'a dyn Outbox,
    /// queue of the messages ready for delivery.
    pub out: &'a dyn Outbox,
    ///
    pub archive: &'a dyn Outbox,
}

/// Signature of a handler.
pub type Handler = fn(
    &mut HandlerContext<'_>,
    &mut MailingList,
    &mut Mail,
    &mut Metadata,
) -> anyhow::Result<Disposition>;

/// Handlers by identifier, built once at startup.
pub struct Registry {
    handlers: std::collections::HashMap<HandlerId, Handler>,
}

impl Default for Registry {
    fn default() -> Self {
        let handlers: [(HandlerId, Handler); 11] = [
            (HandlerId::Approve, moderation::approve),
            (HandlerId::Emergency, moderation::emergency),
            (HandlerId::Moderate, moderation::moderate),
            (HandlerId::Hold, moderation::hold),
            (HandlerId::Cleanse, moderation::cleanse),
            (HandlerId::CalcRecips, headers::calc_recips),
            (HandlerId::CookHeaders, headers::cook_headers),
            (HandlerId::ToDigest, delivery::to_digest),
            (HandlerId::ToArchive, delivery::to_archive),
            (HandlerId::AfterDelivery, delivery::after_delivery),
            (HandlerId::ToOutgoing, delivery::to_outgoing),
        ];
        Self {
            handlers: handlers.into_iter().collect(),
        }
    }
}

impl Registry {
    /// Run the handlers left in the `pipeline` key, initialized with
    /// `default` if absent.
    ///
    /// The remaining handlers are stored back in the metadata before each
    /// call. A failing handler is put back in front of them.
    ///
    /// # Errors
    ///
    /// * a handler name is unknown
    /// * a handler failed
    /// * the hold or reject notices could not be queued
    pub fn dispatch(
        &self,
        ctx: &mut HandlerContext<'_>,
        list: &mut MailingList,
        mail: &mut Mail,
        metadata: &mut Metadata,
        default: &[HandlerId],
    ) -> anyhow::Result<Disposition> {
        let mut pipeline = std::collections::VecDeque::from(metadata.pipeline().unwrap_or_else(
            || default.iter().map(ToString::to_string).collect(),
        ));

        while let Some(name) = pipeline.pop_front() {
            metadata.set_pipeline(pipeline.iter().cloned().collect());

            let outcome = name
                .parse::<HandlerId>()
                .with_context(|| format!("unknown handler `{name}`"))
                .and_then(|id| {
                    let handler = self
                        .handlers
                        .get(&id)
                        .with_context(|| format!("handler `{id}` is not registered"))?;
                    tracing::trace!(handler = %id, "Running handler.");
                    handler(ctx, list, mail, metadata)
                        .with_context(|| format!("handler `{id}` failed"))
                });

            match outcome {
                Ok(Disposition::Continue) => {}
                Ok(disposition) => {
                    apply(ctx, list, mail, metadata, &disposition)?;
                    return Ok(disposition);
                }
                Err(error) => {
                    pipeline.push_front(name);
                    metadata.set_pipeline(pipeline.into_iter().collect());
                    return Err(error);
                }
            }
        }

        metadata.remove(keys::PIPELINE);
        Ok(Disposition::Continue)
    }
}

fn apply(
    ctx: &HandlerContext<'_>,
    list: &MailingList,
    mail: &Mail,
    metadata: &Metadata,
    disposition: &Disposition,
) -> anyhow::Result<()> {
    let sender = mail.sender().map(|address| address.email);
    let message_id = mail.message_id().unwrap_or("n/a");

    match disposition {
        Disposition::Continue => {}
        Disposition::Hold(reason) => {
            let cookie = ctx.pending.pend_new(PendingOp::HeldMessage {
                reason: reason.clone(),
                message: mail.clone(),
                metadata: metadata.persistent(),
            })?;
            tracing::info!(list = %list.name, %message_id, %reason, %cookie, "Post held.");

            if let Some(sender) = &sender {
                let (notice, notice_metadata) = notice::hold_to_sender(
                    list,
                    sender,
                    mail.subject().unwrap_or("(no subject)"),
                    reason,
                );
                ctx.virgin.send(&notice, &notice_metadata)?;
            }
            let (notice, notice_metadata) = notice::hold_to_owner(
                list,
                sender.as_deref().unwrap_or("(unknown sender)"),
                reason,
                &cookie,
                mail,
            );
            ctx.virgin.send(&notice, &notice_metadata)?;
        }
        Disposition::Discard => {
            tracing::info!(list = %list.name, %message_id, ?sender, "Post discarded.");
        }
        Disposition::Reject(reason) => {
            tracing::info!(list = %list.name, %message_id, ?sender, %reason, "Post rejected.");
            if let Some(sender) = sender {
                let (notice, notice_metadata) = notice::reject(list, &sender, reason, mail);
                ctx.virgin.send(&notice, &notice_metadata)?;
            }
        }
    }
    Ok(())
}
