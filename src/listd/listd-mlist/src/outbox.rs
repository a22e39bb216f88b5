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
use listd_common::{Mail, Metadata};

/// Destination of the messages generated while processing a list.
pub trait Outbox {
    /// Queue a message for the pipeline of generated messages.
    ///
    /// # Errors
    ///
    /// * the message could not be queued
    fn send(&self, mail: &Mail, metadata: &Metadata) -> anyhow::Result<()>;
}

impl Outbox for lqueue::Switchboard {
    fn send(&self, mail: &Mail, metadata: &Metadata) -> anyhow::Result<()> {
        self.enqueue(mail, metadata).map(|_| ())
    }
}

/// Keeps the messages in memory.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    sent: std::cell::RefCell<Vec<(Mail, Metadata)>>,
}

impl MemoryOutbox {
    /// Take the messages sent so far.
    pub fn take(&self) -> Vec<(Mail, Metadata)> {
        self.sent.take()
    }

    ///
    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.borrow().len()
    }

    ///
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.borrow().is_empty()
    }
}

impl Outbox for MemoryOutbox {
    fn send(&self, mail: &Mail, metadata: &Metadata) -> anyhow::Result<()> {
        self.sent.borrow_mut().push((mail.clone(), metadata.clone()));
        Ok(())
    }
}
