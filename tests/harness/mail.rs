// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-memory mail transport that records what would have been sent.

use async_trait::async_trait;
use enrolment_intake::mailer::{MailError, MailTransport, OutboundMail};
use std::sync::Mutex;

/// What the transport does with each message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behaviour {
    #[default]
    Deliver,
    Reject,
    Panic,
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMail>>,
    attempts: Mutex<usize>,
    behaviour: Behaviour,
}

impl RecordingTransport {
    pub fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            ..Default::default()
        }
    }

    /// Transport that rejects every message.
    pub fn failing() -> Self {
        Self::with_behaviour(Behaviour::Reject)
    }

    /// Messages delivered successfully.
    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Delivery attempts, successful or not.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        *self.attempts.lock().unwrap() += 1;
        match self.behaviour {
            Behaviour::Deliver => {
                self.sent.lock().unwrap().push(mail.clone());
                Ok(())
            }
            Behaviour::Reject => Err(MailError::Rejected(503)),
            Behaviour::Panic => panic!("mail transport exploded"),
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
