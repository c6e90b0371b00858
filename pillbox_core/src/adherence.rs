//! Adherence state machine for daily logs.
//!
//! ```text
//!   pending ──mark_taken──▶ taken
//!      ▲                      │
//!      └─────mark_pending─────┘
//!   missed ──mark_taken / mark_pending──▶ taken / pending
//! ```
//!
//! `missed` is never entered: no time-based expiry exists. Ownership is not
//! checked here; callers pass a log they already resolved for the acting user.

use crate::{AdherenceLog, Error, LogStatus, Result};
use chrono::{DateTime, Utc};

/// A requested status change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    MarkTaken,
    MarkPending,
}

impl Transition {
    /// Parse a requested status (`taken` or `pending`)
    pub fn parse(status: &str) -> Result<Self> {
        match status.trim().to_lowercase().as_str() {
            "taken" => Ok(Transition::MarkTaken),
            "pending" => Ok(Transition::MarkPending),
            other => Err(Error::field(
                "status",
                format!("{} is not a valid status", other),
            )),
        }
    }
}

impl AdherenceLog {
    /// pending|missed|taken → taken, stamping `taken_at`
    ///
    /// On an already-taken log this refreshes `taken_at`.
    pub fn mark_taken(&mut self, now: DateTime<Utc>) {
        self.status = LogStatus::Taken;
        self.taken_at = Some(now);
        self.updated_at = now;
    }

    /// taken|missed|pending → pending, clearing `taken_at`
    pub fn mark_pending(&mut self, now: DateTime<Utc>) {
        if self.status == LogStatus::Pending && self.taken_at.is_none() {
            return;
        }
        self.status = LogStatus::Pending;
        self.taken_at = None;
        self.updated_at = now;
    }

    /// Apply a parsed transition
    pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) {
        let from = self.status;
        match transition {
            Transition::MarkTaken => self.mark_taken(now),
            Transition::MarkPending => self.mark_pending(now),
        }
        tracing::debug!("Log {}: {} -> {}", self.id, from, self.status);
    }
}
