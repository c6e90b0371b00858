//! Source of "now" and "today".
//!
//! The tracked day is always the server's calendar date, never a value the
//! caller supplies. Keeping it behind a trait lets tests pin the date.

use chrono::{DateTime, Local, NaiveDate, Utc};

pub trait Clock: Send + Sync {
    /// Current instant, used for `taken_at` and record timestamps
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar date in the server's local time zone
    fn today(&self) -> NaiveDate;
}

/// Wall clock of the machine running the tracker
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock stopped at a given instant and date
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
}

impl FixedClock {
    /// Stop at `now`, using its UTC date as today
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            today: now.date_naive(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}
