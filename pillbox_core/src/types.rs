//! Core domain types for the Pillbox system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Accounts and caregiver links
//! - Medications and their time-of-day schedule slots
//! - Daily adherence logs and their status
//! - Read views combining a medication with its slots and logs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type MedicationId = Uuid;
pub type SlotId = Uuid;
pub type LogId = Uuid;

// ============================================================================
// Accounts
// ============================================================================

/// Account role
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Caregiver,
}

impl Role {
    /// Parse a role name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "patient" => Some(Role::Patient),
            "caregiver" => Some(Role::Caregiver),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Patient => write!(f, "patient"),
            Role::Caregiver => write!(f, "caregiver"),
        }
    }
}

/// Six-digit linking code handed from a patient to a caregiver
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ShareCode(String);

impl ShareCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered account
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub share_code: ShareCode,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }
}

/// Caregiver observing a patient
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaregiverLink {
    pub caregiver_id: UserId,
    pub patient_id: UserId,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Medications and schedules
// ============================================================================

/// Recurring time of day a dose is due
///
/// Stored as a plain string; values written by older data that are not one of
/// the three known slots survive as `Other` and sort after the known ones.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Other(String),
}

impl TimeOfDay {
    /// Known slots in display order
    pub const KNOWN: [TimeOfDay; 3] = [TimeOfDay::Morning, TimeOfDay::Afternoon, TimeOfDay::Evening];

    /// Parse only the known slots
    pub fn parse_known(s: &str) -> Option<Self> {
        match Self::from(s.to_string()) {
            TimeOfDay::Other(_) => None,
            known => Some(known),
        }
    }

    /// Canonical display rank; unknown values share the last rank
    pub fn rank(&self) -> u8 {
        match self {
            TimeOfDay::Morning => 0,
            TimeOfDay::Afternoon => 1,
            TimeOfDay::Evening => 2,
            TimeOfDay::Other(_) => 3,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Other(s) => s,
        }
    }
}

impl From<String> for TimeOfDay {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "morning" => TimeOfDay::Morning,
            "afternoon" => TimeOfDay::Afternoon,
            "evening" => TimeOfDay::Evening,
            _ => TimeOfDay::Other(s),
        }
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A medication owned by a patient
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Medication {
    pub id: MedicationId,
    pub owner_id: UserId,
    pub name: String,
    pub dosage: Option<String>,
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One time-of-day assignment for a medication
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub id: SlotId,
    pub medication_id: MedicationId,
    pub time_of_day: TimeOfDay,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Adherence logs
// ============================================================================

/// Adherence status of a daily log
///
/// `Missed` is a reserved value: nothing in the engine transitions into it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    #[default]
    Pending,
    Taken,
    Missed,
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStatus::Pending => write!(f, "pending"),
            LogStatus::Taken => write!(f, "taken"),
            LogStatus::Missed => write!(f, "missed"),
        }
    }
}

/// Per-day adherence record for one schedule slot
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdherenceLog {
    pub id: LogId,
    pub slot_id: SlotId,
    pub log_date: NaiveDate,
    pub status: LogStatus,
    pub taken_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdherenceLog {
    /// A fresh pending log for `slot_id` on `log_date`
    pub fn pending(slot_id: SlotId, log_date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_id,
            log_date,
            status: LogStatus::Pending,
            taken_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Read views
// ============================================================================

/// A slot together with its log for the date being viewed
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotView {
    pub slot: ScheduleSlot,
    pub log: Option<AdherenceLog>,
}

/// A medication with its slots, as consumed by the aggregator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MedicationView {
    pub medication: Medication,
    pub slots: Vec<SlotView>,
}
