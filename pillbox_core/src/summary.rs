//! Adherence aggregation over already-materialized logs.
//!
//! Pure functions: no store access, no mutation. The same computation backs
//! the patient's own "today" view and each row of a caregiver's dashboard.

use crate::{LogId, LogStatus, MedicationId, MedicationView, SlotId, TimeOfDay, User, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One scheduled dose as displayed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DoseEntry {
    pub medication_id: MedicationId,
    pub medication_name: String,
    pub dosage: Option<String>,
    pub instructions: Option<String>,
    pub slot_id: SlotId,
    pub log_id: Option<LogId>,
    pub status: Option<LogStatus>,
    pub taken_at: Option<DateTime<Utc>>,
}

/// Doses sharing a time of day
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimeOfDayGroup {
    pub time_of_day: TimeOfDay,
    pub entries: Vec<DoseEntry>,
}

/// Completion figures for one user on one date
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AdherenceSummary {
    pub date: NaiveDate,
    pub total: usize,
    pub taken: usize,
    pub percentage: f64,
    pub groups: Vec<TimeOfDayGroup>,
}

/// A caregiver dashboard row
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatientSummary {
    pub patient_id: UserId,
    pub patient_name: String,
    pub summary: AdherenceSummary,
}

/// `taken / total * 100`, or 0 when nothing is scheduled
pub fn completion_percentage(taken: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        taken as f64 / total as f64 * 100.0
    }
}

/// Summarize a user's medications for `date`
///
/// `total` counts the (medication, slot) pairs that have a log dated `date`;
/// slots without one appear in the groups but not in the counts. Groups follow
/// morning, afternoon, evening, then unrecognized values in first-seen order.
pub fn summarize(medications: &[MedicationView], date: NaiveDate) -> AdherenceSummary {
    let mut total = 0;
    let mut taken = 0;
    let mut groups: Vec<TimeOfDayGroup> = Vec::new();

    for view in medications {
        for slot_view in &view.slots {
            let log = slot_view.log.as_ref().filter(|l| l.log_date == date);

            if let Some(log) = log {
                total += 1;
                if log.status == LogStatus::Taken {
                    taken += 1;
                }
            }

            let entry = DoseEntry {
                medication_id: view.medication.id,
                medication_name: view.medication.name.clone(),
                dosage: view.medication.dosage.clone(),
                instructions: view.medication.instructions.clone(),
                slot_id: slot_view.slot.id,
                log_id: log.map(|l| l.id),
                status: log.map(|l| l.status),
                taken_at: log.and_then(|l| l.taken_at),
            };

            let time = &slot_view.slot.time_of_day;
            match groups.iter_mut().find(|g| &g.time_of_day == time) {
                Some(group) => group.entries.push(entry),
                None => groups.push(TimeOfDayGroup {
                    time_of_day: time.clone(),
                    entries: vec![entry],
                }),
            }
        }
    }

    // Stable: groups of equal rank keep first-seen order
    groups.sort_by_key(|g| g.time_of_day.rank());

    AdherenceSummary {
        date,
        total,
        taken,
        percentage: completion_percentage(taken, total),
        groups,
    }
}

/// Summarize each linked patient, preserving the given order
pub fn summarize_patients(
    patients: &[(User, Vec<MedicationView>)],
    date: NaiveDate,
) -> Vec<PatientSummary> {
    patients
        .iter()
        .map(|(patient, medications)| PatientSummary {
            patient_id: patient.id,
            patient_name: patient.name.clone(),
            summary: summarize(medications, date),
        })
        .collect()
}
