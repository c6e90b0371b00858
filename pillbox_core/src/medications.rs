//! Medication CRUD and schedule-set replacement.
//!
//! All functions expect to run inside one store transaction and take an
//! already-authenticated owner. A medication that exists but belongs to
//! someone else is reported exactly like a missing one.

use crate::materializer::ensure_today_logs;
use crate::store::Database;
use crate::{
    Error, Medication, MedicationId, MedicationView, Result, ScheduleSlot, SlotId, SlotView,
    TimeOfDay, UserId, ValidationErrors,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Create/update input as submitted by the user (or prefilled by a scan)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MedicationInput {
    pub name: String,
    pub dosage: Option<String>,
    pub instructions: Option<String>,
    pub schedules: Vec<String>,
}

/// Validated input
#[derive(Clone, Debug, PartialEq)]
pub struct ValidMedication {
    pub name: String,
    pub dosage: Option<String>,
    pub instructions: Option<String>,
    pub times: Vec<TimeOfDay>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl MedicationInput {
    /// Check name and schedule selection, collecting field messages
    pub fn validate(&self) -> Result<ValidMedication> {
        let mut errors = ValidationErrors::default();

        let mut times: Vec<TimeOfDay> = Vec::new();
        if self.schedules.iter().all(|s| s.trim().is_empty()) {
            errors.add("schedules", "Please select at least one time");
        }
        for raw in self.schedules.iter().filter(|s| !s.trim().is_empty()) {
            match TimeOfDay::parse_known(raw) {
                Some(time) if !times.contains(&time) => times.push(time),
                Some(_) => {}
                None => errors.add(
                    "schedules",
                    format!("{} is not a valid time of day", raw.trim()),
                ),
            }
        }

        let name = self.name.trim().to_string();
        if name.is_empty() {
            errors.add("name", "can't be blank");
        }

        errors.into_result()?;
        Ok(ValidMedication {
            name,
            dosage: non_blank(&self.dosage),
            instructions: non_blank(&self.instructions),
            times,
        })
    }
}

fn owned(db: &Database, owner_id: UserId, id: MedicationId) -> Result<&Medication> {
    db.medication(id)
        .filter(|m| m.owner_id == owner_id)
        .ok_or_else(|| Error::NotFound(format!("medication {}", id)))
}

fn insert_slot(db: &mut Database, medication_id: MedicationId, time: TimeOfDay, now: DateTime<Utc>) -> Result<SlotId> {
    let slot = ScheduleSlot {
        id: Uuid::new_v4(),
        medication_id,
        time_of_day: time,
        created_at: now,
    };
    let id = slot.id;
    db.insert_slot(slot)?;
    Ok(id)
}

/// Create a medication with its slots and today's pending logs
pub fn create_medication(
    db: &mut Database,
    owner_id: UserId,
    input: &MedicationInput,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<MedicationId> {
    let valid = input.validate()?;

    let medication = Medication {
        id: Uuid::new_v4(),
        owner_id,
        name: valid.name,
        dosage: valid.dosage,
        instructions: valid.instructions,
        created_at: now,
        updated_at: now,
    };
    let id = medication.id;
    db.insert_medication(medication)?;

    for time in valid.times {
        insert_slot(db, id, time, now)?;
    }
    ensure_today_logs(db, &[id], today, now)?;

    tracing::info!("Created medication {} for {}", id, owner_id);
    Ok(id)
}

/// Update fields and replace the schedule set
///
/// Slots whose time is no longer selected are deleted with their logs; slots
/// whose time is kept are reused (same id, same logs); new times get new slots.
pub fn update_medication(
    db: &mut Database,
    owner_id: UserId,
    id: MedicationId,
    input: &MedicationInput,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<()> {
    owned(db, owner_id, id)?;
    let valid = input.validate()?;

    if let Some(medication) = db.medication_mut(id) {
        medication.name = valid.name;
        medication.dosage = valid.dosage;
        medication.instructions = valid.instructions;
        medication.updated_at = now;
    }

    let dropped: Vec<SlotId> = db
        .slots_of(id)
        .filter(|s| !valid.times.contains(&s.time_of_day))
        .map(|s| s.id)
        .collect();
    for slot_id in &dropped {
        db.delete_slot(*slot_id)?;
    }

    for time in valid.times {
        if db.slot_for(id, &time).is_none() {
            insert_slot(db, id, time, now)?;
        }
    }
    ensure_today_logs(db, &[id], today, now)?;

    tracing::info!(
        "Updated medication {} ({} slots removed)",
        id,
        dropped.len()
    );
    Ok(())
}

/// Delete a medication with its slots and logs
pub fn delete_medication(db: &mut Database, owner_id: UserId, id: MedicationId) -> Result<()> {
    owned(db, owner_id, id)?;
    db.delete_medication(id)?;
    tracing::info!("Deleted medication {}", id);
    Ok(())
}

/// One medication with each slot's log for `date`
pub fn medication_view(db: &Database, owner_id: UserId, id: MedicationId, date: NaiveDate) -> Result<MedicationView> {
    let medication = owned(db, owner_id, id)?;
    Ok(build_view(db, medication, date))
}

/// All of the owner's medications with each slot's log for `date`
pub fn list_medications(db: &Database, owner_id: UserId, date: NaiveDate) -> Vec<MedicationView> {
    db.medications_of(owner_id)
        .map(|m| build_view(db, m, date))
        .collect()
}

fn build_view(db: &Database, medication: &Medication, date: NaiveDate) -> MedicationView {
    let slots = db
        .slots_of(medication.id)
        .map(|slot| SlotView {
            slot: slot.clone(),
            log: db.log_for(slot.id, date).cloned(),
        })
        .collect();
    MedicationView {
        medication: medication.clone(),
        slots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::*;
    use crate::{LogStatus, Role};

    fn input(name: &str, schedules: &[&str]) -> MedicationInput {
        MedicationInput {
            name: name.into(),
            dosage: Some("500mg".into()),
            instructions: Some("  ".into()),
            schedules: schedules.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn times(view: &MedicationView) -> Vec<TimeOfDay> {
        view.slots.iter().map(|s| s.slot.time_of_day.clone()).collect()
    }

    #[test]
    fn test_validation_messages() {
        match input("  ", &[]).validate() {
            Err(Error::Validation(errors)) => {
                assert_eq!(errors.get("name"), Some("can't be blank"));
                assert_eq!(errors.get("schedules"), Some("Please select at least one time"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }

        match input("Metformin", &["morning", "bedtime"]).validate() {
            Err(Error::Validation(errors)) => {
                assert_eq!(errors.get("schedules"), Some("bedtime is not a valid time of day"))
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_normalizes() {
        let valid = input(" Metformin ", &["Evening", "morning", "evening"])
            .validate()
            .unwrap();
        assert_eq!(valid.name, "Metformin");
        assert_eq!(valid.times, vec![TimeOfDay::Evening, TimeOfDay::Morning]);
        assert_eq!(valid.dosage.as_deref(), Some("500mg"));
        assert_eq!(valid.instructions, None);
    }

    #[test]
    fn test_create_materializes_today() {
        let mut db = Database::default();
        let user = add_user(&mut db, "ana@example.com", "123456", Role::Patient);

        let id = create_medication(&mut db, user, &input("Metformin", &["morning", "evening"]), today(), now())
            .unwrap();

        let view = medication_view(&db, user, id, today()).unwrap();
        assert_eq!(times(&view), vec![TimeOfDay::Morning, TimeOfDay::Evening]);
        assert!(view
            .slots
            .iter()
            .all(|s| s.log.as_ref().map(|l| l.status) == Some(LogStatus::Pending)));
    }

    #[test]
    fn test_invalid_create_writes_nothing() {
        let mut db = Database::default();
        let user = add_user(&mut db, "ana@example.com", "123456", Role::Patient);

        assert!(create_medication(&mut db, user, &input("Metformin", &[]), today(), now()).is_err());
        assert!(list_medications(&db, user, today()).is_empty());
    }

    #[test]
    fn test_update_replaces_schedule_set() {
        let mut db = Database::default();
        let user = add_user(&mut db, "ana@example.com", "123456", Role::Patient);
        let id = create_medication(&mut db, user, &input("Metformin", &["morning", "evening"]), today(), now())
            .unwrap();

        let before = medication_view(&db, user, id, today()).unwrap();
        let morning_slot = before.slots[0].slot.id;
        let morning_log = before.slots[0].log.as_ref().unwrap().id;
        let evening_slot = before.slots[1].slot.id;
        db.log_mut(morning_log).unwrap().mark_taken(now());

        update_medication(&mut db, user, id, &input("Metformin XR", &["morning", "afternoon"]), today(), now())
            .unwrap();

        let after = medication_view(&db, user, id, today()).unwrap();
        assert_eq!(after.medication.name, "Metformin XR");
        assert_eq!(times(&after), vec![TimeOfDay::Morning, TimeOfDay::Afternoon]);

        // Kept slot keeps its identity and its taken log
        assert_eq!(after.slots[0].slot.id, morning_slot);
        assert_eq!(after.slots[0].log.as_ref().unwrap().status, LogStatus::Taken);

        // New slot gets today's pending log; dropped slot is gone with its logs
        assert_eq!(after.slots[1].log.as_ref().unwrap().status, LogStatus::Pending);
        assert!(db.slot(evening_slot).is_none());
        assert_eq!(db.logs_of(evening_slot).count(), 0);
    }

    #[test]
    fn test_update_with_empty_schedules_changes_nothing() {
        let mut db = Database::default();
        let user = add_user(&mut db, "ana@example.com", "123456", Role::Patient);
        let id = create_medication(&mut db, user, &input("Metformin", &["morning"]), today(), now())
            .unwrap();

        let result = update_medication(&mut db, user, id, &input("Renamed", &[]), today(), now());
        assert!(matches!(result, Err(Error::Validation(_))));

        let view = medication_view(&db, user, id, today()).unwrap();
        assert_eq!(view.medication.name, "Metformin");
        assert_eq!(times(&view), vec![TimeOfDay::Morning]);
    }

    #[test]
    fn test_other_users_medication_is_not_found() {
        let mut db = Database::default();
        let owner = add_user(&mut db, "ana@example.com", "123456", Role::Patient);
        let other = add_user(&mut db, "bo@example.com", "654321", Role::Patient);
        let id = create_medication(&mut db, owner, &input("Metformin", &["morning"]), today(), now())
            .unwrap();

        assert!(matches!(
            update_medication(&mut db, other, id, &input("Mine now", &["evening"]), today(), now()),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            delete_medication(&mut db, other, id),
            Err(Error::NotFound(_))
        ));
        assert!(db.medication(id).is_some());
    }

    #[test]
    fn test_delete_cascades() {
        let mut db = Database::default();
        let user = add_user(&mut db, "ana@example.com", "123456", Role::Patient);
        let id = create_medication(&mut db, user, &input("Metformin", &["morning"]), today(), now())
            .unwrap();
        let slot_id = db.slots_of(id).next().unwrap().id;

        delete_medication(&mut db, user, id).unwrap();

        assert!(db.medication(id).is_none());
        assert!(db.slot(slot_id).is_none());
        assert_eq!(db.logs_of(slot_id).count(), 0);
    }
}
