//! Storage layer: the database document and transactional stores.
//!
//! `Database` owns every record and enforces the uniqueness constraints
//! (one slot per medication and time of day, one log per slot and date,
//! unique emails, unique share codes, unique caregiver links). Callers never
//! check-then-insert; they insert and handle `Error::UniqueViolation`.
//!
//! A `Store` runs closures against the database as all-or-nothing
//! transactions: a closure returning `Err` leaves the stored state untouched.

use crate::{
    AdherenceLog, CaregiverLink, Error, LogId, Medication, MedicationId, Result, ScheduleSlot,
    ShareCode, SlotId, TimeOfDay, User, UserId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

pub const USERS_EMAIL: &str = "users.email";
pub const USERS_SHARE_CODE: &str = "users.share_code";
pub const SLOTS_MEDICATION_TIME: &str = "schedule_slots.medication_id_time_of_day";
pub const LOGS_SLOT_DATE: &str = "adherence_logs.slot_id_log_date";
pub const LINKS_CAREGIVER_PATIENT: &str = "caregiver_links.caregiver_id_patient_id";

/// All persisted records, in insertion order
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    medications: Vec<Medication>,
    #[serde(default)]
    slots: Vec<ScheduleSlot>,
    #[serde(default)]
    logs: Vec<AdherenceLog>,
    #[serde(default)]
    links: Vec<CaregiverLink>,
}

impl Database {
    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    pub fn insert_user(&mut self, user: User) -> Result<()> {
        if self.users.iter().any(|u| u.email == user.email) {
            return Err(Error::UniqueViolation(USERS_EMAIL));
        }
        if self.users.iter().any(|u| u.share_code == user.share_code) {
            return Err(Error::UniqueViolation(USERS_SHARE_CODE));
        }
        tracing::debug!("Inserted user {}", user.id);
        self.users.push(user);
        Ok(())
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn user_by_share_code(&self, code: &ShareCode) -> Option<&User> {
        self.users.iter().find(|u| &u.share_code == code)
    }

    pub fn share_code_taken(&self, code: &ShareCode) -> bool {
        self.user_by_share_code(code).is_some()
    }

    /// Delete a user with everything it owns and every link it is part of
    pub fn delete_user(&mut self, id: UserId) -> Result<()> {
        if self.user(id).is_none() {
            return Err(Error::NotFound(format!("user {}", id)));
        }
        let owned: Vec<MedicationId> = self.medications_of(id).map(|m| m.id).collect();
        for medication_id in owned {
            self.delete_medication(medication_id)?;
        }
        self.links
            .retain(|l| l.caregiver_id != id && l.patient_id != id);
        self.users.retain(|u| u.id != id);
        tracing::debug!("Deleted user {}", id);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Medications
    // ------------------------------------------------------------------------

    pub fn insert_medication(&mut self, medication: Medication) -> Result<()> {
        if self.user(medication.owner_id).is_none() {
            return Err(Error::NotFound(format!("user {}", medication.owner_id)));
        }
        self.medications.push(medication);
        Ok(())
    }

    pub fn medication(&self, id: MedicationId) -> Option<&Medication> {
        self.medications.iter().find(|m| m.id == id)
    }

    pub fn medication_mut(&mut self, id: MedicationId) -> Option<&mut Medication> {
        self.medications.iter_mut().find(|m| m.id == id)
    }

    pub fn medications_of(&self, owner_id: UserId) -> impl Iterator<Item = &Medication> {
        self.medications.iter().filter(move |m| m.owner_id == owner_id)
    }

    /// Delete a medication, cascading to its slots and their logs
    pub fn delete_medication(&mut self, id: MedicationId) -> Result<()> {
        if self.medication(id).is_none() {
            return Err(Error::NotFound(format!("medication {}", id)));
        }
        let slot_ids: Vec<SlotId> = self.slots_of(id).map(|s| s.id).collect();
        for slot_id in slot_ids {
            self.delete_slot(slot_id)?;
        }
        self.medications.retain(|m| m.id != id);
        tracing::debug!("Deleted medication {}", id);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Schedule slots
    // ------------------------------------------------------------------------

    pub fn insert_slot(&mut self, slot: ScheduleSlot) -> Result<()> {
        if self.medication(slot.medication_id).is_none() {
            return Err(Error::NotFound(format!("medication {}", slot.medication_id)));
        }
        if self
            .slots
            .iter()
            .any(|s| s.medication_id == slot.medication_id && s.time_of_day == slot.time_of_day)
        {
            return Err(Error::UniqueViolation(SLOTS_MEDICATION_TIME));
        }
        self.slots.push(slot);
        Ok(())
    }

    pub fn slot(&self, id: SlotId) -> Option<&ScheduleSlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn slots_of(&self, medication_id: MedicationId) -> impl Iterator<Item = &ScheduleSlot> {
        self.slots
            .iter()
            .filter(move |s| s.medication_id == medication_id)
    }

    pub fn slot_for(&self, medication_id: MedicationId, time: &TimeOfDay) -> Option<&ScheduleSlot> {
        self.slots_of(medication_id).find(|s| &s.time_of_day == time)
    }

    /// Delete a slot, cascading to its logs
    pub fn delete_slot(&mut self, id: SlotId) -> Result<()> {
        if self.slot(id).is_none() {
            return Err(Error::NotFound(format!("schedule slot {}", id)));
        }
        let before = self.logs.len();
        self.logs.retain(|l| l.slot_id != id);
        self.slots.retain(|s| s.id != id);
        tracing::debug!(
            "Deleted slot {} and {} logs",
            id,
            before - self.logs.len()
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Adherence logs
    // ------------------------------------------------------------------------

    /// Insert a log; a second log for the same slot and date is rejected
    pub fn insert_log(&mut self, log: AdherenceLog) -> Result<()> {
        if self.slot(log.slot_id).is_none() {
            return Err(Error::NotFound(format!("schedule slot {}", log.slot_id)));
        }
        if self.log_for(log.slot_id, log.log_date).is_some() {
            return Err(Error::UniqueViolation(LOGS_SLOT_DATE));
        }
        self.logs.push(log);
        Ok(())
    }

    pub fn log(&self, id: LogId) -> Option<&AdherenceLog> {
        self.logs.iter().find(|l| l.id == id)
    }

    pub fn log_mut(&mut self, id: LogId) -> Option<&mut AdherenceLog> {
        self.logs.iter_mut().find(|l| l.id == id)
    }

    pub fn log_for(&self, slot_id: SlotId, date: NaiveDate) -> Option<&AdherenceLog> {
        self.logs
            .iter()
            .find(|l| l.slot_id == slot_id && l.log_date == date)
    }

    pub fn logs_of(&self, slot_id: SlotId) -> impl Iterator<Item = &AdherenceLog> {
        self.logs.iter().filter(move |l| l.slot_id == slot_id)
    }

    // ------------------------------------------------------------------------
    // Caregiver links
    // ------------------------------------------------------------------------

    pub fn insert_link(&mut self, link: CaregiverLink) -> Result<()> {
        if link.caregiver_id == link.patient_id {
            return Err(Error::field("patient", "cannot be yourself"));
        }
        for id in [link.caregiver_id, link.patient_id] {
            if self.user(id).is_none() {
                return Err(Error::NotFound(format!("user {}", id)));
            }
        }
        if self.is_linked(link.caregiver_id, link.patient_id) {
            return Err(Error::UniqueViolation(LINKS_CAREGIVER_PATIENT));
        }
        self.links.push(link);
        Ok(())
    }

    pub fn is_linked(&self, caregiver_id: UserId, patient_id: UserId) -> bool {
        self.links
            .iter()
            .any(|l| l.caregiver_id == caregiver_id && l.patient_id == patient_id)
    }

    /// Links of a caregiver in creation order
    pub fn links_of(&self, caregiver_id: UserId) -> impl Iterator<Item = &CaregiverLink> {
        self.links
            .iter()
            .filter(move |l| l.caregiver_id == caregiver_id)
    }
}

/// Transactional access to a `Database`
pub trait Store: Send + Sync {
    /// Run `f` against a consistent snapshot
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>;

    /// Run `f` as one all-or-nothing unit of work
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>;
}

/// In-process store guarded by a mutex
#[derive(Debug, Default)]
pub struct MemoryStore {
    db: Mutex<Database>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        let db = self
            .db
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))?;
        f(&db)
    }

    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>,
    {
        let mut db = self
            .db
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))?;

        // Work on a copy so a failing closure cannot leave partial writes
        let mut working = db.clone();
        let value = f(&mut working)?;
        *db = working;
        Ok(value)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::Role;
    use uuid::Uuid;

    #[test]
    fn test_duplicate_log_rejected() {
        let mut db = Database::default();
        let user = add_user(&mut db, "ana@example.com", "123456", Role::Patient);
        let med = add_medication(&mut db, user, "Metformin", &[TimeOfDay::Morning]);
        let slot_id = db.slots_of(med).next().unwrap().id;

        db.insert_log(AdherenceLog::pending(slot_id, today(), now()))
            .unwrap();
        let second = db.insert_log(AdherenceLog::pending(slot_id, today(), now()));

        assert!(matches!(second, Err(Error::UniqueViolation(LOGS_SLOT_DATE))));
        assert_eq!(db.logs_of(slot_id).count(), 1);
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let mut db = Database::default();
        let user = add_user(&mut db, "ana@example.com", "123456", Role::Patient);
        let med = add_medication(&mut db, user, "Metformin", &[TimeOfDay::Morning]);

        let result = db.insert_slot(ScheduleSlot {
            id: Uuid::new_v4(),
            medication_id: med,
            time_of_day: TimeOfDay::Morning,
            created_at: now(),
        });
        assert!(matches!(
            result,
            Err(Error::UniqueViolation(SLOTS_MEDICATION_TIME))
        ));
    }

    #[test]
    fn test_unique_email_and_share_code() {
        let mut db = Database::default();
        add_user(&mut db, "ana@example.com", "123456", Role::Patient);

        let mut clash = db.user_by_email("ana@example.com").unwrap().clone();
        clash.id = Uuid::new_v4();
        clash.share_code = ShareCode::new("654321");
        assert!(matches!(
            db.insert_user(clash.clone()),
            Err(Error::UniqueViolation(USERS_EMAIL))
        ));

        clash.email = "bo@example.com".into();
        clash.share_code = ShareCode::new("123456");
        assert!(matches!(
            db.insert_user(clash),
            Err(Error::UniqueViolation(USERS_SHARE_CODE))
        ));
    }

    #[test]
    fn test_delete_medication_cascades() {
        let mut db = Database::default();
        let user = add_user(&mut db, "ana@example.com", "123456", Role::Patient);
        let med = add_medication(
            &mut db,
            user,
            "Metformin",
            &[TimeOfDay::Morning, TimeOfDay::Evening],
        );
        let slot_ids: Vec<_> = db.slots_of(med).map(|s| s.id).collect();
        for slot_id in &slot_ids {
            db.insert_log(AdherenceLog::pending(*slot_id, today(), now()))
                .unwrap();
        }

        db.delete_medication(med).unwrap();

        assert!(db.medication(med).is_none());
        assert_eq!(db.slots_of(med).count(), 0);
        for slot_id in slot_ids {
            assert_eq!(db.logs_of(slot_id).count(), 0);
        }
    }

    #[test]
    fn test_delete_user_cascades_links() {
        let mut db = Database::default();
        let patient = add_user(&mut db, "ana@example.com", "123456", Role::Patient);
        let caregiver = add_user(&mut db, "bo@example.com", "654321", Role::Caregiver);
        add_medication(&mut db, patient, "Metformin", &[TimeOfDay::Morning]);
        db.insert_link(CaregiverLink {
            caregiver_id: caregiver,
            patient_id: patient,
            created_at: now(),
        })
        .unwrap();

        db.delete_user(patient).unwrap();

        assert!(db.user(patient).is_none());
        assert_eq!(db.medications_of(patient).count(), 0);
        assert_eq!(db.links_of(caregiver).count(), 0);
    }

    #[test]
    fn test_self_link_rejected() {
        let mut db = Database::default();
        let user = add_user(&mut db, "ana@example.com", "123456", Role::Patient);
        let result = db.insert_link(CaregiverLink {
            caregiver_id: user,
            patient_id: user,
            created_at: now(),
        });
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_failed_transaction_leaves_no_partial_writes() {
        let store = MemoryStore::new();
        let result: Result<()> = store.transaction(|db| {
            add_user(db, "ana@example.com", "123456", Role::Patient);
            Err(Error::Storage("boom".into()))
        });
        assert!(result.is_err());

        let exists = store
            .read(|db| Ok(db.user_by_email("ana@example.com").is_some()))
            .unwrap();
        assert!(!exists);
    }
}
