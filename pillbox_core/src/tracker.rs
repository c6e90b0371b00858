//! Request-level operations.
//!
//! `Tracker` is the layer between an authenticated caller and the engine:
//! it reads "now" and "today" from its clock, runs each operation as one
//! store transaction, and scopes every record lookup to the acting user so a
//! record owned by someone else is indistinguishable from a missing one.

use crate::accounts::{self, NewUser};
use crate::caregivers;
use crate::clock::{Clock, SystemClock};
use crate::materializer;
use crate::medications::{self, MedicationInput};
use crate::share_code;
use crate::store::{Database, Store};
use crate::summary::{self, AdherenceSummary, PatientSummary};
use crate::{
    adherence::Transition, AdherenceLog, Error, LogId, MedicationId, MedicationView, Result,
    ShareCode, User, UserId,
};
use serde::{Deserialize, Serialize};

/// Everything the "today" screen shows
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TodayReport {
    pub share_code: ShareCode,
    pub medications: Vec<MedicationView>,
    pub summary: AdherenceSummary,
}

/// Request-level facade over a store
pub struct Tracker<S: Store> {
    store: S,
    clock: Box<dyn Clock>,
    max_share_code_attempts: u32,
}

impl<S: Store> Tracker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Box::new(SystemClock),
            max_share_code_attempts: 1000,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_share_code_attempts(mut self, attempts: u32) -> Self {
        self.max_share_code_attempts = attempts;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    pub fn register(&self, input: &NewUser) -> Result<User> {
        let now = self.clock.now();
        let attempts = self.max_share_code_attempts;
        self.store.transaction(|db| {
            accounts::register_user(db, &mut rand::thread_rng(), input, attempts, now)
        })
    }

    pub fn user_by_email(&self, email: &str) -> Result<User> {
        self.store
            .read(|db| accounts::find_by_email(db, email).cloned())
    }

    pub fn find_patient_by_code(&self, code: &str) -> Result<Option<User>> {
        self.store
            .read(|db| Ok(share_code::find_patient_by_code(db, code).cloned()))
    }

    pub fn delete_account(&self, user_id: UserId) -> Result<()> {
        self.store
            .transaction(|db| accounts::delete_account(db, user_id))
    }

    // ------------------------------------------------------------------------
    // Medications
    // ------------------------------------------------------------------------

    pub fn add_medication(&self, owner: UserId, input: &MedicationInput) -> Result<MedicationView> {
        let (today, now) = (self.clock.today(), self.clock.now());
        self.store.transaction(|db| {
            let id = medications::create_medication(db, owner, input, today, now)?;
            medications::medication_view(db, owner, id, today)
        })
    }

    pub fn update_medication(
        &self,
        owner: UserId,
        id: MedicationId,
        input: &MedicationInput,
    ) -> Result<MedicationView> {
        let (today, now) = (self.clock.today(), self.clock.now());
        self.store.transaction(|db| {
            medications::update_medication(db, owner, id, input, today, now)?;
            medications::medication_view(db, owner, id, today)
        })
    }

    pub fn remove_medication(&self, owner: UserId, id: MedicationId) -> Result<()> {
        self.store
            .transaction(|db| medications::delete_medication(db, owner, id))
    }

    /// Materialize today's logs, then list and summarize them
    pub fn today(&self, owner: UserId) -> Result<TodayReport> {
        let (today, now) = (self.clock.today(), self.clock.now());
        self.store.transaction(|db| {
            let user = db
                .user(owner)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("user {}", owner)))?;
            materializer::ensure_today_logs_for_user(db, owner, today, now)?;

            let medications = medications::list_medications(db, owner, today);
            let summary = summary::summarize(&medications, today);
            Ok(TodayReport {
                share_code: user.share_code,
                medications,
                summary,
            })
        })
    }

    // ------------------------------------------------------------------------
    // Adherence
    // ------------------------------------------------------------------------

    pub fn mark_taken(&self, owner: UserId, log_id: LogId) -> Result<AdherenceLog> {
        self.transition(owner, log_id, Transition::MarkTaken)
    }

    pub fn mark_pending(&self, owner: UserId, log_id: LogId) -> Result<AdherenceLog> {
        self.transition(owner, log_id, Transition::MarkPending)
    }

    /// Apply a status given as text (`taken` or `pending`)
    pub fn set_status(&self, owner: UserId, log_id: LogId, status: &str) -> Result<AdherenceLog> {
        self.transition(owner, log_id, Transition::parse(status)?)
    }

    fn transition(&self, owner: UserId, log_id: LogId, transition: Transition) -> Result<AdherenceLog> {
        let now = self.clock.now();
        self.store.transaction(|db| {
            let log = owned_log_mut(db, owner, log_id)?;
            log.apply(transition, now);
            Ok(log.clone())
        })
    }

    // ------------------------------------------------------------------------
    // Caregivers
    // ------------------------------------------------------------------------

    pub fn link_patient(&self, caregiver: UserId, code: &str) -> Result<User> {
        let now = self.clock.now();
        self.store
            .transaction(|db| caregivers::link_by_code(db, caregiver, code, now))
    }

    /// Today's summary for every linked patient, in link order
    pub fn dashboard(&self, caregiver: UserId) -> Result<Vec<PatientSummary>> {
        let (today, now) = (self.clock.today(), self.clock.now());
        self.store.transaction(|db| {
            let patients = caregivers::linked_patients(db, caregiver);
            let mut rows = Vec::with_capacity(patients.len());
            for patient in patients {
                materializer::ensure_today_logs_for_user(db, patient.id, today, now)?;
                let medications = medications::list_medications(db, patient.id, today);
                rows.push((patient, medications));
            }
            Ok(summary::summarize_patients(&rows, today))
        })
    }
}

/// Resolve a log through the owner's medications; anything else is not found
fn owned_log_mut(db: &mut Database, owner: UserId, log_id: LogId) -> Result<&mut AdherenceLog> {
    let visible = db
        .log(log_id)
        .and_then(|log| db.slot(log.slot_id))
        .and_then(|slot| db.medication(slot.medication_id))
        .map(|medication| medication.owner_id == owner)
        .unwrap_or(false);

    if !visible {
        return Err(Error::NotFound(format!("log {}", log_id)));
    }
    db.log_mut(log_id)
        .ok_or_else(|| Error::NotFound(format!("log {}", log_id)))
}
