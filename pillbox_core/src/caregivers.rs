//! Caregiver-to-patient links.

use crate::share_code::find_patient_by_code;
use crate::store::{Database, LINKS_CAREGIVER_PATIENT};
use crate::{CaregiverLink, Error, Result, User, UserId};
use chrono::{DateTime, Utc};

/// Link `caregiver_id` to the patient holding `code`
///
/// Returns the linked patient. Every refusal is a `share_code` field error so
/// the form can show it next to the input.
pub fn link_by_code(
    db: &mut Database,
    caregiver_id: UserId,
    code: &str,
    now: DateTime<Utc>,
) -> Result<User> {
    let patient = find_patient_by_code(db, code)
        .cloned()
        .ok_or_else(|| {
            Error::field(
                "share_code",
                "Code not found. Please check with your family member.",
            )
        })?;

    if patient.id == caregiver_id {
        return Err(Error::field("share_code", "You cannot link to yourself"));
    }

    let link = CaregiverLink {
        caregiver_id,
        patient_id: patient.id,
        created_at: now,
    };
    match db.insert_link(link) {
        Ok(()) => {
            tracing::info!("Linked caregiver {} to patient {}", caregiver_id, patient.id);
            Ok(patient)
        }
        Err(Error::UniqueViolation(LINKS_CAREGIVER_PATIENT)) => Err(Error::field(
            "share_code",
            "You are already linked to this patient",
        )),
        Err(e) => Err(e),
    }
}

/// Patients linked to `caregiver_id`, in link order, without duplicates or self
pub fn linked_patients(db: &Database, caregiver_id: UserId) -> Vec<User> {
    let mut patients: Vec<User> = Vec::new();
    for link in db.links_of(caregiver_id) {
        if link.patient_id == caregiver_id || patients.iter().any(|p| p.id == link.patient_id) {
            continue;
        }
        if let Some(patient) = db.user(link.patient_id) {
            patients.push(patient.clone());
        }
    }
    patients
}
