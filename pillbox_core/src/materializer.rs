//! Daily log materialization.
//!
//! Every schedule slot gets exactly one adherence log per calendar day,
//! created lazily the first time that day is viewed. Creation is an
//! insert-and-catch-conflict against the store's (slot, date) uniqueness
//! constraint: when another call path got there first the conflict is the
//! expected outcome, not an error.

use crate::store::Database;
use crate::{AdherenceLog, Error, MedicationId, Result, SlotId, UserId};
use chrono::{DateTime, NaiveDate, Utc};

/// Ensure every slot of the given medications has a log dated `today`
///
/// Returns the number of logs this call created. Slots that already have a
/// log for `today` are left untouched. Only `today` is ever written; past and
/// future dates are never materialized here.
pub fn ensure_today_logs(
    db: &mut Database,
    medication_ids: &[MedicationId],
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<usize> {
    let slot_ids: Vec<SlotId> = medication_ids
        .iter()
        .flat_map(|id| db.slots_of(*id).map(|s| s.id).collect::<Vec<_>>())
        .collect();

    let mut created = 0;
    for slot_id in slot_ids {
        if insert_pending_log(db, slot_id, today, now)? {
            created += 1;
        }
    }

    if created > 0 {
        tracing::info!("Materialized {} pending logs for {}", created, today);
    }
    Ok(created)
}

/// Materialize today's logs for every medication `owner_id` owns
pub fn ensure_today_logs_for_user(
    db: &mut Database,
    owner_id: UserId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<usize> {
    let medication_ids: Vec<MedicationId> = db.medications_of(owner_id).map(|m| m.id).collect();
    ensure_today_logs(db, &medication_ids, today, now)
}

/// Create-if-absent for a single slot. `Ok(false)` means the log already existed.
fn insert_pending_log(
    db: &mut Database,
    slot_id: SlotId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<bool> {
    match db.insert_log(AdherenceLog::pending(slot_id, today, now)) {
        Ok(()) => {
            tracing::debug!("Created pending log for slot {} on {}", slot_id, today);
            Ok(true)
        }
        Err(Error::UniqueViolation(constraint)) => {
            tracing::debug!(
                "Log for slot {} on {} already exists ({})",
                slot_id,
                today,
                constraint
            );
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
