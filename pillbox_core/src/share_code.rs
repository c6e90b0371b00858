//! Share-code issuance and lookup.
//!
//! Every account gets a six-digit code drawn from 100000..=999999. Issuance
//! runs inside a store transaction: candidates already held by a user are
//! rejected and redrawn, and the `users.share_code` constraint on insert is
//! the backstop that makes the check-and-assign race-free.

use crate::store::Database;
use crate::{Error, Result, ShareCode, User};
use rand::Rng;

/// Smallest issuable code
pub const SHARE_CODE_MIN: u32 = 100_000;
/// Largest issuable code
pub const SHARE_CODE_MAX: u32 = 999_999;

/// Draw a random candidate (not checked for uniqueness)
pub fn generate_candidate<R: Rng + ?Sized>(rng: &mut R) -> ShareCode {
    ShareCode::new(rng.gen_range(SHARE_CODE_MIN..=SHARE_CODE_MAX).to_string())
}

/// Issue a code no user in `db` holds
///
/// Gives up with a storage error after `max_attempts` collisions in a row.
pub fn issue_share_code<R: Rng + ?Sized>(
    db: &Database,
    rng: &mut R,
    max_attempts: u32,
) -> Result<ShareCode> {
    for attempt in 1..=max_attempts.max(1) {
        let candidate = generate_candidate(rng);
        if !db.share_code_taken(&candidate) {
            return Ok(candidate);
        }
        tracing::debug!("Share code collision on attempt {}", attempt);
    }

    tracing::error!("No free share code after {} attempts", max_attempts);
    Err(Error::Storage(format!(
        "could not issue a unique share code after {} attempts",
        max_attempts
    )))
}

/// True when `code` is six ASCII digits within the issuable range
pub fn is_well_formed(code: &str) -> bool {
    code.len() == 6
        && code.bytes().all(|b| b.is_ascii_digit())
        && code
            .parse::<u32>()
            .map(|n| (SHARE_CODE_MIN..=SHARE_CODE_MAX).contains(&n))
            .unwrap_or(false)
}

/// Find the patient holding `code`
///
/// Caregiver accounts also hold codes but are never returned.
pub fn find_patient_by_code<'a>(db: &'a Database, code: &str) -> Option<&'a User> {
    let code = code.trim();
    if !is_well_formed(code) {
        return None;
    }
    db.user_by_share_code(&ShareCode::new(code))
        .filter(|u| u.is_patient())
}
