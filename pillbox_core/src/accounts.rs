//! Account records: registration data, lookup and deletion.
//!
//! Passwords and sessions belong to the authentication layer; this module
//! only owns the data the adherence engine relies on (role, unique email,
//! unique share code).

use crate::share_code::issue_share_code;
use crate::store::{Database, USERS_EMAIL, USERS_SHARE_CODE};
use crate::{Error, Result, Role, User, UserId, ValidationErrors};
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// Registration input
#[derive(Clone, Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: String,
}

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loose `local@domain.tld` shape check
fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .map(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
            .unwrap_or(false)
}

impl NewUser {
    /// Validate and normalize, returning `(name, email, role)`
    pub fn validate(&self) -> Result<(String, String, Role)> {
        let mut errors = ValidationErrors::default();

        let name = self.name.trim().to_string();
        if name.is_empty() {
            errors.add("name", "can't be blank");
        }

        let email = normalize_email(&self.email);
        if email.is_empty() {
            errors.add("email", "can't be blank");
        } else if !looks_like_email(&email) {
            errors.add("email", "is invalid");
        }

        let role = Role::parse(&self.role);
        if role.is_none() {
            errors.add("role", "is not included in the list");
        }

        errors.into_result()?;
        Ok((name, email, role.unwrap_or(Role::Patient)))
    }
}

/// Create an account with a freshly issued share code
///
/// A share-code conflict on insert is retried with a new code; an email
/// conflict becomes a field error.
pub fn register_user<R: Rng + ?Sized>(
    db: &mut Database,
    rng: &mut R,
    input: &NewUser,
    max_share_code_attempts: u32,
    now: DateTime<Utc>,
) -> Result<User> {
    let (name, email, role) = input.validate()?;

    if db.user_by_email(&email).is_some() {
        return Err(Error::field("email", "has already been taken"));
    }

    loop {
        let share_code = issue_share_code(db, rng, max_share_code_attempts)?;
        let user = User {
            id: Uuid::new_v4(),
            name: name.clone(),
            email: email.clone(),
            role,
            share_code,
            created_at: now,
        };

        match db.insert_user(user.clone()) {
            Ok(()) => {
                tracing::info!("Registered {} account {}", user.role, user.id);
                return Ok(user);
            }
            Err(Error::UniqueViolation(USERS_SHARE_CODE)) => {
                tracing::debug!("Share code taken on insert, issuing another");
            }
            Err(Error::UniqueViolation(USERS_EMAIL)) => {
                return Err(Error::field("email", "has already been taken"));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Look up an account by (normalized) email
pub fn find_by_email<'a>(db: &'a Database, email: &str) -> Result<&'a User> {
    let email = normalize_email(email);
    db.user_by_email(&email)
        .ok_or_else(|| Error::NotFound(format!("user {}", email)))
}

/// Delete an account and everything it owns
pub fn delete_account(db: &mut Database, user_id: UserId) -> Result<()> {
    db.delete_user(user_id)?;
    tracing::info!("Deleted account {}", user_id);
    Ok(())
}
