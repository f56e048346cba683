// City-claim protocol: validation, normalization, and the transactional
// claim with bounded retry on store conflicts.
//
// A city name is claimed exactly once, by exactly one identity, forever.
// Two raw strings that normalize identically are the same claim, so
// "Berlin" and "  berlin  " collide. Claims survive account deletion: a
// retired identity's city is burned, never recycled.

use thiserror::Error;

use crate::db::{ClaimAttempt, Database};
use crate::metrics;

/// Maximum length of a raw city name after trimming, in characters.
pub const MAX_NAME_LEN: usize = 30;

/// Transaction conflicts are transient; retry a few times before giving up.
const MAX_CLAIM_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("city name must be 1-{MAX_NAME_LEN} characters")]
    InvalidName,
    #[error("city already claimed")]
    NameTaken,
    #[error("you already have a city")]
    AlreadyClaimed,
    #[error("identity not found")]
    IdentityNotFound,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// A successful claim: the canonical key plus the form the user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedCity {
    pub city_name: String,
    pub display_name: String,
}

/// Derive the canonical comparison key from raw user input: trim, uppercase,
/// collapse internal whitespace runs to a single `_`. Returns the key and
/// the trimmed display form.
pub fn normalize(raw: &str) -> Result<(String, String), ClaimError> {
    let display = raw.trim();
    if display.is_empty() || display.chars().count() > MAX_NAME_LEN {
        return Err(ClaimError::InvalidName);
    }
    let normalized = display
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase();
    Ok((normalized, display.to_string()))
}

/// Claim a city name for an identity.
///
/// Validation happens before any mutation; the claim itself is a single
/// serialized store transaction (`Database::try_claim`). When two calls race
/// on the same normalized name, SQLite aborts one with a busy error or a
/// unique-constraint violation on `name_claims`; busy aborts are retried
/// from scratch and the retry then observes the winner's row, so exactly
/// one caller ever gets `Ok`.
pub async fn claim_name(
    db: &Database,
    identity_id: i64,
    raw: &str,
) -> Result<ClaimedCity, ClaimError> {
    let (normalized, display) = normalize(raw)?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match db.try_claim(identity_id, &normalized, &display).await {
            Ok(ClaimAttempt::Claimed) => {
                metrics::CLAIMS_TOTAL.with_label_values(&["claimed"]).inc();
                tracing::info!(identity_id, city = %normalized, "city claimed");
                return Ok(ClaimedCity {
                    city_name: normalized,
                    display_name: display,
                });
            }
            Ok(ClaimAttempt::NameTaken) => {
                metrics::CLAIMS_TOTAL.with_label_values(&["taken"]).inc();
                return Err(ClaimError::NameTaken);
            }
            Ok(ClaimAttempt::AlreadyClaimed) => {
                metrics::CLAIMS_TOTAL
                    .with_label_values(&["already_claimed"])
                    .inc();
                return Err(ClaimError::AlreadyClaimed);
            }
            Ok(ClaimAttempt::IdentityMissing) => return Err(ClaimError::IdentityNotFound),
            Err(e) if is_unique_violation(&e) => {
                // Lost the commit race at the primary-key backstop.
                metrics::CLAIMS_TOTAL.with_label_values(&["taken"]).inc();
                return Err(ClaimError::NameTaken);
            }
            Err(e) if is_busy(&e) && attempt < MAX_CLAIM_ATTEMPTS => {
                metrics::CLAIM_CONFLICT_RETRIES_TOTAL.inc();
                tracing::debug!(identity_id, city = %normalized, attempt, "claim conflict, retrying");
            }
            Err(e) => return Err(ClaimError::Db(e)),
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED: another writer held the database. The
/// transaction aborted with no durable effects and can be retried whole.
fn is_busy(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<u32>().ok())
        .is_some_and(|code| matches!(code & 0xff, 5 | 6))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_simple() {
        let (normalized, display) = normalize("Berlin").unwrap();
        assert_eq!(normalized, "BERLIN");
        assert_eq!(display, "Berlin");
    }

    #[test]
    fn test_normalize_trims_and_uppercases() {
        let (normalized, display) = normalize("  berlin  ").unwrap();
        assert_eq!(normalized, "BERLIN");
        assert_eq!(display, "berlin");
    }

    #[test]
    fn test_normalize_collapses_whitespace_runs() {
        let (a, _) = normalize("New York").unwrap();
        let (b, _) = normalize("new   york").unwrap();
        let (c, _) = normalize(" NEW\tYORK ").unwrap();
        assert_eq!(a, "NEW_YORK");
        assert_eq!(b, a);
        assert_eq!(c, a);
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(matches!(normalize(""), Err(ClaimError::InvalidName)));
        assert!(matches!(normalize(" "), Err(ClaimError::InvalidName)));
        assert!(matches!(normalize("\t\n"), Err(ClaimError::InvalidName)));
    }

    #[test]
    fn test_normalize_rejects_too_long() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(normalize(&long), Err(ClaimError::InvalidName)));

        // Exactly at the bound is fine.
        let max = "x".repeat(MAX_NAME_LEN);
        assert!(normalize(&max).is_ok());
    }

    #[test]
    fn test_normalize_counts_chars_not_bytes() {
        let name = "Ü".repeat(MAX_NAME_LEN);
        assert!(normalize(&name).is_ok());
    }

    #[tokio::test]
    async fn test_claim_name_full_path() {
        let db = Database::in_memory().await.unwrap();
        let a = db.create_identity().await.unwrap();
        let b = db.create_identity().await.unwrap();

        let city = claim_name(&db, a.id, " New York ").await.unwrap();
        assert_eq!(city.city_name, "NEW_YORK");
        assert_eq!(city.display_name, "New York");

        // Same normalized key from a different raw string.
        let err = claim_name(&db, b.id, "new   york").await.unwrap_err();
        assert!(matches!(err, ClaimError::NameTaken));

        // Same identity: fresh name or its own name, always AlreadyClaimed.
        let err = claim_name(&db, a.id, "Tokyo").await.unwrap_err();
        assert!(matches!(err, ClaimError::AlreadyClaimed));
        let err = claim_name(&db, a.id, "New York").await.unwrap_err();
        assert!(matches!(err, ClaimError::AlreadyClaimed));

        // Invalid input never reaches the store.
        let err = claim_name(&db, b.id, "   ").await.unwrap_err();
        assert!(matches!(err, ClaimError::InvalidName));

        let err = claim_name(&db, 999, "Oslo").await.unwrap_err();
        assert!(matches!(err, ClaimError::IdentityNotFound));
    }
}
