// Database access layer (SQLite via sqlx).
//
// All SQL lives here. The two correctness-critical operations are
// `try_claim` (the city-claim transaction) and `award_points` (the atomic
// score increment); no other code path writes `city_name` or `score`.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;

/// Upper bound on a single points award. Deltas come from the scoring
/// policy, which stays far below this; anything larger is a logic error.
pub const MAX_AWARD: i64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Identity {
    pub id: i64,
    pub city_name: Option<String>,
    pub display_name: Option<String>,
    pub score: i64,
    pub status: String,
    pub last_activity_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NameClaim {
    pub normalized_name: String,
    pub owner_identity_id: i64,
    pub display_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workout {
    pub id: i64,
    pub identity_id: i64,
    pub exercise: String,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub weight_kg: Option<i64>,
    pub duration_min: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub identity_id: i64,
    pub content: String,
    pub trigger: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardRow {
    pub city_name: String,
    pub score: i64,
}

/// Outcome of a single claim-transaction attempt. The friendly rejections
/// are reads inside the transaction; a lost race can additionally surface
/// as a unique-constraint error, which the caller maps to `NameTaken`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimAttempt {
    Claimed,
    NameTaken,
    AlreadyClaimed,
    IdentityMissing,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("identity not found")]
    IdentityNotFound,
    #[error("invalid award delta: {0}")]
    InvalidDelta(i64),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Single-connection in-memory database for unit tests. Each pooled
    /// connection to `sqlite::memory:` opens its own private database, so
    /// the pool must be capped at one connection.
    #[cfg(test)]
    pub(crate) async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city_name TEXT,
                display_name TEXT,
                score INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                last_activity_at TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS name_claims (
                normalized_name TEXT PRIMARY KEY,
                owner_identity_id INTEGER NOT NULL REFERENCES identities(id),
                display_name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workouts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity_id INTEGER NOT NULL REFERENCES identities(id),
                exercise TEXT NOT NULL,
                sets INTEGER,
                reps INTEGER,
                weight_kg INTEGER,
                duration_min INTEGER,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity_id INTEGER NOT NULL REFERENCES identities(id),
                content TEXT NOT NULL,
                trigger TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Identities ────────────────────────────────────────────────────

    pub async fn create_identity(&self) -> Result<Identity, sqlx::Error> {
        let row = sqlx::query_as::<_, Identity>(
            "INSERT INTO identities DEFAULT VALUES RETURNING id, city_name, display_name, score, status, last_activity_at, created_at",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_identity(&self, id: i64) -> Result<Option<Identity>, sqlx::Error> {
        let row = sqlx::query_as::<_, Identity>(
            "SELECT id, city_name, display_name, score, status, last_activity_at, created_at FROM identities WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Mark an identity as deleted. One-way: an already-DELETED row is left
    /// untouched. The identity's name claim is never removed.
    pub async fn mark_deleted(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE identities SET status = 'DELETED' WHERE id = ? AND status = 'ACTIVE'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Claim transaction ─────────────────────────────────────────────

    /// One attempt at the city-claim transaction: both reads and both writes
    /// happen inside a single SQLite transaction, so no concurrent attempt
    /// observes an intermediate state. Rolls back with zero durable writes
    /// on every non-`Claimed` outcome.
    ///
    /// The identity's own `city_name` is checked before the name registry:
    /// an identity that already holds a city gets `AlreadyClaimed` no matter
    /// which name it asks for, including its own.
    pub async fn try_claim(
        &self,
        identity_id: i64,
        normalized_name: &str,
        display_name: &str,
    ) -> Result<ClaimAttempt, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(Option<String>,)> =
            sqlx::query_as("SELECT city_name FROM identities WHERE id = ?")
                .bind(identity_id)
                .fetch_optional(&mut *tx)
                .await?;
        match current {
            None => {
                tx.rollback().await?;
                return Ok(ClaimAttempt::IdentityMissing);
            }
            Some((Some(_),)) => {
                tx.rollback().await?;
                return Ok(ClaimAttempt::AlreadyClaimed);
            }
            Some((None,)) => {}
        }

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT owner_identity_id FROM name_claims WHERE normalized_name = ?")
                .bind(normalized_name)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            tx.rollback().await?;
            return Ok(ClaimAttempt::NameTaken);
        }

        sqlx::query(
            "INSERT INTO name_claims (normalized_name, owner_identity_id, display_name) VALUES (?, ?, ?)",
        )
        .bind(normalized_name)
        .bind(identity_id)
        .bind(display_name)
        .execute(&mut *tx)
        .await?;

        // The IS NULL guard keeps a racing claim for the same identity from
        // ever overwriting an established city_name.
        sqlx::query(
            "UPDATE identities SET city_name = ?, display_name = ? WHERE id = ? AND city_name IS NULL",
        )
        .bind(normalized_name)
        .bind(display_name)
        .bind(identity_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ClaimAttempt::Claimed)
    }

    pub async fn get_claim(&self, normalized_name: &str) -> Result<Option<NameClaim>, sqlx::Error> {
        let row = sqlx::query_as::<_, NameClaim>(
            "SELECT normalized_name, owner_identity_id, display_name, created_at FROM name_claims WHERE normalized_name = ?",
        )
        .bind(normalized_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ── Points ledger ─────────────────────────────────────────────────

    /// Atomically add `delta` to an identity's score and stamp its last
    /// activity time. A single in-place increment, never read-modify-write:
    /// N concurrent awards always sum. Fails rather than creating a row for
    /// an unknown identity.
    pub async fn award_points(&self, identity_id: i64, delta: i64) -> Result<(), LedgerError> {
        if !(0..=MAX_AWARD).contains(&delta) {
            return Err(LedgerError::InvalidDelta(delta));
        }

        let result = sqlx::query(
            "UPDATE identities SET score = score + ?, last_activity_at = datetime('now') WHERE id = ?",
        )
        .bind(delta)
        .bind(identity_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::IdentityNotFound);
        }
        Ok(())
    }

    // ── Leaderboard ───────────────────────────────────────────────────

    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, LeaderboardRow>(
            "SELECT city_name, score FROM identities WHERE city_name IS NOT NULL AND status = 'ACTIVE' ORDER BY score DESC, city_name ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ── Workouts ──────────────────────────────────────────────────────

    pub async fn add_workout(
        &self,
        identity_id: i64,
        exercise: &str,
        sets: Option<i64>,
        reps: Option<i64>,
        weight_kg: Option<i64>,
        duration_min: Option<i64>,
    ) -> Result<Workout, sqlx::Error> {
        let row = sqlx::query_as::<_, Workout>(
            "INSERT INTO workouts (identity_id, exercise, sets, reps, weight_kg, duration_min) VALUES (?, ?, ?, ?, ?, ?) RETURNING id, identity_id, exercise, sets, reps, weight_kg, duration_min, created_at",
        )
        .bind(identity_id)
        .bind(exercise)
        .bind(sets)
        .bind(reps)
        .bind(weight_kg)
        .bind(duration_min)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    // ── Tyler message feed ────────────────────────────────────────────

    pub async fn add_message(
        &self,
        identity_id: i64,
        content: &str,
        trigger: &str,
    ) -> Result<Message, sqlx::Error> {
        let row = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (identity_id, content, trigger) VALUES (?, ?, ?) RETURNING id, identity_id, content, trigger, created_at",
        )
        .bind(identity_id)
        .bind(content)
        .bind(trigger)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_messages(
        &self,
        identity_id: i64,
        limit: i64,
    ) -> Result<Vec<Message>, sqlx::Error> {
        let rows = sqlx::query_as::<_, Message>(
            "SELECT id, identity_id, content, trigger, created_at FROM messages WHERE identity_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(identity_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
