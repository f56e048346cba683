// Integration tests for the correctness core: city-claim uniqueness under
// concurrent claims, ledger increment linearity, and commentary fallback.

use std::sync::Arc;

use futures::future::join_all;

use fightclub_backend::claim::{self, ClaimError};
use fightclub_backend::config::Config;
use fightclub_backend::db::{Database, LedgerError};
use fightclub_backend::scoring;
use fightclub_backend::tyler::{TylerClient, FALLBACK_NO_KEY, FALLBACK_OFFLINE};

/// A throwaway file-backed database. Pooled connections to `sqlite::memory:`
/// each get a private database, so concurrency tests need a real file.
async fn test_db() -> Arc<Database> {
    let path = std::env::temp_dir().join(format!("fightclub-test-{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite:{}?mode=rwc", path.display());
    Arc::new(Database::new(&url).await.unwrap())
}

// ── Claim uniqueness ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_uniqueness_under_race() {
    let db = test_db().await;

    // All of these normalize to NEW_YORK.
    let variants = ["New York", "  new york  ", "NEW   YORK", "new\tyork"];

    let mut identities = Vec::new();
    for _ in &variants {
        identities.push(db.create_identity().await.unwrap().id);
    }

    let tasks = identities
        .iter()
        .zip(variants.iter())
        .map(|(&id, &raw)| {
            let db = db.clone();
            tokio::spawn(async move { claim::claim_name(&db, id, raw).await })
        })
        .collect::<Vec<_>>();

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one racer may claim the name");
    for result in &results {
        match result {
            Ok(city) => assert_eq!(city.city_name, "NEW_YORK"),
            Err(ClaimError::NameTaken) => {}
            Err(e) => panic!("unexpected claim outcome: {e:?}"),
        }
    }

    // Exactly one claim record, owned by the winner.
    let claim_row = db.get_claim("NEW_YORK").await.unwrap().unwrap();
    let owner = db.get_identity(claim_row.owner_identity_id).await.unwrap().unwrap();
    assert_eq!(owner.city_name.as_deref(), Some("NEW_YORK"));

    // Losers remain unclaimed.
    for &id in &identities {
        if id == claim_row.owner_identity_id {
            continue;
        }
        let identity = db.get_identity(id).await.unwrap().unwrap();
        assert!(identity.city_name.is_none());
    }
}

#[tokio::test]
async fn test_irreversibility() {
    let db = test_db().await;
    let a = db.create_identity().await.unwrap();

    claim::claim_name(&db, a.id, "Berlin").await.unwrap();

    for raw in ["Berlin", "Munich", "berlin"] {
        let err = claim::claim_name(&db, a.id, raw).await.unwrap_err();
        assert!(matches!(err, ClaimError::AlreadyClaimed), "raw={raw}");
    }

    let a = db.get_identity(a.id).await.unwrap().unwrap();
    assert_eq!(a.city_name.as_deref(), Some("BERLIN"));
}

#[tokio::test]
async fn test_normalization_collision() {
    let db = test_db().await;
    let a = db.create_identity().await.unwrap();
    let b = db.create_identity().await.unwrap();

    claim::claim_name(&db, a.id, "Berlin").await.unwrap();

    let err = claim::claim_name(&db, b.id, "  berlin  ").await.unwrap_err();
    assert!(matches!(err, ClaimError::NameTaken));
}

#[tokio::test]
async fn test_burned_name_permanence() {
    let db = test_db().await;
    let a = db.create_identity().await.unwrap();
    let b = db.create_identity().await.unwrap();

    claim::claim_name(&db, a.id, "Paris").await.unwrap();
    assert!(db.mark_deleted(a.id).await.unwrap());

    // The name stays reserved even though its owner is gone.
    let err = claim::claim_name(&db, b.id, "Paris").await.unwrap_err();
    assert!(matches!(err, ClaimError::NameTaken));

    let claim_row = db.get_claim("PARIS").await.unwrap().unwrap();
    assert_eq!(claim_row.owner_identity_id, a.id);
}

#[tokio::test]
async fn test_invalid_input_rejected_without_writes() {
    let db = test_db().await;
    let a = db.create_identity().await.unwrap();

    for raw in ["", " ", "\t"] {
        let err = claim::claim_name(&db, a.id, raw).await.unwrap_err();
        assert!(matches!(err, ClaimError::InvalidName), "raw={raw:?}");
    }

    let a = db.get_identity(a.id).await.unwrap().unwrap();
    assert!(a.city_name.is_none());
}

// ── Ledger linearity ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_increment_linearity() {
    let db = test_db().await;
    let identity = db.create_identity().await.unwrap();

    const N: usize = 20;
    let tasks = (0..N)
        .map(|_| {
            let db = db.clone();
            let id = identity.id;
            tokio::spawn(async move { db.award_points(id, 10).await })
        })
        .collect::<Vec<_>>();

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let identity = db.get_identity(identity.id).await.unwrap().unwrap();
    assert_eq!(identity.score, 10 * N as i64);
}

#[tokio::test]
async fn test_award_to_unknown_identity_fails() {
    let db = test_db().await;
    let err = db.award_points(12345, 10).await.unwrap_err();
    assert!(matches!(err, LedgerError::IdentityNotFound));
}

#[tokio::test]
async fn test_workout_scoring_feeds_ledger() {
    let db = test_db().await;
    let identity = db.create_identity().await.unwrap();

    // 120 kg deadlift for 30 min: 10 + 12 + 3
    let delta = scoring::workout_points(Some(120), Some(30));
    assert_eq!(delta, 25);
    db.award_points(identity.id, delta).await.unwrap();

    let identity = db.get_identity(identity.id).await.unwrap().unwrap();
    assert_eq!(identity.score, 25);
    assert!(identity.last_activity_at.is_some());
}

// ── Commentary fallback ──────────────────────────────────────────────

fn tyler_config(key: Option<&str>) -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        port: 0,
        commentary_api_key: key.map(|k| k.to_string()),
        // Discard port: nothing listens, connections fail fast.
        commentary_api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
        commentary_model: "test-model".to_string(),
        commentary_timeout_secs: 1,
    }
}

#[tokio::test]
async fn test_fallback_on_upstream_failure() {
    let tyler = TylerClient::new(&tyler_config(Some("key")));
    let text = tyler.respond("PARIS", "workout_logged", None).await;
    assert_eq!(text, FALLBACK_OFFLINE);
    assert!(!text.is_empty());
}

#[tokio::test]
async fn test_fallback_without_api_key() {
    let tyler = TylerClient::new(&tyler_config(None));
    let text = tyler.respond("PARIS", "workout_logged", None).await;
    assert_eq!(text, FALLBACK_NO_KEY);
    assert!(!text.is_empty());
}
