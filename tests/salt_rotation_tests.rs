mod common;

use chrono::{Duration, Utc};
use common::{CURRENT_SECRET, PREVIOUS_SECRET, salt_record, subject};
use rolegate::{
    error::{SaltError, TokenError},
    repository::{MockData, MockRepository, RepositoryState, WriteGate},
    salt::{RotationOutcome, SECRET_LENGTH, SaltRotator, SaltStore, generate_secret},
    token::{TokenCodec, TokenKind},
};
use std::sync::Arc;

const INTERVAL_MINUTES: i64 = 240;

fn repo_with_record(rotated_minutes_ago: i64) -> MockRepository {
    MockRepository::new(MockData {
        salt: Some(salt_record(Utc::now() - Duration::minutes(rotated_minutes_ago))),
        ..MockData::default()
    })
}

async fn rotator_for(repo: Arc<MockRepository>) -> (SaltRotator, Arc<SaltStore>) {
    let repo: RepositoryState = repo;
    let pair = SaltRotator::provision(&repo).await.unwrap();
    let store = Arc::new(SaltStore::new(pair));
    let rotator = SaltRotator::new(repo, store.clone(), Duration::minutes(INTERVAL_MINUTES));
    (rotator, store)
}

#[test]
fn test_generated_secrets_are_random_alphanumeric() {
    let a = generate_secret();
    let b = generate_secret();
    assert_eq!(a.len(), SECRET_LENGTH);
    assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_provision_creates_record_once() {
    let repo = Arc::new(MockRepository::new(MockData::default()));
    let state: RepositoryState = repo.clone();

    let first = SaltRotator::provision(&state).await.unwrap();
    assert_eq!(first.current.len(), SECRET_LENGTH);
    assert_ne!(first.current, first.previous);

    let second = SaltRotator::provision(&state).await.unwrap();
    assert_eq!(first, second, "an existing record must be adopted, not replaced");

    let stored = repo.snapshot().await.salt.unwrap();
    assert_eq!(stored.current_secret, first.current);
}

#[tokio::test]
async fn test_rotation_shifts_current_into_previous() {
    let repo = Arc::new(repo_with_record(INTERVAL_MINUTES + 1));
    let (rotator, store) = rotator_for(repo.clone()).await;

    let outcome = rotator.rotate_once(Utc::now()).await.unwrap();
    assert_eq!(outcome, RotationOutcome::Rotated);

    let pair = store.snapshot();
    assert_eq!(pair.previous, CURRENT_SECRET);
    assert_ne!(pair.current, CURRENT_SECRET);
    assert_ne!(pair.current, PREVIOUS_SECRET);

    // Memory and store agree.
    let stored = repo.snapshot().await.salt.unwrap();
    assert_eq!(stored.current_secret, pair.current);
    assert_eq!(stored.previous_secret, pair.previous);
    assert_eq!(stored.rotated_at, pair.rotated_at);
}

#[tokio::test]
async fn test_rotation_not_due_keeps_secrets() {
    let repo = Arc::new(repo_with_record(60));
    let (rotator, store) = rotator_for(repo.clone()).await;

    let outcome = rotator.rotate_once(Utc::now()).await.unwrap();
    assert_eq!(outcome, RotationOutcome::Adopted);
    assert_eq!(store.snapshot().current, CURRENT_SECRET);
    assert_eq!(store.snapshot().previous, PREVIOUS_SECRET);
}

#[tokio::test]
async fn test_rotation_by_another_instance_is_adopted() {
    let repo = Arc::new(repo_with_record(INTERVAL_MINUTES + 1));
    let (rotator, store) = rotator_for(repo.clone()).await;

    // A peer rotated the shared record after this instance loaded it.
    let rotated_elsewhere = Utc::now();
    repo.update(|data| {
        let record = data.salt.as_mut().unwrap();
        record.previous_secret = record.current_secret.clone();
        record.current_secret = "peer-secret".to_string();
        record.rotated_at = rotated_elsewhere;
    })
    .await;

    let outcome = rotator.rotate_once(Utc::now()).await.unwrap();
    assert_eq!(outcome, RotationOutcome::Adopted);

    let pair = store.snapshot();
    assert_eq!(pair.current, "peer-secret");
    assert_eq!(pair.previous, CURRENT_SECRET);

    let stored = repo.snapshot().await.salt.unwrap();
    assert_eq!(stored.current_secret, "peer-secret", "no double rotation");
}

#[tokio::test]
async fn test_persist_failure_leaves_memory_unchanged() {
    let mut repo = repo_with_record(INTERVAL_MINUTES + 1);
    repo.fail_salt_writes = true;
    let repo = Arc::new(repo);
    let (rotator, store) = rotator_for(repo.clone()).await;
    let before = store.snapshot();

    let result = rotator.rotate_once(Utc::now()).await;
    assert!(matches!(result, Err(SaltError::Persist(_))));

    assert_eq!(*store.snapshot(), *before);
    let stored = repo.snapshot().await.salt.unwrap();
    assert_eq!(stored.current_secret, CURRENT_SECRET);
}

#[tokio::test]
async fn test_tick_during_rotation_is_skipped() {
    let gate = Arc::new(WriteGate::default());
    let mut repo = repo_with_record(INTERVAL_MINUTES + 1);
    repo.salt_write_gate = Some(gate.clone());
    let repo = Arc::new(repo);
    let (rotator, store) = rotator_for(repo.clone()).await;
    let rotator = Arc::new(rotator);

    let now = Utc::now();
    let in_flight = tokio::spawn({
        let rotator = rotator.clone();
        async move { rotator.rotate_once(now).await }
    });
    gate.entered().await;

    let second = rotator.rotate_once(now).await.unwrap();
    assert_eq!(second, RotationOutcome::Skipped);
    assert_eq!(store.snapshot().current, CURRENT_SECRET);

    gate.release();
    let first = in_flight.await.unwrap().unwrap();
    assert_eq!(first, RotationOutcome::Rotated);

    // Rotated exactly once.
    let pair = store.snapshot();
    assert_eq!(pair.previous, CURRENT_SECRET);
    let stored = repo.snapshot().await.salt.unwrap();
    assert_eq!(stored.current_secret, pair.current);
    assert_eq!(stored.previous_secret, CURRENT_SECRET);
}

#[tokio::test]
async fn test_until_due_counts_down_from_last_rotation() {
    let repo = Arc::new(repo_with_record(60));
    let (rotator, _store) = rotator_for(repo).await;

    let left = rotator.until_due(Utc::now());
    assert!(left <= Duration::minutes(INTERVAL_MINUTES - 60));
    assert!(left > Duration::minutes(INTERVAL_MINUTES - 61));

    let overdue = Arc::new(repo_with_record(INTERVAL_MINUTES * 2));
    let (rotator, _store) = rotator_for(overdue).await;
    assert_eq!(rotator.until_due(Utc::now()), Duration::zero());
}

#[tokio::test]
async fn test_token_outlives_one_rotation_and_dies_on_the_next() {
    let repo = Arc::new(repo_with_record(INTERVAL_MINUTES + 1));
    let (rotator, store) = rotator_for(repo).await;
    let codec = TokenCodec::new(store, Duration::minutes(30), Duration::minutes(180));

    let issued_at = Utc::now();
    let token = codec.issue(&subject(&["Editor"]), TokenKind::Access, issued_at).unwrap();

    let first = issued_at + Duration::seconds(1);
    assert_eq!(rotator.rotate_once(first).await.unwrap(), RotationOutcome::Rotated);
    assert!(codec.verify_at(&token, TokenKind::Access, first).is_ok());

    let second = first + Duration::minutes(INTERVAL_MINUTES);
    assert_eq!(rotator.rotate_once(second).await.unwrap(), RotationOutcome::Rotated);
    assert_eq!(
        codec.decode_any_at(&token, issued_at),
        Err(TokenError::SignatureInvalid)
    );
}
