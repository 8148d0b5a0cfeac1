//! Rotating token signing secrets.
//!
//! The secrets form a two-slot ring `{current, previous}`. Each rotation shifts
//! `current` into `previous` and installs a fresh secret, so a token signed just
//! before a rotation keeps verifying until the following rotation evicts its secret.
//! The durable copy is the singleton `jwt_salts` row; [`SaltStore`] mirrors it in
//! memory for lock-free reads on the request path.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distributions::Alphanumeric};
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{error::SaltError, models::SaltRecord, repository::RepositoryState};

/// Length of every generated secret, in characters.
pub const SECRET_LENGTH: usize = 64;

/// Generates a random alphanumeric secret of [`SECRET_LENGTH`] characters.
pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

/// SaltPair
///
/// The in-memory view of the two signing slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaltPair {
    pub current: String,
    pub previous: String,
    pub rotated_at: DateTime<Utc>,
}

impl From<SaltRecord> for SaltPair {
    fn from(record: SaltRecord) -> Self {
        Self {
            current: record.current_secret,
            previous: record.previous_secret,
            rotated_at: record.rotated_at,
        }
    }
}

/// SaltStore
///
/// Shared, read-mostly holder of the current [`SaltPair`]. Only the rotator writes.
#[derive(Debug)]
pub struct SaltStore {
    pair: ArcSwap<SaltPair>,
}

/// SaltStoreState
///
/// The concrete type used to share the secrets across the application state.
pub type SaltStoreState = Arc<SaltStore>;

impl SaltStore {
    pub fn new(pair: SaltPair) -> Self {
        Self {
            pair: ArcSwap::from_pointee(pair),
        }
    }

    pub fn snapshot(&self) -> Arc<SaltPair> {
        self.pair.load_full()
    }

    pub fn install(&self, pair: SaltPair) {
        self.pair.store(Arc::new(pair));
    }
}

/// RotationOutcome
///
/// What a single rotation attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// This process rotated the secrets.
    Rotated,
    /// The stored record was not due, or another instance rotated it first; the
    /// in-memory pair was synced to the stored one.
    Adopted,
    /// Another rotation attempt in this process was still running.
    Skipped,
}

/// SaltRotator
///
/// Background job promoting a fresh secret on a fixed interval.
pub struct SaltRotator {
    repo: RepositoryState,
    store: SaltStoreState,
    interval: Duration,
    in_flight: Mutex<()>,
}

impl SaltRotator {
    pub fn new(repo: RepositoryState, store: SaltStoreState, interval: Duration) -> Self {
        Self {
            repo,
            store,
            interval,
            in_flight: Mutex::new(()),
        }
    }

    /// provision
    ///
    /// Creates the singleton record on first start (both slots random) and returns
    /// the stored pair. Existing records are left untouched.
    pub async fn provision(repo: &RepositoryState) -> Result<SaltPair, SaltError> {
        if let Some(record) = repo.get_salt().await? {
            return Ok(record.into());
        }
        tracing::info!("No signing secret record found, provisioning a new one");
        let record = repo
            .provision_salt(&generate_secret(), &generate_secret(), Utc::now())
            .await?;
        Ok(record.into())
    }

    /// rotate_once
    ///
    /// Attempts one rotation as of `now`. The in-memory pair only changes after the
    /// database accepted the write (or after re-reading a newer stored record), so a
    /// failed write leaves both copies on the old secrets.
    pub async fn rotate_once(&self, now: DateTime<Utc>) -> Result<RotationOutcome, SaltError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("Signing secret rotation already in progress, skipping tick");
            return Ok(RotationOutcome::Skipped);
        };

        let expected = self.store.snapshot();
        let next = generate_secret();
        let due_before = now - self.interval;

        match self
            .repo
            .rotate_salt(&expected.current, &next, now, due_before)
            .await?
        {
            Some(record) => {
                self.store.install(record.into());
                tracing::info!("Signing secrets rotated");
                Ok(RotationOutcome::Rotated)
            }
            None => {
                let stored = self.repo.get_salt().await?.ok_or(SaltError::Missing)?;
                tracing::info!(
                    rotated_at = %stored.rotated_at,
                    "Signing secrets not due or rotated elsewhere, adopting stored record"
                );
                self.store.install(stored.into());
                Ok(RotationOutcome::Adopted)
            }
        }
    }

    /// Time left until the in-memory pair is due for rotation (zero when overdue).
    pub fn until_due(&self, now: DateTime<Utc>) -> Duration {
        let due_at = self.store.snapshot().rotated_at + self.interval;
        (due_at - now).max(Duration::zero())
    }

    /// run
    ///
    /// Loops forever: sleep until due, rotate, repeat. Errors are logged and the
    /// rotation is retried after one more interval.
    pub async fn run(self: Arc<Self>) {
        loop {
            let wait = self.until_due(Utc::now());
            tokio::time::sleep(wait.to_std().unwrap_or_default()).await;

            match self.rotate_once(Utc::now()).await {
                Ok(outcome) => tracing::debug!(?outcome, "Signing secret rotation tick"),
                Err(e) => {
                    tracing::warn!("Signing secret rotation failed, retrying next tick: {}", e);
                    tokio::time::sleep(self.interval.to_std().unwrap_or_default()).await;
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
