//! Match Coordination
//!
//! Creates waiting records with a join code and lets a second participant
//! claim one by code.

use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::core::code::JoinCode;
use crate::core::rng::DeterministicRng;
use super::record::{GameId, ParticipantId, RecordStatus, RemoteGameRecord};
use super::store::{RecordQuery, RecordStore, StoreError, TxDecision};

/// Attempts at drawing a join code not held by another waiting record.
pub const MAX_CODE_ATTEMPTS: usize = 8;

/// A record together with its store id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchHandle {
    /// Store id.
    pub game_id: GameId,
    /// Record as written.
    pub record: RemoteGameRecord,
}

/// Result of a join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Joined; the record is now playing.
    Joined(MatchHandle),
    /// No waiting record has this code (or another guest got there first).
    NotFound,
    /// The code belongs to a match this participant is hosting.
    OwnMatch,
}

/// Creates and joins online matches.
pub struct MatchCoordinator {
    store: Arc<dyn RecordStore>,
    rng: Mutex<DeterministicRng>,
}

impl MatchCoordinator {
    /// Coordinator over `store`, codes drawn from entropy.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_rng(store, DeterministicRng::from_entropy())
    }

    /// Coordinator with a seeded code generator.
    pub fn with_rng(store: Arc<dyn RecordStore>, rng: DeterministicRng) -> Self {
        Self { store, rng: Mutex::new(rng) }
    }

    fn draw_code(&self) -> JoinCode {
        // A poisoned lock still holds a usable generator.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        JoinCode::generate(&mut *rng)
    }

    /// Draw a code, retrying while another waiting record holds it.
    async fn fresh_code(&self) -> Result<JoinCode, StoreError> {
        let mut code = self.draw_code();
        for attempt in 1..MAX_CODE_ATTEMPTS {
            let taken = self
                .store
                .query(&RecordQuery::waiting_with_code(code.clone()))
                .await?;
            if taken.is_empty() {
                return Ok(code);
            }
            debug!(%code, attempt, "join code in use, drawing another");
            code = self.draw_code();
        }
        warn!(%code, "giving up on unique join code");
        Ok(code)
    }

    /// Create a waiting match hosted by `host`.
    #[instrument(skip(self, host), fields(host = %host))]
    pub async fn create_match(&self, host: &ParticipantId) -> Result<MatchHandle, StoreError> {
        let code = self.fresh_code().await?;
        let record = RemoteGameRecord::new_waiting(host.clone(), code);
        let game_id = self.store.create(record).await?;

        let record = self
            .store
            .get(&game_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(game_id.clone()))?;

        info!(game_id = %game_id, code = %record.code, "match created");
        Ok(MatchHandle { game_id, record })
    }

    /// Join the waiting match with `code` as `guest`.
    ///
    /// The code is trimmed and upper-cased first. The claim itself runs in a
    /// transaction that re-checks the record is still waiting, so of two
    /// simultaneous joiners exactly one gets in.
    #[instrument(skip(self, guest), fields(guest = %guest))]
    pub async fn join_match(&self, code: &str, guest: &ParticipantId) -> Result<JoinOutcome, StoreError> {
        let Some(code) = JoinCode::parse(code) else {
            return Ok(JoinOutcome::NotFound);
        };

        let found = self
            .store
            .query(&RecordQuery::waiting_with_code(code.clone()))
            .await?;
        let Some((game_id, record)) = found.into_iter().next() else {
            debug!(%code, "no waiting match for code");
            return Ok(JoinOutcome::NotFound);
        };

        if record.host_id == *guest {
            return Ok(JoinOutcome::OwnMatch);
        }

        let written = self
            .store
            .transact(
                &game_id,
                Box::new(|current: Option<&RemoteGameRecord>| match current {
                    Some(r)
                        if r.status == RecordStatus::Waiting
                            && r.guest_id.is_none()
                            && r.code == code =>
                    {
                        let mut next = r.clone();
                        next.guest_id = Some(guest.clone());
                        next.status = RecordStatus::Playing;
                        next.current_turn = Some(r.host_id.clone());
                        TxDecision::Write(next)
                    }
                    _ => TxDecision::Abort,
                }),
            )
            .await?;

        match written {
            Some(record) => {
                info!(game_id = %game_id, "match joined");
                Ok(JoinOutcome::Joined(MatchHandle { game_id, record }))
            }
            None => {
                debug!(game_id = %game_id, "match claimed by someone else");
                Ok(JoinOutcome::NotFound)
            }
        }
    }
}
