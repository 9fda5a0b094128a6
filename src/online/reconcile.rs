//! Read-Model Reconciliation
//!
//! Turns each record value a client receives into what that client shows:
//! a local board, a status line, and which move just landed.
//!
//! [`reconcile`] is pure. [`Reconciler`] remembers the previous record and
//! [`OnlineSession`] drives it from a live [`Subscription`].

use std::fmt;
use tracing::trace;

use crate::core::code::JoinCode;
use crate::game::board::{Board, Mark, BOARD_SIZE};
use super::arbiter::{MoveArbiter, MoveOutcome};
use super::record::{GameId, ParticipantId, RecordStatus, RemoteGameRecord, Winner};
use super::store::{StoreError, Subscription};

/// Who made a move, from the local participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mover {
    /// The local participant.
    Me,
    /// The other participant.
    Opponent,
}

/// The move that changed the board since the previous record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveFeedback {
    /// Cell that changed.
    pub index: usize,
    /// Mark now in it.
    pub mark: Mark,
    /// Whose move it was.
    pub by: Mover,
}

/// Human-facing status derived from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLine {
    /// No guest yet.
    AwaitingOpponent,
    /// Local participant moves next, playing this mark.
    YourTurn(Mark),
    /// Other participant moves next.
    OpponentsTurn,
    /// Finished without a line.
    Draw,
    /// Finished, local participant won.
    YouWin,
    /// Finished, other participant won.
    YouLose,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLine::AwaitingOpponent => write!(f, "Share this code and wait for the other player."),
            StatusLine::YourTurn(mark) => write!(f, "Your turn ({})", mark),
            StatusLine::OpponentsTurn => write!(f, "Opponent's turn"),
            StatusLine::Draw => write!(f, "Draw!"),
            StatusLine::YouWin => write!(f, "You win!"),
            StatusLine::YouLose => write!(f, "You lose!"),
        }
    }
}

/// Everything a client displays for one record value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadModel {
    /// Local board rebuilt from the record.
    pub board: Board,
    /// Status for the local participant.
    pub status: StatusLine,
    /// Move that produced this record, if one can be told apart.
    pub last_move: Option<MoveFeedback>,
    /// Join code to show.
    pub code: JoinCode,
}

/// Mark the local participant plays in `record`.
pub fn my_mark(record: &RemoteGameRecord, me: &ParticipantId) -> Mark {
    record.mark_of(me)
}

/// Status line for `me`.
pub fn status_line(record: &RemoteGameRecord, me: &ParticipantId) -> StatusLine {
    match record.status {
        RecordStatus::Waiting => StatusLine::AwaitingOpponent,
        RecordStatus::Playing if record.current_turn.as_ref() == Some(me) => {
            StatusLine::YourTurn(my_mark(record, me))
        }
        RecordStatus::Playing => StatusLine::OpponentsTurn,
        RecordStatus::Finished => match &record.winner {
            Winner::Participant(id) if id == me => StatusLine::YouWin,
            Winner::Participant(_) => StatusLine::YouLose,
            // A finished record always names a winner or a draw.
            Winner::Draw | Winner::None => StatusLine::Draw,
        },
    }
}

/// First cell that differs between two boards and holds a mark in `next`.
fn changed_cell(previous: &RemoteGameRecord, next: &RemoteGameRecord) -> Option<(usize, Mark)> {
    (0..BOARD_SIZE)
        .find(|&i| previous.board[i] != next.board[i])
        .and_then(|i| next.board[i].mark().map(|mark| (i, mark)))
}

/// Derive the read model for `next`, given the record seen before it.
pub fn reconcile(
    previous: Option<&RemoteGameRecord>,
    next: &RemoteGameRecord,
    me: &ParticipantId,
) -> ReadModel {
    let mine = my_mark(next, me);
    let last_move = previous
        .and_then(|prev| changed_cell(prev, next))
        .map(|(index, mark)| MoveFeedback {
            index,
            mark,
            by: if mark == mine { Mover::Me } else { Mover::Opponent },
        });

    ReadModel {
        board: next.to_board(),
        status: status_line(next, me),
        last_move,
        code: next.code.clone(),
    }
}

/// Reconciles a stream of records, remembering the last one.
#[derive(Debug, Clone)]
pub struct Reconciler {
    me: ParticipantId,
    last: Option<RemoteGameRecord>,
}

impl Reconciler {
    /// Reconciler for participant `me`.
    pub fn new(me: ParticipantId) -> Self {
        Self { me, last: None }
    }

    /// Reconcile `next` against the previous record and remember it.
    pub fn apply(&mut self, next: RemoteGameRecord) -> ReadModel {
        let model = reconcile(self.last.as_ref(), &next, &self.me);
        self.last = Some(next);
        model
    }

    /// Most recent record seen.
    pub fn last(&self) -> Option<&RemoteGameRecord> {
        self.last.as_ref()
    }
}

/// One participant's view of an online match.
pub struct OnlineSession {
    game_id: GameId,
    me: ParticipantId,
    subscription: Subscription,
    reconciler: Reconciler,
    arbiter: MoveArbiter,
}

impl OnlineSession {
    /// Session for `me` over an open subscription.
    pub fn new(me: ParticipantId, subscription: Subscription, arbiter: MoveArbiter) -> Self {
        Self {
            game_id: subscription.game_id().clone(),
            reconciler: Reconciler::new(me.clone()),
            me,
            subscription,
            arbiter,
        }
    }

    /// Match being followed.
    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    /// Wait for the next record value and reconcile it.
    ///
    /// `None` once the feed closes.
    pub async fn next_update(&mut self) -> Option<ReadModel> {
        let record = self.subscription.next().await?;
        let model = self.reconciler.apply(record);
        trace!(game_id = %self.game_id, status = %model.status, "reconciled");
        Some(model)
    }

    /// Submit a move as the local participant.
    ///
    /// The local view changes only when the committed record arrives on the
    /// feed.
    pub async fn submit(&self, index: usize) -> Result<MoveOutcome, StoreError> {
        self.arbiter.submit_move(&self.game_id, &self.me, index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::game::board::Cell;
    use crate::online::arbiter::apply_move;
    use crate::online::store::{InMemoryStore, RecordStore};

    fn host() -> ParticipantId {
        ParticipantId::new("host").unwrap()
    }

    fn guest() -> ParticipantId {
        ParticipantId::new("guest").unwrap()
    }

    fn playing() -> RemoteGameRecord {
        let mut record = RemoteGameRecord::new_waiting(host(), JoinCode::from_stored("QRS23"));
        record.guest_id = Some(guest());
        record.status = RecordStatus::Playing;
        record
    }

    #[test]
    fn test_waiting_status() {
        let record = RemoteGameRecord::new_waiting(host(), JoinCode::from_stored("QRS23"));
        let model = reconcile(None, &record, &host());
        assert_eq!(model.status, StatusLine::AwaitingOpponent);
        assert_eq!(model.last_move, None);
        assert_eq!(model.code.as_str(), "QRS23");
        assert_eq!(model.status.to_string(), "Share this code and wait for the other player.");
    }

    #[test]
    fn test_turn_status_per_participant() {
        let record = playing();
        assert_eq!(status_line(&record, &host()), StatusLine::YourTurn(Mark::X));
        assert_eq!(status_line(&record, &guest()), StatusLine::OpponentsTurn);
        assert_eq!(StatusLine::YourTurn(Mark::X).to_string(), "Your turn (X)");

        let next = apply_move(&record, &host(), 4).unwrap();
        assert_eq!(status_line(&next, &guest()), StatusLine::YourTurn(Mark::O));
        assert_eq!(status_line(&next, &host()), StatusLine::OpponentsTurn);
    }

    #[test]
    fn test_move_feedback_classification() {
        let before = playing();
        let after = apply_move(&before, &host(), 4).unwrap();

        let for_host = reconcile(Some(&before), &after, &host());
        assert_eq!(
            for_host.last_move,
            Some(MoveFeedback { index: 4, mark: Mark::X, by: Mover::Me })
        );

        let for_guest = reconcile(Some(&before), &after, &guest());
        assert_eq!(for_guest.last_move.map(|m| m.by), Some(Mover::Opponent));
        assert_eq!(for_guest.board.occupant(4), Cell::X);
    }

    #[test]
    fn test_unchanged_board_has_no_feedback() {
        let record = playing();
        let model = reconcile(Some(&record), &record, &host());
        assert_eq!(model.last_move, None);
    }

    #[test]
    fn test_finished_statuses() {
        let mut record = playing();
        record.board = [
            Cell::X, Cell::X, Cell::X,
            Cell::O, Cell::O, Cell::Empty,
            Cell::Empty, Cell::Empty, Cell::Empty,
        ];
        record.status = RecordStatus::Finished;
        record.current_turn = None;
        record.winner = Winner::Participant(host());
        assert_eq!(status_line(&record, &host()), StatusLine::YouWin);
        assert_eq!(status_line(&record, &guest()), StatusLine::YouLose);

        record.winner = Winner::Draw;
        assert_eq!(status_line(&record, &guest()), StatusLine::Draw);
        assert_eq!(StatusLine::YouLose.to_string(), "You lose!");
    }

    #[test]
    fn test_board_replayed_from_record() {
        let mut record = playing();
        record = apply_move(&record, &host(), 0).unwrap();
        record = apply_move(&record, &guest(), 8).unwrap();
        let model = reconcile(None, &record, &guest());
        assert_eq!(model.board.occupant(0), Cell::X);
        assert_eq!(model.board.occupant(8), Cell::O);
        assert_eq!(model.board.empty_cells().count(), 7);
    }

    #[test]
    fn test_reconciler_remembers_previous() {
        let mut reconciler = Reconciler::new(guest());
        let first = playing();
        assert_eq!(reconciler.apply(first.clone()).last_move, None);

        let second = apply_move(&first, &host(), 2).unwrap();
        let model = reconciler.apply(second.clone());
        assert_eq!(model.last_move.map(|m| (m.index, m.by)), Some((2, Mover::Opponent)));
        assert_eq!(reconciler.last(), Some(&second));
    }

    #[tokio::test]
    async fn test_online_session_follows_feed() {
        let store = Arc::new(InMemoryStore::new());
        let id = store.create(playing()).await.unwrap();
        let arbiter = MoveArbiter::new(store.clone());

        let mut host_view = OnlineSession::new(host(), store.subscribe(&id).await.unwrap(), arbiter.clone());
        let mut guest_view = OnlineSession::new(guest(), store.subscribe(&id).await.unwrap(), arbiter);

        assert_eq!(host_view.next_update().await.unwrap().status, StatusLine::YourTurn(Mark::X));
        assert_eq!(guest_view.next_update().await.unwrap().status, StatusLine::OpponentsTurn);

        assert!(host_view.submit(4).await.unwrap().is_applied());

        let seen_by_guest = guest_view.next_update().await.unwrap();
        assert_eq!(seen_by_guest.status, StatusLine::YourTurn(Mark::O));
        assert_eq!(
            seen_by_guest.last_move,
            Some(MoveFeedback { index: 4, mark: Mark::X, by: Mover::Opponent })
        );

        let seen_by_host = host_view.next_update().await.unwrap();
        assert_eq!(seen_by_host.last_move.map(|m| m.by), Some(Mover::Me));
        assert_eq!(host_view.game_id(), &id);
    }
}
