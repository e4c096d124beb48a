//! Traits a game implements to be hosted.
//!
//! A game is split in two halves:
//! - a [`GameTracker`], the state machine replicated on the host and in
//!   every bot. It only changes through [`GameTracker::update`], fed with
//!   updates the host broadcast.
//! - a [`Game`], the host-only rules: hidden information (e.g. a secret
//!   number) and the judgement that turns a submitted move into an update.

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

use crate::{error::MoveError, message::Message};

/// What happens to a seat whose move could not be obtained or was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForfeitPolicy {
    /// The match stops at once. The forfeiting seat scores zero, the other
    /// seats keep their points.
    EndMatch,
    /// The seat keeps its points but is skipped for the rest of the match.
    /// The match ends early when every seat forfeited.
    ExcludeAndContinue,
}

/// Authoritative per-match state.
///
/// State machine: in progress until [`is_done`](Self::is_done) turns true,
/// after which [`points`](Self::points) are final.
pub trait GameTracker: Sized {
    /// Sent to every seat with `new_game`.
    type Params: Serialize + DeserializeOwned + Clone + Debug;
    /// What a bot answers to `your_turn`.
    type Move: Serialize + DeserializeOwned + Debug;
    /// What the host broadcasts after an accepted move.
    type Update: Serialize + DeserializeOwned + Clone + Debug;

    fn from_params(params: &Self::Params) -> anyhow::Result<Self>;

    /// Parameters as seen from `seat`.
    fn seat_params(params: &Self::Params, seat: usize) -> Self::Params;

    fn player_count(&self) -> usize;

    /// One entry per seat, all zero at creation.
    fn points(&self) -> &[u32];

    fn whose_turn(&self) -> usize;

    /// Legality of `mv` for the seat whose turn it is.
    ///
    /// # Errors
    /// The reason the move is illegal.
    fn validate(&self, mv: &Self::Move) -> Result<(), MoveError>;

    fn check_move(&self, mv: &Self::Move) -> bool {
        self.validate(mv).is_ok()
    }

    /// Wire form of a move, after checking it is legal. Used by bots before
    /// answering a turn request.
    fn make_move(&self, mv: Self::Move) -> Result<Message, MoveError> {
        self.validate(&mv)?;
        Message::from_payload(&mv).map_err(|e| MoveError::Malformed(e.to_string()))
    }

    /// Applies an accepted move. This is the only mutation of the game
    /// state and it records `update` as the latest one.
    ///
    /// # Errors
    /// The tracker is left untouched when the update is rejected.
    fn update(&mut self, update: &Self::Update) -> Result<(), MoveError>;

    /// Passes the turn of the current seat without playing.
    fn skip_turn(&mut self);

    fn is_done(&self) -> bool;

    fn latest_update(&self) -> Option<&Self::Update>;

    /// Human readable state.
    fn render(&self) -> String {
        format!("points: {:?}", self.points())
    }
}

/// Host-side rules of a game.
pub trait Game {
    type Tracker: GameTracker;
    /// Per-match settings chosen by whoever runs the hoster.
    type Settings;

    fn name(&self) -> &str;

    fn forfeit_policy(&self) -> ForfeitPolicy;

    /// Prepares a match and returns the host view of its parameters.
    fn new_match(
        &mut self,
        settings: &Self::Settings,
        player_count: usize,
    ) -> anyhow::Result<<Self::Tracker as GameTracker>::Params>;

    /// Turns a legal move of `seat` into the update broadcast to everyone.
    fn judge(
        &mut self,
        tracker: &Self::Tracker,
        seat: usize,
        mv: <Self::Tracker as GameTracker>::Move,
    ) -> Result<<Self::Tracker as GameTracker>::Update, MoveError>;
}

/// Reads a move out of a bot answer. Extra keys are ignored, missing or
/// mistyped fields are [`MoveError::Malformed`].
pub fn parse_move<M: DeserializeOwned>(msg: Message) -> Result<M, MoveError> {
    msg.parse().map_err(|e| MoveError::Malformed(e.to_string()))
}

/// True when `lower <= value < upper`.
pub fn in_bounds<T: PartialOrd>(value: T, lower: T, upper: T) -> bool {
    lower <= value && value < upper
}
