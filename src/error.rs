//! Error types of the protocol and of the game trackers.

use std::{io, time::Duration};

use thiserror::Error;

use crate::message::Command;

/// Failure of a channel operation.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Nothing usable arrived within the allowed window.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// End of stream: the peer closed its end or exited.
    #[error("peer terminated")]
    PeerTerminated,

    /// A received line is not a well formed message. The stream cannot be
    /// resynchronised after this.
    #[error("could not decode '{line}': {reason}")]
    Decode { line: String, reason: String },

    /// The peer left this many lines unread on its input.
    #[error("peer stopped reading, {0} lines pending")]
    Stalled(usize),

    /// Sending on a channel that was already closed.
    #[error("channel is closed")]
    Closed,

    /// The peer kept sending side-channel traffic without ever answering.
    #[error("gave up after {0} side-channel only messages")]
    DrainLimit(usize),

    /// Servicing a side-channel command failed on the local console.
    #[error("could not service '{command}': {source}")]
    SideChannel {
        command: Command,
        #[source]
        source: io::Error,
    },

    #[error("could not encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ChannelError {
    /// False only for errors after which the channel may still be used.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChannelError::Timeout(_) | ChannelError::Encode(_))
    }
}

/// An authoritative update that a tracker refused. The tracker is left
/// untouched when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("move is outside of the board: {0}")]
    OutOfBounds(String),

    #[error("{0} is already taken")]
    Occupied(String),

    #[error("seat {actual} moved but it is seat {expected}'s turn")]
    NotYourTurn { expected: usize, actual: usize },

    #[error("game is already over")]
    GameOver,

    #[error("malformed move: {0}")]
    Malformed(String),
}
