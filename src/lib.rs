//! # Colosseum
//!
//! Hosts turn-based games between bots, each running as its own OS process and talking to the
//! host over its standard input/output.
//!
//! It provides:
//! - A line-oriented JSON protocol ([`message`], [`channel`]) where side-channel commands
//!   (`log`, `input`) can be multiplexed with the regular request/response traffic
//! - Process management with optional cgroup confinement ([`bot_link`])
//! - A host-side façade per bot ([`proxy`]) and a game-agnostic match orchestrator
//!   ([`hoster`]) enforcing timeouts, move legality and fair seating
//! - A bot-side runtime ([`bot`]) and two games with reference bots ([`games`])
//!
//! # Documentation Overview
//!
//! - For the match loop, forfeits and score aggregation, see [`GameHoster`](crate::hoster::GameHoster).
//! - For hosting behaviors and resource limits, see
//!   [`Configuration`](crate::configuration::Configuration) and [`limits`].
//! - For implementing new games, check out the [`GameTracker`] and [`Game`] traits.
//! - For writing bots, see [`Bot`](crate::bot::Bot) and [`run_bot`](crate::bot::run_bot).
//!
//! # Wire protocol
//!
//! Every message is one JSON object on one line. Host to bot:
//!
//! | command     | payload              | answer          |
//! |-------------|----------------------|-----------------|
//! | `new_game`  | seat parameters      | none            |
//! | `update`    | accepted move        | none            |
//! | `your_turn` | `{}`                 | a move object   |
//! | `stop`      | `{"code": n}` or `{}`| none, bot exits |
//!
//! Bot to host, at any time before the answer or in the same line:
//!
//! | command | payload                  | host behavior                               |
//! |---------|--------------------------|---------------------------------------------|
//! | `log`   | `{"args": [..], "kwargs": {..}}` | prints the arguments                |
//! | `input` | `{"args": [prompt]}`     | reads a line, replies `{"s": line}`         |
//!
//! # Usage Example
//!
//! ```no_run
//! use colosseum::prelude::*;
//! use colosseum::games::dots_and_boxes::{DnbSettings, DotsAndBoxes};
//!
//! fn main() -> anyhow::Result<()> {
//!     let limits = LimitsBuilder::new()
//!         .with_move_timeout(std::time::Duration::from_millis(500))
//!         .build()?;
//!     let config = Configuration::new().with_verbose(false);
//!     let bots = vec![
//!         BotSpec::parse(Some("first"), "./target/release/dnb-random-bot")?,
//!         BotSpec::parse(Some("second"), "./target/release/dnb-random-bot")?,
//!     ];
//!
//!     let mut hoster = GameHoster::new(DotsAndBoxes::new(), bots, config, limits)?;
//!     for _ in 0..10 {
//!         hoster.start_game(&DnbSettings { n: 5 })?;
//!     }
//!     for (name, avg) in hoster.ranking() {
//!         println!("{name}: {avg:.2}");
//!     }
//!     Ok(())
//! }
//! ```

pub use anyhow;
pub mod bot;
pub mod bot_link;
pub mod bot_spec;
pub mod channel;
pub mod configuration;
pub mod error;
pub mod game_interface;
pub mod games;
pub mod hoster;
pub mod limits;
mod logger;
pub mod message;
mod process;
pub mod proxy;
pub mod seat_shuffler;

pub use game_interface::{Game, GameTracker};

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use colosseum::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bot::{run_bot, Bot, BotContext};
    pub use crate::bot_spec::BotSpec;
    pub use crate::configuration::Configuration;
    pub use crate::error::{ChannelError, MoveError};
    pub use crate::game_interface::{ForfeitPolicy, Game, GameTracker};
    pub use crate::hoster::{ForfeitReason, GameHoster, MatchEnd, MatchReport};
    pub use crate::limits::{Limits, LimitsBuilder};
    pub use crate::message::{Command, Message};
}
