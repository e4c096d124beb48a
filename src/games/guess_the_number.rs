//! Players take turns guessing a secret number in `[lower, upper)`. After
//! each guess the host tells everyone whether the secret is higher; the
//! first correct guess scores one point and ends the match.

use anyhow::{bail, Context};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    bot::{Bot, BotContext},
    error::MoveError,
    game_interface::{in_bounds, ForfeitPolicy, Game, GameTracker},
    message::Message,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GtnParams {
    /// Seat of the receiving bot, `None` on the host.
    #[serde(default)]
    pub player_id: Option<usize>,
    pub n_players: usize,
    /// Inclusive.
    pub lower: i64,
    /// Exclusive.
    pub upper: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GtnMove {
    pub guess: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GtnUpdate {
    pub player: usize,
    pub guess: i64,
    /// The secret is greater than `guess`.
    pub higher: bool,
    pub correct: bool,
}

#[derive(Debug, Clone)]
pub struct GtnTracker {
    player_id: Option<usize>,
    lower: i64,
    upper: i64,
    turn: usize,
    points: Vec<u32>,
    done: bool,
    guesses: usize,
    latest: Option<GtnUpdate>,
}

impl GtnTracker {
    /// Smallest value the secret can still be.
    pub fn lower(&self) -> i64 {
        self.lower
    }

    /// The secret is strictly below this.
    pub fn upper(&self) -> i64 {
        self.upper
    }

    pub fn player_id(&self) -> Option<usize> {
        self.player_id
    }

    /// Accepted guesses so far.
    pub fn guesses(&self) -> usize {
        self.guesses
    }
}

impl GameTracker for GtnTracker {
    type Params = GtnParams;
    type Move = GtnMove;
    type Update = GtnUpdate;

    fn from_params(params: &GtnParams) -> anyhow::Result<Self> {
        if params.n_players == 0 {
            bail!("guess the number needs at least one player");
        }
        if params.lower >= params.upper {
            bail!("empty range [{}, {})", params.lower, params.upper);
        }
        Ok(GtnTracker {
            player_id: params.player_id,
            lower: params.lower,
            upper: params.upper,
            turn: 0,
            points: vec![0; params.n_players],
            done: false,
            guesses: 0,
            latest: None,
        })
    }

    fn seat_params(params: &GtnParams, seat: usize) -> GtnParams {
        GtnParams {
            player_id: Some(seat),
            ..params.clone()
        }
    }

    fn player_count(&self) -> usize {
        self.points.len()
    }

    fn points(&self) -> &[u32] {
        &self.points
    }

    fn whose_turn(&self) -> usize {
        self.turn
    }

    fn validate(&self, mv: &GtnMove) -> Result<(), MoveError> {
        if self.done {
            return Err(MoveError::GameOver);
        }
        if !in_bounds(mv.guess, self.lower, self.upper) {
            return Err(MoveError::OutOfBounds(format!(
                "{} is not in [{}, {})",
                mv.guess, self.lower, self.upper
            )));
        }
        Ok(())
    }

    fn update(&mut self, update: &GtnUpdate) -> Result<(), MoveError> {
        if update.player >= self.points.len() {
            return Err(MoveError::OutOfBounds(format!("player {}", update.player)));
        }
        self.validate(&GtnMove {
            guess: update.guess,
        })?;
        if update.correct && update.higher {
            return Err(MoveError::Malformed(
                "a correct guess cannot be lower than the secret".to_owned(),
            ));
        }

        // seats skipped by the host are not broadcast: the mover is authoritative
        self.turn = update.player;
        if update.correct {
            self.lower = update.guess;
            self.upper = update.guess + 1;
            self.points[update.player] += 1;
            self.done = true;
        } else {
            if update.higher {
                self.lower = update.guess + 1;
            } else {
                self.upper = update.guess;
            }
            self.skip_turn();
        }
        self.guesses += 1;
        self.latest = Some(*update);
        Ok(())
    }

    fn skip_turn(&mut self) {
        self.turn = (self.turn + 1) % self.points.len();
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn latest_update(&self) -> Option<&GtnUpdate> {
        self.latest.as_ref()
    }

    fn render(&self) -> String {
        if self.done {
            format!("The number was {}. Points: {:?}", self.lower, self.points)
        } else {
            format!(
                "The number is in [{}, {}). Player {}'s turn",
                self.lower, self.upper, self.turn
            )
        }
    }
}

/// Settings of one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GtnSettings {
    pub lower: i64,
    pub upper: i64,
}

impl Default for GtnSettings {
    fn default() -> Self {
        GtnSettings {
            lower: 0,
            upper: 100,
        }
    }
}

/// Host rules: draws the secret and answers guesses.
#[derive(Debug)]
pub struct GuessTheNumber {
    rng: StdRng,
    secret: i64,
}

impl GuessTheNumber {
    pub fn new() -> Self {
        GuessTheNumber {
            rng: StdRng::from_os_rng(),
            secret: 0,
        }
    }

    /// Same sequence of secrets on every run.
    pub fn with_seed(seed: u64) -> Self {
        GuessTheNumber {
            rng: StdRng::seed_from_u64(seed),
            secret: 0,
        }
    }

    /// Secret of the current match.
    pub fn secret(&self) -> i64 {
        self.secret
    }
}

impl Default for GuessTheNumber {
    fn default() -> Self {
        Self::new()
    }
}

impl Game for GuessTheNumber {
    type Tracker = GtnTracker;
    type Settings = GtnSettings;

    fn name(&self) -> &str {
        "guess the number"
    }

    fn forfeit_policy(&self) -> ForfeitPolicy {
        ForfeitPolicy::ExcludeAndContinue
    }

    fn new_match(&mut self, settings: &GtnSettings, player_count: usize) -> anyhow::Result<GtnParams> {
        let params = GtnParams {
            player_id: None,
            n_players: player_count,
            lower: settings.lower,
            upper: settings.upper,
        };
        // validates the settings before drawing
        GtnTracker::from_params(&params).context("invalid settings")?;
        self.secret = self.rng.random_range(settings.lower..settings.upper);
        Ok(params)
    }

    fn judge(&mut self, _tracker: &GtnTracker, seat: usize, mv: GtnMove) -> Result<GtnUpdate, MoveError> {
        Ok(GtnUpdate {
            player: seat,
            guess: mv.guess,
            higher: mv.guess < self.secret,
            correct: mv.guess == self.secret,
        })
    }
}

/// Always guesses the smallest possible value.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearBot;

impl Bot for LinearBot {
    type Tracker = GtnTracker;

    fn take_turn(&mut self, tracker: &GtnTracker, _ctx: &mut BotContext) -> anyhow::Result<Message> {
        Ok(tracker.make_move(GtnMove {
            guess: tracker.lower(),
        })?)
    }
}

/// Middle of `[lower, upper)`, rounded down. Exact for any pair of `i64`.
fn midpoint(lower: i64, upper: i64) -> i64 {
    let mid = (i128::from(lower) + i128::from(upper)).div_euclid(2);
    // lies between the two bounds
    mid as i64
}

/// Guesses the middle of the remaining range.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinarySearchBot;

impl Bot for BinarySearchBot {
    type Tracker = GtnTracker;

    fn take_turn(&mut self, tracker: &GtnTracker, _ctx: &mut BotContext) -> anyhow::Result<Message> {
        Ok(tracker.make_move(GtnMove { guess: midpoint(tracker.lower(), tracker.upper()) })?)
    }
}

/// Asks the person at the host console.
#[derive(Debug, Default, Clone, Copy)]
pub struct HumanBot;

impl Bot for HumanBot {
    type Tracker = GtnTracker;

    fn new_game(&mut self, tracker: &GtnTracker, ctx: &mut BotContext) -> anyhow::Result<()> {
        ctx.log(format!(
            "New game! You are player {}",
            tracker.player_id().map_or("?".to_owned(), |p| p.to_string())
        ))?;
        Ok(())
    }

    fn take_turn(&mut self, tracker: &GtnTracker, ctx: &mut BotContext) -> anyhow::Result<Message> {
        ctx.log(tracker.render())?;
        loop {
            let line = ctx.get_input("Your guess: ")?;
            match line.trim().parse::<i64>() {
                Ok(guess) => match tracker.make_move(GtnMove { guess }) {
                    Ok(mv) => return Ok(mv),
                    Err(e) => ctx.log(e.to_string())?,
                },
                Err(_) => ctx.log(format!("'{}' is not a number", line.trim()))?,
            }
        }
    }

    fn update(&mut self, _tracker: &GtnTracker, update: &GtnUpdate, ctx: &mut BotContext) -> anyhow::Result<()> {
        let verdict = if update.correct {
            "correct!"
        } else if update.higher {
            "higher"
        } else {
            "lower"
        };
        ctx.log(format!("Player {} guessed {}: {verdict}", update.player, update.guess))?;
        Ok(())
    }
}
