//! Dots and boxes for two players.
//!
//! A board of size `n` has `n - 1` dots per side, hence `(n - 1)(n - 2)`
//! horizontal lines, as many vertical lines and `(n - 2)²` boxes. Drawing
//! the last side of one or two boxes captures them, scores one point per
//! box and keeps the turn. The match ends when every line is drawn.
//!
//! Horizontal line `(row, col)` joins dots `(row, col)` and `(row, col+1)`,
//! vertical line `(row, col)` joins dots `(row, col)` and `(row+1, col)`.

use anyhow::bail;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    bot::{Bot, BotContext},
    error::MoveError,
    game_interface::{ForfeitPolicy, Game, GameTracker},
    message::Message,
};

const PLAYERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnbParams {
    #[serde(default)]
    pub player_id: Option<usize>,
    pub n: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnbMove {
    pub horizontal: bool,
    pub row: usize,
    pub col: usize,
}

impl DnbMove {
    pub fn new(horizontal: bool, row: usize, col: usize) -> Self {
        DnbMove {
            horizontal,
            row,
            col,
        }
    }
}

impl std::fmt::Display for DnbMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.horizontal { 'h' } else { 'v' };
        write!(f, "{kind}{},{}", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnbUpdate {
    pub player: usize,
    pub horizontal: bool,
    pub row: usize,
    pub col: usize,
}

impl DnbUpdate {
    fn as_move(&self) -> DnbMove {
        DnbMove::new(self.horizontal, self.row, self.col)
    }
}

#[derive(Debug, Clone)]
pub struct DnbTracker {
    player_id: Option<usize>,
    n: usize,
    hlines: Vec<Vec<bool>>,
    vlines: Vec<Vec<bool>>,
    boxes: Vec<Vec<Option<usize>>>,
    moves: usize,
    turn: usize,
    points: Vec<u32>,
    latest: Option<DnbUpdate>,
}

impl DnbTracker {
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn player_id(&self) -> Option<usize> {
        self.player_id
    }

    /// Lines drawn so far.
    pub fn moves(&self) -> usize {
        self.moves
    }

    pub fn total_lines(&self) -> usize {
        2 * (self.n - 1) * (self.n - 2)
    }

    pub fn is_drawn(&self, mv: &DnbMove) -> Option<bool> {
        let lines = if mv.horizontal {
            &self.hlines
        } else {
            &self.vlines
        };
        lines.get(mv.row)?.get(mv.col).copied()
    }

    /// Seat that captured box `(row, col)`, if any.
    pub fn box_owner(&self, row: usize, col: usize) -> Option<usize> {
        *self.boxes.get(row)?.get(col)?
    }

    /// Undrawn sides of box `(row, col)`, `None` outside of the board.
    pub fn edges_left(&self, row: usize, col: usize) -> Option<u8> {
        if row >= self.n - 2 || col >= self.n - 2 {
            return None;
        }
        let drawn = [
            self.hlines[row][col],
            self.hlines[row + 1][col],
            self.vlines[row][col],
            self.vlines[row][col + 1],
        ];
        Some(drawn.iter().filter(|d| !**d).count() as u8)
    }

    /// Every line not drawn yet.
    pub fn legal_moves(&self) -> Vec<DnbMove> {
        let mut moves = Vec::with_capacity(self.total_lines() - self.moves);
        for (horizontal, lines) in [(true, &self.hlines), (false, &self.vlines)] {
            for (row, line) in lines.iter().enumerate() {
                for (col, drawn) in line.iter().enumerate() {
                    if !drawn {
                        moves.push(DnbMove::new(horizontal, row, col));
                    }
                }
            }
        }
        moves
    }

    /// Boxes that `mv` may close.
    fn adjacent_boxes(&self, mv: &DnbMove) -> impl Iterator<Item = (usize, usize)> {
        let side = self.n - 2;
        let (row, col) = (mv.row, mv.col);
        let candidates = if mv.horizontal {
            [Some((row, col)), row.checked_sub(1).map(|r| (r, col))]
        } else {
            [Some((row, col)), col.checked_sub(1).map(|c| (row, c))]
        };
        candidates
            .into_iter()
            .flatten()
            .filter(move |(r, c)| *r < side && *c < side)
    }
}

impl GameTracker for DnbTracker {
    type Params = DnbParams;
    type Move = DnbMove;
    type Update = DnbUpdate;

    fn from_params(params: &DnbParams) -> anyhow::Result<Self> {
        let n = params.n;
        if n < 2 {
            bail!("n must be greater than 1 (given {n})");
        }
        Ok(DnbTracker {
            player_id: params.player_id,
            n,
            hlines: vec![vec![false; n - 2]; n - 1],
            vlines: vec![vec![false; n - 1]; n - 2],
            boxes: vec![vec![None; n - 2]; n - 2],
            moves: 0,
            turn: 0,
            points: vec![0; PLAYERS],
            latest: None,
        })
    }

    fn seat_params(params: &DnbParams, seat: usize) -> DnbParams {
        DnbParams {
            player_id: Some(seat),
            n: params.n,
        }
    }

    fn player_count(&self) -> usize {
        PLAYERS
    }

    fn points(&self) -> &[u32] {
        &self.points
    }

    fn whose_turn(&self) -> usize {
        self.turn
    }

    fn validate(&self, mv: &DnbMove) -> Result<(), MoveError> {
        if self.is_done() {
            return Err(MoveError::GameOver);
        }
        match self.is_drawn(mv) {
            None => Err(MoveError::OutOfBounds(mv.to_string())),
            Some(true) => Err(MoveError::Occupied(mv.to_string())),
            Some(false) => Ok(()),
        }
    }

    fn update(&mut self, update: &DnbUpdate) -> Result<(), MoveError> {
        if update.player >= PLAYERS {
            return Err(MoveError::OutOfBounds(format!("player {}", update.player)));
        }
        let mv = update.as_move();
        self.validate(&mv)?;

        // seats skipped by the host are not broadcast: the mover is authoritative
        self.turn = update.player;

        if mv.horizontal {
            self.hlines[mv.row][mv.col] = true;
        } else {
            self.vlines[mv.row][mv.col] = true;
        }
        let captured = self
            .adjacent_boxes(&mv)
            .filter(|&(r, c)| self.edges_left(r, c) == Some(0))
            .collect::<Vec<_>>();
        for &(r, c) in &captured {
            self.boxes[r][c] = Some(update.player);
        }
        self.points[update.player] += captured.len() as u32;
        if captured.is_empty() {
            self.skip_turn();
        }
        self.moves += 1;
        self.latest = Some(*update);
        Ok(())
    }

    fn skip_turn(&mut self) {
        self.turn = (self.turn + 1) % PLAYERS;
    }

    fn is_done(&self) -> bool {
        self.moves >= self.total_lines()
    }

    fn latest_update(&self) -> Option<&DnbUpdate> {
        self.latest.as_ref()
    }

    fn render(&self) -> String {
        const HLINE: &str = "---";
        const VLINE: &str = " | ";
        const DOT: &str = " • ";
        const BLANK: &str = "   ";
        let pick = |drawn: bool, line| if drawn { line } else { BLANK };

        let dot_row = |row: &Vec<bool>| {
            let joined = row
                .iter()
                .map(|d| pick(*d, HLINE))
                .collect::<Vec<_>>()
                .join(DOT);
            format!("{DOT}{joined}{DOT}")
        };

        let mut lines = vec![dot_row(&self.hlines[0])];
        for (r, (vline, boxes)) in self.vlines.iter().zip(&self.boxes).enumerate() {
            let mut s = String::new();
            for (c, drawn) in vline.iter().enumerate() {
                s.push_str(pick(*drawn, VLINE));
                match boxes.get(c) {
                    Some(Some(owner)) => s.push_str(&format!(" {owner} ")),
                    Some(None) => s.push_str(BLANK),
                    None => {}
                }
            }
            lines.push(s);
            lines.push(dot_row(&self.hlines[r + 1]));
        }

        let scores = self
            .points
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join("-");
        let status = format!("| Score: {scores}   Player {}'s turn |", self.turn);
        let bars = format!("+{}+", "-".repeat(status.chars().count() - 2));
        lines.extend([bars.clone(), status, bars]);
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnbSettings {
    pub n: usize,
}

impl Default for DnbSettings {
    fn default() -> Self {
        DnbSettings { n: 5 }
    }
}

/// Host rules. The board holds no hidden information, so a legal move is
/// applied as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct DotsAndBoxes;

impl DotsAndBoxes {
    pub fn new() -> Self {
        DotsAndBoxes
    }
}

impl Game for DotsAndBoxes {
    type Tracker = DnbTracker;
    type Settings = DnbSettings;

    fn name(&self) -> &str {
        "dots and boxes"
    }

    fn forfeit_policy(&self) -> ForfeitPolicy {
        ForfeitPolicy::EndMatch
    }

    fn new_match(&mut self, settings: &DnbSettings, player_count: usize) -> anyhow::Result<DnbParams> {
        if player_count != PLAYERS {
            bail!("dots and boxes is played by {PLAYERS} players, got {player_count}");
        }
        if settings.n < 2 {
            bail!("n must be greater than 1 (given {})", settings.n);
        }
        Ok(DnbParams {
            player_id: None,
            n: settings.n,
        })
    }

    fn judge(&mut self, _tracker: &DnbTracker, seat: usize, mv: DnbMove) -> Result<DnbUpdate, MoveError> {
        Ok(DnbUpdate {
            player: seat,
            horizontal: mv.horizontal,
            row: mv.row,
            col: mv.col,
        })
    }
}

/// Plays uniformly random legal moves: every line is listed in random
/// order at the start of a match and lines drawn by anyone are pruned.
#[derive(Debug)]
pub struct RandomDnbBot {
    rng: StdRng,
    moves: Vec<DnbMove>,
}

impl RandomDnbBot {
    pub fn new() -> Self {
        RandomDnbBot {
            rng: StdRng::from_os_rng(),
            moves: Vec::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        RandomDnbBot {
            rng: StdRng::seed_from_u64(seed),
            moves: Vec::new(),
        }
    }
}

impl Default for RandomDnbBot {
    fn default() -> Self {
        Self::new()
    }
}

impl Bot for RandomDnbBot {
    type Tracker = DnbTracker;

    fn new_game(&mut self, tracker: &DnbTracker, _ctx: &mut BotContext) -> anyhow::Result<()> {
        self.moves = tracker.legal_moves();
        self.moves.shuffle(&mut self.rng);
        Ok(())
    }

    fn take_turn(&mut self, tracker: &DnbTracker, _ctx: &mut BotContext) -> anyhow::Result<Message> {
        while let Some(mv) = self.moves.pop() {
            if tracker.check_move(&mv) {
                return Ok(tracker.make_move(mv)?);
            }
        }
        bail!("no legal move left")
    }

    fn update(&mut self, _tracker: &DnbTracker, update: &DnbUpdate, _ctx: &mut BotContext) -> anyhow::Result<()> {
        let drawn = update.as_move();
        self.moves.retain(|mv| *mv != drawn);
        Ok(())
    }
}
