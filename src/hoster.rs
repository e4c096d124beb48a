//! Orchestration of matches between bot processes.
//!
//! A [`GameHoster`] owns a roster of [`RemoteBotProxy`], one per bot, kept
//! alive across matches. Every call to [`GameHoster::start_game`] plays one
//! match:
//!
//! 1. dead proxies, and proxies still owing the answer to a timed out
//!    turn, are respawned and seats are shuffled (if configured),
//! 2. a fresh tracker is built and every seat receives `new_game`,
//! 3. the seat whose turn it is gets `your_turn`, its answer is parsed,
//!    checked against the tracker and judged by the game; the resulting
//!    update is applied and broadcast to every bot, mover included,
//! 4. points are mapped back to roster order and added to the totals.
//!
//! A bot that times out, dies, or answers something unusable forfeits
//! according to the [`ForfeitPolicy`]. None of this is an error for the
//! host: a match always ends and the statistics stay well defined.
//!
//! ```no_run
//! use colosseum::{
//!     bot_spec::BotSpec, configuration::Configuration, hoster::GameHoster,
//!     games::guess_the_number::{GtnSettings, GuessTheNumber}, limits::Limits,
//! };
//!
//! let bots = vec![
//!     BotSpec::parse(None, "./target/release/linear-bot").unwrap(),
//!     BotSpec::parse(None, "./target/release/binary-bot").unwrap(),
//! ];
//! let limits = Limits::builder().build().unwrap();
//! let mut hoster =
//!     GameHoster::new(GuessTheNumber::new(), bots, Configuration::from_env(), limits).unwrap();
//! for _ in 0..100 {
//!     hoster.start_game(&GtnSettings { lower: 0, upper: 100 }).unwrap();
//! }
//! println!("{:?}", hoster.ranking());
//! ```

use std::fmt::Display;

use anyhow::{bail, Context};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    bot_spec::BotSpec,
    configuration::Configuration,
    error::ChannelError,
    game_interface::{parse_move, ForfeitPolicy, Game, GameTracker},
    limits::Limits,
    logger::init_logger,
    proxy::RemoteBotProxy,
    seat_shuffler::SeatShuffler,
};

/// Why a seat forfeited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForfeitReason {
    /// No answer within the move timeout.
    Timeout,
    /// The bot process closed its output.
    PeerTerminated,
    /// The answer does not have the shape of a move.
    Malformed,
    /// The move is well formed but not legal.
    Illegal,
    /// The bot broke the protocol (undecodable line, side-channel flood).
    Protocol,
    /// The bot could not be reached at all.
    Unavailable,
}

impl From<&ChannelError> for ForfeitReason {
    fn from(error: &ChannelError) -> Self {
        match error {
            ChannelError::Timeout(_) | ChannelError::Stalled(_) => ForfeitReason::Timeout,
            ChannelError::PeerTerminated => ForfeitReason::PeerTerminated,
            ChannelError::Decode { .. } | ChannelError::DrainLimit(_) => ForfeitReason::Protocol,
            ChannelError::Closed
            | ChannelError::SideChannel { .. }
            | ChannelError::Encode(_)
            | ChannelError::Io(_) => ForfeitReason::Unavailable,
        }
    }
}

impl Display for ForfeitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ForfeitReason::Timeout => "timeout",
            ForfeitReason::PeerTerminated => "terminated",
            ForfeitReason::Malformed => "malformed move",
            ForfeitReason::Illegal => "illegal move",
            ForfeitReason::Protocol => "protocol error",
            ForfeitReason::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEnd {
    /// The tracker reached its terminal state.
    Finished,
    /// A seat forfeited under [`ForfeitPolicy::EndMatch`].
    Forfeit,
    /// Every seat forfeited.
    AllForfeited,
    /// The move budget ran out.
    MoveBudget,
}

/// Outcome of one match. Every per-bot vector is in roster order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    /// Points credited to each bot.
    pub points: Vec<u32>,
    /// Points held by the tracker, before forfeit penalties.
    pub tracker_points: Vec<u32>,
    /// `seating[seat]` is the roster index of the bot in that seat.
    pub seating: Vec<usize>,
    /// Number of accepted moves.
    pub moves: usize,
    /// Roster index and reason of every forfeit, in order.
    pub forfeits: Vec<(usize, ForfeitReason)>,
    pub end: MatchEnd,
}

/// Runs repeated matches of `G` between a fixed roster of bots.
pub struct GameHoster<G: Game> {
    game: G,
    players: SeatShuffler<RemoteBotProxy>,
    config: Configuration,
    limits: Limits,
    forfeit_policy: ForfeitPolicy,
    total_points: Vec<u64>,
    games_played: usize,
    rng: StdRng,
}

impl<G: Game> GameHoster<G> {
    /// Starts one process per bot. A bot that cannot be started is kept in
    /// the roster and forfeits until a respawn succeeds.
    ///
    /// # Errors
    /// Fails on an empty roster, or if file logging was requested and
    /// could not be set up.
    #[instrument(skip_all)]
    pub fn new(
        game: G,
        bots: Vec<BotSpec>,
        config: Configuration,
        limits: Limits,
    ) -> anyhow::Result<GameHoster<G>> {
        if config.log {
            init_logger().context("could not initialise file logging")?;
        }
        trace!(?config, ?limits);
        if bots.is_empty() {
            bail!("no bot to host");
        }

        let proxies = bots
            .into_iter()
            .map(|spec| match RemoteBotProxy::spawn(spec.clone(), &config, &limits) {
                Ok(proxy) => proxy,
                Err(e) => {
                    warn!("could not start {spec}: {e:#}");
                    RemoteBotProxy::unavailable(spec)
                }
            })
            .collect::<Vec<_>>();
        info!(bots = ?proxies.iter().map(RemoteBotProxy::name).collect::<Vec<_>>(), "roster ready");

        Ok(GameHoster {
            forfeit_policy: game.forfeit_policy(),
            game,
            total_points: vec![0; proxies.len()],
            players: SeatShuffler::new(proxies),
            config,
            limits,
            games_played: 0,
            rng: StdRng::from_os_rng(),
        })
    }

    /// Makes seat shuffling reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Overrides the game's default forfeit policy.
    #[must_use]
    pub fn with_forfeit_policy(mut self, policy: ForfeitPolicy) -> Self {
        self.forfeit_policy = policy;
        self
    }

    pub fn game(&self) -> &G {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut G {
        &mut self.game
    }

    /// Bot names in roster order.
    pub fn names(&self) -> Vec<&str> {
        self.players.roster().iter().map(RemoteBotProxy::name).collect()
    }

    /// Plays one match and accumulates its points.
    ///
    /// Seats are always back in roster order when this returns.
    ///
    /// # Errors
    /// Only host-side failures are errors: invalid settings, a tracker
    /// that cannot be built or that does not fit the roster.
    #[instrument(skip_all, fields(game = %self.game.name(), number = self.games_played + 1))]
    pub fn start_game(&mut self, settings: &G::Settings) -> anyhow::Result<MatchReport> {
        self.respawn_unhealthy();
        if self.config.shuffle_seats {
            self.players.shuffle(&mut self.rng);
        }
        let report = self.play(settings);
        self.players.unshuffle();
        let report = report?;

        for (total, points) in self.total_points.iter_mut().zip(&report.points) {
            *total += u64::from(*points);
        }
        self.games_played += 1;
        if self.config.verbose {
            self.print_report(&report);
        }
        info!(?report, "match over");
        Ok(report)
    }

    fn play(&mut self, settings: &G::Settings) -> anyhow::Result<MatchReport> {
        let n = self.players.len();
        let params = self.game.new_match(settings, n)?;
        let mut tracker =
            G::Tracker::from_params(&params).context("could not create game tracker")?;
        if tracker.player_count() != n {
            bail!(
                "{} is played by {} players, roster has {n}",
                self.game.name(),
                tracker.player_count()
            );
        }

        let mut forfeited = vec![false; n];
        let mut forfeits = Vec::new();
        let mut cut_short = None;

        for seat in 0..n {
            let seat_params = serde_json::to_value(G::Tracker::seat_params(&params, seat))
                .context("could not encode seat parameters")?;
            let sent = match self.players.get_mut(seat) {
                Some(proxy) => proxy.new_game(seat_params),
                None => Err(ChannelError::Closed),
            };
            if let Err(e) = sent {
                let reason = ForfeitReason::from(&e);
                self.record_forfeit(seat, reason, &e.to_string(), &mut forfeited, &mut forfeits);
                if self.forfeit_policy == ForfeitPolicy::EndMatch {
                    cut_short = Some(MatchEnd::Forfeit);
                    break;
                }
            }
        }

        let mut attempts = 0;
        let mut moves = 0;
        let end = loop {
            if let Some(end) = cut_short {
                break end;
            }
            if tracker.is_done() {
                break MatchEnd::Finished;
            }
            if forfeited.iter().all(|f| *f) {
                break MatchEnd::AllForfeited;
            }
            if self.limits.move_budget().is_some_and(|budget| attempts >= budget) {
                debug!(attempts, "move budget exhausted");
                break MatchEnd::MoveBudget;
            }

            let seat = tracker.whose_turn();
            if forfeited.get(seat).copied().unwrap_or(true) {
                tracker.skip_turn();
                continue;
            }
            attempts += 1;

            match self.request_move(&tracker, seat) {
                Ok(update) => {
                    if let Err(e) = tracker.update(&update) {
                        self.record_forfeit(
                            seat,
                            ForfeitReason::Illegal,
                            &e.to_string(),
                            &mut forfeited,
                            &mut forfeits,
                        );
                    } else {
                        moves += 1;
                        self.broadcast(&update)?;
                        continue;
                    }
                }
                Err((reason, details)) => {
                    self.record_forfeit(seat, reason, &details, &mut forfeited, &mut forfeits);
                }
            }
            match self.forfeit_policy {
                ForfeitPolicy::EndMatch => cut_short = Some(MatchEnd::Forfeit),
                ForfeitPolicy::ExcludeAndContinue => tracker.skip_turn(),
            }
        };
        trace!("final state:\n{}", tracker.render());

        let tracker_points = tracker.points().to_vec();
        let mut final_points = tracker_points.clone();
        if end == MatchEnd::Forfeit {
            for (points, _) in final_points.iter_mut().zip(&forfeited).filter(|(_, f)| **f) {
                *points = 0;
            }
        }

        Ok(MatchReport {
            points: self.players.unshuffle_values(&final_points),
            tracker_points: self.players.unshuffle_values(&tracker_points),
            seating: self.players.mapping().to_vec(),
            moves,
            forfeits,
            end,
        })
    }

    /// Asks `seat` for a move and turns it into an update, or tells why
    /// the seat forfeits.
    fn request_move(
        &mut self,
        tracker: &G::Tracker,
        seat: usize,
    ) -> Result<<G::Tracker as GameTracker>::Update, (ForfeitReason, String)> {
        let proxy = self
            .players
            .get_mut(seat)
            .ok_or((ForfeitReason::Unavailable, format!("no bot in seat {seat}")))?;
        let response = proxy
            .take_turn()
            .map_err(|e| (ForfeitReason::from(&e), e.to_string()))?;
        trace!(seat, ?response, "answer");
        let mv = parse_move(response).map_err(|e| (ForfeitReason::Malformed, e.to_string()))?;
        tracker
            .validate(&mv)
            .map_err(|e| (ForfeitReason::Illegal, e.to_string()))?;
        self.game
            .judge(tracker, seat, mv)
            .map_err(|e| (ForfeitReason::Illegal, e.to_string()))
    }

    /// Sends an accepted update to every bot. A bot that cannot receive it
    /// will forfeit on its next turn.
    fn broadcast(&mut self, update: &<G::Tracker as GameTracker>::Update) -> anyhow::Result<()> {
        let value = serde_json::to_value(update).context("could not encode update")?;
        for proxy in self.players.roster_mut() {
            if let Err(e) = proxy.update(value.clone()) {
                debug!(bot = proxy.name(), "update not delivered: {e}");
            }
        }
        Ok(())
    }

    fn record_forfeit(
        &self,
        seat: usize,
        reason: ForfeitReason,
        details: &str,
        forfeited: &mut [bool],
        forfeits: &mut Vec<(usize, ForfeitReason)>,
    ) {
        let index = self.players.roster_index(seat).unwrap_or(seat);
        let name = self.players.get(seat).map_or("?", RemoteBotProxy::name);
        warn!(seat, bot = name, %reason, "forfeit: {details}");
        if let Some(flag) = forfeited.get_mut(seat) {
            *flag = true;
        }
        forfeits.push((index, reason));
    }

    /// Replaces dead bots and bots still owing the answer to a timed out turn.
    fn respawn_unhealthy(&mut self) {
        let config = self.config;
        for proxy in self.players.roster_mut() {
            if proxy.is_stale() || !proxy.is_usable() {
                if let Err(e) = proxy.respawn(&config, &self.limits) {
                    warn!(bot = proxy.name(), "could not respawn: {e:#}");
                }
            }
        }
    }

    fn print_report(&self, report: &MatchReport) {
        let seats = report
            .seating
            .iter()
            .map(|&i| self.players.roster()[i].name())
            .collect::<Vec<_>>()
            .join(" vs ");
        let scores = report
            .seating
            .iter()
            .map(|&i| report.points[i].to_string())
            .collect::<Vec<_>>()
            .join("-");
        let errors = report
            .forfeits
            .iter()
            .map(|(i, reason)| format!("{}: {reason}", self.players.roster()[*i].name()))
            .collect::<Vec<_>>()
            .join(", ");
        // clear line, green match, results, red errors
        println!(
            "\x1b[2K\x1b[32mMatch {} ({seats}): \x1b[39m{scores} \x1b[31m{errors}\x1b[39m",
            self.games_played
        );
    }

    /// Sums of points per bot, roster order.
    pub fn total_points(&self) -> &[u64] {
        &self.total_points
    }

    pub fn games_played(&self) -> usize {
        self.games_played
    }

    /// Average points per match, roster order. All zero before any match.
    pub fn avg_points(&self) -> Vec<f64> {
        self.total_points
            .iter()
            .map(|&total| {
                if self.games_played == 0 {
                    0.0
                } else {
                    total as f64 / self.games_played as f64
                }
            })
            .collect()
    }

    /// Bot names with their average points, best first.
    pub fn ranking(&self) -> Vec<(String, f64)> {
        let mut ranking = self
            .names()
            .into_iter()
            .map(str::to_owned)
            .zip(self.avg_points())
            .collect::<Vec<_>>();
        ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranking
    }

    /// Stops every bot. Later matches respawn them.
    pub fn shutdown(&mut self) {
        for proxy in self.players.roster_mut() {
            proxy.stop();
        }
    }
}

impl<G: Game> Drop for GameHoster<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::games::{
        dots_and_boxes::{DnbSettings, DotsAndBoxes},
        guess_the_number::{GtnSettings, GuessTheNumber},
    };

    fn limits() -> Limits {
        Limits::builder()
            .with_total_cpu_count(1)
            .with_move_timeout(Duration::from_secs(2))
            .with_stop_grace(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    fn config() -> Configuration {
        Configuration::new().with_verbose(false)
    }

    // `cat` answers `your_turn` by echoing the earlier `new_game`, which is
    // not a move
    fn echo_bots(n: usize) -> Vec<BotSpec> {
        (0..n).map(|i| BotSpec::new(format!("cat{i}"), "cat")).collect()
    }

    #[test]
    fn forfeit_reasons_from_channel_errors() {
        let timeout = ChannelError::Timeout(Duration::from_millis(1));
        assert_eq!(ForfeitReason::from(&timeout), ForfeitReason::Timeout);
        assert_eq!(
            ForfeitReason::from(&ChannelError::PeerTerminated),
            ForfeitReason::PeerTerminated
        );
        assert_eq!(
            ForfeitReason::from(&ChannelError::DrainLimit(3)),
            ForfeitReason::Protocol
        );
        assert_eq!(
            ForfeitReason::from(&ChannelError::Closed),
            ForfeitReason::Unavailable
        );
    }

    #[test]
    fn every_seat_forfeits_when_nobody_plays() {
        let mut hoster = GameHoster::new(GuessTheNumber::new(), echo_bots(3), config(), limits())
            .unwrap()
            .with_seed(5)
            .with_forfeit_policy(ForfeitPolicy::ExcludeAndContinue);
        let report = hoster.start_game(&GtnSettings { lower: 0, upper: 10 }).unwrap();
        assert_eq!(report.end, MatchEnd::AllForfeited);
        assert_eq!(report.moves, 0);
        assert_eq!(report.forfeits.len(), 3);
        assert!(report
            .forfeits
            .iter()
            .all(|(_, reason)| *reason == ForfeitReason::Malformed));
        assert_eq!(hoster.total_points(), &[0, 0, 0]);
        assert_eq!(hoster.games_played(), 1);
        assert_eq!(hoster.avg_points(), vec![0.0; 3]);
    }

    #[test]
    fn end_match_stops_at_first_forfeit() {
        let mut hoster =
            GameHoster::new(DotsAndBoxes::new(), echo_bots(2), config(), limits()).unwrap();
        let report = hoster.start_game(&DnbSettings { n: 3 }).unwrap();
        assert_eq!(report.end, MatchEnd::Forfeit);
        assert_eq!(report.forfeits.len(), 1);
        assert_eq!(report.points, vec![0, 0]);
    }

    #[test]
    fn roster_size_must_fit_the_game() {
        let mut hoster =
            GameHoster::new(DotsAndBoxes::new(), echo_bots(3), config(), limits()).unwrap();
        assert!(hoster.start_game(&DnbSettings { n: 3 }).is_err());
        assert_eq!(hoster.games_played(), 0);
    }

    #[test]
    fn move_budget_bounds_the_match() {
        let limits = Limits::builder()
            .with_total_cpu_count(1)
            .with_move_timeout(Duration::from_secs(2))
            .with_move_budget(0)
            .build()
            .unwrap();
        let mut hoster =
            GameHoster::new(DotsAndBoxes::new(), echo_bots(2), config(), limits).unwrap();
        let report = hoster.start_game(&DnbSettings { n: 4 }).unwrap();
        assert_eq!(report.end, MatchEnd::MoveBudget);
        assert!(report.forfeits.is_empty());
    }

    #[test]
    fn unstartable_bot_forfeits() {
        let bots = vec![
            BotSpec::new("ghost", "./no-such-bot"),
            BotSpec::new("cat", "cat"),
        ];
        let mut hoster = GameHoster::new(GuessTheNumber::new(), bots, config(), limits())
            .unwrap()
            .with_seed(1);
        let report = hoster.start_game(&GtnSettings { lower: 0, upper: 4 }).unwrap();
        assert!(report
            .forfeits
            .contains(&(0, ForfeitReason::Unavailable)));
        assert_eq!(hoster.names(), vec!["ghost", "cat"]);
        assert_eq!(hoster.ranking().len(), 2);
    }
}
