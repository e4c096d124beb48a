//! Resource and timing limits applied to hosted bots.
//!
//! Limits are configured through [`LimitsBuilder`], either programmatically
//! or from environment variables with [`LimitsBuilder::from_env()`]:
//!
//! ```no_run
//! use std::time::Duration;
//! use colosseum::limits::LimitsBuilder;
//!
//! let limits = LimitsBuilder::new()
//!     .with_move_timeout(Duration::from_millis(200))
//!     .with_move_budget(500)
//!     .with_ram_per_bot(512)
//!     .with_cpu_list("0-3")
//!     .build()
//!     .unwrap();
//! ```
//!
//! Memory and cpu limits only apply to bots started inside a cgroup (see
//! [`Configuration::with_contain_bots`](crate::configuration::Configuration::with_contain_bots)),
//! which requires Linux with cgroups v2. Timing limits always apply.

use std::{collections::BTreeSet, env, time::Duration};

use anyhow::{bail, Context};
use tracing::warn;

use crate::channel::DEFAULT_MAX_SIDE_CHANNEL_DRAIN;

const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Clone)]
enum AutoCpus {
    #[default]
    Auto,
    Count(usize),
    List(String),
}

/// Builder for [`Limits`].
///
/// Memory and the number of moves are unlimited by default. A bot has one
/// second to answer a turn request and may run on every physical cpu when
/// contained.
#[derive(Debug, Default, Clone)]
pub struct LimitsBuilder {
    ram_per_bot: Option<usize>,
    cpus: AutoCpus,
    move_timeout: Option<Duration>,
    stop_grace: Option<Duration>,
    move_budget: Option<usize>,
    max_side_channel_drain: Option<usize>,
}

impl LimitsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from environment variables. Unset or unparsable
    /// variables leave the default in place.
    ///
    /// - `MOVE_TIMEOUT_MS` (u64): time a bot has to answer `your_turn`
    /// - `STOP_GRACE_MS` (u64): time a stopped bot has to exit before being killed
    /// - `MOVE_BUDGET` (usize): maximum turn attempts per match
    /// - `MAX_SIDE_CHANNEL_DRAIN` (usize): side-channel only lines tolerated per receive
    /// - `RAM_PER_BOT` (usize): memory limit per contained bot in MB
    /// - `CPU_LIST` (string): cpus for contained bots, e.g. "0-3,6"
    /// - `TOTAL_CPU_COUNT` (usize): use cpus `0..count`, overridden by `CPU_LIST`
    #[must_use]
    pub fn from_env() -> Self {
        fn parse_usize(var: &str) -> Option<usize> {
            env::var(var).ok()?.parse().ok()
        }

        fn parse_duration_millis(var: &str) -> Option<Duration> {
            env::var(var)
                .ok()?
                .parse::<u64>()
                .ok()
                .map(Duration::from_millis)
        }

        let cpus = if let Ok(list) = env::var("CPU_LIST") {
            AutoCpus::List(list)
        } else if let Some(count) = parse_usize("TOTAL_CPU_COUNT") {
            AutoCpus::Count(count)
        } else {
            AutoCpus::Auto
        };

        LimitsBuilder {
            ram_per_bot: parse_usize("RAM_PER_BOT"),
            cpus,
            move_timeout: parse_duration_millis("MOVE_TIMEOUT_MS"),
            stop_grace: parse_duration_millis("STOP_GRACE_MS"),
            move_budget: parse_usize("MOVE_BUDGET"),
            max_side_channel_drain: parse_usize("MAX_SIDE_CHANNEL_DRAIN"),
        }
    }

    /// Time a bot has to answer a turn request, side-channel traffic
    /// included.
    #[must_use]
    pub fn with_move_timeout(self, duration: Duration) -> Self {
        Self {
            move_timeout: Some(duration),
            ..self
        }
    }

    /// Time a bot has to exit on its own after `stop` before it is killed.
    #[must_use]
    pub fn with_stop_grace(self, duration: Duration) -> Self {
        Self {
            stop_grace: Some(duration),
            ..self
        }
    }

    /// Maximum number of turn attempts in one match, forfeits included.
    #[must_use]
    pub fn with_move_budget(self, moves: usize) -> Self {
        Self {
            move_budget: Some(moves),
            ..self
        }
    }

    #[must_use]
    pub fn with_max_side_channel_drain(self, lines: usize) -> Self {
        Self {
            max_side_channel_drain: Some(lines),
            ..self
        }
    }

    /// Memory limit of each contained bot, in MB.
    #[must_use]
    pub fn with_ram_per_bot(self, max: usize) -> Self {
        Self {
            ram_per_bot: Some(max),
            ..self
        }
    }

    /// Cpus contained bots may run on, e.g. `"0-3,6,8"`.
    #[must_use]
    pub fn with_cpu_list(self, cpus: &str) -> Self {
        Self {
            cpus: AutoCpus::List(cpus.to_string()),
            ..self
        }
    }

    /// Contained bots run on cpus `0..max`. Ignored if a cpu list is set.
    #[must_use]
    pub fn with_total_cpu_count(self, max: usize) -> Self {
        if let AutoCpus::List(_) = self.cpus {
            warn!("`with_total_cpu_count` is ignored if `with_cpu_list` is used!");
            self
        } else {
            Self {
                cpus: AutoCpus::Count(max),
                ..self
            }
        }
    }

    /// # Errors
    ///
    /// Fails when the cpu list cannot be parsed, when it selects no cpu, or
    /// when the memory per bot exceeds the memory currently available.
    pub fn build(self) -> anyhow::Result<Limits> {
        let ram_per_bot = match self.ram_per_bot {
            Some(mb) => {
                let mut sys = sysinfo::System::new();
                sys.refresh_memory();
                let available = sys.available_memory() as usize;
                let wanted = mb
                    .checked_mul(1_000_000)
                    .with_context(|| format!("Bot RAM size ({mb}MB) does not fit in memory"))?;
                if available < wanted {
                    bail!(
                        "Bot RAM size ({mb}MB) is greater than available RAM ({}MB)",
                        available / 1_000_000
                    );
                }
                Some(wanted)
            }
            None => None,
        };

        // physical cpus by default, using every logical cpu slows bots down
        let cpus = match self.cpus {
            AutoCpus::Auto => (0..num_cpus::get_physical().min(256) as u16)
                .map(|c| c as u8)
                .collect::<BTreeSet<u8>>(),
            AutoCpus::Count(count) => (0..count.min(256) as u16)
                .map(|c| c as u8)
                .collect::<BTreeSet<u8>>(),
            AutoCpus::List(s) => cpu_list_to_set(&s).context("error parsing cpu list")?,
        };
        if cpus.is_empty() {
            bail!("no cpu available for bots");
        }

        Ok(Limits {
            ram_per_bot,
            cpus,
            move_timeout: self.move_timeout.unwrap_or(DEFAULT_MOVE_TIMEOUT),
            stop_grace: self.stop_grace.unwrap_or(DEFAULT_STOP_GRACE),
            move_budget: self.move_budget,
            max_side_channel_drain: self
                .max_side_channel_drain
                .unwrap_or(DEFAULT_MAX_SIDE_CHANNEL_DRAIN)
                .max(1),
        })
    }
}

fn cpu_list_to_set(s: &str) -> anyhow::Result<BTreeSet<u8>> {
    if s.trim().is_empty() {
        bail!("Empty string");
    }
    let mut set = BTreeSet::new();
    for item in s.split(',').map(str::trim) {
        let parse = |value: &str| -> anyhow::Result<u8> {
            value
                .trim()
                .parse()
                .with_context(|| format!("could not parse {value}"))
        };
        match item.split('-').collect::<Vec<_>>().as_slice() {
            [value] => {
                set.insert(parse(value)?);
            }
            [start, end] => {
                let (start, end) = (parse(start)?, parse(end)?);
                set.extend(start.min(end)..=start.max(end));
            }
            _ => bail!(
                "each comma-separated item must be a number or a range (e.g. '0-3'), got '{item}'"
            ),
        }
    }
    Ok(set)
}

/// Obtained using [`LimitsBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    pub(crate) ram_per_bot: Option<usize>,
    pub(crate) cpus: BTreeSet<u8>,
    pub(crate) move_timeout: Duration,
    pub(crate) stop_grace: Duration,
    pub(crate) move_budget: Option<usize>,
    pub(crate) max_side_channel_drain: usize,
}

impl Limits {
    pub fn builder() -> LimitsBuilder {
        LimitsBuilder::new()
    }

    pub fn move_timeout(&self) -> Duration {
        self.move_timeout
    }

    pub fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    pub fn move_budget(&self) -> Option<usize> {
        self.move_budget
    }

    pub fn max_side_channel_drain(&self) -> usize {
        self.max_side_channel_drain
    }

    /// Memory limit in bytes, 0 when unlimited.
    pub(crate) fn ram_per_bot_bytes(&self) -> i64 {
        self.ram_per_bot.map_or(0, |b| i64::try_from(b).unwrap_or(i64::MAX))
    }

    /// Cpu list in cgroup syntax, e.g. `"0,1,2"`.
    pub(crate) fn cpus_string(&self) -> String {
        self.cpus
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            ram_per_bot: None,
            cpus: BTreeSet::new(),
            move_timeout: DEFAULT_MOVE_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            move_budget: None,
            max_side_channel_drain: DEFAULT_MAX_SIDE_CHANNEL_DRAIN,
        }
    }
}
