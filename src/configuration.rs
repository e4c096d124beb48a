//! Config for the hoster behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional and case-insensitive. Set the value to `"true"` to enable a flag,
//! anything else disables it.
//!
//! - `COLOSSEUM_VERBOSE`: print match progress (default: `true`)
//! - `COLOSSEUM_LOG`: enable logging to a file (default: `false`)
//! - `COLOSSEUM_SHUFFLE_SEATS`: shuffle seats before every match (default: `true`)
//! - `COLOSSEUM_CONTAIN_BOTS`: run every bot inside its own cgroup (default: `false`)
//! - `COLOSSEUM_ALLOW_UNCONTAINED`: start a plain process when containment fails (default: `true`)
//! - `COLOSSEUM_DEBUG_BOT_STDERR`: forward bot stderr to the host stderr (default: `false`)

/// Configuration for hoster behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) shuffle_seats: bool,
    pub(crate) contain_bots: bool,
    pub(crate) allow_uncontained: bool,
    pub(crate) debug_bot_stderr: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default match progress is printed, nothing is logged to a file, seats are
    /// shuffled, and bots run as plain processes with their stderr discarded.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            shuffle_seats: true,
            contain_bots: false,
            allow_uncontained: true,
            debug_bot_stderr: false,
        }
    }

    /// Create configuration from the `COLOSSEUM_*` environment variables.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        Self {
            verbose: get_env_flag("COLOSSEUM_VERBOSE", true),
            log: get_env_flag("COLOSSEUM_LOG", false),
            shuffle_seats: get_env_flag("COLOSSEUM_SHUFFLE_SEATS", true),
            contain_bots: get_env_flag("COLOSSEUM_CONTAIN_BOTS", false),
            allow_uncontained: get_env_flag("COLOSSEUM_ALLOW_UNCONTAINED", true),
            debug_bot_stderr: get_env_flag("COLOSSEUM_DEBUG_BOT_STDERR", false),
        }
    }

    /// Enable or disable progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable seat shuffling.
    pub fn with_shuffle_seats(mut self, value: bool) -> Self {
        self.shuffle_seats = value;
        self
    }

    /// Run bots inside a cgroup so that memory and cpu [`Limits`](crate::limits::Limits)
    /// apply. Linux only.
    pub fn with_contain_bots(mut self, value: bool) -> Self {
        self.contain_bots = value;
        self
    }

    /// When containment fails, start the bot as a plain process instead of failing.
    pub fn with_allow_uncontained(mut self, value: bool) -> Self {
        self.allow_uncontained = value;
        self
    }

    /// Enable or disable bot stderr output (debug purposes only).
    pub fn with_debug_bot_stderr(mut self, value: bool) -> Self {
        self.debug_bot_stderr = value;
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn shuffle_seats(&self) -> bool {
        self.shuffle_seats
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Configuration::new()
            .with_verbose(false)
            .with_shuffle_seats(false)
            .with_contain_bots(true)
            .with_allow_uncontained(false);
        assert!(!config.verbose());
        assert!(!config.shuffle_seats());
        assert!(config.contain_bots);
        assert!(!config.allow_uncontained);
        assert!(!config.log);
        assert_eq!(Configuration::default(), Configuration::new());
    }
}
