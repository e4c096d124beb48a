use std::{
    fmt::Display,
    hash::Hash,
    path::PathBuf,
    sync::atomic::{AtomicU32, Ordering},
};

use anyhow::Context;

/// How to launch a bot: an executable and its arguments.
#[derive(Debug, Clone)]
pub struct BotSpec {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub id: u32,
}

impl PartialEq for BotSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.id == other.id
    }
}

impl Eq for BotSpec {}

impl Hash for BotSpec {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.id.hash(state);
    }
}

fn next_id() -> u32 {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

impl BotSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> BotSpec {
        BotSpec {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            id: next_id(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> BotSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Splits a command line on whitespace, e.g. `"./target/release/binary-bot --fast"`.
    /// The bot is named after the executable file when `name` is `None`.
    pub fn parse(name: Option<&str>, command_line: &str) -> anyhow::Result<BotSpec> {
        let mut words = command_line.split_whitespace();
        let program = words.next().context("empty bot command")?;
        let name = match name {
            Some(name) => name.to_owned(),
            None => PathBuf::from(program)
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| program.to_owned()),
        };
        Ok(BotSpec::new(name, program).with_args(words))
    }

    pub(crate) fn program_str(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl Display for BotSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, " ({})", self.args.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_line() {
        let spec = BotSpec::parse(None, "  ./bots/faulty-bot silent 3 ").unwrap();
        assert_eq!(spec.name, "faulty-bot");
        assert_eq!(spec.program, PathBuf::from("./bots/faulty-bot"));
        assert_eq!(spec.args, vec!["silent", "3"]);
        assert_eq!(spec.to_string(), "faulty-bot (silent 3)");

        let named = BotSpec::parse(Some("alice"), "python3 -m bot").unwrap();
        assert_eq!(named.name, "alice");
        assert!(BotSpec::parse(None, "   ").is_err());
    }

    #[test]
    fn same_command_twice_gives_distinct_bots() {
        let a = BotSpec::new("bot", "bot");
        let b = BotSpec::new("bot", "bot");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
