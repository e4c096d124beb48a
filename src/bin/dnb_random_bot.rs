//! Random dots and boxes player. An optional first argument seeds it.

use std::process::ExitCode;

use anyhow::Context;
use colosseum::{bot::run_bot, games::dots_and_boxes::RandomDnbBot};

fn main() -> anyhow::Result<ExitCode> {
    let bot = match std::env::args().nth(1) {
        Some(seed) => RandomDnbBot::with_seed(seed.parse().context("seed must be a number")?),
        None => RandomDnbBot::new(),
    };
    run_bot(bot)
}
