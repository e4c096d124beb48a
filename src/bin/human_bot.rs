//! Lets the person at the host console play guess the number.

use std::process::ExitCode;

use colosseum::{bot::run_bot, games::guess_the_number::HumanBot};

fn main() -> anyhow::Result<ExitCode> {
    run_bot(HumanBot)
}
