use std::process::ExitCode;

use colosseum::{bot::run_bot, games::guess_the_number::BinarySearchBot};

fn main() -> anyhow::Result<ExitCode> {
    run_bot(BinarySearchBot)
}
