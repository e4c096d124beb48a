//! Dots and boxes bot that plays random legal moves for a while, then
//! misbehaves. Used to exercise the host's forfeit paths.
//!
//! Usage: `faulty-bot <missing-field|silent|crash> [after]`

use std::{process::ExitCode, thread, time::Duration};

use anyhow::{bail, Context};
use colosseum::{
    bot::{run_bot, Bot, BotContext},
    games::dots_and_boxes::{DnbTracker, DnbUpdate, RandomDnbBot},
    message::Message,
};

#[derive(Debug, Clone, Copy)]
enum Fault {
    /// Answers with a move lacking its `col` field.
    MissingField,
    /// Never answers.
    Silent,
    /// Exits without answering.
    Crash,
}

struct FaultyBot {
    inner: RandomDnbBot,
    fault: Fault,
    /// Valid turns left before the fault shows.
    healthy_turns: usize,
}

impl Bot for FaultyBot {
    type Tracker = DnbTracker;

    fn new_game(&mut self, tracker: &DnbTracker, ctx: &mut BotContext) -> anyhow::Result<()> {
        self.inner.new_game(tracker, ctx)
    }

    fn take_turn(&mut self, tracker: &DnbTracker, ctx: &mut BotContext) -> anyhow::Result<Message> {
        if self.healthy_turns > 0 {
            self.healthy_turns -= 1;
            return self.inner.take_turn(tracker, ctx);
        }
        match self.fault {
            Fault::MissingField => Ok(Message::new().with("horizontal", true).with("row", 0)),
            Fault::Silent => loop {
                thread::sleep(Duration::from_secs(3600));
            },
            Fault::Crash => bail!("crashing on purpose"),
        }
    }

    fn update(&mut self, tracker: &DnbTracker, update: &DnbUpdate, ctx: &mut BotContext) -> anyhow::Result<()> {
        self.inner.update(tracker, update, ctx)
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let mut args = std::env::args().skip(1);
    let fault = match args.next().as_deref() {
        Some("missing-field") => Fault::MissingField,
        Some("silent") => Fault::Silent,
        Some("crash") => Fault::Crash,
        other => bail!("usage: faulty-bot <missing-field|silent|crash> [after], got {other:?}"),
    };
    let healthy_turns = match args.next() {
        Some(after) => after.parse().context("`after` must be a number")?,
        None => 0,
    };
    run_bot(FaultyBot {
        inner: RandomDnbBot::new(),
        fault,
        healthy_turns,
    })
}
