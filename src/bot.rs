//! Bot side of the protocol.
//!
//! A bot program implements [`Bot`] and hands it to [`run_bot`], which
//! talks to the host over the process's own stdin/stdout:
//!
//! ```no_run
//! use colosseum::{bot::run_bot, games::guess_the_number::BinarySearchBot};
//!
//! fn main() -> anyhow::Result<std::process::ExitCode> {
//!     run_bot(BinarySearchBot)
//! }
//! ```
//!
//! Stdout is the channel: bots must print through [`BotContext::log`].

use std::{
    io::{self, Read, Write},
    process::ExitCode,
};

use anyhow::{bail, Context};
use serde_json::Value;
use tracing::debug;

use crate::{
    channel::MessageChannel,
    error::ChannelError,
    game_interface::GameTracker,
    message::{Command, Message, SideChannelArgs},
};

/// Decision making of a bot. The runtime keeps the tracker replica up to
/// date, implementations only read it.
pub trait Bot {
    type Tracker: GameTracker;

    /// Called once the replica of a new match is built.
    fn new_game(&mut self, _tracker: &Self::Tracker, _ctx: &mut BotContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns the answer to `your_turn`, normally built with
    /// [`GameTracker::make_move`].
    fn take_turn(
        &mut self,
        tracker: &Self::Tracker,
        ctx: &mut BotContext,
    ) -> anyhow::Result<Message>;

    /// Called after `update` was applied to the replica.
    fn update(
        &mut self,
        _tracker: &Self::Tracker,
        _update: &<Self::Tracker as GameTracker>::Update,
        _ctx: &mut BotContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Access to the host console through the side channel.
pub struct BotContext<'a> {
    channel: &'a mut MessageChannel,
}

impl<'a> BotContext<'a> {
    pub fn new(channel: &'a mut MessageChannel) -> Self {
        BotContext { channel }
    }

    /// Prints `text` on the host's stdout.
    pub fn log(&mut self, text: impl Into<String>) -> Result<(), ChannelError> {
        self.log_args(&SideChannelArgs::positional([text.into()]))
    }

    pub fn log_args(&mut self, args: &SideChannelArgs) -> Result<(), ChannelError> {
        self.channel.send_command(Command::Log, args.to_value())
    }

    /// Shows `prompt` on the host's console and returns the line typed
    /// there, without its line terminator.
    pub fn get_input(&mut self, prompt: impl Into<String>) -> anyhow::Result<String> {
        let args = SideChannelArgs::positional([prompt.into()]);
        self.channel.send_command(Command::Input, args.to_value())?;
        let reply = self.channel.receive(None)?;
        match reply.get("s") {
            Some(Value::String(line)) => Ok(line.clone()),
            _ => bail!("expected an input reply, got {reply:?}"),
        }
    }
}

/// Runs `bot` over stdin/stdout until the host sends `stop` or goes away.
///
/// # Errors
/// Fails on protocol errors and when the bot itself fails.
pub fn run_bot<B: Bot>(bot: B) -> anyhow::Result<ExitCode> {
    let channel = MessageChannel::builder()
        .with_label("host")
        .without_side_channel()
        .build(io::stdin(), io::stdout())
        .context("could not start stdin reader")?;
    serve(bot, channel).map(ExitCode::from)
}

/// Serves the host on an arbitrary pair of streams. Returns the exit code
/// requested by `stop`, or 0 when the host closed the stream.
pub fn run_bot_on<B, R, W>(bot: B, reader: R, writer: W) -> anyhow::Result<u8>
where
    B: Bot,
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let channel = MessageChannel::builder()
        .with_label("host")
        .without_side_channel()
        .build(reader, writer)
        .context("could not start reader")?;
    serve(bot, channel)
}

fn serve<B: Bot>(mut bot: B, mut channel: MessageChannel) -> anyhow::Result<u8> {
    let mut tracker: Option<B::Tracker> = None;
    loop {
        let msg = match channel.receive(None) {
            Ok(msg) => msg,
            Err(ChannelError::PeerTerminated) => {
                debug!("host went away");
                channel.close();
                return Ok(0);
            }
            Err(e) => return Err(e).context("could not read host message"),
        };

        for (key, value) in msg {
            match Command::from_name(&key) {
                Some(Command::NewGame) => {
                    let params = serde_json::from_value(value).context("invalid game parameters")?;
                    let replica =
                        B::Tracker::from_params(&params).context("could not create tracker")?;
                    bot.new_game(&replica, &mut BotContext::new(&mut channel))?;
                    tracker = Some(replica);
                }
                Some(Command::Update) => {
                    let update = serde_json::from_value(value).context("invalid update")?;
                    let replica = tracker.as_mut().context("update before new_game")?;
                    replica.update(&update).context("host sent an illegal update")?;
                    bot.update(replica, &update, &mut BotContext::new(&mut channel))?;
                }
                Some(Command::YourTurn) => {
                    let replica = tracker.as_ref().context("turn request before new_game")?;
                    let mv = bot.take_turn(replica, &mut BotContext::new(&mut channel))?;
                    channel.send(&mv)?;
                }
                Some(Command::Stop) => {
                    let code = value
                        .get("code")
                        .and_then(Value::as_u64)
                        .map_or(0, |c| c.min(255) as u8);
                    channel.close();
                    return Ok(code);
                }
                _ => debug!(%key, "ignoring unknown key"),
            }
        }
    }
}
