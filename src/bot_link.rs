//! Ownership of one bot process and the channel bound to its stdio.

use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::{
    bot_spec::BotSpec,
    channel::MessageChannel,
    configuration::Configuration,
    error::ChannelError,
    limits::Limits,
    message::Command,
    process::LimitedProcess,
};

const KILL_TIMEOUT: Duration = Duration::from_millis(200);

/// A running bot process. The host writes to the bot's stdin and reads
/// from its stdout through [`channel`](Self::channel).
///
/// The process is always torn down, either by [`terminate`](Self::terminate)
/// or on drop.
#[derive(Debug)]
pub struct BotProcessLink {
    name: String,
    process: LimitedProcess,
    channel: MessageChannel,
    stop_grace: Duration,
    terminated: bool,
}

impl BotProcessLink {
    /// Spawns the bot described by `spec`.
    ///
    /// With [`Configuration::with_contain_bots`] the process is placed in a
    /// cgroup carrying the memory and cpu limits; if that fails and
    /// uncontained bots are allowed, a plain process is started instead.
    #[instrument(skip_all, fields(bot = %spec.name))]
    pub fn start(
        spec: &BotSpec,
        config: &Configuration,
        limits: &Limits,
    ) -> anyhow::Result<BotProcessLink> {
        let program = spec.program_str();
        let stderr = config.debug_bot_stderr;
        let mut process = if config.contain_bots {
            match LimitedProcess::launch(
                &program,
                &spec.args,
                limits.ram_per_bot_bytes(),
                &limits.cpus_string(),
                stderr,
            ) {
                Ok(process) => process,
                Err(e) if config.allow_uncontained => {
                    warn!("could not contain {}, starting it uncontained: {e:#}", spec.name);
                    LimitedProcess::launch_without_container(&program, &spec.args, stderr)?
                }
                Err(e) => return Err(e),
            }
        } else {
            LimitedProcess::launch_without_container(&program, &spec.args, stderr)?
        };

        let (stdin, stdout) = process
            .take_stdio()
            .context("bot process has no piped stdio")?;
        let channel = MessageChannel::builder()
            .with_label(spec.name.clone())
            .with_timeout(Some(limits.move_timeout()))
            .with_max_side_channel_drain(limits.max_side_channel_drain())
            .build(stdout, stdin)
            .context("could not start channel reader")?;
        debug!(pid = process.id(), contained = process.is_contained(), "bot started");

        Ok(BotProcessLink {
            name: spec.name.clone(),
            process,
            channel,
            stop_grace: limits.stop_grace(),
            terminated: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut MessageChannel {
        &mut self.channel
    }

    /// False once the process exited or the link was terminated.
    pub fn is_alive(&mut self) -> bool {
        !self.terminated && !self.process.has_exited()
    }

    /// Asks the bot to stop, closes the channel and reaps the process.
    ///
    /// A bot that already exited, or that does not exit within the stop
    /// grace period, is not an error. Calling this twice is a no-op.
    ///
    /// # Errors
    /// Fails only if the process could not be killed.
    pub fn terminate(&mut self) -> anyhow::Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;

        if !self.channel.is_closed() {
            match self.channel.send_command(Command::Stop, json!({})) {
                Ok(()) | Err(ChannelError::PeerTerminated) | Err(ChannelError::Closed) => {}
                Err(e) => debug!(bot = %self.name, "could not send stop: {e}"),
            }
            self.channel.close();
        }

        if self.process.wait_for_exit(self.stop_grace).is_none() {
            debug!(bot = %self.name, grace = ?self.stop_grace, "bot ignored stop, killing it");
        }
        self.process
            .try_kill(KILL_TIMEOUT)
            .with_context(|| format!("could not kill bot {}", self.name))
    }
}

impl Drop for BotProcessLink {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("{e:#}");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use serde_json::json;

    use super::*;
    use crate::message::Message;

    fn limits() -> Limits {
        Limits::builder()
            .with_total_cpu_count(1)
            .with_move_timeout(Duration::from_secs(2))
            .with_stop_grace(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    #[test]
    fn echo_process_round_trip() {
        let spec = BotSpec::new("cat", "cat");
        let mut link = BotProcessLink::start(&spec, &Configuration::new(), &limits()).unwrap();
        assert!(link.is_alive());

        let msg = Message::command(Command::NewGame, json!({"n": 3}));
        link.channel_mut().send(&msg).unwrap();
        assert_eq!(link.channel_mut().receive(None).unwrap(), msg);

        link.terminate().unwrap();
        assert!(!link.is_alive());
        assert!(link.channel().is_closed());
        link.terminate().unwrap();
    }

    #[test]
    fn stubborn_process_is_killed_after_grace() {
        let spec = BotSpec::new("sleeper", "sleep").with_args(["10"]);
        let mut link = BotProcessLink::start(&spec, &Configuration::new(), &limits()).unwrap();
        let start = Instant::now();
        link.terminate().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!link.is_alive());
    }

    #[test]
    fn already_dead_process_terminates_cleanly() {
        let spec = BotSpec::new("true", "true");
        let mut link = BotProcessLink::start(&spec, &Configuration::new(), &limits()).unwrap();
        assert!(matches!(
            link.channel_mut().receive(None),
            Err(ChannelError::PeerTerminated)
        ));
        link.terminate().unwrap();
    }

    #[test]
    fn missing_executable_fails_to_start() {
        let spec = BotSpec::new("ghost", "./definitely-not-a-bot");
        assert!(BotProcessLink::start(&spec, &Configuration::new(), &limits()).is_err());
    }
}
