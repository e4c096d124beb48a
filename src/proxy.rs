//! Host side façade of one bot.

use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::{
    bot_link::BotProcessLink,
    bot_spec::BotSpec,
    configuration::Configuration,
    error::ChannelError,
    limits::Limits,
    message::{Command, Message},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyState {
    Ready,
    /// A turn request timed out: its answer may still arrive and must be
    /// discarded before the next request.
    Stale,
    Dead,
}

/// Synchronous calls to a bot running in its own process.
///
/// A proxy whose bot crashed, closed its output or sent garbage is marked
/// dead: every later call fails fast with [`ChannelError::Closed`] until
/// [`respawn`](Self::respawn) replaces the process.
#[derive(Debug)]
pub struct RemoteBotProxy {
    spec: BotSpec,
    link: Option<BotProcessLink>,
    state: ProxyState,
}

impl RemoteBotProxy {
    #[instrument(skip_all, fields(bot = %spec.name))]
    pub fn spawn(
        spec: BotSpec,
        config: &Configuration,
        limits: &Limits,
    ) -> anyhow::Result<RemoteBotProxy> {
        let link = BotProcessLink::start(&spec, config, limits)?;
        Ok(RemoteBotProxy {
            spec,
            link: Some(link),
            state: ProxyState::Ready,
        })
    }

    /// A proxy for a bot that could not be started. It behaves like a dead
    /// one until respawned.
    pub fn unavailable(spec: BotSpec) -> RemoteBotProxy {
        RemoteBotProxy {
            spec,
            link: None,
            state: ProxyState::Dead,
        }
    }

    /// Tears the current process down, if any, and starts a new one.
    pub fn respawn(&mut self, config: &Configuration, limits: &Limits) -> anyhow::Result<()> {
        self.stop();
        let link = BotProcessLink::start(&self.spec, config, limits)?;
        debug!(bot = %self.spec.name, pid = link.pid(), "bot respawned");
        self.link = Some(link);
        self.state = ProxyState::Ready;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &BotSpec {
        &self.spec
    }

    /// False once the proxy is dead or its process exited.
    pub fn is_usable(&mut self) -> bool {
        self.state != ProxyState::Dead && self.link.as_mut().is_some_and(|l| l.is_alive())
    }

    /// True while the answer to a timed out turn request is outstanding.
    pub fn is_stale(&self) -> bool {
        self.state == ProxyState::Stale
    }

    /// Sends `{new_game: params}`. No answer is expected.
    pub fn new_game(&mut self, params: Value) -> Result<(), ChannelError> {
        self.send(&Message::command(Command::NewGame, params))
    }

    /// Sends `{update: params}`. No answer is expected.
    pub fn update(&mut self, params: Value) -> Result<(), ChannelError> {
        self.send(&Message::command(Command::Update, params))
    }

    /// Sends `{your_turn: {}}` and waits for the move, within the channel
    /// timeout.
    ///
    /// A [`ChannelError::Timeout`] leaves the proxy stale. The next call
    /// first waits, within the move timeout, for the late answer and drops
    /// it; no new request is sent while it is outstanding. Any fatal error
    /// marks the proxy dead.
    pub fn take_turn(&mut self) -> Result<Message, ChannelError> {
        let result = self.exchange();
        match &result {
            Ok(_) => {}
            Err(e @ ChannelError::Timeout(_)) => {
                warn!(bot = %self.spec.name, "{e}");
                self.state = ProxyState::Stale;
            }
            Err(e) => self.mark_dead(e),
        }
        result
    }

    /// Sends `stop` and releases the process. The proxy is dead afterwards.
    pub fn stop(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.terminate() {
                warn!(bot = %self.spec.name, "{e:#}");
            }
        }
        self.state = ProxyState::Dead;
    }

    fn exchange(&mut self) -> Result<Message, ChannelError> {
        let state = self.state;
        let link = self.usable_link()?;
        let channel = link.channel_mut();
        if state == ProxyState::Stale {
            let discarded = channel.drain_stale()?;
            if discarded == 0 {
                let late = channel.receive(None)?;
                debug!(peer = %channel.label(), ?late, "dropped late answer");
            } else {
                debug!(peer = %channel.label(), discarded, "dropped late answers");
            }
        }
        channel.send_command(Command::YourTurn, json!({}))?;
        let response = channel.receive(None)?;
        self.state = ProxyState::Ready;
        Ok(response)
    }

    fn send(&mut self, msg: &Message) -> Result<(), ChannelError> {
        let sent = self.usable_link()?.channel_mut().send(msg);
        if let Err(e) = &sent {
            if e.is_fatal() {
                self.mark_dead(e);
            }
        }
        sent
    }

    fn usable_link(&mut self) -> Result<&mut BotProcessLink, ChannelError> {
        match (&mut self.link, self.state) {
            (Some(link), ProxyState::Ready | ProxyState::Stale) => Ok(link),
            _ => Err(ChannelError::Closed),
        }
    }

    fn mark_dead(&mut self, error: &ChannelError) {
        if self.state != ProxyState::Dead {
            warn!(bot = %self.spec.name, "bot is unusable: {error}");
        }
        self.state = ProxyState::Dead;
    }
}

impl Drop for RemoteBotProxy {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    fn limits(timeout_ms: u64) -> Limits {
        Limits::builder()
            .with_total_cpu_count(1)
            .with_move_timeout(Duration::from_millis(timeout_ms))
            .with_stop_grace(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    #[test]
    fn echo_bot_answers_its_own_request() {
        // `cat` echoes `{"your_turn": {}}`, which is a valid non side-channel answer
        let mut proxy =
            RemoteBotProxy::spawn(BotSpec::new("cat", "cat"), &Configuration::new(), &limits(2000))
                .unwrap();
        let response = proxy.take_turn().unwrap();
        assert!(response.contains(Command::YourTurn));
        assert!(proxy.is_usable());
        proxy.stop();
        assert!(!proxy.is_usable());
        assert!(matches!(proxy.take_turn(), Err(ChannelError::Closed)));
        assert!(matches!(proxy.update(json!({})), Err(ChannelError::Closed)));
    }

    #[test]
    fn silent_bot_times_out_and_stays_usable() {
        let spec = BotSpec::new("sleeper", "sleep").with_args(["10"]);
        let mut proxy = RemoteBotProxy::spawn(spec, &Configuration::new(), &limits(100)).unwrap();
        assert!(matches!(proxy.take_turn(), Err(ChannelError::Timeout(_))));
        assert!(proxy.is_usable());
        assert!(proxy.is_stale());
        assert!(matches!(proxy.take_turn(), Err(ChannelError::Timeout(_))));
        assert!(proxy.is_stale());
    }

    /// Answers its first turn request 300 ms late, every later one at once.
    const LATE_FIRST_ANSWER: &str = r#"first=1
while read -r line; do
  case "$line" in
    *your_turn*)
      if [ "$first" = 1 ]; then
        first=0
        sleep 0.3
        echo '{"late": true}'
      else
        echo '{"guess": 0}'
      fi ;;
  esac
done"#;

    #[test]
    fn late_answer_is_never_taken_for_the_next_move() {
        let spec = BotSpec::new("late", "sh").with_args(["-c", LATE_FIRST_ANSWER]);
        let mut proxy = RemoteBotProxy::spawn(spec, &Configuration::new(), &limits(200)).unwrap();
        assert!(matches!(proxy.take_turn(), Err(ChannelError::Timeout(_))));

        // the late answer lands after the next call started waiting
        let response = proxy.take_turn().unwrap();
        assert_eq!(response.get("guess"), Some(&json!(0)));
        assert!(response.get("late").is_none());
        assert!(!proxy.is_stale());
    }

    #[test]
    fn exited_bot_is_dead_until_respawned() {
        let config = Configuration::new();
        let mut proxy =
            RemoteBotProxy::spawn(BotSpec::new("true", "true"), &config, &limits(2000)).unwrap();
        assert!(matches!(
            proxy.take_turn(),
            Err(ChannelError::PeerTerminated)
        ));
        assert!(!proxy.is_usable());

        proxy.respawn(&config, &limits(2000)).unwrap();
        assert_eq!(proxy.name(), "true");
    }

    #[test]
    fn unavailable_proxy_rejects_calls() {
        let mut proxy = RemoteBotProxy::unavailable(BotSpec::new("ghost", "ghost"));
        assert!(!proxy.is_usable());
        assert!(matches!(proxy.new_game(json!({})), Err(ChannelError::Closed)));
    }
}
