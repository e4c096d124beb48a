//! Line framed message transport with side-channel dispatch.
//!
//! A [`MessageChannel`] owns one readable and one writable stream, each
//! served by a small pump thread. The reader forwards complete lines through
//! an `mpsc` channel, which is what lets [`MessageChannel::receive`] give up
//! after a timeout even though pipe reads themselves cannot time out. The
//! writer drains a bounded queue, so a peer that stops reading its input
//! makes [`MessageChannel::send`] fail with [`ChannelError::Stalled`]
//! instead of blocking the caller.
//!
//! Incoming messages may carry side-channel commands (`log`, `input` by
//! default on the host side). Those are serviced locally, in the order they
//! appear in the line, before anything is returned to the caller. A line
//! made only of side-channel commands is never returned: the channel keeps
//! reading until a real response shows up, the timeout expires or
//! [`max_side_channel_drain`](ChannelBuilder::with_max_side_channel_drain)
//! lines have been consumed.

use std::{
    io::{self, BufRead, BufReader, Read, Write},
    sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError},
    thread,
    time::{Duration, Instant},
};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{
    error::ChannelError,
    message::{Command, Message, SideChannelArgs},
};

/// Local handler of a side-channel command.
///
/// Handlers run synchronously on the receiving thread. A returned message is
/// sent back to the peer before the channel reads on, which keeps
/// request/response ordering intact.
pub trait SideChannelHandler: Send {
    fn handle(&mut self, params: &Value) -> io::Result<Option<Message>>;
}

impl<F> SideChannelHandler for F
where
    F: FnMut(&Value) -> io::Result<Option<Message>> + Send,
{
    fn handle(&mut self, params: &Value) -> io::Result<Option<Message>> {
        self(params)
    }
}

/// Prints `log` arguments on a writer (the host's stdout by default).
pub struct LogHandler<W> {
    out: W,
}

impl<W: Write + Send> LogHandler<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl LogHandler<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> SideChannelHandler for LogHandler<W> {
    fn handle(&mut self, params: &Value) -> io::Result<Option<Message>> {
        let args = SideChannelArgs::from_value(params);
        self.out.write_all(args.render().as_bytes())?;
        self.out.flush()?;
        Ok(None)
    }
}

/// Answers `input` requests with a line read from a local reader (the
/// host's stdin by default). The reply is `{"s": <line>}`.
pub struct InputHandler<R, W> {
    input: R,
    prompt_out: W,
}

impl<R: BufRead + Send, W: Write + Send> InputHandler<R, W> {
    pub fn new(input: R, prompt_out: W) -> Self {
        Self { input, prompt_out }
    }
}

impl InputHandler<BufReader<io::Stdin>, io::Stdout> {
    /// Reads the host's stdin one byte at a time so that several channels
    /// sharing it never swallow each other's lines.
    pub fn stdin() -> Self {
        Self::new(BufReader::with_capacity(1, io::stdin()), io::stdout())
    }
}

impl<R: BufRead + Send, W: Write + Send> SideChannelHandler for InputHandler<R, W> {
    fn handle(&mut self, params: &Value) -> io::Result<Option<Message>> {
        let args = SideChannelArgs::from_value(params);
        if !args.args.is_empty() {
            let mut prompt = args.render();
            // a prompt stays on the line the user types on
            if prompt.ends_with('\n') {
                prompt.pop();
            }
            self.prompt_out.write_all(prompt.as_bytes())?;
            self.prompt_out.flush()?;
        }
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        let line = line.trim_end_matches(['\r', '\n']).to_owned();
        Ok(Some(Message::new().with("s", line)))
    }
}

/// Default upper bound of side-channel only lines consumed by one receive.
pub const DEFAULT_MAX_SIDE_CHANNEL_DRAIN: usize = 1024;

/// Lines that may wait for the writer thread before `send` gives up.
pub const WRITE_QUEUE_CAPACITY: usize = 64;

/// How long `close` waits for queued lines to reach the peer.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Configures and builds a [`MessageChannel`].
///
/// A new builder registers the host side handlers: `log` prints on stdout
/// and `input` reads from stdin. Bots use
/// [`without_side_channel`](Self::without_side_channel).
pub struct ChannelBuilder {
    label: String,
    timeout: Option<Duration>,
    max_side_channel_drain: usize,
    handlers: Vec<(Command, Box<dyn SideChannelHandler>)>,
}

impl ChannelBuilder {
    pub fn new() -> Self {
        Self {
            label: "peer".to_owned(),
            timeout: None,
            max_side_channel_drain: DEFAULT_MAX_SIDE_CHANNEL_DRAIN,
            handlers: Vec::new(),
        }
        .with_handler(Command::Log, LogHandler::stdout())
        .with_handler(Command::Input, InputHandler::stdin())
    }

    /// Name used in traces, usually the bot name.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Default receive timeout. `None` blocks until something arrives.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_side_channel_drain(mut self, max: usize) -> Self {
        self.max_side_channel_drain = max.max(1);
        self
    }

    /// Registers (or replaces) the handler of a side-channel command.
    #[must_use]
    pub fn with_handler(
        mut self,
        command: Command,
        handler: impl SideChannelHandler + 'static,
    ) -> Self {
        self.handlers.retain(|(c, _)| *c != command);
        self.handlers.push((command, Box::new(handler)));
        self
    }

    /// Drops every handler: all keys are handed to the caller.
    #[must_use]
    pub fn without_side_channel(mut self) -> Self {
        self.handlers.clear();
        self
    }

    /// Starts the reader and writer pumps and returns the channel.
    ///
    /// # Errors
    /// Fails if a pump thread cannot be spawned.
    pub fn build<R, W>(self, reader: R, writer: W) -> io::Result<MessageChannel>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let lines = spawn_line_pump(reader, &self.label)?;
        let (queue, flushed) = spawn_write_pump(writer, &self.label)?;
        Ok(MessageChannel {
            label: self.label,
            queue: Some(queue),
            flushed,
            lines,
            handlers: self.handlers,
            default_timeout: self.timeout,
            max_side_channel_drain: self.max_side_channel_drain,
            peer_gone: false,
        })
    }
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_line_pump<R: Read + Send + 'static>(
    reader: R,
    label: &str,
) -> io::Result<Receiver<Result<String, ChannelError>>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("{label}-reader"))
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            loop {
                let mut bytes = Vec::new();
                match reader.read_until(b'\n', &mut bytes) {
                    // end of stream: dropping `tx` tells the receiver
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8(bytes).map_err(|e| ChannelError::Decode {
                            line: String::from_utf8_lossy(e.as_bytes()).trim_end().to_owned(),
                            reason: format!("invalid UTF-8: {}", e.utf8_error()),
                        });
                        let undecodable = line.is_err();
                        if tx.send(line).is_err() || undecodable {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::Io(e)));
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Writes queued lines in order. `flushed` disconnects once the thread is
/// done, after the queue was dropped or the peer stopped accepting data.
fn spawn_write_pump<W: Write + Send + 'static>(
    writer: W,
    label: &str,
) -> io::Result<(SyncSender<String>, Receiver<()>)> {
    let (tx, rx) = mpsc::sync_channel::<String>(WRITE_QUEUE_CAPACITY);
    let (done, flushed) = mpsc::channel::<()>();
    let peer = label.to_owned();
    thread::Builder::new()
        .name(format!("{label}-writer"))
        .spawn(move || {
            let _done = done;
            let mut writer = writer;
            for line in rx {
                if let Err(e) = writer.write_all(line.as_bytes()).and_then(|()| writer.flush()) {
                    debug!(%peer, "write failed: {e}");
                    break;
                }
            }
        })?;
    Ok((tx, flushed))
}

/// One endpoint of a line-oriented JSON conversation.
pub struct MessageChannel {
    label: String,
    queue: Option<SyncSender<String>>,
    flushed: Receiver<()>,
    lines: Receiver<Result<String, ChannelError>>,
    handlers: Vec<(Command, Box<dyn SideChannelHandler>)>,
    default_timeout: Option<Duration>,
    max_side_channel_drain: usize,
    peer_gone: bool,
}

impl MessageChannel {
    pub fn builder() -> ChannelBuilder {
        ChannelBuilder::new()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn set_default_timeout(&mut self, timeout: Option<Duration>) {
        self.default_timeout = timeout;
    }

    /// True once [`close`](Self::close) ran.
    pub fn is_closed(&self) -> bool {
        self.queue.is_none()
    }

    /// True once end of stream was observed on the reading side.
    pub fn peer_gone(&self) -> bool {
        self.peer_gone
    }

    /// Queues `msg` as one line for the writer thread. Never blocks.
    ///
    /// # Errors
    /// - [`ChannelError::Closed`] after [`close`](Self::close).
    /// - [`ChannelError::Stalled`] when the peer left
    ///   [`WRITE_QUEUE_CAPACITY`] lines unread.
    /// - [`ChannelError::PeerTerminated`] when the peer stopped accepting
    ///   data.
    pub fn send(&mut self, msg: &Message) -> Result<(), ChannelError> {
        let line = msg.encode()?;
        let queue = self.queue.as_ref().ok_or(ChannelError::Closed)?;
        trace!(peer = %self.label, line = %line.trim_end(), "send");
        match queue.try_send(line) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(peer = %self.label, "peer does not read its input");
                Err(ChannelError::Stalled(WRITE_QUEUE_CAPACITY))
            }
            Err(TrySendError::Disconnected(_)) => Err(ChannelError::PeerTerminated),
        }
    }

    /// Sends a message holding the single `command`.
    pub fn send_command(
        &mut self,
        command: Command,
        params: impl Into<Value>,
    ) -> Result<(), ChannelError> {
        self.send(&Message::command(command, params))
    }

    /// Blocks until a message with at least one non side-channel key arrives.
    ///
    /// `timeout` overrides the channel default for this call. The window
    /// covers the whole call, side-channel traffic included.
    ///
    /// # Errors
    /// - [`ChannelError::Timeout`] when the window elapsed. The channel
    ///   stays usable.
    /// - [`ChannelError::PeerTerminated`] on end of stream.
    /// - [`ChannelError::Decode`] when a line is not a JSON object.
    /// - [`ChannelError::DrainLimit`] when the peer only sends side-channel
    ///   commands.
    pub fn receive(&mut self, timeout: Option<Duration>) -> Result<Message, ChannelError> {
        let timeout = timeout.or(self.default_timeout);
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut drained = 0;
        loop {
            let line = self.next_line(deadline, timeout)?;
            if !line.trim().is_empty() {
                let payload = self.dispatch(Message::decode(&line)?)?;
                if !payload.is_empty() {
                    return Ok(payload);
                }
            }
            drained += 1;
            if drained >= self.max_side_channel_drain {
                warn!(peer = %self.label, drained, "side-channel flood");
                return Err(ChannelError::DrainLimit(drained));
            }
        }
    }

    /// Consumes every line already buffered without blocking.
    ///
    /// Side-channel commands are serviced as usual; anything else is a late
    /// answer to a request that already timed out and is dropped. Returns
    /// the number of dropped messages.
    pub fn drain_stale(&mut self) -> Result<usize, ChannelError> {
        let mut discarded = 0;
        loop {
            match self.lines.try_recv() {
                Ok(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let payload = self.dispatch(Message::decode(&line)?)?;
                    if !payload.is_empty() {
                        debug!(peer = %self.label, ?payload, "discarding late response");
                        discarded += 1;
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(TryRecvError::Empty) => return Ok(discarded),
                Err(TryRecvError::Disconnected) => {
                    self.peer_gone = true;
                    return Err(ChannelError::PeerTerminated);
                }
            }
        }
    }

    /// Closes the writing end, which the peer sees as end of stream on its
    /// input once the queued lines are written. Waits a bounded time for
    /// that flush. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(queue) = self.queue.take() {
            drop(queue);
            if let Err(RecvTimeoutError::Timeout) = self.flushed.recv_timeout(CLOSE_FLUSH_TIMEOUT) {
                debug!(peer = %self.label, "closed with unwritten lines");
            }
            debug!(peer = %self.label, "channel closed");
        }
    }

    fn next_line(
        &mut self,
        deadline: Option<Instant>,
        timeout: Option<Duration>,
    ) -> Result<String, ChannelError> {
        if self.peer_gone {
            return Err(ChannelError::PeerTerminated);
        }
        let received = match deadline {
            None => self
                .lines
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
            Some(deadline) => self
                .lines
                .recv_timeout(deadline.saturating_duration_since(Instant::now())),
        };
        match received {
            Ok(Ok(line)) => {
                trace!(peer = %self.label, line = %line.trim_end(), "recv");
                Ok(line)
            }
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => {
                Err(ChannelError::Timeout(timeout.unwrap_or_default()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.peer_gone = true;
                Err(ChannelError::PeerTerminated)
            }
        }
    }

    /// Runs the handlers of the side-channel keys of `msg` and returns what
    /// is left.
    fn dispatch(&mut self, msg: Message) -> Result<Message, ChannelError> {
        let handlers = &self.handlers;
        let (side, payload) =
            msg.split_side_channel(|command| handlers.iter().any(|(c, _)| *c == command));

        for (command, params) in side {
            let reply = match self.handlers.iter_mut().find(|(c, _)| *c == command) {
                Some((_, handler)) => handler
                    .handle(&params)
                    .map_err(|source| ChannelError::SideChannel { command, source })?,
                None => None,
            };
            if let Some(reply) = reply {
                self.send(&reply)?;
            }
        }
        Ok(payload)
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .field("peer_gone", &self.peer_gone)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::{Arc, Mutex},
    };

    use serde_json::json;

    use super::*;

    /// Writer whose content stays readable by the test.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Writer of a peer that never reads its input.
    struct Blocked;

    impl Write for Blocked {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            loop {
                thread::sleep(Duration::from_secs(60));
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Reader that produces nothing for a while, then end of stream.
    struct Stall(Duration);

    impl Read for Stall {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(self.0);
            Ok(0)
        }
    }

    fn host_channel(input: &str, log: SharedBuffer, sent: SharedBuffer) -> MessageChannel {
        MessageChannel::builder()
            .with_label("test")
            .with_handler(Command::Log, LogHandler::new(log))
            .with_handler(
                Command::Input,
                InputHandler::new(Cursor::new(b"42\n".to_vec()), io::sink()),
            )
            .build(Cursor::new(input.as_bytes().to_vec()), sent)
            .unwrap()
    }

    #[test]
    fn send_writes_one_line() {
        let sent = SharedBuffer::default();
        let mut channel = host_channel("", SharedBuffer::default(), sent.clone());
        channel.send_command(Command::YourTurn, json!({})).unwrap();
        channel
            .send(&Message::command(Command::Update, json!({"guess": 3})))
            .unwrap();
        channel.close();
        assert_eq!(
            sent.contents(),
            "{\"your_turn\":{}}\n{\"update\":{\"guess\":3}}\n"
        );
    }

    #[test]
    fn multiplexed_log_is_consumed() {
        let log = SharedBuffer::default();
        let mut channel = host_channel(
            "{\"log\": {\"args\": [\"thinking\"]}, \"guess\": 3}\n",
            log.clone(),
            SharedBuffer::default(),
        );
        let msg = channel.receive(None).unwrap();
        assert_eq!(msg, Message::new().with("guess", 3));
        assert!(msg.get("log").is_none());
        assert_eq!(log.contents(), "thinking\n");
    }

    #[test]
    fn side_channel_only_lines_are_skipped() {
        let log = SharedBuffer::default();
        let input = concat!(
            "{\"log\": {\"args\": [\"first\"]}}\n",
            "\n",
            "{\"log\": {\"args\": [\"second\"]}}\n",
            "{\"row\": 1, \"col\": 0}\n",
        );
        let mut channel = host_channel(input, log.clone(), SharedBuffer::default());
        let msg = channel.receive(None).unwrap();
        assert_eq!(msg.keys().collect::<Vec<_>>(), vec!["row", "col"]);
        assert_eq!(log.contents(), "first\nsecond\n");
    }

    #[test]
    fn input_reply_is_queued_before_the_response_is_returned() {
        let sent = SharedBuffer::default();
        let input = "{\"input\": {\"args\": [\"> \"]}}\n{\"guess\": 42}\n";
        let mut channel = host_channel(input, SharedBuffer::default(), sent.clone());
        let msg = channel.receive(None).unwrap();
        assert_eq!(msg.get("guess"), Some(&json!(42)));
        channel.send_command(Command::YourTurn, json!({})).unwrap();
        channel.close();
        assert_eq!(sent.contents(), "{\"s\":\"42\"}\n{\"your_turn\":{}}\n");
    }

    #[test]
    fn end_of_stream_is_peer_terminated() {
        let mut channel = host_channel("\n", SharedBuffer::default(), SharedBuffer::default());
        assert!(matches!(
            channel.receive(None),
            Err(ChannelError::PeerTerminated)
        ));
        assert!(channel.peer_gone());
        assert!(matches!(
            channel.receive(None),
            Err(ChannelError::PeerTerminated)
        ));
    }

    #[test]
    fn malformed_line_is_a_decode_error() {
        let mut channel = host_channel(
            "not json\n",
            SharedBuffer::default(),
            SharedBuffer::default(),
        );
        let err = channel.receive(None).unwrap_err();
        assert!(matches!(err, ChannelError::Decode { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let mut channel = MessageChannel::builder()
            .without_side_channel()
            .build(Cursor::new(b"{\"guess\": \"\xff\"}\n".to_vec()), io::sink())
            .unwrap();
        let err = channel.receive(Some(Duration::from_secs(2))).unwrap_err();
        assert!(matches!(err, ChannelError::Decode { .. }), "{err:?}");
        assert!(err.is_fatal());
    }

    #[test]
    fn unread_peer_stalls_send_without_blocking() {
        let mut channel = MessageChannel::builder()
            .without_side_channel()
            .build(Stall(Duration::from_secs(2)), Blocked)
            .unwrap();
        let start = Instant::now();
        let mut queued = 0;
        let err = loop {
            match channel.send_command(Command::Update, json!({"guess": queued})) {
                Ok(()) => queued += 1,
                Err(e) => break e,
            }
            assert!(queued <= WRITE_QUEUE_CAPACITY + 1);
        };
        assert!(matches!(err, ChannelError::Stalled(WRITE_QUEUE_CAPACITY)));
        assert!(err.is_fatal());
        // the line held by the writer thread is not in the queue
        assert!(queued >= WRITE_QUEUE_CAPACITY);
        channel.close();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn receive_times_out() {
        let mut channel = MessageChannel::builder()
            .without_side_channel()
            .build(Stall(Duration::from_secs(2)), io::sink())
            .unwrap();
        let start = Instant::now();
        let err = channel
            .receive(Some(Duration::from_millis(100)))
            .unwrap_err();
        let elapsed = start.elapsed();
        assert!(matches!(err, ChannelError::Timeout(_)));
        assert!(!err.is_fatal());
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn default_timeout_applies() {
        let mut channel = MessageChannel::builder()
            .without_side_channel()
            .with_timeout(Some(Duration::from_millis(50)))
            .build(Stall(Duration::from_secs(1)), io::sink())
            .unwrap();
        assert!(matches!(
            channel.receive(None),
            Err(ChannelError::Timeout(d)) if d == Duration::from_millis(50)
        ));
    }

    #[test]
    fn side_channel_flood_is_bounded() {
        let input = "{\"log\": {\"args\": [\"spam\"]}}\n".repeat(10);
        let mut channel = MessageChannel::builder()
            .with_handler(Command::Log, LogHandler::new(io::sink()))
            .with_max_side_channel_drain(3)
            .build(Cursor::new(input.into_bytes()), io::sink())
            .unwrap();
        assert!(matches!(
            channel.receive(None),
            Err(ChannelError::DrainLimit(3))
        ));
    }

    #[test]
    fn without_side_channel_returns_every_key() {
        let mut channel = MessageChannel::builder()
            .without_side_channel()
            .build(
                Cursor::new(b"{\"log\": {\"args\": [1]}}\n".to_vec()),
                io::sink(),
            )
            .unwrap();
        let msg = channel.receive(None).unwrap();
        assert!(msg.contains(Command::Log));
    }

    #[test]
    fn closure_handlers_are_accepted() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let mut channel = MessageChannel::builder()
            .with_handler(
                Command::Log,
                move |params: &Value| -> io::Result<Option<Message>> {
                    record.lock().unwrap().push(params.clone());
                    Ok(None)
                },
            )
            .build(
                Cursor::new(b"{\"log\": \"x\", \"ok\": true}\n".to_vec()),
                io::sink(),
            )
            .unwrap();
        let msg = channel.receive(None).unwrap();
        assert_eq!(msg, Message::new().with("ok", true));
        assert_eq!(*seen.lock().unwrap(), vec![json!("x")]);
    }

    #[test]
    fn drain_stale_drops_late_answers() {
        let log = SharedBuffer::default();
        let buffered = "{\"guess\": 1}\n{\"log\": {\"args\": [\"late\"]}}\n{\"guess\": 2}\n";
        // keep the stream open after the buffered lines
        let reader = Cursor::new(buffered.as_bytes().to_vec()).chain(Stall(Duration::from_secs(2)));
        let mut channel = MessageChannel::builder()
            .with_handler(Command::Log, LogHandler::new(log.clone()))
            .build(reader, io::sink())
            .unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(channel.drain_stale().unwrap(), 2);
        assert_eq!(log.contents(), "late\n");
        assert!(matches!(
            channel.receive(Some(Duration::from_millis(20))),
            Err(ChannelError::Timeout(_))
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let mut channel = host_channel("", SharedBuffer::default(), SharedBuffer::default());
        channel.close();
        channel.close();
        assert!(channel.is_closed());
        assert!(matches!(
            channel.send_command(Command::Stop, json!({})),
            Err(ChannelError::Closed)
        ));
    }
}
