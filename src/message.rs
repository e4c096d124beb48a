//! Wire representation of host/bot traffic.
//!
//! A [`Message`] is one JSON object transmitted as a single `\n`-terminated
//! line. Each key is a command name and its value the command parameters.
//! A single line may carry several commands at once, e.g. a bot can emit
//! `{"log": {...}, "guess": 42}` while answering a turn request.
//!
//! Key order is preserved (`serde_json` is built with `preserve_order`), so
//! side-channel commands are serviced in the order the peer wrote them.

use std::fmt::Display;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ChannelError;

/// The closed set of protocol commands.
///
/// Game specific payload keys (`guess`, `row`, ...) are not commands: they
/// are whatever is left in a message once the commands have been extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// bot -> host: print arguments on the host's standard output
    Log,
    /// bot -> host: read a line from the host's standard input
    Input,
    /// host -> bot: a match starts, payload holds the seat parameters
    NewGame,
    /// host -> bot: an authoritative state change
    Update,
    /// host -> bot: the bot must answer with a move
    YourTurn,
    /// host -> bot: the bot must exit
    Stop,
}

impl Command {
    /// Every command, in declaration order.
    pub const ALL: [Command; 6] = [
        Command::Log,
        Command::Input,
        Command::NewGame,
        Command::Update,
        Command::YourTurn,
        Command::Stop,
    ];

    /// Name used on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Command::Log => "log",
            Command::Input => "input",
            Command::NewGame => "new_game",
            Command::Update => "update",
            Command::YourTurn => "your_turn",
            Command::Stop => "stop",
        }
    }

    /// Look a wire name up. Returns `None` for game payload keys.
    pub fn from_name(name: &str) -> Option<Command> {
        Command::ALL.into_iter().find(|c| c.name() == name)
    }

    /// True for commands flowing from the bot to the host outside of the
    /// request/response exchange.
    pub fn is_side_channel(self) -> bool {
        matches!(self, Command::Log | Command::Input)
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An ordered mapping from key to parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message(Map<String, Value>);

impl Message {
    /// Empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Message holding a single command.
    pub fn command(command: Command, params: impl Into<Value>) -> Self {
        Self::new().with(command.name(), params)
    }

    /// Builder flavoured [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a key. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, command: Command) -> bool {
        self.0.contains_key(command.name())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Splits the message into the side-channel commands it carries (in
    /// insertion order) and the remaining payload. The payload keeps the
    /// relative order of its keys.
    pub fn split_side_channel(
        self,
        is_side_channel: impl Fn(Command) -> bool,
    ) -> (Vec<(Command, Value)>, Message) {
        let mut side = Vec::new();
        let mut rest = Map::new();
        for (key, value) in self.0 {
            match Command::from_name(&key) {
                Some(command) if is_side_channel(command) => side.push((command, value)),
                _ => {
                    rest.insert(key, value);
                }
            }
        }
        (side, Message(rest))
    }

    /// Serialises the message as one line, newline included.
    ///
    /// JSON string escaping guarantees that the encoded text holds no raw
    /// newline, so one message is always exactly one line.
    pub fn encode(&self) -> Result<String, ChannelError> {
        let mut line = serde_json::to_string(&self.0).map_err(ChannelError::Encode)?;
        line.push('\n');
        Ok(line)
    }

    /// Parses one received line. Anything but a JSON object is rejected.
    pub fn decode(line: &str) -> Result<Message, ChannelError> {
        let value: Value = serde_json::from_str(line.trim_end()).map_err(|source| {
            ChannelError::Decode {
                line: line.trim_end().to_owned(),
                reason: source.to_string(),
            }
        })?;
        match value {
            Value::Object(map) => Ok(Message(map)),
            other => Err(ChannelError::Decode {
                line: line.trim_end().to_owned(),
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
        }
    }

    /// Interprets the whole message as a typed payload, e.g. a move.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0))
    }

    /// Builds a message from a payload that serialises to a JSON object.
    pub fn from_payload<T: Serialize>(payload: &T) -> Result<Message, serde_json::Error> {
        match serde_json::to_value(payload)? {
            Value::Object(map) => Ok(Message(map)),
            other => Ok(Message::new().with("value", other)),
        }
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Message {
    fn from(map: Map<String, Value>) -> Self {
        Message(map)
    }
}

impl IntoIterator for Message {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parameters of the `log` and `input` side-channel commands.
///
/// Bots send `{"args": [...], "kwargs": {...}}`. A bare string or array is
/// accepted too and treated as the positional arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideChannelArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl SideChannelArgs {
    pub fn from_value(value: &Value) -> SideChannelArgs {
        match value {
            Value::Object(_) => serde_json::from_value(value.clone()).unwrap_or_else(|_| {
                SideChannelArgs {
                    args: vec![value.clone()],
                    kwargs: Map::new(),
                }
            }),
            Value::Array(items) => SideChannelArgs {
                args: items.clone(),
                kwargs: Map::new(),
            },
            Value::Null => SideChannelArgs::default(),
            other => SideChannelArgs {
                args: vec![other.clone()],
                kwargs: Map::new(),
            },
        }
    }

    /// Positional arguments only.
    pub fn positional<I, V>(args: I) -> SideChannelArgs
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        SideChannelArgs {
            args: args.into_iter().map(Into::into).collect(),
            kwargs: Map::new(),
        }
    }

    /// Renders the arguments the way a print statement would: joined by
    /// `sep` (default a space) and followed by `end` (default a newline).
    pub fn render(&self) -> String {
        let sep = self.kwarg_str("sep").unwrap_or(" ");
        let end = self.kwarg_str("end").unwrap_or("\n");
        let mut out = self
            .args
            .iter()
            .map(|arg| match arg {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(sep);
        out.push_str(end);
        out
    }

    fn kwarg_str(&self, key: &str) -> Option<&str> {
        self.kwargs.get(key).and_then(Value::as_str)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn command_names_round_trip() {
        for command in Command::ALL {
            assert_eq!(Command::from_name(command.name()), Some(command));
        }
        assert_eq!(Command::from_name("guess"), None);
    }

    #[test]
    fn encoded_message_is_a_single_line() {
        let msg = Message::command(Command::Log, json!({"args": ["two\nlines"]}));
        let line = msg.encode().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(Message::decode(&line).unwrap(), msg);
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert!(matches!(
            Message::decode("[1, 2]\n"),
            Err(ChannelError::Decode { .. })
        ));
        assert!(matches!(
            Message::decode("{\"guess\": 4"),
            Err(ChannelError::Decode { .. })
        ));
    }

    #[test]
    fn split_keeps_insertion_order() {
        let msg = Message::decode(r#"{"row": 1, "log": {"args": ["a"]}, "col": 2, "input": {}}"#)
            .unwrap();
        let (side, rest) = msg.split_side_channel(Command::is_side_channel);
        let commands = side.iter().map(|(c, _)| *c).collect::<Vec<_>>();
        assert_eq!(commands, vec![Command::Log, Command::Input]);
        assert_eq!(rest.keys().collect::<Vec<_>>(), vec!["row", "col"]);
    }

    #[test]
    fn split_only_extracts_requested_commands() {
        let msg = Message::new()
            .with("log", json!({}))
            .with("your_turn", json!({}));
        let (side, rest) = msg.split_side_channel(|c| c == Command::Log);
        assert_eq!(side.len(), 1);
        assert!(rest.contains(Command::YourTurn));
    }

    #[test]
    fn render_honours_sep_and_end() {
        let args = SideChannelArgs::from_value(&json!({
            "args": ["a", 1, true],
            "kwargs": {"sep": "-", "end": "!"}
        }));
        assert_eq!(args.render(), "a-1-true!");

        let bare = SideChannelArgs::from_value(&json!("hello"));
        assert_eq!(bare.render(), "hello\n");
    }
}
