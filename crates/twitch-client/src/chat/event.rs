//! Typed chat events delivered to transport listeners.

use serde::{Deserialize, Serialize};

use super::irc::IrcMessage;

/// NOTICE ids that mean a JOIN was refused.
const JOIN_FAILURE_IDS: &[&str] = &[
    "msg_banned",
    "msg_channel_blocked",
    "msg_channel_suspended",
    "msg_room_not_found",
    "tos_ban",
];

/// NOTICE ids that mean a sent message was rejected.
const MESSAGE_FAILED_IDS: &[&str] = &[
    "msg_duplicate",
    "msg_emoteonly",
    "msg_followersonly",
    "msg_followersonly_followed",
    "msg_followersonly_zero",
    "msg_r9k",
    "msg_rejected",
    "msg_rejected_mandatory",
    "msg_requires_verified_phone_number",
    "msg_slowmode",
    "msg_subsonly",
    "msg_suspended",
    "msg_timedout",
    "msg_verified_email",
];

/// NOTICE id for a rate-limited message.
const RATELIMIT_ID: &str = "msg_ratelimit";

/// Kinds of remote events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatEventKind {
    Action,
    Connect,
    Disconnect,
    Join,
    JoinFailure,
    Message,
    MessageFailed,
    MessageRatelimit,
    Register,
    Whisper,
}

impl ChatEventKind {
    /// Every kind, in a stable order.
    pub const ALL: [ChatEventKind; 10] = [
        Self::Action,
        Self::Connect,
        Self::Disconnect,
        Self::Join,
        Self::JoinFailure,
        Self::Message,
        Self::MessageFailed,
        Self::MessageRatelimit,
        Self::Register,
        Self::Whisper,
    ];

    /// Event name as used in topics (`joinFailure`, `messageRatelimit`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Join => "join",
            Self::JoinFailure => "joinFailure",
            Self::Message => "message",
            Self::MessageFailed => "messageFailed",
            Self::MessageRatelimit => "messageRatelimit",
            Self::Register => "register",
            Self::Whisper => "whisper",
        }
    }
}

impl std::fmt::Display for ChatEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A remote chat event with its callback arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// `/me` message in a channel.
    Action {
        channel: String,
        user: String,
        message: String,
        msg: IrcMessage,
    },
    /// Socket connected.
    Connect,
    /// Socket closed. `manually` is true when the close was requested via `quit`.
    Disconnect {
        manually: bool,
        reason: Option<String>,
    },
    /// A user (possibly the bot) joined a channel.
    Join { channel: String, user: String },
    /// Joining a channel was refused.
    JoinFailure { channel: String, reason: String },
    /// Regular chat message.
    Message {
        channel: String,
        user: String,
        message: String,
        msg: IrcMessage,
    },
    /// A message sent by the bot was rejected.
    MessageFailed { channel: String, reason: String },
    /// A message sent by the bot hit the rate limit.
    MessageRatelimit { channel: String, message: String },
    /// Server accepted the login; messages can now be sent.
    Register,
    /// Direct message.
    Whisper {
        user: String,
        message: String,
        msg: IrcMessage,
    },
}

impl ChatEvent {
    /// The kind of this event.
    pub fn kind(&self) -> ChatEventKind {
        match self {
            Self::Action { .. } => ChatEventKind::Action,
            Self::Connect => ChatEventKind::Connect,
            Self::Disconnect { .. } => ChatEventKind::Disconnect,
            Self::Join { .. } => ChatEventKind::Join,
            Self::JoinFailure { .. } => ChatEventKind::JoinFailure,
            Self::Message { .. } => ChatEventKind::Message,
            Self::MessageFailed { .. } => ChatEventKind::MessageFailed,
            Self::MessageRatelimit { .. } => ChatEventKind::MessageRatelimit,
            Self::Register => ChatEventKind::Register,
            Self::Whisper { .. } => ChatEventKind::Whisper,
        }
    }

    /// Translate a parsed IRC line into at most one chat event.
    ///
    /// Connection-level events (`Connect`, `Disconnect`) are produced by the
    /// client itself, never by this function.
    pub fn from_irc(msg: &IrcMessage) -> Option<Self> {
        match msg.command.as_str() {
            "001" => Some(Self::Register),
            "PRIVMSG" => {
                let channel = msg.param(0)?.to_string();
                let text = msg.param(1)?;
                let user = msg.nick()?.to_string();
                match parse_action(text) {
                    Some(action) => Some(Self::Action {
                        channel,
                        user,
                        message: action.to_string(),
                        msg: msg.clone(),
                    }),
                    None => Some(Self::Message {
                        channel,
                        user,
                        message: text.to_string(),
                        msg: msg.clone(),
                    }),
                }
            }
            "WHISPER" => Some(Self::Whisper {
                user: msg.nick()?.to_string(),
                message: msg.param(1)?.to_string(),
                msg: msg.clone(),
            }),
            "JOIN" => Some(Self::Join {
                channel: msg.param(0)?.to_string(),
                user: msg.nick()?.to_string(),
            }),
            "NOTICE" => Self::from_notice(msg),
            _ => None,
        }
    }

    fn from_notice(msg: &IrcMessage) -> Option<Self> {
        let msg_id = msg.tag("msg-id")?;
        let channel = msg.param(0)?.to_string();
        if msg_id == RATELIMIT_ID {
            return Some(Self::MessageRatelimit {
                channel,
                message: msg.param(1).unwrap_or_default().to_string(),
            });
        }
        if JOIN_FAILURE_IDS.contains(&msg_id) {
            return Some(Self::JoinFailure {
                channel,
                reason: msg_id.to_string(),
            });
        }
        if MESSAGE_FAILED_IDS.contains(&msg_id) {
            return Some(Self::MessageFailed {
                channel,
                reason: msg_id.to_string(),
            });
        }
        None
    }
}

/// Extract the text of a CTCP ACTION (`\x01ACTION text\x01`).
fn parse_action(text: &str) -> Option<&str> {
    text.strip_prefix("\u{1}ACTION ")
        .map(|rest| rest.strip_suffix('\u{1}').unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<ChatEvent> {
        ChatEvent::from_irc(&IrcMessage::parse(line).unwrap())
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ChatEventKind::JoinFailure.name(), "joinFailure");
        assert_eq!(ChatEventKind::MessageRatelimit.name(), "messageRatelimit");
        assert_eq!(ChatEventKind::ALL.len(), 10);
    }

    #[test]
    fn test_privmsg_becomes_message() {
        let event = parse(":alice!alice@alice.tmi.twitch.tv PRIVMSG #chan :hi").unwrap();
        match event {
            ChatEvent::Message {
                channel,
                user,
                message,
                msg,
            } => {
                assert_eq!(channel, "#chan");
                assert_eq!(user, "alice");
                assert_eq!(message, "hi");
                assert_eq!(msg.command, "PRIVMSG");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_ctcp_action() {
        let event =
            parse(":alice!alice@alice.tmi.twitch.tv PRIVMSG #chan :\u{1}ACTION waves\u{1}").unwrap();
        assert_eq!(event.kind(), ChatEventKind::Action);
        if let ChatEvent::Action { message, .. } = event {
            assert_eq!(message, "waves");
        }
    }

    #[test]
    fn test_welcome_is_register() {
        assert_eq!(
            parse(":tmi.twitch.tv 001 bot :Welcome, GLHF!"),
            Some(ChatEvent::Register)
        );
    }

    #[test]
    fn test_join() {
        assert_eq!(
            parse(":bot!bot@bot.tmi.twitch.tv JOIN #chan"),
            Some(ChatEvent::Join {
                channel: "#chan".to_string(),
                user: "bot".to_string()
            })
        );
    }

    #[test]
    fn test_whisper() {
        let event =
            parse(":bob!bob@bob.tmi.twitch.tv WHISPER bot :psst").unwrap();
        assert_eq!(event.kind(), ChatEventKind::Whisper);
    }

    #[test]
    fn test_notice_mapping() {
        assert_eq!(
            parse("@msg-id=msg_ratelimit :tmi.twitch.tv NOTICE #chan :Your message was not sent because you are sending messages too quickly."),
            Some(ChatEvent::MessageRatelimit {
                channel: "#chan".to_string(),
                message: "Your message was not sent because you are sending messages too quickly.".to_string(),
            })
        );
        assert_eq!(
            parse("@msg-id=msg_channel_suspended :tmi.twitch.tv NOTICE #gone :This channel does not exist or has been suspended."),
            Some(ChatEvent::JoinFailure {
                channel: "#gone".to_string(),
                reason: "msg_channel_suspended".to_string(),
            })
        );
        assert_eq!(
            parse("@msg-id=msg_duplicate :tmi.twitch.tv NOTICE #chan :dup"),
            Some(ChatEvent::MessageFailed {
                channel: "#chan".to_string(),
                reason: "msg_duplicate".to_string(),
            })
        );
        assert_eq!(parse("@msg-id=host_on :tmi.twitch.tv NOTICE #chan :x"), None);
    }

    #[test]
    fn test_unhandled_commands() {
        assert_eq!(parse("PING :tmi.twitch.tv"), None);
        assert_eq!(parse(":tmi.twitch.tv CAP * ACK :twitch.tv/tags"), None);
    }
}
