//! Chat event to bus topic translation.

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use twitch_client::ChatEvent;

use crate::bus::Topic;

/// Topic and payload for `event`. Argument order follows the event fields.
pub fn translate(event: &ChatEvent) -> (Topic, Value) {
    let topic = Topic::chat(event.kind().name());
    let payload = match event {
        ChatEvent::Action {
            channel,
            user,
            message,
            msg,
        }
        | ChatEvent::Message {
            channel,
            user,
            message,
            msg,
        } => json!({
            "channel": channel,
            "user": user,
            "message": message,
            "msg": msg.to_value(),
        }),
        ChatEvent::Connect | ChatEvent::Register => Value::Object(Map::new()),
        ChatEvent::Disconnect { manually, reason } => {
            let mut payload = Map::new();
            payload.insert("manually".to_string(), Value::Bool(*manually));
            if let Some(reason) = reason {
                payload.insert("reason".to_string(), Value::String(reason.clone()));
            }
            Value::Object(payload)
        }
        ChatEvent::Join { channel, user } => json!({ "channel": channel, "user": user }),
        ChatEvent::JoinFailure { channel, reason } | ChatEvent::MessageFailed { channel, reason } => {
            json!({ "channel": channel, "reason": reason })
        }
        ChatEvent::MessageRatelimit { channel, message } => {
            json!({ "channel": channel, "message": message })
        }
        ChatEvent::Whisper { user, message, msg } => json!({
            "user": user,
            "message": message,
            "msg": msg.to_value(),
        }),
    };
    (topic, payload)
}

/// Trace connection lifecycle events.
pub fn log_lifecycle(event: &ChatEvent) {
    match event {
        ChatEvent::Connect => debug!("Chat transport connected"),
        ChatEvent::Register => debug!("Chat transport registered"),
        ChatEvent::Disconnect { manually: true, .. } => info!("Chat transport disconnected manually"),
        ChatEvent::Disconnect {
            manually: false,
            reason,
        } => warn!(reason = ?reason, "Chat transport disconnected"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use twitch_client::IrcMessage;

    fn privmsg() -> IrcMessage {
        IrcMessage::parse("@id=abc :alice!alice@alice.tmi.twitch.tv PRIVMSG #chan :hello there").unwrap()
    }

    fn sample_events() -> Vec<ChatEvent> {
        vec![
            ChatEvent::Action {
                channel: "#chan".into(),
                user: "alice".into(),
                message: "waves".into(),
                msg: privmsg(),
            },
            ChatEvent::Connect,
            ChatEvent::Disconnect {
                manually: false,
                reason: Some("reset".into()),
            },
            ChatEvent::Join {
                channel: "#chan".into(),
                user: "bot".into(),
            },
            ChatEvent::JoinFailure {
                channel: "#chan".into(),
                reason: "msg_banned".into(),
            },
            ChatEvent::Message {
                channel: "#chan".into(),
                user: "alice".into(),
                message: "hello there".into(),
                msg: privmsg(),
            },
            ChatEvent::MessageFailed {
                channel: "#chan".into(),
                reason: "msg_duplicate".into(),
            },
            ChatEvent::MessageRatelimit {
                channel: "#chan".into(),
                message: "slow down".into(),
            },
            ChatEvent::Register,
            ChatEvent::Whisper {
                user: "alice".into(),
                message: "psst".into(),
                msg: privmsg(),
            },
        ]
    }

    #[test]
    fn test_every_payload_matches_its_schema() {
        let schemas = SchemaRegistry::twitch();
        for event in sample_events() {
            let (topic, payload) = translate(&event);
            assert_eq!(topic.to_string(), format!("v1.chat.{}", event.kind()));
            schemas.check(&topic.schema_name(), &payload).unwrap();
        }
    }

    #[test]
    fn test_message_payload() {
        let msg = privmsg();
        let (topic, payload) = translate(&ChatEvent::Message {
            channel: "#chan".into(),
            user: "alice".into(),
            message: "hello there".into(),
            msg: msg.clone(),
        });
        assert_eq!(topic.to_string(), "v1.chat.message");
        assert_eq!(
            payload,
            json!({
                "channel": "#chan",
                "user": "alice",
                "message": "hello there",
                "msg": msg.to_value(),
            })
        );
    }

    #[test]
    fn test_disconnect_reason_is_optional() {
        let (_, manual) = translate(&ChatEvent::Disconnect {
            manually: true,
            reason: None,
        });
        assert_eq!(manual, json!({ "manually": true }));

        let (_, dropped) = translate(&ChatEvent::Disconnect {
            manually: false,
            reason: Some("ping timeout".into()),
        });
        assert_eq!(dropped, json!({ "manually": false, "reason": "ping timeout" }));
    }

    #[test]
    fn test_ratelimit_has_own_topic() {
        let (topic, _) = translate(&ChatEvent::MessageRatelimit {
            channel: "#chan".into(),
            message: "slow down".into(),
        });
        assert_eq!(topic.to_string(), "v1.chat.messageRatelimit");
    }
}
