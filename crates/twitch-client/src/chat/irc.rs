//! Minimal IRC line parsing for Twitch chat.
//!
//! Format with tags:
//! `@badge-info=;color=#FF0000;display-name=User;id=xxx :user!user@user.tmi.twitch.tv PRIVMSG #channel :message content`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TwitchError};

/// A parsed IRC line.
///
/// This is the raw message forwarded verbatim to bus subscribers, so it is
/// serializable as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrcMessage {
    /// IRCv3 message tags (unescaped).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Message prefix without the leading `:`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Command or numeric reply (`PRIVMSG`, `001`, ...).
    pub command: String,
    /// Parameters; the trailing parameter is the last element.
    #[serde(default)]
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse a single IRC line. Returns `None` for empty or malformed lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            return None;
        }

        // Parse tags
        let mut tags = BTreeMap::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let space_idx = stripped.find(' ')?;
            for tag in stripped[..space_idx].split(';') {
                match tag.split_once('=') {
                    Some((key, value)) => {
                        tags.insert(key.to_string(), unescape_tag_value(value));
                    }
                    None if !tag.is_empty() => {
                        tags.insert(tag.to_string(), String::new());
                    }
                    None => {}
                }
            }
            rest = stripped[space_idx + 1..].trim_start();
        }

        // Parse prefix
        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let space_idx = stripped.find(' ')?;
            prefix = Some(stripped[..space_idx].to_string());
            rest = stripped[space_idx + 1..].trim_start();
        }

        // Command and params
        let (head, trailing) = match rest.find(" :") {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 2..])),
            None => (rest, None),
        };
        let mut parts = head.split_whitespace();
        let command = parts.next()?.to_string();
        let mut params: Vec<String> = parts.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Some(Self {
            tags,
            prefix,
            command,
            params,
        })
    }

    /// Nickname part of the prefix (`user` in `user!user@user.tmi.twitch.tv`).
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split('!').next().unwrap_or(prefix);
        if nick.contains('.') && !prefix.contains('!') {
            // Server prefix, not a user
            return None;
        }
        Some(nick)
    }

    /// Get a parameter by index.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Get a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Convert to an opaque JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Unescape an IRCv3 tag value.
fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Escape an IRCv3 tag value.
pub fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Reject text that would end the IRC line early.
pub fn check_trailing(field: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n', '\0']) {
        return Err(TwitchError::protocol(format!(
            "{field} must not contain line breaks or NUL"
        )));
    }
    Ok(())
}

/// Reject a channel or user name that is not a single IRC parameter.
pub fn check_param(field: &str, value: &str) -> Result<()> {
    check_trailing(field, value)?;
    let value = value.trim();
    if value.is_empty() || value.contains(char::is_whitespace) || value.contains(',') {
        return Err(TwitchError::protocol(format!(
            "{field} must be a single non-empty name"
        )));
    }
    Ok(())
}

/// Normalize a channel name to `#lowercase`.
pub fn to_channel(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_prefix('#').unwrap_or(name);
    format!("#{}", name.to_lowercase())
}

/// Strip the leading `#` from a channel name.
pub fn to_user_name(channel: &str) -> &str {
    channel.strip_prefix('#').unwrap_or(channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg_with_tags() {
        let line = "@badge-info=;badges=broadcaster/1;color=#FF0000;display-name=TestUser;emotes=;id=abc123;mod=0;room-id=12345;subscriber=0;tmi-sent-ts=1234567890;turbo=0;user-id=67890;user-type= :testuser!testuser@testuser.tmi.twitch.tv PRIVMSG #channel :Hello world!";

        let msg = IrcMessage::parse(line).unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.nick(), Some("testuser"));
        assert_eq!(msg.param(0), Some("#channel"));
        assert_eq!(msg.param(1), Some("Hello world!"));
        assert_eq!(msg.tag("display-name"), Some("TestUser"));
        assert_eq!(msg.tag("user-id"), Some("67890"));
        assert_eq!(msg.tag("user-type"), Some(""));
    }

    #[test]
    fn test_escape_tag_value() {
        let raw = "a b;c\\d";
        let escaped = escape_tag_value(raw);
        assert_eq!(escaped, "a\\sb\\:c\\\\d");
        assert_eq!(unescape_tag_value(&escaped), raw);
        assert!(!escaped.contains([' ', ';']));
    }

    #[test]
    fn test_line_checks() {
        assert!(check_trailing("message", "hello there").is_ok());
        assert!(check_trailing("message", "hi\r\nPART #chan").is_err());
        assert!(check_trailing("message", "nul\0").is_err());

        assert!(check_param("channel", "#chan").is_ok());
        assert!(check_param("channel", "#chan PRIVMSG").is_err());
        assert!(check_param("channel", "#a,#b").is_err());
        assert!(check_param("user", "  ").is_err());
    }

    #[test]
    fn test_parse_ping() {
        let msg = IrcMessage::parse("PING :tmi.twitch.tv").unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.param(0), Some("tmi.twitch.tv"));
        assert!(msg.prefix.is_none());
    }

    #[test]
    fn test_parse_numeric_reply() {
        let msg = IrcMessage::parse(":tmi.twitch.tv 001 bot :Welcome, GLHF!\r\n").unwrap();
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["bot", "Welcome, GLHF!"]);
        assert_eq!(msg.nick(), None);
    }

    #[test]
    fn test_parse_trailing_with_colons() {
        let msg = IrcMessage::parse(":a!a@a.tmi.twitch.tv PRIVMSG #c :time is 12:30 :)").unwrap();
        assert_eq!(msg.param(1), Some("time is 12:30 :)"));
    }

    #[test]
    fn test_unescape_tag_values() {
        let msg = IrcMessage::parse(
            "@msg-id=msg_ratelimit;system-msg=hello\\sthere\\:x :tmi.twitch.tv NOTICE #c :slow",
        )
        .unwrap();
        assert_eq!(msg.tag("system-msg"), Some("hello there;x"));
        assert_eq!(msg.tag("msg-id"), Some("msg_ratelimit"));
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(IrcMessage::parse("").is_none());
        assert!(IrcMessage::parse("\r\n").is_none());
    }

    #[test]
    fn test_channel_normalization() {
        assert_eq!(to_channel("Streamer"), "#streamer");
        assert_eq!(to_channel("#Streamer"), "#streamer");
        assert_eq!(to_user_name("#streamer"), "streamer");
    }

    #[test]
    fn test_raw_value_round_trips_tags() {
        let msg = IrcMessage::parse("@id=1 :a!a@a.tmi.twitch.tv PRIVMSG #c :hi").unwrap();
        let value = msg.to_value();
        assert_eq!(value["command"], "PRIVMSG");
        assert_eq!(value["tags"]["id"], "1");
    }
}
