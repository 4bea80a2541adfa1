//! Classification of received lines into chat commands.

use chat_shared::{
    usage, COMPLAINT_COMMAND, DELAY_COMMAND, NICK_COMMAND, PRIVATE_COMMAND, QUIT_KEYWORD,
};
use thiserror::Error;

/// The slash commands a client may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Nick,
    PrivateMessage,
    Complaint,
    Delay,
}

impl CommandKind {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            NICK_COMMAND => Some(Self::Nick),
            PRIVATE_COMMAND => Some(Self::PrivateMessage),
            COMPLAINT_COMMAND => Some(Self::Complaint),
            DELAY_COMMAND => Some(Self::Delay),
            _ => None,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Nick => NICK_COMMAND,
            Self::PrivateMessage => PRIVATE_COMMAND,
            Self::Complaint => COMPLAINT_COMMAND,
            Self::Delay => DELAY_COMMAND,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{} is missing its argument", .0.prefix())]
    MissingArgument(CommandKind),

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("not a minute count: {0}")]
    BadMinutes(String),
}

impl CommandError {
    /// Usage line to send after the invalid-command notice, if any.
    pub fn usage_hint(&self) -> Option<String> {
        match self {
            Self::MissingArgument(kind) => Some(usage(kind.prefix())),
            Self::Unknown(_) | Self::BadMinutes(_) => None,
        }
    }
}

/// A parsed line, produced once per received message and dropped after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    SetNick(String),
    PrivateMessage { target: String, body: String },
    Complaint(String),
    Delay { minutes: u64, body: String },
    PlainText(String),
    Invalid(CommandError),
}

/// Classifies one received message. Trailing CR/LF must already be stripped.
pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed == QUIT_KEYWORD {
        return Command::Quit;
    }
    if !trimmed.starts_with('/') {
        return Command::PlainText(line.to_string());
    }

    let (prefix, rest) = split_token(trimmed);
    let Some(kind) = CommandKind::from_prefix(prefix) else {
        return Command::Invalid(CommandError::Unknown(prefix.to_string()));
    };

    let (argument, body) = split_token(rest);
    if argument.is_empty() {
        return Command::Invalid(CommandError::MissingArgument(kind));
    }

    match kind {
        CommandKind::Nick => Command::SetNick(argument.to_string()),
        CommandKind::PrivateMessage => Command::PrivateMessage {
            target: argument.to_string(),
            body: body.to_string(),
        },
        CommandKind::Complaint => Command::Complaint(argument.to_string()),
        CommandKind::Delay => match argument.parse::<u64>() {
            Ok(minutes) => Command::Delay {
                minutes,
                body: body.to_string(),
            },
            Err(_) => Command::Invalid(CommandError::BadMinutes(argument.to_string())),
        },
    }
}

// Splits off the first whitespace-delimited token; the remainder keeps its
// inner spacing.
fn split_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], text[end..].trim_start()),
        None => (text, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_must_match_exactly() {
        assert_eq!(parse("quit"), Command::Quit);
        assert_eq!(parse("  quit \t"), Command::Quit);
        assert_eq!(parse("quitting"), Command::PlainText("quitting".to_string()));
        assert_eq!(parse("quit now"), Command::PlainText("quit now".to_string()));
    }

    #[test]
    fn test_nick() {
        assert_eq!(parse("/nick bob"), Command::SetNick("bob".to_string()));
        assert_eq!(parse("/nick   bob  extra"), Command::SetNick("bob".to_string()));
    }

    #[test]
    fn test_missing_argument_is_invalid() {
        for (line, kind) in [
            ("/nick", CommandKind::Nick),
            ("/pm ", CommandKind::PrivateMessage),
            ("/complaint", CommandKind::Complaint),
            ("/delay", CommandKind::Delay),
        ] {
            assert_eq!(
                parse(line),
                Command::Invalid(CommandError::MissingArgument(kind)),
                "line {:?}",
                line
            );
        }
    }

    #[test]
    fn test_private_message_keeps_body_spacing() {
        assert_eq!(
            parse("/pm alice hello  there"),
            Command::PrivateMessage {
                target: "alice".to_string(),
                body: "hello  there".to_string(),
            }
        );
        assert_eq!(
            parse("/pm alice"),
            Command::PrivateMessage {
                target: "alice".to_string(),
                body: String::new(),
            }
        );
    }

    #[test]
    fn test_complaint() {
        assert_eq!(parse("/complaint alice"), Command::Complaint("alice".to_string()));
    }

    #[test]
    fn test_delay() {
        assert_eq!(
            parse("/delay 5 see you later"),
            Command::Delay {
                minutes: 5,
                body: "see you later".to_string(),
            }
        );
        assert_eq!(
            parse("/delay soon hi"),
            Command::Invalid(CommandError::BadMinutes("soon".to_string()))
        );
        assert_eq!(
            parse("/delay -1 hi"),
            Command::Invalid(CommandError::BadMinutes("-1".to_string()))
        );
    }

    #[test]
    fn test_unknown_prefix_is_invalid() {
        assert_eq!(
            parse("/foo bar"),
            Command::Invalid(CommandError::Unknown("/foo".to_string()))
        );
        assert_eq!(
            parse("/nickname bob"),
            Command::Invalid(CommandError::Unknown("/nickname".to_string()))
        );
    }

    #[test]
    fn test_plain_text_is_untouched() {
        assert_eq!(
            parse("  hello /nick world"),
            Command::PlainText("  hello /nick world".to_string())
        );
    }

    #[test]
    fn test_usage_hint_only_for_missing_arguments() {
        assert_eq!(
            CommandError::MissingArgument(CommandKind::Nick).usage_hint(),
            Some("Please write /nick <your nick>".to_string())
        );
        assert_eq!(CommandError::Unknown("/foo".to_string()).usage_hint(), None);
    }
}
