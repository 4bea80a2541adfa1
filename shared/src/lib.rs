pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

/// Bytes taken from the socket per receive call in chunk framing.
pub const READ_CHUNK_SIZE: usize = 255;

pub const QUIT_KEYWORD: &str = "quit";

pub const NICK_COMMAND: &str = "/nick";
pub const PRIVATE_COMMAND: &str = "/pm";
pub const COMPLAINT_COMMAND: &str = "/complaint";
pub const DELAY_COMMAND: &str = "/delay";

pub const WELCOME: &str = "Welcome to chat\n\
Write /nick <your nickname> for chose nickname\n\
Write /pm <nickname> <message> for private chat\n\
Write /complaint <nick> to block user\n\
Write /delay <minutes> <message> for delay message\n\
Write quit to leave chat";

pub const INVALID_COMMAND: &str = "Invalid Command";
pub const MESSAGE_LIMIT: &str = "Message limit, wait 1 hour";
pub const SELF_MESSAGE: &str = "Can't send message to yourself";

/// Line every participant sees when `nickname` speaks.
pub fn chat_line(nickname: &str, text: &str) -> String {
    format!("{}: {}", nickname, text)
}

pub fn left_notice(nickname: &str) -> String {
    format!("{} has left!", nickname)
}

pub fn nick_changed(nickname: &str) -> String {
    format!("Nickname changed to {}", nickname)
}

pub fn banned_notice(hours: u64) -> String {
    format!("Your account was banned for {} hour", hours)
}

pub fn no_such_nickname(nickname: &str) -> String {
    format!("No user with nickname: {}", nickname)
}

pub fn private_line(sender: &str, text: &str) -> String {
    format!("private message from {}: {}", sender, text)
}

/// Usage hint sent after an invalid command that was missing its argument.
pub fn usage(command: &str) -> String {
    let arguments = match command {
        NICK_COMMAND => "<your nick>",
        PRIVATE_COMMAND => "<nick> <message>",
        COMPLAINT_COMMAND => "<nick>",
        DELAY_COMMAND => "<minutes> <message>",
        _ => "",
    };
    format!("Please write {} {}", command, arguments)
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_lists_every_command() {
        for command in [NICK_COMMAND, PRIVATE_COMMAND, COMPLAINT_COMMAND, DELAY_COMMAND] {
            assert!(WELCOME.contains(command), "banner misses {}", command);
        }
        assert!(WELCOME.contains(QUIT_KEYWORD));
        assert!(!WELCOME.ends_with('\n'));
    }

    #[test]
    fn test_notice_formatting() {
        assert_eq!(chat_line("alice", "hi there"), "alice: hi there");
        assert_eq!(left_notice("bob"), "bob has left!");
        assert_eq!(nick_changed("carol"), "Nickname changed to carol");
        assert_eq!(banned_notice(4), "Your account was banned for 4 hour");
        assert_eq!(no_such_nickname("dave"), "No user with nickname: dave");
        assert_eq!(
            private_line("erin", "psst"),
            "private message from erin: psst"
        );
    }

    #[test]
    fn test_usage_hints() {
        assert_eq!(usage(NICK_COMMAND), "Please write /nick <your nick>");
        assert_eq!(usage(PRIVATE_COMMAND), "Please write /pm <nick> <message>");
        assert_eq!(usage(COMPLAINT_COMMAND), "Please write /complaint <nick>");
        assert_eq!(
            usage(DELAY_COMMAND),
            "Please write /delay <minutes> <message>"
        );
        assert_eq!(usage("/other"), "Please write /other");
    }
}
