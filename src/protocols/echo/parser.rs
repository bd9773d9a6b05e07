//! Echo protocol parser.

use crate::protocols::timestamp;

/// Line sent back before the server closes a session on `quit`.
pub const FAREWELL: &str = "До свидания!";

/// Prefix of the `time` response.
pub const TIME_PREFIX: &str = "Текущее время: ";

/// Prefix of an echoed line.
pub const ECHO_PREFIX: &str = "Эхо: ";

/// Parsed echo command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Say goodbye and close the session.
    Quit,
    /// Report the server time.
    Time,
    /// Echo the trimmed text back.
    Echo(&'a str),
}

/// Parse one line of input. Line endings and surrounding whitespace are
/// not part of the command.
pub fn parse(line: &str) -> Command<'_> {
    let trimmed = line.trim();

    if trimmed.eq_ignore_ascii_case("quit") {
        Command::Quit
    } else if trimmed.eq_ignore_ascii_case("time") {
        Command::Time
    } else {
        Command::Echo(trimmed)
    }
}

/// Format the newline-terminated response for a command.
pub fn response(command: &Command<'_>) -> String {
    match command {
        Command::Quit => format!("{FAREWELL}\n"),
        Command::Time => format!("{TIME_PREFIX}{}\n", timestamp()),
        Command::Echo(text) => format!("{ECHO_PREFIX}{text}\n"),
    }
}
