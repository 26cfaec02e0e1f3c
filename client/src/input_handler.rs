//! Turns command line input into relay requests.
//!
//! `@name text` sends `text` privately to `name`, `\users` lists who is
//! online, `\quit` leaves.

use thiserror::Error;

pub const GREETINGS: &str = "$ Welcome to chat! \n$ Commands: @name message, \\users, \\quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Private { recipient: String, text: String },
    Users,
    Quit,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("empty line")]
    Empty,
    #[error("no message for {0}")]
    MissingText(String),
    #[error("unknown command {0}, try \\users or \\quit")]
    UnknownCommand(String),
    #[error("start a message with @name")]
    NoRecipient,
}

pub fn parse_line(line: &str) -> Result<Command, InputError> {
    let line = line.trim();

    if line.is_empty() {
        return Err(InputError::Empty);
    }

    if let Some(cmd) = line.strip_prefix('\\') {
        return match cmd {
            "users" => Ok(Command::Users),
            "quit" => Ok(Command::Quit),
            other => Err(InputError::UnknownCommand(other.to_owned())),
        };
    }

    let Some(rest) = line.strip_prefix('@') else {
        return Err(InputError::NoRecipient);
    };

    match rest.split_once(char::is_whitespace) {
        Some((recipient, text)) if !recipient.is_empty() && !text.trim().is_empty() => {
            Ok(Command::Private { recipient: recipient.to_owned(), text: text.trim().to_owned() })
        },
        Some((recipient, _)) => Err(InputError::MissingText(recipient.to_owned())),
        None => Err(InputError::MissingText(rest.to_owned())),
    }
}
