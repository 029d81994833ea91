//! Command tokens written to the command channel.
//!
//! The wire form is one token per line. The executor owns the mapping from
//! tokens to keystrokes; this side only needs to produce valid tokens.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::escape::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "token", content = "dir", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Pass one turn.
    Wait,
    /// Start the game's own auto-explore.
    Autoexplore,
    /// Answer a yes/no prompt with yes.
    ConfirmY,
    /// Dismiss a menu or prompt.
    Esc,
    /// Attack the nearest enemy.
    Attack,
    /// Acknowledge a `--more--` pager.
    More,
    /// Step one tile.
    Move(Direction),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("empty command token")]
    Empty,
    #[error("unknown command token '{0}'")]
    Unknown(String),
    #[error("bad MOVE direction '{0}' (expected one of h j k l y u b n)")]
    BadDirection(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Wait => f.write_str("WAIT"),
            Command::Autoexplore => f.write_str("AUTOEXPLORE"),
            Command::ConfirmY => f.write_str("CONFIRM_Y"),
            Command::Esc => f.write_str("ESC"),
            Command::Attack => f.write_str("ATTACK"),
            Command::More => f.write_str("MORE"),
            Command::Move(dir) => write!(f, "MOVE {dir}"),
        }
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err(CommandParseError::Empty);
        }

        if let Some(rest) = token.strip_prefix("MOVE ") {
            let rest = rest.trim();
            let mut chars = rest.chars();
            return match (chars.next(), chars.next()) {
                (Some(key), None) => Direction::from_key(key)
                    .map(Command::Move)
                    .ok_or_else(|| CommandParseError::BadDirection(rest.to_string())),
                _ => Err(CommandParseError::BadDirection(rest.to_string())),
            };
        }

        match token {
            "WAIT" => Ok(Command::Wait),
            "AUTOEXPLORE" => Ok(Command::Autoexplore),
            "CONFIRM_Y" => Ok(Command::ConfirmY),
            "ESC" => Ok(Command::Esc),
            "ATTACK" => Ok(Command::Attack),
            "MORE" => Ok(Command::More),
            other => Err(CommandParseError::Unknown(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_matches_executor_vocabulary() {
        assert_eq!(Command::Wait.to_string(), "WAIT");
        assert_eq!(Command::ConfirmY.to_string(), "CONFIRM_Y");
        assert_eq!(Command::Move(Direction::B).to_string(), "MOVE b");
    }

    #[test]
    fn parses_every_token() {
        let tokens = [
            "WAIT",
            "AUTOEXPLORE",
            "CONFIRM_Y",
            "ESC",
            "ATTACK",
            "MORE",
            "MOVE h",
            "MOVE n",
        ];
        for token in tokens {
            let cmd: Command = token.parse().unwrap();
            assert_eq!(cmd.to_string(), token);
        }
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!("  ESC \n".parse::<Command>().unwrap(), Command::Esc);
    }

    #[test]
    fn rejects_unknown_and_malformed_tokens() {
        assert_eq!("".parse::<Command>(), Err(CommandParseError::Empty));
        assert_eq!(
            "DANCE".parse::<Command>(),
            Err(CommandParseError::Unknown("DANCE".to_string()))
        );
        assert_eq!(
            "MOVE x".parse::<Command>(),
            Err(CommandParseError::BadDirection("x".to_string()))
        );
        assert_eq!(
            "MOVE hj".parse::<Command>(),
            Err(CommandParseError::BadDirection("hj".to_string()))
        );
    }

    #[test]
    fn serializes_with_token_tag() {
        let json = serde_json::to_string(&Command::Move(Direction::K)).unwrap();
        assert_eq!(json, r#"{"token":"MOVE","dir":"k"}"#);
        let json = serde_json::to_string(&Command::Attack).unwrap();
        assert_eq!(json, r#"{"token":"ATTACK"}"#);
    }
}
