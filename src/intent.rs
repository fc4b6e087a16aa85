//! Normalized inbound events and intent decoding
//!
//! Platform adapters turn native webhook entries into an [`Event`]: the
//! chat user, the raw [`Message`] and the [`Intent`] decoded from it. Intent
//! decoding happens once, here, so the dialogue engine only ever switches
//! on the enumerated intent. Keywords and the answer marker are recognized
//! the same way whether they arrive as typed text or as a postback payload,
//! which keeps both platforms on identical semantics.

use std::{fmt::Display, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::{constants::wire::ANSWER_MARKER, platform::UserKey, roster::AttendeeUid};

/// Keywords understood as commands
pub mod keyword {
    /// Starts the registration flow (typed)
    pub const BEGIN_REGISTRATION: &str = "開始註冊";
    /// Starts the registration flow (Messenger postback)
    pub const BEGIN_REGISTRATION_POSTBACK: &str = "register_user";
    /// Starts the game
    pub const START_GAME: &str = "玩遊戲";
    /// Starts the game (Messenger wording)
    pub const START_GAME_ALT: &str = "開始玩";
    /// Pauses the game
    pub const PAUSE_GAME: &str = "不玩了";
    /// Shows the current score
    pub const LOOKUP_SCORE: &str = "查分數";
    /// Asks to unbind the chat identity
    pub const UNBIND: &str = "解除綁定";
    /// Abandons a registration in progress
    pub const RESET_SESSION: &str = "clean";
}

const REGISTER_PREFIX: &str = "R:";
const REGISTER_CANCEL: &str = "CANCEL";

/// Structured payloads carried by postback actions
#[derive(Debug, Clone, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum Postback {
    /// Picks an attendee from the identity picker
    Register(AttendeeUid),
    /// Dismisses the identity picker
    CancelRegister,
    /// Declines the invitation to register
    DeclineRegistration,
    /// Confirms unbinding
    ConfirmUnbind,
    /// Keeps the binding
    CancelUnbind,
    /// Leaves the menu
    Exit,
}

impl Display for Postback {
    /// Formats the postback as its wire payload
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(uid) => write!(f, "{REGISTER_PREFIX}{uid}"),
            Self::CancelRegister => write!(f, "{REGISTER_PREFIX}{REGISTER_CANCEL}"),
            Self::DeclineRegistration => f.write_str("NOREGISTER"),
            Self::ConfirmUnbind => f.write_str("CONFIRM_DELETE"),
            Self::CancelUnbind => f.write_str("CANCEL_DELETE"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

/// The payload is not a known postback code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown postback payload `{0}`")]
pub struct ParsePostbackError(String);

impl FromStr for Postback {
    type Err = ParsePostbackError;

    /// Parses a wire payload
    ///
    /// # Errors
    ///
    /// Returns a `ParsePostbackError` if the payload is not a postback code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOREGISTER" => Ok(Self::DeclineRegistration),
            "CONFIRM_DELETE" => Ok(Self::ConfirmUnbind),
            "CANCEL_DELETE" => Ok(Self::CancelUnbind),
            "exit" => Ok(Self::Exit),
            _ => match s.strip_prefix(REGISTER_PREFIX) {
                Some(REGISTER_CANCEL) => Ok(Self::CancelRegister),
                Some(serial) if !serial.trim().is_empty() => {
                    Ok(Self::Register(AttendeeUid::new(serial)))
                }
                _ => Err(ParsePostbackError(s.to_owned())),
            },
        }
    }
}

/// A normalized inbound chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Text the user typed or a message action sent on their behalf
    Text(String),
    /// Payload of a postback button or quick reply
    Postback(String),
}

impl Message {
    /// The typed text, if this is a text message
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Postback(_) => None,
        }
    }
}

/// What the user wants, decoded from a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Intent {
    /// Start registering
    BeginRegistration,
    /// Not registering now
    DeclineRegistration,
    /// Bind to the picked attendee
    SelectIdentity(AttendeeUid),
    /// None of the listed attendees
    CancelIdentitySelection,
    /// Start answering questions
    StartGame,
    /// Stop answering questions
    PauseGame,
    /// Show the score
    LookupScore,
    /// Ask to unbind
    RequestUnbind,
    /// Confirm unbinding
    ConfirmUnbind,
    /// Keep the binding
    CancelUnbind,
    /// Leave the menu
    Exit,
    /// Abandon a registration in progress
    ResetSession,
    /// Submit a choice as the answer to the open question
    Answer(String),
    /// Anything else, including an email being typed
    Unrecognized,
}

impl Intent {
    /// Decodes the intent carried by a message
    pub fn decode(message: &Message) -> Self {
        let (Message::Text(content) | Message::Postback(content)) = message;

        if let Some(choice) = parse_answer(content) {
            return Self::Answer(choice.to_owned());
        }

        match content.as_str() {
            keyword::BEGIN_REGISTRATION | keyword::BEGIN_REGISTRATION_POSTBACK => {
                return Self::BeginRegistration;
            }
            keyword::START_GAME | keyword::START_GAME_ALT => return Self::StartGame,
            keyword::PAUSE_GAME => return Self::PauseGame,
            keyword::LOOKUP_SCORE => return Self::LookupScore,
            keyword::UNBIND => return Self::RequestUnbind,
            keyword::RESET_SESSION => return Self::ResetSession,
            _ => {}
        }

        match message {
            Message::Postback(payload) => match payload.parse() {
                Ok(Postback::Register(uid)) => Self::SelectIdentity(uid),
                Ok(Postback::CancelRegister) => Self::CancelIdentitySelection,
                Ok(Postback::DeclineRegistration) => Self::DeclineRegistration,
                Ok(Postback::ConfirmUnbind) => Self::ConfirmUnbind,
                Ok(Postback::CancelUnbind) => Self::CancelUnbind,
                Ok(Postback::Exit) => Self::Exit,
                Err(_) => Self::Unrecognized,
            },
            Message::Text(_) => Self::Unrecognized,
        }
    }
}

/// One inbound event from one chat user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Who sent it
    pub user: UserKey,
    /// What was sent
    pub message: Message,
    /// What it means
    pub intent: Intent,
}

impl Event {
    /// Creates an event and decodes its intent
    pub fn new(user: UserKey, message: Message) -> Self {
        let intent = Intent::decode(&message);
        Self {
            user,
            message,
            intent,
        }
    }

    /// Creates a text event
    pub fn text(user: UserKey, text: impl Into<String>) -> Self {
        Self::new(user, Message::Text(text.into()))
    }

    /// Creates a postback event
    pub fn postback(user: UserKey, payload: impl Into<String>) -> Self {
        Self::new(user, Message::Postback(payload.into()))
    }
}

/// The text that submits `choice` as an answer
pub fn answer_text(choice: &str) -> String {
    format!("{ANSWER_MARKER}{choice}")
}

/// The choice submitted by an answer text, if the text is one
pub fn parse_answer(text: &str) -> Option<&str> {
    text.strip_prefix(ANSWER_MARKER)
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[_a-z0-9-]+(\.[_a-z0-9-]+)*@[a-z0-9-]+(\.[a-z0-9-]+)*(\.[a-z]{2,4})$")
        .expect("email pattern is valid")
});

/// Whether the text is syntactically an email address
pub fn is_email(text: &str) -> bool {
    EMAIL.is_match(text)
}
