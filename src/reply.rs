//! Normalized outbound replies
//!
//! The dialogue engine answers every event with an ordered list of
//! [`Reply`] items. Platform adapters lower them to native JSON; the
//! engine never sees platform payload shapes.

use serde::Serialize;

use crate::intent::{self, Postback};

/// One item of a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_more::From)]
pub enum Reply {
    /// Plain text
    Text(String),
    /// A multiple choice question
    Choices(ChoicePrompt),
    /// A two-way choice
    Confirm(ConfirmPrompt),
    /// A list of attendees to bind to
    IdentityPicker(IdentityPicker),
}

impl Reply {
    /// Creates a plain text reply
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// The two layouts of a multiple choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChoicePrompt {
    /// The prompt with a few inline choice actions
    Buttons {
        /// Prompt text
        text: String,
        /// One action per choice
        actions: Vec<Action>,
    },
    /// One card per choice
    Carousel(Vec<Card>),
}

/// A carousel card offering one choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    /// Card title, e.g. `選項 A`
    pub title: String,
    /// Choice text, possibly shortened
    pub text: String,
    /// Selects the choice
    pub action: Action,
}

/// A two-way prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmPrompt {
    /// Question put to the user
    pub text: String,
    /// The affirmative action
    pub confirm: Action,
    /// The negative action
    pub cancel: Action,
}

/// A list of attendees the user may be
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityPicker {
    /// Headline
    pub title: String,
    /// Instructions
    pub text: String,
    /// One action per attendee
    pub candidates: Vec<Action>,
    /// Dismisses the picker
    pub cancel: Action,
}

/// A tappable action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    /// Text on the button
    pub label: String,
    /// What tapping it sends back
    pub value: ActionValue,
}

impl Action {
    /// An action that sends a keyword as if typed
    pub fn say(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: ActionValue::Say(text.into()),
        }
    }

    /// An action that submits a choice as the answer
    pub fn answer(label: impl Into<String>, choice: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: ActionValue::Answer(choice.into()),
        }
    }

    /// An action that sends a postback code
    pub fn postback(label: impl Into<String>, postback: Postback) -> Self {
        Self {
            label: label.into(),
            value: ActionValue::Postback(postback),
        }
    }
}

/// What an action sends back when tapped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ActionValue {
    /// The text, sent as a message or keyword payload
    Say(String),
    /// The full, untruncated choice, sent behind the answer marker
    Answer(String),
    /// A postback code
    Postback(Postback),
}

impl ActionValue {
    /// The text or payload the platform sends back for this action
    pub fn payload(&self) -> String {
        match self {
            Self::Say(text) => text.clone(),
            Self::Answer(choice) => intent::answer_text(choice),
            Self::Postback(postback) => postback.to_string(),
        }
    }

    /// Whether the platform should echo the payload as a user message
    pub fn is_message(&self) -> bool {
        !matches!(self, Self::Postback(_))
    }
}
