//! LINE Messaging API adapter
//!
//! Inbound, a webhook body carries a list of events; text messages and
//! postbacks from users become normalized [`Event`]s and everything else
//! (stickers, follows, group sources, ...) is skipped. Outbound, replies
//! are lowered to LINE message objects: plain text, or a template message
//! whose actions are either message actions (the user "says" the text, so
//! answers arrive as `答案：{choice}` text) or postback actions.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{
    constants::line::{
        MAX_ALT_TEXT_LENGTH, MAX_BUTTONS_ACTIONS, MAX_BUTTONS_TEXT_LENGTH, MAX_CAROUSEL_COLUMNS,
        MAX_COLUMN_TEXT_LENGTH, MAX_COLUMN_TITLE_LENGTH, MAX_CONFIRM_TEXT_LENGTH,
        MAX_LABEL_LENGTH, MAX_MESSAGES_PER_PUSH,
    },
    intent::{Event, Message},
    platform::{Platform, UserKey},
    reply::{Action, Card, ChoicePrompt, ConfirmPrompt, IdentityPicker, Reply},
    truncate,
};

const ANSWER_ALT_TEXT: &str = "請作答：";
const PICK_IDENTITY_ALT_TEXT: &str = "選擇身份";

/// A webhook request body
#[derive(Debug, Deserialize)]
pub struct Webhook {
    /// Events delivered in this request
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

/// One webhook event
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookEvent {
    /// The user sent a message
    Message {
        /// Who sent it
        source: Source,
        /// What was sent
        message: InboundMessage,
    },
    /// The user tapped a postback action
    Postback {
        /// Who tapped it
        source: Source,
        /// The action's data
        postback: PostbackContent,
    },
    /// Follow, join, beacon and other events the bot ignores
    #[serde(other)]
    Other,
}

/// The sender of an event
#[derive(Debug, Deserialize)]
pub struct Source {
    /// Present for one-to-one chats
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// The message of a message event
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    /// A text message
    Text {
        /// The text as typed
        text: String,
    },
    /// Images, stickers, locations and the like
    #[serde(other)]
    Other,
}

/// The data of a postback event
#[derive(Debug, Deserialize)]
pub struct PostbackContent {
    /// The action's data string
    pub data: String,
}

impl WebhookEvent {
    /// Normalizes the event, or `None` if the bot does not handle it
    pub fn into_event(self) -> Option<Event> {
        let (source, message) = match self {
            Self::Message {
                source,
                message: InboundMessage::Text { text },
            } => (source, Message::Text(text.trim().to_owned())),
            Self::Postback { source, postback } => (source, Message::Postback(postback.data)),
            Self::Message { .. } | Self::Other => return None,
        };
        let user = UserKey::new(Platform::Line, source.user_id?);
        Some(Event::new(user, message))
    }
}

/// Parses a webhook body into the events the bot handles
///
/// # Errors
///
/// Returns a `serde_json::Error` if the body is not a LINE webhook body.
pub fn parse_webhook(body: &str) -> Result<Vec<Event>, serde_json::Error> {
    let webhook: Webhook = serde_json::from_str(body)?;
    Ok(webhook
        .events
        .into_iter()
        .filter_map(|event| {
            let event = WebhookEvent::into_event(event);
            if event.is_none() {
                tracing::debug!("skipping unsupported LINE webhook event");
            }
            event
        })
        .collect_vec())
}

/// A LINE message object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LineMessage {
    /// A text message
    Text {
        /// The text
        text: String,
    },
    /// A template message
    Template {
        /// Shown where templates cannot be displayed
        #[serde(rename = "altText")]
        alt_text: String,
        /// The template
        template: Template,
    },
}

impl LineMessage {
    fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    fn template(alt_text: &str, template: Template) -> Self {
        Self::Template {
            alt_text: truncate(alt_text, MAX_ALT_TEXT_LENGTH),
            template,
        }
    }
}

/// A template of a template message
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Template {
    /// Text with up to four actions
    Buttons {
        /// Bold headline
        title: Option<String>,
        /// Body text
        text: String,
        /// The actions
        actions: Vec<LineAction>,
    },
    /// Text with two actions side by side
    Confirm {
        /// Body text
        text: String,
        /// Exactly two actions
        actions: Vec<LineAction>,
    },
    /// Horizontally scrolling columns
    Carousel {
        /// The columns
        columns: Vec<Column>,
    },
}

/// A carousel column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Bold headline
    pub title: String,
    /// Body text
    pub text: String,
    /// The actions
    pub actions: Vec<LineAction>,
}

/// A template action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LineAction {
    /// Sends `text` as a message from the user
    Message {
        /// Button label
        label: String,
        /// The message sent
        text: String,
    },
    /// Sends `data` in a postback event
    Postback {
        /// Button label
        label: String,
        /// The postback data
        data: String,
    },
}

impl From<&Action> for LineAction {
    fn from(action: &Action) -> Self {
        let label = truncate(&action.label, MAX_LABEL_LENGTH);
        if action.value.is_message() {
            Self::Message {
                label,
                text: action.value.payload(),
            }
        } else {
            Self::Postback {
                label,
                data: action.value.payload(),
            }
        }
    }
}

/// Lowers reply items to LINE message objects
///
/// A buttons prompt whose text is too long for the template is sent as a
/// separate text message followed by the template, so the question text is
/// never cut.
pub fn lower(replies: &[Reply]) -> Vec<LineMessage> {
    replies.iter().flat_map(lower_reply).collect_vec()
}

fn lower_reply(reply: &Reply) -> Vec<LineMessage> {
    match reply {
        Reply::Text(text) => vec![LineMessage::text(text.as_str())],
        Reply::Choices(ChoicePrompt::Buttons { text, actions }) => lower_buttons(text, actions),
        Reply::Choices(ChoicePrompt::Carousel(cards)) => vec![lower_carousel(cards)],
        Reply::Confirm(prompt) => vec![lower_confirm(prompt)],
        Reply::IdentityPicker(picker) => lower_picker(picker),
    }
}

fn lower_buttons(text: &str, actions: &[Action]) -> Vec<LineMessage> {
    let actions = actions
        .iter()
        .take(MAX_BUTTONS_ACTIONS)
        .map(LineAction::from)
        .collect_vec();

    if text.chars().count() <= MAX_BUTTONS_TEXT_LENGTH {
        return vec![LineMessage::template(
            ANSWER_ALT_TEXT,
            Template::Buttons {
                title: None,
                text: text.to_owned(),
                actions,
            },
        )];
    }

    vec![
        LineMessage::text(text),
        LineMessage::template(
            ANSWER_ALT_TEXT,
            Template::Buttons {
                title: None,
                text: ANSWER_ALT_TEXT.to_owned(),
                actions,
            },
        ),
    ]
}

fn lower_carousel(cards: &[Card]) -> LineMessage {
    LineMessage::template(
        ANSWER_ALT_TEXT,
        Template::Carousel {
            columns: cards
                .iter()
                .map(|card| Column {
                    title: card.title.clone(),
                    text: truncate(&card.text, MAX_COLUMN_TEXT_LENGTH),
                    actions: vec![LineAction::from(&card.action)],
                })
                .collect_vec(),
        },
    )
}

fn lower_confirm(prompt: &ConfirmPrompt) -> LineMessage {
    LineMessage::template(
        &prompt.text,
        Template::Confirm {
            text: truncate(&prompt.text, MAX_CONFIRM_TEXT_LENGTH),
            actions: vec![
                LineAction::from(&prompt.confirm),
                LineAction::from(&prompt.cancel),
            ],
        },
    )
}

/// One column per candidate and a final column for cancelling
///
/// Carousel columns must all carry the same number of actions, so each
/// column carries exactly one. Pickers longer than a carousel are split
/// over several template messages; the cancel column closes the last one.
fn lower_picker(picker: &IdentityPicker) -> Vec<LineMessage> {
    let text = truncate(&picker.text, MAX_COLUMN_TEXT_LENGTH);
    let columns = picker
        .candidates
        .iter()
        .map(|candidate| Column {
            title: truncate(&candidate.label, MAX_COLUMN_TITLE_LENGTH),
            text: text.clone(),
            actions: vec![LineAction::from(candidate)],
        })
        .chain(std::iter::once(Column {
            title: truncate(&picker.title, MAX_COLUMN_TITLE_LENGTH),
            text: text.clone(),
            actions: vec![LineAction::from(&picker.cancel)],
        }))
        .collect_vec();

    columns
        .chunks(MAX_CAROUSEL_COLUMNS)
        .map(|columns| {
            LineMessage::template(
                PICK_IDENTITY_ALT_TEXT,
                Template::Carousel {
                    columns: columns.to_vec(),
                },
            )
        })
        .collect_vec()
}

/// A push message request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushRequest {
    /// The LINE user id
    pub to: String,
    /// Up to five messages
    pub messages: Vec<LineMessage>,
}

/// Lowers replies into push request bodies for one user
///
/// Each body carries at most five messages; longer reply lists are split
/// across several bodies, to be sent in order.
pub fn push_requests(user: &UserKey, replies: &[Reply]) -> Vec<PushRequest> {
    lower(replies)
        .into_iter()
        .chunks(MAX_MESSAGES_PER_PUSH)
        .into_iter()
        .map(|messages| PushRequest {
            to: user.id.clone(),
            messages: messages.collect_vec(),
        })
        .collect_vec()
}
