//! Facebook Messenger adapter
//!
//! Messenger reports taps on buttons and quick replies as payload strings
//! rather than as messages typed by the user, so every action lowered here
//! becomes a postback or quick reply carrying [`ActionValue::payload`].
//! Answers therefore arrive as `答案：{choice}` payloads and decode to the
//! same intent as the typed form on LINE.
//!
//! [`ActionValue::payload`]: crate::reply::ActionValue::payload

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{
    constants::messenger::{
        MAX_ELEMENT_BUTTONS, MAX_ELEMENTS, MAX_PAYLOAD_LENGTH, MAX_QUICK_REPLIES,
        MAX_ELEMENT_TITLE_LENGTH, MAX_SUBTITLE_LENGTH, MAX_TITLE_LENGTH,
    },
    intent::{Event, Message},
    platform::{Platform, UserKey},
    reply::{Action, Card, ChoicePrompt, ConfirmPrompt, IdentityPicker, Reply},
    truncate,
};

const ANSWER_PROMPT: &str = "答案是？";
const CONFIRM_TITLE: &str = "請選擇";

/// A webhook request body
#[derive(Debug, Deserialize)]
pub struct Webhook {
    /// Entries batched in this request
    #[serde(default)]
    pub entry: Vec<Entry>,
}

/// One page entry
#[derive(Debug, Deserialize)]
pub struct Entry {
    /// Messaging events of the entry
    #[serde(default)]
    pub messaging: Vec<Messaging>,
}

/// One messaging event
#[derive(Debug, Deserialize)]
pub struct Messaging {
    /// The user
    pub sender: Participant,
    /// Present for message events
    pub message: Option<InboundMessage>,
    /// Present for postback events
    pub postback: Option<PostbackContent>,
}

/// A user or page reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Page-scoped id
    pub id: String,
}

/// The message of a message event
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    /// Typed text, absent for attachments
    pub text: Option<String>,
    /// Set when the message came from tapping a quick reply
    pub quick_reply: Option<PostbackContent>,
    /// Set when the page itself sent the message
    #[serde(default)]
    pub is_echo: bool,
}

/// The payload of a postback or quick reply
#[derive(Debug, Deserialize)]
pub struct PostbackContent {
    /// The payload string
    pub payload: String,
}

impl Messaging {
    /// Normalizes the event, or `None` if the bot does not handle it
    ///
    /// Quick replies are treated as postbacks even though Messenger delivers
    /// them as messages.
    pub fn into_event(self) -> Option<Event> {
        let message = match (self.message, self.postback) {
            (_, Some(postback)) => Message::Postback(postback.payload),
            (Some(message), None) if message.is_echo => return None,
            (
                Some(InboundMessage {
                    quick_reply: Some(quick_reply),
                    ..
                }),
                None,
            ) => Message::Postback(quick_reply.payload),
            (
                Some(InboundMessage {
                    text: Some(text), ..
                }),
                None,
            ) => Message::Text(text.trim().to_owned()),
            _ => return None,
        };
        Some(Event::new(
            UserKey::new(Platform::Messenger, self.sender.id),
            message,
        ))
    }
}

/// Parses a webhook body into the events the bot handles
///
/// # Errors
///
/// Returns a `serde_json::Error` if the body is not a Messenger webhook
/// body.
pub fn parse_webhook(body: &str) -> Result<Vec<Event>, serde_json::Error> {
    let webhook: Webhook = serde_json::from_str(body)?;
    Ok(webhook
        .entry
        .into_iter()
        .flat_map(|entry| entry.messaging)
        .filter_map(|event| {
            let event = Messaging::into_event(event);
            if event.is_none() {
                tracing::debug!("skipping unsupported Messenger webhook event");
            }
            event
        })
        .collect_vec())
}

/// A Send API request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendRequest {
    /// The user
    pub recipient: Participant,
    /// The message
    pub message: OutboundMessage,
}

/// A message to send
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    /// Plain text
    pub text: Option<String>,
    /// A structured template
    pub attachment: Option<Attachment>,
    /// Quick replies shown under the message
    pub quick_replies: Option<Vec<QuickReply>>,
}

impl OutboundMessage {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachment: None,
            quick_replies: None,
        }
    }

    fn generic(elements: Vec<Element>) -> Self {
        Self {
            text: None,
            attachment: Some(Attachment {
                kind: "template",
                payload: TemplatePayload {
                    template_type: "generic",
                    elements,
                },
            }),
            quick_replies: None,
        }
    }
}

/// A message attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    /// Always `template`
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// The template
    pub payload: TemplatePayload,
}

/// A generic template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplatePayload {
    /// Always `generic`
    pub template_type: &'static str,
    /// Horizontally scrolling elements
    pub elements: Vec<Element>,
}

/// One element of a generic template
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    /// Bold headline
    pub title: String,
    /// Text under the title
    pub subtitle: Option<String>,
    /// Up to three buttons
    pub buttons: Vec<Button>,
}

/// A postback button
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Button {
    /// Sends `payload` in a postback event
    Postback {
        /// Button label
        title: String,
        /// The payload
        payload: String,
    },
}

/// A quick reply chip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickReply {
    /// Always `text`
    pub content_type: &'static str,
    /// Chip label
    pub title: String,
    /// The payload
    pub payload: String,
}

impl From<&Action> for Button {
    fn from(action: &Action) -> Self {
        Self::Postback {
            title: truncate(&action.label, MAX_TITLE_LENGTH),
            payload: truncate(&action.value.payload(), MAX_PAYLOAD_LENGTH),
        }
    }
}

impl From<&Action> for QuickReply {
    fn from(action: &Action) -> Self {
        Self {
            content_type: "text",
            title: truncate(&action.label, MAX_TITLE_LENGTH),
            payload: truncate(&action.value.payload(), MAX_PAYLOAD_LENGTH),
        }
    }
}

fn element(title: &str, subtitle: Option<&str>, buttons: &[&Action]) -> Element {
    Element {
        title: truncate(title, MAX_ELEMENT_TITLE_LENGTH),
        subtitle: subtitle.map(|subtitle| truncate(subtitle, MAX_SUBTITLE_LENGTH)),
        buttons: buttons.iter().copied().map(Button::from).collect_vec(),
    }
}

/// Lowers reply items to Send API messages
pub fn lower(replies: &[Reply]) -> Vec<OutboundMessage> {
    replies.iter().flat_map(lower_reply).collect_vec()
}

fn lower_reply(reply: &Reply) -> Vec<OutboundMessage> {
    match reply {
        Reply::Text(text) => vec![OutboundMessage::text(text.as_str())],
        Reply::Choices(ChoicePrompt::Buttons { text, actions }) => vec![
            OutboundMessage::text(text.as_str()),
            OutboundMessage {
                quick_replies: Some(
                    actions
                        .iter()
                        .take(MAX_QUICK_REPLIES)
                        .map(QuickReply::from)
                        .collect_vec(),
                ),
                ..OutboundMessage::text(ANSWER_PROMPT)
            },
        ],
        Reply::Choices(ChoicePrompt::Carousel(cards)) => vec![lower_carousel(cards)],
        Reply::Confirm(prompt) => vec![lower_confirm(prompt)],
        Reply::IdentityPicker(picker) => vec![lower_picker(picker)],
    }
}

fn lower_carousel(cards: &[Card]) -> OutboundMessage {
    OutboundMessage::generic(
        cards
            .iter()
            .take(MAX_ELEMENTS)
            .map(|card| element(&card.title, Some(card.text.as_str()), &[&card.action]))
            .collect_vec(),
    )
}

fn lower_confirm(prompt: &ConfirmPrompt) -> OutboundMessage {
    OutboundMessage::generic(vec![element(
        CONFIRM_TITLE,
        Some(prompt.text.as_str()),
        &[&prompt.confirm, &prompt.cancel],
    )])
}

/// Candidates are spread over as many elements as needed, with the cancel
/// button closing the last one.
fn lower_picker(picker: &IdentityPicker) -> OutboundMessage {
    let actions = picker
        .candidates
        .iter()
        .chain(std::iter::once(&picker.cancel))
        .collect_vec();

    OutboundMessage::generic(
        actions
            .chunks(MAX_ELEMENT_BUTTONS)
            .take(MAX_ELEMENTS)
            .map(|buttons| element(&picker.title, Some(picker.text.as_str()), buttons))
            .collect_vec(),
    )
}

/// Lowers replies into Send API request bodies for one user, in order
pub fn send_requests(user: &UserKey, replies: &[Reply]) -> Vec<SendRequest> {
    lower(replies)
        .into_iter()
        .map(|message| SendRequest {
            recipient: Participant {
                id: user.id.clone(),
            },
            message,
        })
        .collect_vec()
}
