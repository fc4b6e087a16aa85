//! Fixed limits and wire conventions for the quiz bot
//!
//! This module contains the constants shared by the dialogue engine, the
//! choice renderer and the platform adapters. Values that operators may want
//! to tune live in [`crate::config::Options`] instead.

/// Choice rendering defaults
pub mod choices {
    /// Most inline choice actions a buttons prompt can carry
    pub const MAX_BUTTON_ACTIONS: usize = 4;
    /// Longest choice text (in characters) that still fits the buttons layout
    pub const MAX_BUTTON_CHOICE_LENGTH: usize = 20;
    /// Most cards a carousel prompt can carry
    pub const MAX_CAROUSEL_CARDS: usize = 5;
    /// Characters of choice text shown on a carousel card
    pub const CAROUSEL_TEXT_LENGTH: usize = 60;
    /// Choices containing this token sort after every other choice
    pub const NONE_OF_THE_ABOVE_MARKER: &str = "皆";
    /// Letters used to label carousel cards
    pub const CARD_LETTERS: &str = "ABCDEFGHIJ";
}

/// Text conventions shared by both platforms
pub mod wire {
    /// Prefix that turns a choice into an answer submission
    pub const ANSWER_MARKER: &str = "答案：";
    /// Prefix of a question prompt
    pub const QUESTION_PREFIX: &str = "Q: ";
}

/// Question bank limits
pub mod question {
    /// Maximum length of a question prompt in characters
    pub const MAX_MESSAGE_LENGTH: usize = 500;
    /// Maximum length of a single choice in characters
    pub const MAX_CHOICE_LENGTH: usize = 200;
    /// Maximum number of wrong choices per question
    pub const MAX_WRONG_CHOICES: usize = 9;
}

/// Registration roster column names
pub mod roster {
    /// Column holding the contact email, the lookup key
    pub const EMAIL_COLUMN: &str = "聯絡人 Email";
    /// Column holding the registration serial, the attendee uid
    pub const SERIAL_COLUMN: &str = "報名序號";
    /// Column holding the nickname printed on the ID card
    pub const NICKNAME_COLUMN: &str = "Nickname (shown on ID card) / 暱稱 (顯示於識別證)";
}

/// LINE Messaging API limits
pub mod line {
    /// Maximum characters in an action label
    pub const MAX_LABEL_LENGTH: usize = 20;
    /// Maximum characters in a carousel column text
    pub const MAX_COLUMN_TEXT_LENGTH: usize = 60;
    /// Maximum characters in a carousel column title
    pub const MAX_COLUMN_TITLE_LENGTH: usize = 40;
    /// Maximum columns in a carousel template
    pub const MAX_CAROUSEL_COLUMNS: usize = 10;
    /// Maximum actions in a buttons template
    pub const MAX_BUTTONS_ACTIONS: usize = 4;
    /// Maximum characters in a buttons template text without a title
    pub const MAX_BUTTONS_TEXT_LENGTH: usize = 160;
    /// Maximum characters in a confirm template text
    pub const MAX_CONFIRM_TEXT_LENGTH: usize = 240;
    /// Maximum characters in an alternative text
    pub const MAX_ALT_TEXT_LENGTH: usize = 400;
    /// Maximum messages in one push request
    pub const MAX_MESSAGES_PER_PUSH: usize = 5;
}

/// Messenger Send API limits
pub mod messenger {
    /// Maximum characters in a button or quick reply title
    pub const MAX_TITLE_LENGTH: usize = 20;
    /// Maximum characters in a generic template element title
    pub const MAX_ELEMENT_TITLE_LENGTH: usize = 80;
    /// Maximum characters in a generic template subtitle
    pub const MAX_SUBTITLE_LENGTH: usize = 80;
    /// Maximum buttons on one generic template element
    pub const MAX_ELEMENT_BUTTONS: usize = 3;
    /// Maximum elements in one generic template
    pub const MAX_ELEMENTS: usize = 10;
    /// Maximum quick replies on one message
    pub const MAX_QUICK_REPLIES: usize = 13;
    /// Maximum characters in a postback payload
    pub const MAX_PAYLOAD_LENGTH: usize = 1000;
}
