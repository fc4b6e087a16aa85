//! Questions and where they come from
//!
//! A question is a prompt with one correct choice and any number of wrong
//! ones. The [`QuestionSource`] decides which question a user faces next;
//! [`QuestionBank`] is an in-memory source that serves unanswered questions
//! in random order.

use std::{fmt::Display, str::FromStr, sync::Mutex};

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

use crate::{constants::question, error::StoreError, identity::Identity};

/// A stable handle to one question
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct QuestionUid(Uuid);

impl QuestionUid {
    /// Creates a new random question uid
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QuestionUid {
    /// Creates a new random question uid (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for QuestionUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for QuestionUid {
    type Err = uuid::Error;

    /// Parses a uid from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A multiple choice trivia question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Question {
    /// Stable handle of the question
    #[garde(skip)]
    #[serde(default)]
    pub uid: QuestionUid,
    /// The prompt shown to the user
    #[garde(length(chars, min = 1, max = question::MAX_MESSAGE_LENGTH))]
    pub message: String,
    /// The correct choice
    #[garde(length(chars, min = 1, max = question::MAX_CHOICE_LENGTH))]
    pub answer: String,
    /// The incorrect choices, in authoring order
    #[garde(
        length(max = question::MAX_WRONG_CHOICES),
        inner(length(chars, max = question::MAX_CHOICE_LENGTH))
    )]
    pub wrong_choices: Vec<String>,
}

impl Question {
    /// Creates a question with a fresh uid
    pub fn new(
        message: impl Into<String>,
        answer: impl Into<String>,
        wrong_choices: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            uid: QuestionUid::new(),
            message: message.into(),
            answer: answer.into(),
            wrong_choices: wrong_choices.into_iter().map(Into::into).collect_vec(),
        }
    }

    /// Whether the submitted text is exactly the correct choice
    pub fn is_correct(&self, submitted: &str) -> bool {
        self.answer == submitted
    }

    /// The correct choice followed by the wrong ones
    pub fn choices(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.answer.as_str()).chain(self.wrong_choices.iter().map(String::as_str))
    }
}

/// Trait for choosing the next question for a user
pub trait QuestionSource {
    /// The question the identity should answer next, or `None` when no
    /// question is left for it
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the source cannot be reached.
    fn next_question(&self, identity: &Identity) -> Result<Option<Question>, StoreError>;
}

/// Errors that can occur when loading a question bank
#[derive(Error, Debug)]
pub enum BankError {
    /// The text is not a JSON list of questions
    #[error("malformed question bank: {0}")]
    Json(#[from] serde_json::Error),
    /// A question failed validation
    #[error("invalid question {index}: {report}")]
    Invalid {
        /// Position of the question in the bank
        index: usize,
        /// What is wrong with it
        report: garde::Report,
    },
    /// Two questions share a uid
    #[error("duplicate question uid {0}")]
    DuplicateUid(QuestionUid),
}

/// An in-memory question source
///
/// Serves a uniformly random question among those the identity has not
/// answered yet.
#[derive(Debug)]
pub struct QuestionBank {
    questions: Vec<Question>,
    rng: Mutex<fastrand::Rng>,
}

impl QuestionBank {
    /// Creates a bank from validated questions
    ///
    /// # Errors
    ///
    /// Returns a `BankError` if a question is invalid or two questions
    /// share a uid.
    pub fn new(questions: Vec<Question>) -> Result<Self, BankError> {
        Self::with_rng(questions, fastrand::Rng::new())
    }

    /// Creates a bank drawing questions with the given generator
    ///
    /// # Errors
    ///
    /// Returns a `BankError` if a question is invalid or two questions
    /// share a uid.
    pub fn with_rng(questions: Vec<Question>, rng: fastrand::Rng) -> Result<Self, BankError> {
        for (index, question) in questions.iter().enumerate() {
            question
                .validate()
                .map_err(|report| BankError::Invalid { index, report })?;
        }
        if let Some(uid) = questions.iter().map(|q| q.uid).duplicates().next() {
            return Err(BankError::DuplicateUid(uid));
        }
        Ok(Self {
            questions,
            rng: Mutex::new(rng),
        })
    }

    /// Loads a bank from a JSON list of questions
    ///
    /// Questions without a `uid` receive a fresh one.
    ///
    /// # Errors
    ///
    /// Returns a `BankError` if the JSON is malformed or a question is
    /// invalid.
    pub fn from_json(json: &str) -> Result<Self, BankError> {
        Self::new(serde_json::from_str(json)?)
    }

    /// Number of questions in the bank
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Whether the bank holds no question
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionSource for QuestionBank {
    fn next_question(&self, identity: &Identity) -> Result<Option<Question>, StoreError> {
        let unanswered = self
            .questions
            .iter()
            .filter(|q| !identity.answered.contains(&q.uid))
            .collect_vec();

        if unanswered.is_empty() {
            return Ok(None);
        }

        let index = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .usize(..unanswered.len());

        Ok(Some(unanswered[index].clone()))
    }
}
