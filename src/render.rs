//! Choice rendering for multiple choice questions
//!
//! The renderer turns a question into reply items. Choices are shuffled,
//! "none/all of the above" choices are moved to the end, and the layout is
//! picked from the choice count and length: a compact buttons prompt when
//! everything fits, otherwise a prompt text followed by a carousel.

use itertools::Itertools;
use thiserror::Error;

use crate::{
    config::Options,
    constants::{choices::CARD_LETTERS, wire::QUESTION_PREFIX},
    messages,
    question::{Question, QuestionUid},
    reply::{Action, Card, ChoicePrompt, Reply},
    truncate,
};

/// Errors that can occur when rendering a question
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Every choice of the question is empty
    #[error("question {0} has no non-empty choice")]
    NoChoices(QuestionUid),
}

/// The layout chosen for a question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// A single prompt with inline choice actions
    Buttons,
    /// A prompt text followed by one card per choice
    Carousel,
}

impl Layout {
    /// Picks the layout for a set of choices
    ///
    /// # Arguments
    ///
    /// * `choices` - The non-empty choices of the question
    /// * `options` - Layout limits
    pub fn for_choices(choices: &[&str], options: &Options) -> Self {
        if choices.len() > options.button_limit
            || choices
                .iter()
                .any(|choice| choice.chars().count() > options.button_choice_length)
        {
            Self::Carousel
        } else {
            Self::Buttons
        }
    }
}

/// Renders a question into reply items
///
/// The carousel is capped at `options.carousel_limit` cards; when choices
/// have to be dropped, only wrong ones are, so the question stays
/// answerable. Card text is shortened for display but every action carries
/// the full choice.
///
/// # Arguments
///
/// * `question` - The question to render
/// * `options` - Layout limits and the none-of-the-above marker
/// * `rng` - Source of the shuffle
///
/// # Errors
///
/// Returns `RenderError::NoChoices` if the question has no non-empty choice.
pub fn render(
    question: &Question,
    options: &Options,
    rng: &mut fastrand::Rng,
) -> Result<Vec<Reply>, RenderError> {
    let correct = Some(question.answer.as_str()).filter(|answer| !answer.is_empty());
    let mut wrong = question
        .wrong_choices
        .iter()
        .map(String::as_str)
        .filter(|choice| !choice.is_empty())
        .collect_vec();

    let all = correct.iter().copied().chain(wrong.iter().copied()).collect_vec();
    if all.is_empty() {
        return Err(RenderError::NoChoices(question.uid));
    }
    let layout = Layout::for_choices(&all, options);

    if layout == Layout::Carousel {
        rng.shuffle(&mut wrong);
        wrong.truncate(
            options
                .carousel_limit
                .saturating_sub(usize::from(correct.is_some())),
        );
    }

    let mut choices = correct.into_iter().chain(wrong).collect_vec();
    rng.shuffle(&mut choices);
    let choices = move_marked_last(choices, &options.none_of_the_above_marker);

    let prompt = format!("{QUESTION_PREFIX}{}", question.message);

    Ok(match layout {
        Layout::Buttons => vec![
            ChoicePrompt::Buttons {
                text: prompt,
                actions: choices
                    .into_iter()
                    .map(|choice| Action::answer(choice, choice))
                    .collect_vec(),
            }
            .into(),
        ],
        Layout::Carousel => vec![
            Reply::Text(prompt),
            ChoicePrompt::Carousel(
                choices
                    .into_iter()
                    .zip(CARD_LETTERS.chars())
                    .map(|(choice, letter)| Card {
                        title: messages::option_title(letter),
                        text: truncate(choice, options.carousel_text_length),
                        action: Action::answer(messages::CHOOSE_LABEL, choice),
                    })
                    .collect_vec(),
            )
            .into(),
        ],
    })
}

/// Stable-partitions choices so those containing `marker` come last
fn move_marked_last<'a>(choices: Vec<&'a str>, marker: &str) -> Vec<&'a str> {
    let (regular, marked): (Vec<_>, Vec<_>) = choices
        .into_iter()
        .partition(|choice| !choice.contains(marker));
    regular.into_iter().chain(marked).collect_vec()
}
