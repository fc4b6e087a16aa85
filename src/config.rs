//! Tunable options for the dialogue engine
//!
//! Options control how questions are laid out. They deserialize with
//! defaults for every missing field and must pass validation before an
//! [`crate::engine::Engine`] accepts them.

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::constants::choices;

/// Layout options for the choice renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Options {
    /// Choice count above which the carousel layout is used
    #[garde(range(min = 1, max = choices::MAX_BUTTON_ACTIONS))]
    pub button_limit: usize,
    /// Choice length (in characters) above which the carousel layout is used
    #[garde(range(min = 1, max = 40))]
    pub button_choice_length: usize,
    /// Most cards rendered in the carousel layout
    #[garde(range(min = 2, max = 10))]
    pub carousel_limit: usize,
    /// Characters of choice text shown on a card
    #[garde(range(min = 1, max = 120))]
    pub carousel_text_length: usize,
    /// Token marking a "none/all of the above" choice
    #[garde(length(chars, min = 1, max = 8))]
    pub none_of_the_above_marker: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            button_limit: choices::MAX_BUTTON_ACTIONS,
            button_choice_length: choices::MAX_BUTTON_CHOICE_LENGTH,
            carousel_limit: choices::MAX_CAROUSEL_CARDS,
            carousel_text_length: choices::CAROUSEL_TEXT_LENGTH,
            none_of_the_above_marker: choices::NONE_OF_THE_ABOVE_MARKER.to_owned(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        assert!(Options::default().validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let options: Options = serde_json::from_str(r#"{"carousel_limit": 3}"#).unwrap();

        assert_eq!(options.carousel_limit, 3);
        assert_eq!(options.button_limit, choices::MAX_BUTTON_ACTIONS);
        assert_eq!(options.none_of_the_above_marker, "皆");
    }

    #[test]
    fn test_button_limit_above_platform_maximum() {
        let options = Options {
            button_limit: choices::MAX_BUTTON_ACTIONS + 1,
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_carousel_limit_cannot_exceed_card_letters() {
        let options = Options {
            carousel_limit: 11,
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_empty_marker_is_rejected() {
        let options = Options {
            none_of_the_above_marker: String::new(),
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }
}
