//! # Quiz Bot Library
//!
//! This library provides the dialogue logic of a registration-gated trivia
//! bot reachable over LINE and Facebook Messenger. Users register by email
//! against an attendee roster, bind their chat identity to an attendee, and
//! then answer multiple choice questions while a running score is kept.
//!
//! Platform adapters in [`platform`] turn webhook bodies into normalized
//! events; the [`engine::Engine`] decides the replies and state changes for
//! each event; [`render`] lays questions out as buttons or carousels; the
//! adapters lower the replies back to platform JSON.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod identity;
pub mod intent;
pub mod messages;
pub mod platform;
pub mod question;
pub mod render;
pub mod reply;
pub mod roster;
pub mod session;

pub use engine::Engine;
pub use error::Error;

/// Keeps at most `max` characters of `text`
pub(crate) fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
