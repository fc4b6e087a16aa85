//! Chat platforms and their adapters
//!
//! Each supported chat platform has an adapter that translates its native
//! webhook bodies into normalized [`crate::intent::Event`]s and lowers
//! normalized [`crate::reply::Reply`] items into the platform's own JSON.
//! Delivering that JSON over HTTP is left to a [`Tunnel`] implementation.

use std::fmt::Display;

use enum_map::Enum;
use serde::{Deserialize, Serialize};

use crate::reply::Reply;

pub mod line;
pub mod messenger;

/// A chat platform the bot is reachable on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Enum, Serialize, Deserialize)]
pub enum Platform {
    /// LINE Messaging API
    #[serde(rename = "line")]
    Line,
    /// Facebook Messenger
    #[serde(rename = "fb")]
    Messenger,
}

impl Platform {
    /// Short, stable name of the platform
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Messenger => "fb",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one chat user on one platform
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserKey {
    /// Platform the user talks through
    pub platform: Platform,
    /// The platform's own user id
    pub id: String,
}

impl UserKey {
    /// Creates a key for a user on a platform
    pub fn new(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
        }
    }
}

impl Display for UserKey {
    /// Formats the key as `platform:id`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.platform, self.id)
    }
}

/// Trait for delivering replies to a chat user
///
/// This is the outbound half of a platform adapter. Implementations lower
/// the replies with the matching adapter module and post them to the
/// platform's send API. Delivery is best effort; nothing the engine does
/// depends on its outcome.
pub trait Tunnel {
    /// Sends the replies, in order, to the user
    fn deliver(&self, user: &UserKey, replies: &[Reply]);
}
