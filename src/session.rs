//! Per-user dialogue session state
//!
//! A session records whether the user is in the middle of registering and
//! which question, if any, they are currently facing. Absence of a stored
//! session is the same as an idle one. The session store also provides
//! per-user mutual exclusion so one user's events are handled one at a time.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use enum_map::EnumMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    platform::{Platform, UserKey},
    question::Question,
};

/// The stored session of a chat user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The user is expected to type their registration email
    pub registration_active: bool,
    /// The open question, if any
    pub current_question: Option<Question>,
}

/// Trait for storing dialogue sessions
pub trait SessionStore {
    /// Runs `f` while holding the user's lock
    ///
    /// Reads and writes for the user made inside `f` are not interleaved
    /// with those of any other call for the same user.
    fn with_user_lock<R>(&self, user: &UserKey, f: impl FnOnce() -> R) -> R;

    /// Whether the user is in the middle of registering
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn is_registration_active(&self, user: &UserKey) -> Result<bool, StoreError>;

    /// Marks the user as registering
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn activate_registration(&self, user: &UserKey) -> Result<(), StoreError>;

    /// Ends the user's registration flow
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn complete_registration(&self, user: &UserKey) -> Result<(), StoreError>;

    /// The question the user is currently facing
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn current_question(&self, user: &UserKey) -> Result<Option<Question>, StoreError>;

    /// Replaces or clears the user's current question
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn set_current_question(
        &self,
        user: &UserKey,
        question: Option<Question>,
    ) -> Result<(), StoreError>;
}

/// A session store held in memory
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<EnumMap<Platform, HashMap<String, Session>>>,
    locks: Mutex<HashMap<UserKey, Arc<Mutex<()>>>>,
}

impl MemorySessionStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the user's session, idle when none is stored
    pub fn session(&self, user: &UserKey) -> Session {
        self.sessions()[user.platform]
            .get(&user.id)
            .cloned()
            .unwrap_or_default()
    }

    fn sessions(&self) -> MutexGuard<'_, EnumMap<Platform, HashMap<String, Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, user: &UserKey, f: impl FnOnce(&mut Session)) {
        let mut sessions = self.sessions();
        let table = &mut sessions[user.platform];
        let session = table.entry(user.id.clone()).or_default();
        f(session);
        if *session == Session::default() {
            table.remove(&user.id);
        }
    }

    fn user_lock(&self, user: &UserKey) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user.clone())
            .or_default()
            .clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn with_user_lock<R>(&self, user: &UserKey, f: impl FnOnce() -> R) -> R {
        let lock = self.user_lock(user);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    fn is_registration_active(&self, user: &UserKey) -> Result<bool, StoreError> {
        Ok(self.session(user).registration_active)
    }

    fn activate_registration(&self, user: &UserKey) -> Result<(), StoreError> {
        self.update(user, |session| session.registration_active = true);
        Ok(())
    }

    fn complete_registration(&self, user: &UserKey) -> Result<(), StoreError> {
        self.update(user, |session| session.registration_active = false);
        Ok(())
    }

    fn current_question(&self, user: &UserKey) -> Result<Option<Question>, StoreError> {
        Ok(self.session(user).current_question)
    }

    fn set_current_question(
        &self,
        user: &UserKey,
        question: Option<Question>,
    ) -> Result<(), StoreError> {
        self.update(user, |session| session.current_question = question);
        Ok(())
    }
}
