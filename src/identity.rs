//! Chat identities bound to attendees
//!
//! An identity ties a chat user to an attendee record and carries the
//! attendee's running score. Scores and answer history belong to the
//! attendee: unbinding only drops the link, and binding the same attendee
//! again picks the score back up.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Mutex, PoisonError},
};

use enum_map::EnumMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    platform::{Platform, UserKey},
    question::QuestionUid,
    roster::AttendeeUid,
};

/// An attendee as seen through a bound chat identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The attendee the chat user is bound to
    pub attendee: AttendeeUid,
    /// Points earned so far, one per correct answer
    pub score: u64,
    /// Questions already answered, correctly or not
    pub answered: BTreeSet<QuestionUid>,
}

impl Identity {
    /// A fresh identity with no score
    pub fn new(attendee: AttendeeUid) -> Self {
        Self {
            attendee,
            score: 0,
            answered: BTreeSet::new(),
        }
    }

    /// Applies an answer to the score and history
    ///
    /// Only the first answer to a question can score. Chat users bound to
    /// the same attendee may face the same question at once, and the later
    /// answer must not count again. Returns whether a point was awarded.
    pub fn record_answer(&mut self, question: QuestionUid, correct: bool) -> bool {
        let scored = self.answered.insert(question) && correct;
        if scored {
            self.score += 1;
        }
        scored
    }
}

/// Trait for storing identity bindings and scores
pub trait IdentityStore {
    /// The identity bound to the user, or `None` when unbound
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn get(&self, user: &UserKey) -> Result<Option<Identity>, StoreError>;

    /// Binds the user to the attendee and returns the bound identity
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn bind(&self, user: &UserKey, attendee: &AttendeeUid) -> Result<Identity, StoreError>;

    /// Drops the user's binding, keeping the attendee's score
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn unbind(&self, user: &UserKey) -> Result<(), StoreError>;

    /// Current score of the bound user, zero when unbound
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn score(&self, user: &UserKey) -> Result<u64, StoreError>;

    /// Records an answer for the bound user, adding a point iff correct
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn record_answer(
        &self,
        user: &UserKey,
        question: QuestionUid,
        correct: bool,
    ) -> Result<(), StoreError>;

    /// The identity the attendee would have once bound
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn record_for(&self, attendee: &AttendeeUid) -> Result<Identity, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    links: EnumMap<Platform, HashMap<String, AttendeeUid>>,
    records: HashMap<AttendeeUid, Identity>,
}

impl Tables {
    fn linked(&self, user: &UserKey) -> Option<&AttendeeUid> {
        self.links[user.platform].get(&user.id)
    }

    fn record(&self, attendee: &AttendeeUid) -> Identity {
        self.records
            .get(attendee)
            .cloned()
            .unwrap_or_else(|| Identity::new(attendee.clone()))
    }
}

/// An identity store held in memory
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    tables: Mutex<Tables>,
}

impl MemoryIdentityStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get(&self, user: &UserKey) -> Result<Option<Identity>, StoreError> {
        let tables = self.tables();
        Ok(tables.linked(user).map(|attendee| tables.record(attendee)))
    }

    fn bind(&self, user: &UserKey, attendee: &AttendeeUid) -> Result<Identity, StoreError> {
        let mut tables = self.tables();
        tables.links[user.platform].insert(user.id.clone(), attendee.clone());
        let identity = tables.record(attendee);
        tables
            .records
            .entry(attendee.clone())
            .or_insert_with(|| identity.clone());
        Ok(identity)
    }

    fn unbind(&self, user: &UserKey) -> Result<(), StoreError> {
        self.tables().links[user.platform].remove(&user.id);
        Ok(())
    }

    fn score(&self, user: &UserKey) -> Result<u64, StoreError> {
        Ok(self.get(user)?.map_or(0, |identity| identity.score))
    }

    fn record_answer(
        &self,
        user: &UserKey,
        question: QuestionUid,
        correct: bool,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let Some(attendee) = tables.linked(user).cloned() else {
            return Ok(());
        };
        tables
            .records
            .entry(attendee.clone())
            .or_insert_with(|| Identity::new(attendee))
            .record_answer(question, correct);
        Ok(())
    }

    fn record_for(&self, attendee: &AttendeeUid) -> Result<Identity, StoreError> {
        Ok(self.tables().record(attendee))
    }
}
