//! The per-user dialogue state machine
//!
//! The engine consumes one inbound [`Event`] at a time and produces the
//! replies for it. A user's state is never kept between events; it is
//! derived from the stores at the start of every event:
//!
//! * unbound, registration inactive: invited to register
//! * unbound, registration active: expected to type their email
//! * bound, no current question: idle
//! * bound, current question open: expected to answer
//!
//! Each event is handled under the session store's per-user lock. All
//! reads and collaborator lookups happen first while state writes are only
//! staged; they are applied together once the event is fully decided. When
//! one of those writes fails, the writes already applied are undone, so a
//! failing collaborator aborts the event without partial writes.

use garde::Validate;

use crate::{
    config::Options,
    error::{Error, StoreError},
    identity::{Identity, IdentityStore},
    intent::{self, Event, Intent, Postback, keyword},
    messages,
    platform::{Tunnel, UserKey},
    question::{Question, QuestionSource, QuestionUid},
    render::render,
    reply::{Action, ConfirmPrompt, IdentityPicker, Reply},
    roster::{AttendeeUid, Roster},
    session::SessionStore,
};

/// A state write staged during an event
#[derive(Debug, Clone, PartialEq, Eq)]
enum Effect {
    ActivateRegistration,
    CompleteRegistration,
    Bind(AttendeeUid),
    Unbind,
    RecordAnswer { question: QuestionUid, correct: bool },
    SetCurrentQuestion(Option<Question>),
}

impl Effect {
    /// Position in the commit order
    ///
    /// Session writes and binding changes can be undone from a snapshot, so
    /// they go first; recording an answer cannot, so it goes last.
    fn commit_order(&self) -> u8 {
        match self {
            Self::ActivateRegistration
            | Self::CompleteRegistration
            | Self::SetCurrentQuestion(_) => 0,
            Self::Bind(_) | Self::Unbind => 1,
            Self::RecordAnswer { .. } => 2,
        }
    }
}

/// User state as it was before an event's writes
#[derive(Debug)]
struct Snapshot {
    registration_active: bool,
    current_question: Option<Question>,
    attendee: Option<AttendeeUid>,
}

/// Work in progress for one event
#[derive(Debug, Default)]
struct Turn {
    effects: Vec<Effect>,
    replies: Vec<Reply>,
}

impl Turn {
    fn stage(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    fn reply(&mut self, reply: impl Into<Reply>) {
        self.replies.push(reply.into());
    }

    fn say(&mut self, text: impl Into<String>) {
        self.replies.push(Reply::Text(text.into()));
    }
}

/// The dialogue engine
///
/// The engine itself holds no per-user state; everything is read from and
/// written to its collaborators, so one engine may serve any number of
/// users from any number of threads.
#[derive(Debug)]
pub struct Engine<R, I, S, Q> {
    options: Options,
    roster: R,
    identities: I,
    sessions: S,
    questions: Q,
    seed: Option<u64>,
}

impl<R, I, S, Q> Engine<R, I, S, Q>
where
    R: Roster,
    I: IdentityStore,
    S: SessionStore,
    Q: QuestionSource,
{
    /// Creates an engine over its collaborators
    ///
    /// # Arguments
    ///
    /// * `options` - Layout options for rendering questions
    /// * `roster` - Attendee lookup
    /// * `identities` - Identity bindings and scores
    /// * `sessions` - Registration flags, current questions and user locks
    /// * `questions` - Supplier of the next question
    ///
    /// # Errors
    ///
    /// Returns `Error::Options` if the options fail validation.
    pub fn new(
        options: Options,
        roster: R,
        identities: I,
        sessions: S,
        questions: Q,
    ) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self {
            options,
            roster,
            identities,
            sessions,
            questions,
            seed: None,
        })
    }

    /// Makes choice shuffling deterministic
    ///
    /// Every event shuffles with a generator seeded from `seed`.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The identity store
    pub fn identities(&self) -> &I {
        &self.identities
    }

    /// The session store
    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    /// Handles one event and returns the replies for it
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if a collaborator fails. No state is written
    /// for the event in that case.
    pub fn handle(&self, event: &Event) -> Result<Vec<Reply>, Error> {
        let user = &event.user;
        self.sessions
            .with_user_lock(user, || -> Result<Vec<Reply>, Error> {
                let mut turn = Turn::default();
                match self.identities.get(user)? {
                    None => self.unbound(event, &mut turn)?,
                    Some(identity) => self.bound(event, identity, &mut turn)?,
                }
                self.commit(user, turn.effects)?;
                Ok(turn.replies)
            })
    }

    /// Handles one event and delivers the replies through the tunnel
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if a collaborator fails; nothing is
    /// delivered in that case.
    pub fn dispatch<T: Tunnel>(&self, event: &Event, tunnel: &T) -> Result<(), Error> {
        let replies = self.handle(event)?;
        if !replies.is_empty() {
            tunnel.deliver(&event.user, &replies);
        }
        Ok(())
    }

    fn unbound(&self, event: &Event, turn: &mut Turn) -> Result<(), StoreError> {
        let user = &event.user;

        match &event.intent {
            Intent::SelectIdentity(uid) => return self.select_identity(user, uid, turn),
            Intent::CancelIdentitySelection => {
                turn.stage(Effect::ActivateRegistration);
                turn.say(messages::ASK_FOR_EMAIL_AGAIN);
                return Ok(());
            }
            Intent::DeclineRegistration => {
                turn.say(messages::REGISTRATION_DECLINED);
                return Ok(());
            }
            Intent::Exit => {
                turn.say(messages::GOODBYE);
                return Ok(());
            }
            Intent::ResetSession => {
                turn.stage(Effect::CompleteRegistration);
                turn.say(messages::SESSION_RESET);
                return Ok(());
            }
            _ => {}
        }

        if self.sessions.is_registration_active(user)? {
            match event.message.text() {
                Some(text) => self.receive_email(user, text, turn),
                None => turn.say(messages::ASK_FOR_EMAIL),
            }
        } else if event.intent == Intent::BeginRegistration {
            turn.stage(Effect::ActivateRegistration);
            turn.say(messages::ASK_FOR_EMAIL);
        } else {
            turn.reply(registration_invitation());
        }
        Ok(())
    }

    fn receive_email(&self, user: &UserKey, text: &str, turn: &mut Turn) {
        if !intent::is_email(text) {
            turn.say(messages::INVALID_EMAIL);
            return;
        }

        turn.stage(Effect::CompleteRegistration);
        let records = self.roster.find(text);
        tracing::info!(%user, candidates = records.len(), "looked up registration email");

        if records.is_empty() {
            turn.say(messages::REGISTRATION_NOT_FOUND);
        } else {
            turn.reply(IdentityPicker {
                title: messages::PICK_IDENTITY_TITLE.to_owned(),
                text: messages::PICK_IDENTITY_TEXT.to_owned(),
                candidates: records
                    .into_iter()
                    .map(|record| {
                        let label = record.label();
                        Action::postback(label, Postback::Register(record.uid))
                    })
                    .collect(),
                cancel: Action::postback(messages::CANCEL_LABEL, Postback::CancelRegister),
            });
        }
    }

    fn select_identity(
        &self,
        user: &UserKey,
        uid: &AttendeeUid,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        let Some(record) = self.roster.find_by_uid(uid) else {
            turn.say(messages::REGISTRATION_NOT_FOUND);
            return Ok(());
        };

        let identity = self.identities.record_for(&record.uid)?;
        turn.stage(Effect::Bind(record.uid));
        turn.stage(Effect::CompleteRegistration);
        tracing::info!(%user, attendee = %identity.attendee, "registered");

        turn.say(messages::REGISTRATION_SUCCEEDED);
        self.ask_next_question(user, &identity, turn)
    }

    fn bound(&self, event: &Event, identity: Identity, turn: &mut Turn) -> Result<(), StoreError> {
        let user = &event.user;

        match &event.intent {
            Intent::LookupScore => turn.say(messages::score(identity.score)),
            Intent::RequestUnbind => turn.reply(ConfirmPrompt {
                text: messages::CONFIRM_UNBIND.to_owned(),
                confirm: Action::postback(messages::CONFIRM_LABEL, Postback::ConfirmUnbind),
                cancel: Action::postback(messages::CANCEL_LABEL, Postback::CancelUnbind),
            }),
            Intent::ConfirmUnbind => {
                turn.stage(Effect::Unbind);
                turn.stage(Effect::SetCurrentQuestion(None));
                turn.stage(Effect::CompleteRegistration);
                tracing::info!(%user, attendee = %identity.attendee, "unbound");
                turn.say(messages::UNBOUND);
            }
            Intent::CancelUnbind => turn.say(messages::UNBIND_CANCELLED),
            Intent::StartGame => {
                tracing::info!(%user, "start game");
                if self.sessions.current_question(user)?.is_some() {
                    turn.say(messages::GAME_IN_PROGRESS);
                } else {
                    self.ask_next_question(user, &identity, turn)?;
                }
            }
            Intent::PauseGame => {
                turn.stage(Effect::SetCurrentQuestion(None));
                tracing::info!(%user, "cleared current question");
                turn.say(messages::GAME_PAUSED);
            }
            Intent::Answer(choice) => match self.sessions.current_question(user)? {
                Some(question) => self.answer(user, identity, &question, choice, turn)?,
                None => turn.say(messages::NO_OPEN_QUESTION),
            },
            Intent::SelectIdentity(_) | Intent::BeginRegistration => {
                turn.say(messages::ALREADY_BOUND);
            }
            Intent::Exit => turn.say(messages::GOODBYE),
            Intent::ResetSession => {
                turn.stage(Effect::CompleteRegistration);
                turn.say(messages::SESSION_RESET);
            }
            Intent::DeclineRegistration | Intent::CancelIdentitySelection | Intent::Unrecognized => {
                turn.reply(game_menu());
            }
        }
        Ok(())
    }

    fn answer(
        &self,
        user: &UserKey,
        mut identity: Identity,
        question: &Question,
        choice: &str,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        let correct = question.is_correct(choice);
        tracing::info!(%user, question = %question.uid, answer = choice, correct, "answer selected");

        identity.record_answer(question.uid, correct);
        turn.stage(Effect::RecordAnswer {
            question: question.uid,
            correct,
        });
        turn.say(if correct {
            messages::correct(identity.score)
        } else {
            messages::wrong(identity.score)
        });

        self.ask_next_question(user, &identity, turn)
    }

    fn ask_next_question(
        &self,
        user: &UserKey,
        identity: &Identity,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        let Some(question) = self.questions.next_question(identity)? else {
            turn.stage(Effect::SetCurrentQuestion(None));
            turn.say(messages::NO_MORE_QUESTIONS);
            return Ok(());
        };

        match render(&question, &self.options, &mut self.rng()) {
            Ok(replies) => {
                tracing::info!(%user, question = %question.uid, "asked question");
                turn.stage(Effect::SetCurrentQuestion(Some(question)));
                turn.replies.extend(replies);
            }
            Err(error) => {
                tracing::error!(%user, %error, "cannot present question");
                turn.stage(Effect::SetCurrentQuestion(None));
                turn.say(messages::QUESTION_UNAVAILABLE);
            }
        }
        Ok(())
    }

    fn commit(&self, user: &UserKey, mut effects: Vec<Effect>) -> Result<(), StoreError> {
        if effects.is_empty() {
            return Ok(());
        }
        effects.sort_by_key(Effect::commit_order);

        let snapshot = Snapshot {
            registration_active: self.sessions.is_registration_active(user)?,
            current_question: self.sessions.current_question(user)?,
            attendee: self.identities.get(user)?.map(|identity| identity.attendee),
        };

        for (applied, effect) in effects.iter().enumerate() {
            if let Err(error) = self.apply(user, effect) {
                tracing::warn!(%user, %error, "rolling back event");
                self.roll_back(user, &effects[..applied], &snapshot);
                return Err(error);
            }
        }
        Ok(())
    }

    fn apply(&self, user: &UserKey, effect: &Effect) -> Result<(), StoreError> {
        match effect {
            Effect::ActivateRegistration => self.sessions.activate_registration(user),
            Effect::CompleteRegistration => self.sessions.complete_registration(user),
            Effect::Bind(attendee) => self.identities.bind(user, attendee).map(drop),
            Effect::Unbind => self.identities.unbind(user),
            Effect::RecordAnswer { question, correct } => {
                self.identities.record_answer(user, *question, *correct)
            }
            Effect::SetCurrentQuestion(question) => {
                self.sessions.set_current_question(user, question.clone())
            }
        }
    }

    /// Restores what the applied effects touched
    ///
    /// An answer is always the last write, so it is never among them.
    fn roll_back(&self, user: &UserKey, applied: &[Effect], snapshot: &Snapshot) {
        for effect in applied.iter().rev() {
            let restored = match effect {
                Effect::ActivateRegistration | Effect::CompleteRegistration => {
                    if snapshot.registration_active {
                        self.sessions.activate_registration(user)
                    } else {
                        self.sessions.complete_registration(user)
                    }
                }
                Effect::SetCurrentQuestion(_) => self
                    .sessions
                    .set_current_question(user, snapshot.current_question.clone()),
                Effect::Bind(_) | Effect::Unbind => match &snapshot.attendee {
                    Some(attendee) => self.identities.bind(user, attendee).map(drop),
                    None => self.identities.unbind(user),
                },
                Effect::RecordAnswer { .. } => Ok(()),
            };
            if let Err(error) = restored {
                tracing::error!(%user, %error, "cannot roll back event");
            }
        }
    }

    fn rng(&self) -> fastrand::Rng {
        self.seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed)
    }
}

/// Invitation to register, offered to unbound users
fn registration_invitation() -> ConfirmPrompt {
    ConfirmPrompt {
        text: messages::ASK_FOR_REGISTRATION.to_owned(),
        confirm: Action::say(messages::REGISTER_LABEL, keyword::BEGIN_REGISTRATION),
        cancel: Action::postback(messages::CANCEL_LABEL, Postback::DeclineRegistration),
    }
}

/// The default menu for bound users
fn game_menu() -> ConfirmPrompt {
    ConfirmPrompt {
        text: messages::MENU_TEXT.to_owned(),
        confirm: Action::say(keyword::START_GAME_ALT, keyword::START_GAME_ALT),
        cancel: Action::postback(messages::EXIT_LABEL, Postback::Exit),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
    };

    use itertools::Itertools;
    use proptest::prelude::*;

    use super::*;
    use crate::{
        identity::MemoryIdentityStore,
        platform::Platform,
        question::QuestionBank,
        reply::{ActionValue, ChoicePrompt},
        roster::{AttendeeRecord, MemoryRoster, tests::row},
        session::MemorySessionStore,
    };

    type TestEngine<Q = QuestionBank, R = MemoryRoster> =
        Engine<R, MemoryIdentityStore, MemorySessionStore, Q>;

    fn roster() -> MemoryRoster {
        MemoryRoster::from_exports([vec![
            row("101", "Alice", "alice@example.com"),
            row("202", "Bob", "family@example.com"),
            row("203", "Carol", "family@example.com"),
        ]])
    }

    fn bank(count: usize) -> QuestionBank {
        QuestionBank::with_rng(
            (0..count)
                .map(|i| Question::new(format!("Question {i}"), "B", ["A", "C"]))
                .collect_vec(),
            fastrand::Rng::with_seed(3),
        )
        .unwrap()
    }

    fn engine_with<Q: QuestionSource>(questions: Q) -> TestEngine<Q> {
        Engine::new(
            Options::default(),
            roster(),
            MemoryIdentityStore::new(),
            MemorySessionStore::new(),
            questions,
        )
        .unwrap()
        .with_seed(11)
    }

    fn engine() -> TestEngine {
        engine_with(bank(10))
    }

    fn user() -> UserKey {
        UserKey::new(Platform::Line, "U-alice")
    }

    fn text_event<R, I, S, Q>(engine: &Engine<R, I, S, Q>, s: &str) -> Vec<Reply>
    where
        R: Roster,
        I: IdentityStore,
        S: SessionStore,
        Q: QuestionSource,
    {
        engine.handle(&Event::text(user(), s)).unwrap()
    }

    fn text(engine: &TestEngine<impl QuestionSource, impl Roster>, s: &str) -> Vec<Reply> {
        engine.handle(&Event::text(user(), s)).unwrap()
    }

    fn postback(engine: &TestEngine<impl QuestionSource, impl Roster>, s: &str) -> Vec<Reply> {
        engine.handle(&Event::postback(user(), s)).unwrap()
    }

    fn bind(engine: &TestEngine<impl QuestionSource, impl Roster>) {
        engine
            .identities()
            .bind(&user(), &AttendeeUid::new("101"))
            .unwrap();
    }

    fn open_question(engine: &TestEngine<impl QuestionSource, impl Roster>, question: &Question) {
        engine
            .sessions()
            .set_current_question(&user(), Some(question.clone()))
            .unwrap();
    }

    fn has_question(replies: &[Reply]) -> bool {
        replies.iter().any(|reply| matches!(reply, Reply::Choices(_)))
    }

    fn is_invitation(replies: &[Reply]) -> bool {
        matches!(replies, [Reply::Confirm(prompt)] if prompt.text == messages::ASK_FOR_REGISTRATION)
    }

    fn score(engine: &TestEngine<impl QuestionSource, impl Roster>) -> u64 {
        engine.identities().score(&user()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let options = Options {
            button_limit: 0,
            ..Options::default()
        };
        let result = Engine::new(
            options,
            roster(),
            MemoryIdentityStore::new(),
            MemorySessionStore::new(),
            bank(1),
        );
        assert!(matches!(result, Err(Error::Options(_))));
    }

    #[test]
    fn test_unbound_user_is_invited_to_register() {
        let engine = engine();
        for message in ["hello", "玩遊戲", "查分數", "答案：B"] {
            assert!(is_invitation(&text(&engine, message)), "{message}");
        }
        assert!(!engine.sessions().is_registration_active(&user()).unwrap());
    }

    #[test]
    fn test_registration_scenario() {
        let engine = engine();

        assert_eq!(text(&engine, "開始註冊"), vec![Reply::text(messages::ASK_FOR_EMAIL)]);
        assert!(engine.sessions().is_registration_active(&user()).unwrap());

        let replies = text(&engine, "alice@example.com");
        let [Reply::IdentityPicker(picker)] = &replies[..] else {
            panic!("expected identity picker, got {replies:?}");
        };
        assert_eq!(picker.candidates.len(), 1);
        assert_eq!(picker.candidates[0].label, "#101, Alice");
        assert_eq!(
            picker.cancel.value,
            ActionValue::Postback(Postback::CancelRegister)
        );
        assert!(!engine.sessions().is_registration_active(&user()).unwrap());

        let replies = postback(&engine, &picker.candidates[0].value.payload());
        assert_eq!(replies[0], Reply::text(messages::REGISTRATION_SUCCEEDED));
        assert!(has_question(&replies[1..]));

        let identity = engine.identities().get(&user()).unwrap().unwrap();
        assert_eq!(identity.attendee, AttendeeUid::new("101"));
        assert_eq!(identity.score, 0);
        assert!(engine.sessions().current_question(&user()).unwrap().is_some());
    }

    #[test]
    fn test_shared_email_lists_every_attendee() {
        let engine = engine();
        text(&engine, "開始註冊");
        let replies = text(&engine, "family@example.com");

        let [Reply::IdentityPicker(picker)] = &replies[..] else {
            panic!("expected identity picker, got {replies:?}");
        };
        assert_eq!(
            picker.candidates.iter().map(|c| c.label.as_str()).collect_vec(),
            vec!["#202, Bob", "#203, Carol"]
        );
    }

    #[test]
    fn test_unknown_email_returns_to_idle() {
        let engine = engine();
        text(&engine, "開始註冊");

        assert_eq!(
            text(&engine, "nobody@example.com"),
            vec![Reply::text(messages::REGISTRATION_NOT_FOUND)]
        );
        assert!(!engine.sessions().is_registration_active(&user()).unwrap());
        assert!(is_invitation(&text(&engine, "nobody@example.com")));
    }

    #[derive(Default)]
    struct SpyRoster {
        inner: MemoryRoster,
        lookups: AtomicUsize,
    }

    impl Roster for SpyRoster {
        fn find(&self, email: &str) -> Vec<AttendeeRecord> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find(email)
        }

        fn find_by_uid(&self, uid: &AttendeeUid) -> Option<AttendeeRecord> {
            self.inner.find_by_uid(uid)
        }
    }

    #[test]
    fn test_malformed_email_keeps_registration_active() {
        let engine: TestEngine<QuestionBank, SpyRoster> = Engine::new(
            Options::default(),
            SpyRoster {
                inner: roster(),
                lookups: AtomicUsize::new(0),
            },
            MemoryIdentityStore::new(),
            MemorySessionStore::new(),
            bank(1),
        )
        .unwrap();

        text(&engine, "開始註冊");
        for attempt in ["alice at example.com", "查分數", "alice@example"] {
            assert_eq!(
                text(&engine, attempt),
                vec![Reply::text(messages::INVALID_EMAIL)]
            );
        }

        assert!(engine.sessions().is_registration_active(&user()).unwrap());
        assert_eq!(engine.roster.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_identity_selection_prompts_for_email_again() {
        let engine = engine();
        text(&engine, "開始註冊");
        text(&engine, "alice@example.com");

        assert_eq!(
            postback(&engine, "R:CANCEL"),
            vec![Reply::text(messages::ASK_FOR_EMAIL_AGAIN)]
        );
        assert!(engine.sessions().is_registration_active(&user()).unwrap());
        assert!(matches!(
            &text(&engine, "alice@example.com")[..],
            [Reply::IdentityPicker(_)]
        ));
    }

    #[test]
    fn test_non_selection_postback_during_registration_asks_for_email() {
        let engine = engine();
        text(&engine, "開始註冊");
        assert_eq!(
            postback(&engine, "CONFIRM_DELETE"),
            vec![Reply::text(messages::ASK_FOR_EMAIL)]
        );
        assert!(engine.sessions().is_registration_active(&user()).unwrap());
    }

    #[test]
    fn test_selecting_unknown_attendee_does_not_bind() {
        let engine = engine();
        assert_eq!(
            postback(&engine, "R:999"),
            vec![Reply::text(messages::REGISTRATION_NOT_FOUND)]
        );
        assert_eq!(engine.identities().get(&user()).unwrap(), None);
    }

    #[test]
    fn test_replayed_selection_reports_already_bound() {
        let engine = engine();
        let first = postback(&engine, "R:101");
        assert!(has_question(&first));
        let question = engine.sessions().current_question(&user()).unwrap();

        assert_eq!(
            postback(&engine, "R:101"),
            vec![Reply::text(messages::ALREADY_BOUND)]
        );
        assert_eq!(engine.sessions().current_question(&user()).unwrap(), question);
        assert_eq!(score(&engine), 0);
    }

    #[test]
    fn test_answer_scoring_scenario() {
        let engine = engine();
        bind(&engine);
        open_question(&engine, &Question::new("Pick B", "B", ["A", "C"]));

        let replies = text(&engine, "答案：B");
        assert_eq!(replies[0], Reply::text(messages::correct(1)));
        assert!(has_question(&replies[1..]));
        assert_eq!(score(&engine), 1);

        let replies = text(&engine, "答案：C");
        assert_eq!(replies[0], Reply::text(messages::wrong(1)));
        assert!(has_question(&replies[1..]));
        assert_eq!(score(&engine), 1);
    }

    #[test]
    fn test_answer_comparison_is_exact() {
        let engine = engine();
        bind(&engine);
        open_question(&engine, &Question::new("Pick", "Python", ["Ruby"]));

        text(&engine, "答案：python");
        assert_eq!(score(&engine), 0);
    }

    #[test]
    fn test_answer_through_postback_scores_the_same() {
        let engine = engine();
        bind(&engine);
        open_question(&engine, &Question::new("Pick B", "B", ["A"]));

        postback(&engine, "答案：B");
        assert_eq!(score(&engine), 1);
    }

    #[test]
    fn test_rendered_answer_action_scores() {
        let engine = engine();
        bind(&engine);
        let replies = text(&engine, "玩遊戲");
        let Some(Reply::Choices(ChoicePrompt::Buttons { actions, .. })) = replies.last() else {
            panic!("expected buttons, got {replies:?}");
        };
        let correct = actions
            .iter()
            .find(|action| action.value == ActionValue::Answer("B".to_owned()))
            .unwrap();

        text(&engine, &correct.value.payload());
        assert_eq!(score(&engine), 1);
    }

    #[test]
    fn test_answer_without_open_question() {
        let engine = engine();
        bind(&engine);
        assert_eq!(
            text(&engine, "答案：B"),
            vec![Reply::text(messages::NO_OPEN_QUESTION)]
        );
        assert_eq!(score(&engine), 0);
    }

    #[test]
    fn test_start_game_issues_question_once() {
        let engine = engine();
        bind(&engine);

        assert!(has_question(&text(&engine, "玩遊戲")));
        assert_eq!(
            text(&engine, "開始玩"),
            vec![Reply::text(messages::GAME_IN_PROGRESS)]
        );
    }

    #[test]
    fn test_pause_clears_current_question() {
        let engine = engine();
        bind(&engine);
        text(&engine, "玩遊戲");

        assert_eq!(text(&engine, "不玩了"), vec![Reply::text(messages::GAME_PAUSED)]);
        assert_eq!(engine.sessions().current_question(&user()).unwrap(), None);
    }

    #[test]
    fn test_score_lookup_while_question_open() {
        let engine = engine();
        bind(&engine);
        open_question(&engine, &Question::new("Pick B", "B", ["A"]));
        text(&engine, "答案：B");

        assert_eq!(text(&engine, "查分數"), vec![Reply::text(messages::score(1))]);
    }

    #[test]
    fn test_unbind_scenario() {
        let engine = engine();
        bind(&engine);
        open_question(&engine, &Question::new("Pick B", "B", ["A"]));
        text(&engine, "答案：B");

        let replies = text(&engine, "解除綁定");
        let [Reply::Confirm(prompt)] = &replies[..] else {
            panic!("expected confirm prompt, got {replies:?}");
        };
        assert_eq!(
            prompt.confirm.value,
            ActionValue::Postback(Postback::ConfirmUnbind)
        );
        assert!(engine.identities().get(&user()).unwrap().is_some());

        assert_eq!(
            postback(&engine, &prompt.confirm.value.payload()),
            vec![Reply::text(messages::UNBOUND)]
        );
        assert_eq!(engine.identities().get(&user()).unwrap(), None);
        assert_eq!(engine.sessions().current_question(&user()).unwrap(), None);
        assert!(is_invitation(&text(&engine, "查分數")));

        let kept = engine
            .identities()
            .record_for(&AttendeeUid::new("101"))
            .unwrap();
        assert_eq!(kept.score, 1);
    }

    #[test]
    fn test_cancel_unbind_keeps_binding() {
        let engine = engine();
        bind(&engine);
        assert_eq!(
            postback(&engine, "CANCEL_DELETE"),
            vec![Reply::text(messages::UNBIND_CANCELLED)]
        );
        assert!(engine.identities().get(&user()).unwrap().is_some());
    }

    #[test]
    fn test_bound_user_gets_menu_for_unrecognized_text() {
        let engine = engine();
        bind(&engine);
        let replies = text(&engine, "hello?");
        let [Reply::Confirm(menu)] = &replies[..] else {
            panic!("expected menu, got {replies:?}");
        };
        assert_eq!(menu.confirm.value, ActionValue::Say("開始玩".to_owned()));
        assert_eq!(menu.cancel.value, ActionValue::Postback(Postback::Exit));
    }

    #[test]
    fn test_exit_and_decline_acknowledge() {
        let engine = engine();
        assert_eq!(
            postback(&engine, "NOREGISTER"),
            vec![Reply::text(messages::REGISTRATION_DECLINED)]
        );
        assert_eq!(postback(&engine, "exit"), vec![Reply::text(messages::GOODBYE)]);
    }

    #[test]
    fn test_no_more_questions() {
        let engine = engine_with(bank(1));
        bind(&engine);
        text(&engine, "玩遊戲");

        let question = engine.sessions().current_question(&user()).unwrap().unwrap();
        let replies = text(&engine, &intent::answer_text(&question.answer));
        assert_eq!(
            replies,
            vec![
                Reply::text(messages::correct(1)),
                Reply::text(messages::NO_MORE_QUESTIONS)
            ]
        );
        assert_eq!(engine.sessions().current_question(&user()).unwrap(), None);
    }

    struct Fixed(Question);

    impl QuestionSource for Fixed {
        fn next_question(&self, _: &Identity) -> Result<Option<Question>, StoreError> {
            Ok(Some(self.0.clone()))
        }
    }

    #[test]
    fn test_question_without_choices_is_reported_not_asked() {
        let engine = engine_with(Fixed(Question::new("Broken", "", [""])));
        bind(&engine);

        assert_eq!(
            text(&engine, "玩遊戲"),
            vec![Reply::text(messages::QUESTION_UNAVAILABLE)]
        );
        assert_eq!(engine.sessions().current_question(&user()).unwrap(), None);
    }

    struct Unavailable;

    impl QuestionSource for Unavailable {
        fn next_question(&self, _: &Identity) -> Result<Option<Question>, StoreError> {
            Err(StoreError::new("question source", "offline"))
        }
    }

    #[test]
    fn test_collaborator_failure_writes_nothing() {
        let engine = engine_with(Unavailable);
        bind(&engine);
        let question = Question::new("Pick B", "B", ["A"]);
        open_question(&engine, &question);

        let result = engine.handle(&Event::text(user(), "答案：B"));
        assert!(matches!(result, Err(Error::Store(_))));
        assert_eq!(score(&engine), 0);
        assert_eq!(
            engine.sessions().current_question(&user()).unwrap(),
            Some(question)
        );
    }

    #[test]
    fn test_failed_selection_leaves_user_unbound() {
        let engine = engine_with(Unavailable);
        text(&engine, "開始註冊");
        text(&engine, "alice@example.com");

        assert!(engine.handle(&Event::postback(user(), "R:101")).is_err());
        assert_eq!(engine.identities().get(&user()).unwrap(), None);
    }

    struct Counting {
        inner: QuestionBank,
        calls: AtomicUsize,
    }

    impl QuestionSource for Counting {
        fn next_question(&self, identity: &Identity) -> Result<Option<Question>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.next_question(identity)
        }
    }

    #[test]
    fn test_concurrent_start_game_issues_one_question() {
        let engine = engine_with(Counting {
            inner: bank(10),
            calls: AtomicUsize::new(0),
        });
        bind(&engine);

        let replies = thread::scope(|scope| {
            (0..8)
                .map(|_| scope.spawn(|| engine.handle(&Event::text(user(), "玩遊戲")).unwrap()))
                .collect_vec()
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect_vec()
        });

        assert_eq!(engine.questions.calls.load(Ordering::SeqCst), 1);
        assert_eq!(replies.iter().filter(|r| has_question(r)).count(), 1);
    }

    #[test]
    fn test_concurrent_answers_keep_score_consistent() {
        for (bank_size, expected) in [(10, 8), (3, 4)] {
            let engine = engine_with(bank(bank_size));
            bind(&engine);
            open_question(&engine, &Question::new("Pick B", "B", ["A"]));

            thread::scope(|scope| {
                for _ in 0..8 {
                    scope.spawn(|| engine.handle(&Event::text(user(), "答案：B")).unwrap());
                }
            });

            let identity = engine.identities().get(&user()).unwrap().unwrap();
            assert_eq!(identity.score, expected, "bank of {bank_size}");
            assert_eq!(identity.answered.len(), 8.min(bank_size + 1));
        }
    }

    #[test]
    fn test_shared_attendee_scores_question_once() {
        let engine = engine();
        let line = user();
        let messenger = UserKey::new(Platform::Messenger, "F1");
        let question = Question::new("Pick B", "B", ["A"]);
        for chat_user in [&line, &messenger] {
            engine
                .identities()
                .bind(chat_user, &AttendeeUid::new("101"))
                .unwrap();
            engine
                .sessions()
                .set_current_question(chat_user, Some(question.clone()))
                .unwrap();
        }

        engine.handle(&Event::text(line, "答案：B")).unwrap();
        engine.handle(&Event::postback(messenger.clone(), "答案：B")).unwrap();

        let identity = engine.identities().get(&messenger).unwrap().unwrap();
        assert_eq!(identity.score, 1);
        assert_eq!(identity.answered.len(), 1);
    }

    #[test]
    fn test_clean_resets_registration() {
        let engine = engine();
        text(&engine, "開始註冊");

        assert_eq!(text(&engine, "clean"), vec![Reply::text(messages::SESSION_RESET)]);
        assert!(!engine.sessions().is_registration_active(&user()).unwrap());
        assert!(is_invitation(&text(&engine, "alice@example.com")));
    }

    /// Session store whose `complete_registration` always fails
    #[derive(Default)]
    struct StuckRegistration(MemorySessionStore);

    impl SessionStore for StuckRegistration {
        fn with_user_lock<T>(&self, user: &UserKey, f: impl FnOnce() -> T) -> T {
            self.0.with_user_lock(user, f)
        }

        fn is_registration_active(&self, user: &UserKey) -> Result<bool, StoreError> {
            self.0.is_registration_active(user)
        }

        fn activate_registration(&self, user: &UserKey) -> Result<(), StoreError> {
            self.0.activate_registration(user)
        }

        fn complete_registration(&self, _: &UserKey) -> Result<(), StoreError> {
            Err(StoreError::new("session store", "write rejected"))
        }

        fn current_question(&self, user: &UserKey) -> Result<Option<Question>, StoreError> {
            self.0.current_question(user)
        }

        fn set_current_question(
            &self,
            user: &UserKey,
            question: Option<Question>,
        ) -> Result<(), StoreError> {
            self.0.set_current_question(user, question)
        }
    }

    #[test]
    fn test_failed_registration_write_leaves_user_unbound() {
        let engine = Engine::new(
            Options::default(),
            roster(),
            MemoryIdentityStore::new(),
            StuckRegistration::default(),
            bank(3),
        )
        .unwrap();
        text_event(&engine, "開始註冊");

        let result = engine.handle(&Event::postback(user(), "R:101"));

        assert!(matches!(result, Err(Error::Store(_))));
        assert_eq!(engine.identities().get(&user()).unwrap(), None);
        assert!(engine.sessions().is_registration_active(&user()).unwrap());
        assert_eq!(engine.sessions().current_question(&user()).unwrap(), None);
    }

    /// Identity store whose `bind` always fails
    #[derive(Default)]
    struct RejectingBind(MemoryIdentityStore);

    impl IdentityStore for RejectingBind {
        fn get(&self, user: &UserKey) -> Result<Option<Identity>, StoreError> {
            self.0.get(user)
        }

        fn bind(&self, _: &UserKey, _: &AttendeeUid) -> Result<Identity, StoreError> {
            Err(StoreError::new("identity store", "write rejected"))
        }

        fn unbind(&self, user: &UserKey) -> Result<(), StoreError> {
            self.0.unbind(user)
        }

        fn score(&self, user: &UserKey) -> Result<u64, StoreError> {
            self.0.score(user)
        }

        fn record_answer(
            &self,
            user: &UserKey,
            question: QuestionUid,
            correct: bool,
        ) -> Result<(), StoreError> {
            self.0.record_answer(user, question, correct)
        }

        fn record_for(&self, attendee: &AttendeeUid) -> Result<Identity, StoreError> {
            self.0.record_for(attendee)
        }
    }

    #[test]
    fn test_failed_bind_rolls_back_session_writes() {
        let engine = Engine::new(
            Options::default(),
            roster(),
            RejectingBind::default(),
            MemorySessionStore::new(),
            bank(3),
        )
        .unwrap();
        text_event(&engine, "開始註冊");

        let result = engine.handle(&Event::postback(user(), "R:101"));

        assert!(matches!(result, Err(Error::Store(_))));
        assert_eq!(engine.identities().get(&user()).unwrap(), None);
        assert!(engine.sessions().is_registration_active(&user()).unwrap());
        assert_eq!(engine.sessions().current_question(&user()).unwrap(), None);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(UserKey, Vec<Reply>)>>);

    impl Tunnel for Recorder {
        fn deliver(&self, user: &UserKey, replies: &[Reply]) {
            self.0.lock().unwrap().push((user.clone(), replies.to_vec()));
        }
    }

    #[test]
    fn test_dispatch_delivers_replies() {
        let engine = engine();
        let tunnel = Recorder::default();

        engine
            .dispatch(&Event::text(user(), "開始註冊"), &tunnel)
            .unwrap();

        let delivered = tunnel.0.lock().unwrap();
        assert_eq!(
            *delivered,
            vec![(user(), vec![Reply::text(messages::ASK_FOR_EMAIL)])]
        );
    }

    #[test]
    fn test_dispatch_delivers_nothing_on_failure() {
        let engine = engine_with(Unavailable);
        bind(&engine);
        let tunnel = Recorder::default();

        assert!(engine.dispatch(&Event::text(user(), "玩遊戲"), &tunnel).is_err());
        assert!(tunnel.0.lock().unwrap().is_empty());
    }

    fn arbitrary_event() -> impl Strategy<Value = Event> {
        prop_oneof![
            prop::sample::select(vec![
                "開始註冊",
                "玩遊戲",
                "開始玩",
                "不玩了",
                "查分數",
                "解除綁定",
                "答案：B",
                "alice@example.com",
                "nobody@example.com",
                "hello",
                "clean",
            ])
            .prop_map(|s| Event::text(user(), s)),
            prop::sample::select(vec![
                "R:101",
                "R:999",
                "R:CANCEL",
                "NOREGISTER",
                "CONFIRM_DELETE",
                "CANCEL_DELETE",
                "exit",
                "register_user",
            ])
            .prop_map(|s| Event::postback(user(), s)),
        ]
    }

    proptest! {
        #[test]
        fn prop_questions_only_reach_bound_users(
            events in prop::collection::vec(arbitrary_event(), 1..40),
        ) {
            let engine = engine();

            for event in events {
                let bound_before = engine.identities().get(&user()).unwrap().is_some();
                let replies = engine.handle(&event).unwrap();
                let bound_after = engine.identities().get(&user()).unwrap().is_some();

                if has_question(&replies) {
                    prop_assert!(bound_after);
                    prop_assert!(bound_before || event.intent == Intent::SelectIdentity(AttendeeUid::new("101")));
                }
                if engine.sessions().current_question(&user()).unwrap().is_some() {
                    prop_assert!(bound_after);
                }
                if bound_after {
                    prop_assert!(!engine.sessions().is_registration_active(&user()).unwrap());
                }
            }
        }
    }
}
