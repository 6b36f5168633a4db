//! Per-user conversation state machine.
//!
//! `transition` is a pure function of `(state, event)`; `DialogueEngine` wraps it
//! with the session store, a per-user critical section, and reply delivery.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    domain::{ChatId, MessageRef, UserId},
    messaging::{
        port::MessagingPort,
        types::{IncomingUpdate, RESTART_CALLBACK},
    },
    replies::render,
    session::{ConversationSession, DialogueState, SessionStore, UserLocks},
    validation::{parse_age, parse_resting_hr, InvalidInput},
    zones::{compute_zones, ZoneResult},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Start,
    /// Pressed the "start over" button. Same transition as `Start`.
    Restart,
    Text(String),
    Cancel,
}

impl Event {
    /// Map a messenger update to a dialogue event. `None` means "ignore".
    pub fn from_update(update: &IncomingUpdate) -> Option<Event> {
        match update {
            IncomingUpdate::Command(cmd) => match cmd.name.as_str() {
                "start" => Some(Event::Start),
                "cancel" => Some(Event::Cancel),
                _ => None,
            },
            IncomingUpdate::Text(msg) => Some(Event::Text(msg.text.clone())),
            IncomingUpdate::Callback(q) if q.data == RESTART_CALLBACK => Some(Event::Restart),
            IncomingUpdate::Callback(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Restart => "restart",
            Event::Text(_) => "text",
            Event::Cancel => "cancel",
        }
    }
}

/// What the user should be told, independent of wording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Welcome,
    Restarted,
    AskAge,
    AskRestingHr,
    Invalid(InvalidInput),
    Zones {
        age: u32,
        resting_heart_rate: u32,
        result: ZoneResult,
    },
    OfferRestart,
    Cancelled,
    NotStarted,
    NothingToCancel,
}

/// What to do with the stored session after an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreEffect {
    Keep,
    Save(DialogueState),
    Clear,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub effect: StoreEffect,
    pub replies: Vec<Reply>,
}

impl Transition {
    fn new(effect: StoreEffect, replies: Vec<Reply>) -> Self {
        Self { effect, replies }
    }
}

/// The whole dialogue. `None` is Idle (no session).
pub fn transition(current: Option<DialogueState>, event: Event) -> Transition {
    match (current, event) {
        // Starting over always discards partial input.
        (_, Event::Start) => Transition::new(
            StoreEffect::Save(DialogueState::AwaitingAge),
            vec![Reply::Welcome],
        ),
        (_, Event::Restart) => Transition::new(
            StoreEffect::Save(DialogueState::AwaitingAge),
            vec![Reply::Restarted, Reply::AskAge],
        ),

        (Some(_), Event::Cancel) => Transition::new(StoreEffect::Clear, vec![Reply::Cancelled]),
        (None, Event::Cancel) => Transition::new(StoreEffect::Keep, vec![Reply::NothingToCancel]),

        (None, Event::Text(_)) => Transition::new(StoreEffect::Keep, vec![Reply::NotStarted]),

        (Some(DialogueState::AwaitingAge), Event::Text(raw)) => match parse_age(&raw) {
            Ok(age) => Transition::new(
                StoreEffect::Save(DialogueState::AwaitingRestingHr { age }),
                vec![Reply::AskRestingHr],
            ),
            Err(e) => Transition::new(StoreEffect::Keep, vec![Reply::Invalid(e)]),
        },

        (Some(DialogueState::AwaitingRestingHr { age }), Event::Text(raw)) => {
            match parse_resting_hr(&raw) {
                Ok(resting_heart_rate) => Transition::new(
                    StoreEffect::Clear,
                    vec![
                        Reply::Zones {
                            age,
                            resting_heart_rate,
                            result: compute_zones(age, resting_heart_rate),
                        },
                        Reply::OfferRestart,
                    ],
                ),
                Err(e) => Transition::new(StoreEffect::Keep, vec![Reply::Invalid(e)]),
            }
        }
    }
}

/// Drives `transition` against a `SessionStore`, one event per user at a time.
pub struct DialogueEngine {
    store: Arc<dyn SessionStore>,
    locks: UserLocks,
    audit: Option<Arc<AuditLogger>>,
}

impl DialogueEngine {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: UserLocks::default(),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    /// Process one event and return the replies, in order.
    pub async fn handle(&self, user_id: UserId, event: Event) -> Vec<Reply> {
        let guard = self.locks.lock_user(user_id).await;
        let replies = self.apply(user_id, event).await;
        self.locks.unlock_user(user_id, guard).await;
        replies
    }

    /// Process one event and deliver its replies to `chat_id`.
    ///
    /// Delivery happens inside the user's critical section, so replies to two
    /// rapid messages from one user cannot interleave. If `restart_notice` is
    /// given, a `Restarted` reply edits that message instead of sending a new one.
    pub async fn dispatch(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        event: Event,
        messenger: &dyn MessagingPort,
        restart_notice: Option<MessageRef>,
    ) -> Vec<Reply> {
        let guard = self.locks.lock_user(user_id).await;
        let replies = self.apply(user_id, event).await;

        for reply in &replies {
            let msg = render(reply);
            let sent = match (reply, restart_notice) {
                (Reply::Restarted, Some(target)) => messenger.edit_html(target, &msg.html).await,
                _ => messenger.send_outbound(chat_id, msg).await.map(|_| ()),
            };
            if let Err(e) = sent {
                warn!(user = user_id.0, chat = chat_id.0, "reply delivery failed: {e}");
            }
        }

        self.locks.unlock_user(user_id, guard).await;
        replies
    }

    async fn apply(&self, user_id: UserId, event: Event) -> Vec<Reply> {
        let current = self.store.get(user_id).await.map(|s| s.state);
        let kind = event.kind();
        let Transition { effect, replies } = transition(current, event);

        match effect {
            // Any input counts as activity, so a kept session starts a fresh idle period.
            StoreEffect::Keep => {
                if let Some(state) = current {
                    self.store
                        .put(ConversationSession::new(user_id, state))
                        .await
                }
            }
            StoreEffect::Save(state) => {
                self.store
                    .put(ConversationSession::new(user_id, state))
                    .await
            }
            StoreEffect::Clear => self.store.remove(user_id).await,
        }

        debug!(
            user = user_id.0,
            event = kind,
            from = ?current,
            effect = ?effect,
            "dialogue transition"
        );
        self.record(user_id, kind, current, &replies);

        replies
    }

    fn record(
        &self,
        user_id: UserId,
        kind: &str,
        current: Option<DialogueState>,
        replies: &[Reply],
    ) {
        let event = replies.iter().find_map(|r| match r {
            Reply::Welcome | Reply::Restarted => Some(AuditEvent::started(user_id, kind)),
            Reply::Cancelled => Some(AuditEvent::cancelled(user_id, current)),
            Reply::Zones {
                age,
                resting_heart_rate,
                result,
            } => {
                info!(
                    user = user_id.0,
                    age,
                    resting = resting_heart_rate,
                    max = result.max_heart_rate,
                    "zones calculated"
                );
                Some(AuditEvent::completed(user_id, *age, *resting_heart_rate, result))
            }
            _ => None,
        });

        let (Some(audit), Some(event)) = (&self.audit, event) else {
            return;
        };
        if let Err(e) = audit.write(&event) {
            warn!("failed to write audit event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::MessageId,
        messaging::types::{Command, InlineKeyboard, TextMessage},
        session::InMemorySessionStore,
        validation::Field,
        zones::ZoneRange,
        Result,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct FakeMessenger {
        next_id: Mutex<i32>,
        sends: Mutex<Vec<(ChatId, String, bool)>>,
        edits: Mutex<Vec<(MessageRef, String)>>,
    }

    impl FakeMessenger {
        fn alloc(&self, chat_id: ChatId) -> MessageRef {
            let mut guard = self.next_id.lock().unwrap();
            *guard += 1;
            MessageRef {
                chat_id,
                message_id: MessageId(*guard),
            }
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            self.sends
                .lock()
                .unwrap()
                .push((chat_id, html.to_string(), false));
            Ok(self.alloc(chat_id))
        }

        async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
            self.edits.lock().unwrap().push((msg, html.to_string()));
            Ok(())
        }

        async fn send_inline_keyboard(
            &self,
            chat_id: ChatId,
            text: &str,
            _keyboard: InlineKeyboard,
        ) -> Result<MessageRef> {
            self.sends
                .lock()
                .unwrap()
                .push((chat_id, text.to_string(), true));
            Ok(self.alloc(chat_id))
        }

        async fn answer_callback_query(&self, _callback_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn text(s: &str) -> Event {
        Event::Text(s.to_string())
    }

    fn engine() -> (DialogueEngine, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new(None));
        (DialogueEngine::new(store.clone()), store)
    }

    #[test]
    fn start_from_any_state_resets_to_awaiting_age() {
        for current in [
            None,
            Some(DialogueState::AwaitingAge),
            Some(DialogueState::AwaitingRestingHr { age: 40 }),
        ] {
            let t = transition(current, Event::Start);
            assert_eq!(t.effect, StoreEffect::Save(DialogueState::AwaitingAge));
            assert_eq!(t.replies, vec![Reply::Welcome]);
        }
    }

    #[test]
    fn valid_age_advances() {
        let t = transition(Some(DialogueState::AwaitingAge), text(" 35 "));
        assert_eq!(
            t.effect,
            StoreEffect::Save(DialogueState::AwaitingRestingHr { age: 35 })
        );
        assert_eq!(t.replies, vec![Reply::AskRestingHr]);
    }

    #[test]
    fn invalid_age_keeps_state() {
        let t = transition(Some(DialogueState::AwaitingAge), text("abc"));
        assert_eq!(t.effect, StoreEffect::Keep);
        assert_eq!(
            t.replies,
            vec![Reply::Invalid(InvalidInput::NotANumber { field: Field::Age })]
        );

        let t = transition(Some(DialogueState::AwaitingAge), text("0"));
        assert_eq!(t.effect, StoreEffect::Keep);
        assert!(matches!(
            t.replies[..],
            [Reply::Invalid(InvalidInput::OutOfRange {
                field: Field::Age,
                ..
            })]
        ));
    }

    #[test]
    fn invalid_resting_hr_keeps_age() {
        let state = Some(DialogueState::AwaitingRestingHr { age: 35 });
        let t = transition(state, text("101"));
        assert_eq!(t.effect, StoreEffect::Keep);
        assert!(matches!(
            t.replies[..],
            [Reply::Invalid(InvalidInput::OutOfRange {
                field: Field::RestingHeartRate,
                ..
            })]
        ));
    }

    #[test]
    fn valid_resting_hr_completes_and_clears() {
        let t = transition(Some(DialogueState::AwaitingRestingHr { age: 35 }), text("60"));
        assert_eq!(t.effect, StoreEffect::Clear);
        assert_eq!(t.replies.len(), 2);
        match &t.replies[0] {
            Reply::Zones {
                age,
                resting_heart_rate,
                result,
            } => {
                assert_eq!((*age, *resting_heart_rate), (35, 60));
                assert_eq!(result.max_heart_rate, 182);
                assert_eq!(result.zones[0], ZoneRange { low: 121, high: 133 });
                assert_eq!(result.zones[4], ZoneRange { low: 170, high: 182 });
            }
            other => panic!("expected zones, got {other:?}"),
        }
        assert_eq!(t.replies[1], Reply::OfferRestart);
    }

    #[test]
    fn idle_text_and_cancel_do_not_create_sessions() {
        let t = transition(None, text("35"));
        assert_eq!(t, Transition::new(StoreEffect::Keep, vec![Reply::NotStarted]));

        let t = transition(None, Event::Cancel);
        assert_eq!(
            t,
            Transition::new(StoreEffect::Keep, vec![Reply::NothingToCancel])
        );
    }

    #[test]
    fn cancel_clears_active_session_at_any_stage() {
        for current in [
            DialogueState::AwaitingAge,
            DialogueState::AwaitingRestingHr { age: 20 },
        ] {
            let t = transition(Some(current), Event::Cancel);
            assert_eq!(t, Transition::new(StoreEffect::Clear, vec![Reply::Cancelled]));
        }
    }

    #[test]
    fn maps_updates_to_events() {
        let cmd = |name: &str| {
            IncomingUpdate::Command(Command {
                chat_id: ChatId(1),
                user_id: UserId(1),
                name: name.to_string(),
            })
        };
        assert_eq!(Event::from_update(&cmd("start")), Some(Event::Start));
        assert_eq!(Event::from_update(&cmd("cancel")), Some(Event::Cancel));
        assert_eq!(Event::from_update(&cmd("help")), None);

        let msg = IncomingUpdate::Text(TextMessage {
            chat_id: ChatId(1),
            user_id: UserId(1),
            text: "42".to_string(),
        });
        assert_eq!(Event::from_update(&msg), Some(text("42")));
    }

    #[tokio::test]
    async fn end_to_end_exchange_removes_session() {
        let (engine, store) = engine();
        let u = UserId(10);

        assert_eq!(engine.handle(u, Event::Start).await, vec![Reply::Welcome]);
        assert_eq!(engine.handle(u, text("35")).await, vec![Reply::AskRestingHr]);
        assert_eq!(store.get(u).await.unwrap().age(), Some(35));

        let replies = engine.handle(u, text("60")).await;
        assert!(matches!(
            replies[0],
            Reply::Zones { result, .. } if result.max_heart_rate == 182
        ));
        assert!(store.get(u).await.is_none());
    }

    #[tokio::test]
    async fn bad_age_leaves_store_untouched() {
        let (engine, store) = engine();
        let u = UserId(11);
        engine.handle(u, Event::Start).await;
        engine.handle(u, text("not a number")).await;
        engine.handle(u, text("200")).await;

        let s = store.get(u).await.unwrap();
        assert_eq!(s.state, DialogueState::AwaitingAge);
        assert_eq!(s.age(), None);
    }

    #[tokio::test]
    async fn cancel_then_text_is_idle() {
        let (engine, store) = engine();
        let u = UserId(12);
        engine.handle(u, Event::Start).await;
        engine.handle(u, text("30")).await;

        assert_eq!(engine.handle(u, Event::Cancel).await, vec![Reply::Cancelled]);
        assert!(store.get(u).await.is_none());
        assert_eq!(engine.handle(u, text("60")).await, vec![Reply::NotStarted]);
        assert!(store.get(u).await.is_none());
    }

    #[tokio::test]
    async fn cancel_while_awaiting_age_returns_to_idle() {
        let (engine, store) = engine();
        let u = UserId(17);
        engine.handle(u, Event::Start).await;

        assert_eq!(engine.handle(u, Event::Cancel).await, vec![Reply::Cancelled]);
        assert!(store.get(u).await.is_none());
        assert_eq!(engine.handle(u, text("35")).await, vec![Reply::NotStarted]);
    }

    #[tokio::test]
    async fn invalid_input_refreshes_session_idle_time() {
        let ttl = Duration::from_secs(60);
        let store = Arc::new(InMemorySessionStore::new(Some(ttl)));
        let engine = DialogueEngine::new(store.clone());
        let u = UserId(18);

        // Session last touched 50s ago: still alive, but close to expiry.
        let now = Instant::now();
        let Some(stale) = now.checked_sub(Duration::from_secs(50)) else {
            return;
        };
        store
            .put(ConversationSession::new_at(
                u,
                DialogueState::AwaitingRestingHr { age: 35 },
                stale,
            ))
            .await;

        let replies = engine.handle(u, text("abc")).await;
        assert!(matches!(replies[..], [Reply::Invalid(_)]));

        // Without the refresh this read would be 80s after the last touch.
        let later = now + Duration::from_secs(30);
        let s = store.get_at(u, later).await.expect("session kept alive");
        assert_eq!(s.state, DialogueState::AwaitingRestingHr { age: 35 });
    }

    #[tokio::test]
    async fn idle_text_does_not_create_a_session() {
        let (engine, store) = engine();
        engine.handle(UserId(19), text("hello")).await;
        assert!(store.get(UserId(19)).await.is_none());
    }

    #[tokio::test]
    async fn user_locks_do_not_accumulate() {
        let (engine, store) = engine();
        let messenger = FakeMessenger::default();

        for id in 0..500i64 {
            engine.handle(UserId(id), text("hi")).await;
            engine
                .dispatch(UserId(id), ChatId(id), text("hi"), &messenger, None)
                .await;
        }

        assert!(store.is_empty().await);
        assert_eq!(engine.locks().len().await, 0);
    }

    #[tokio::test]
    async fn restart_mid_dialogue_discards_age() {
        let (engine, store) = engine();
        let u = UserId(13);
        engine.handle(u, Event::Start).await;
        engine.handle(u, text("70")).await;
        assert_eq!(store.get(u).await.unwrap().age(), Some(70));

        assert_eq!(
            engine.handle(u, Event::Restart).await,
            vec![Reply::Restarted, Reply::AskAge]
        );
        let s = store.get(u).await.unwrap();
        assert_eq!(s.state, DialogueState::AwaitingAge);

        engine.handle(u, text("20")).await;
        let replies = engine.handle(u, text("50")).await;
        assert!(matches!(replies[0], Reply::Zones { age: 20, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_users_do_not_share_state() {
        let store = Arc::new(InMemorySessionStore::new(None));
        let engine = Arc::new(DialogueEngine::new(store.clone()));

        let mut tasks = Vec::new();
        for id in 1..=32i64 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                let u = UserId(id);
                let age = 10 + id as u32;
                let resting = 40 + id as u32;
                engine.handle(u, Event::Start).await;
                tokio::task::yield_now().await;
                engine.handle(u, Event::Text(age.to_string())).await;
                tokio::task::yield_now().await;
                let replies = engine.handle(u, Event::Text(resting.to_string())).await;
                (age, resting, replies)
            }));
        }

        for task in tasks {
            let (age, resting, replies) = task.await.unwrap();
            match &replies[0] {
                Reply::Zones {
                    age: got_age,
                    resting_heart_rate,
                    result,
                } => {
                    assert_eq!(*got_age, age);
                    assert_eq!(*resting_heart_rate, resting);
                    assert_eq!(*result, compute_zones(age, resting));
                }
                other => panic!("expected zones, got {other:?}"),
            }
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rapid_messages_from_one_user_are_serialized() {
        let (engine, store) = engine();
        let engine = Arc::new(engine);
        let u = UserId(14);
        engine.handle(u, Event::Start).await;

        // Two ages racing: exactly one is accepted, the other lands in AwaitingRestingHr
        // where "30"/"31" are valid resting rates, completing the dialogue.
        let a = tokio::spawn({
            let engine = engine.clone();
            async move { engine.handle(u, Event::Text("30".into())).await }
        });
        let b = tokio::spawn({
            let engine = engine.clone();
            async move { engine.handle(u, Event::Text("31".into())).await }
        });
        let ra = a.await.unwrap();
        let rb = b.await.unwrap();

        let asks = [&ra, &rb]
            .iter()
            .filter(|r| r[..] == [Reply::AskRestingHr])
            .count();
        let zones = [&ra, &rb]
            .iter()
            .filter(|r| matches!(r[0], Reply::Zones { .. }))
            .count();
        assert_eq!((asks, zones), (1, 1));
        assert!(store.get(u).await.is_none());
    }

    #[tokio::test]
    async fn dispatch_delivers_in_order_with_keyboard_last() {
        let (engine, _store) = engine();
        let messenger = FakeMessenger::default();
        let u = UserId(15);
        let chat = ChatId(15);

        engine.dispatch(u, chat, Event::Start, &messenger, None).await;
        engine.dispatch(u, chat, text("35"), &messenger, None).await;
        engine.dispatch(u, chat, text("60"), &messenger, None).await;

        let sends = messenger.sends.lock().unwrap();
        assert_eq!(sends.len(), 4);
        assert!(sends.iter().all(|(c, _, _)| *c == chat));
        assert!(sends[2].1.contains("182"));
        assert!(!sends[2].2);
        assert!(sends[3].2, "restart offer carries the button");
    }

    #[tokio::test]
    async fn dispatch_restart_edits_the_button_message() {
        let (engine, _store) = engine();
        let messenger = FakeMessenger::default();
        let target = MessageRef {
            chat_id: ChatId(16),
            message_id: MessageId(99),
        };

        engine
            .dispatch(UserId(16), ChatId(16), Event::Restart, &messenger, Some(target))
            .await;

        let edits = messenger.edits.lock().unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, target);
        assert_eq!(messenger.sends.lock().unwrap().len(), 1);
    }
}
