//! Generic named-topic event bus.
//!
//! Both raw protocol events and bus-internal notifications flow through
//! here. Handlers run synchronously on the connection loop in
//! registration order, `all`-subscribers first; a handler fault is
//! contained at this boundary unless suppression is turned off.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tracing::error;

use straybot_proto::Event;

use crate::bot::Bot;
use crate::error::BusError;

/// Reserved topic whose handlers run before any specific topic's handlers.
pub const TOPIC_ALL: &str = "all";
/// Emitted after a non-empty handler run, carrying the original topic name.
pub const TOPIC_EMITTED: &str = "event_emitted";
/// Emitted when a topic is created through [`Bot::create_topic`].
pub const TOPIC_CREATED: &str = "event_created";
/// Emitted when a topic is removed through [`Bot::remove_topic`].
pub const TOPIC_REMOVED: &str = "event_removed";

/// Identifier for a registered handler, used for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A bus subscriber callback.
pub type HandlerFn = dyn Fn(&mut Bot, &Event) -> anyhow::Result<()>;

#[derive(Clone)]
struct Subscriber {
    id: HandlerId,
    handler: Rc<HandlerFn>,
}

/// Topic names are case-insensitive and may not contain whitespace.
fn normalize(topic: &str) -> String {
    topic
        .trim()
        .to_ascii_lowercase()
        .replace(|c: char| c.is_whitespace(), "_")
}

/// Named-topic publish/subscribe dispatcher.
pub struct EventBus {
    topics: HashMap<String, Vec<Subscriber>>,
    silenced: Vec<String>,
    suppress_faults: bool,
    isolated: bool,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        let mut topics = HashMap::new();
        for topic in [TOPIC_ALL, TOPIC_CREATED, TOPIC_EMITTED, TOPIC_REMOVED] {
            topics.insert(topic.to_string(), Vec::new());
        }
        Self {
            topics,
            silenced: Vec::new(),
            suppress_faults: true,
            isolated: false,
            next_id: 0,
        }
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(&normalize(topic))
    }

    /// Create a topic if missing; true when newly created. Prefer
    /// [`Bot::create_topic`], which also announces the creation.
    pub fn create(&mut self, topic: &str) -> bool {
        let topic = normalize(topic);
        if self.topics.contains_key(&topic) {
            return false;
        }
        self.topics.insert(topic, Vec::new());
        true
    }

    /// Drop a topic and all of its subscribers.
    pub fn remove(&mut self, topic: &str) -> bool {
        self.topics.remove(&normalize(topic)).is_some()
    }

    /// Subscribe to `topic`, auto-creating it.
    pub fn observe(&mut self, topic: &str, handler: Rc<HandlerFn>) -> HandlerId {
        let topic = normalize(topic);
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.topics
            .entry(topic)
            .or_default()
            .push(Subscriber { id, handler });
        id
    }

    /// Subscribe to an existing topic only.
    pub fn try_observe(
        &mut self,
        topic: &str,
        handler: Rc<HandlerFn>,
    ) -> Result<HandlerId, BusError> {
        if !self.has_topic(topic) {
            return Err(BusError::UnknownTopic(normalize(topic)));
        }
        Ok(self.observe(topic, handler))
    }

    /// Remove one subscriber; true when something was removed.
    pub fn unobserve(&mut self, topic: &str, id: HandlerId) -> bool {
        match self.topics.get_mut(&normalize(topic)) {
            Some(subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|s| s.id != id);
                subscribers.len() != before
            }
            None => false,
        }
    }

    /// Count of subscribers on `topic` (not counting `all`).
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(&normalize(topic)).map_or(0, Vec::len)
    }

    /// Silenced topics drop every emit until unsilenced.
    pub fn silence(&mut self, topic: &str) {
        let topic = normalize(topic);
        if !self.silenced.contains(&topic) {
            self.silenced.push(topic);
        }
    }

    pub fn unsilence(&mut self, topic: &str) -> bool {
        let topic = normalize(topic);
        let before = self.silenced.len();
        self.silenced.retain(|t| t != &topic);
        self.silenced.len() != before
    }

    pub fn is_silenced(&self, topic: &str) -> bool {
        self.silenced.iter().any(|t| t == &normalize(topic))
    }

    /// When off, a handler fault propagates out of `emit` and aborts the
    /// remaining handlers of that call. On by default.
    pub fn set_suppress_faults(&mut self, on: bool) {
        self.suppress_faults = on;
    }

    pub fn suppresses_faults(&self) -> bool {
        self.suppress_faults
    }

    /// Isolated mode wraps each handler call so a panic is contained and
    /// reported instead of unwinding the connection loop. Ordering is
    /// unchanged; this buys fault containment, not parallelism.
    pub fn set_isolated(&mut self, on: bool) {
        self.isolated = on;
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    fn snapshot(&self, topic: &str) -> Vec<Subscriber> {
        self.topics
            .get(&normalize(topic))
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bot {
    /// Create a topic, announcing it on the created-notification topic.
    pub fn create_topic(&mut self, topic: &str) -> bool {
        if !self.bus.create(topic) {
            return false;
        }
        let meta = Event::synthetic(TOPIC_CREATED, normalize(topic));
        if let Err(err) = self.emit(TOPIC_CREATED, &meta) {
            error!(topic = %topic, error = %err, "created-notification failed");
        }
        true
    }

    /// Remove a topic, announcing it on the removed-notification topic.
    pub fn remove_topic(&mut self, topic: &str) -> bool {
        if !self.bus.remove(topic) {
            return false;
        }
        let meta = Event::synthetic(TOPIC_REMOVED, normalize(topic));
        if let Err(err) = self.emit(TOPIC_REMOVED, &meta) {
            error!(topic = %topic, error = %err, "removed-notification failed");
        }
        true
    }

    /// Invoke every `all`-subscriber, then every subscriber of `topic`, in
    /// registration order. Returns `Ok(true)` iff at least one handler ran
    /// to completion; silenced topics return `Ok(false)` without invoking
    /// anything. The subscriber lists are snapshotted first, so a handler
    /// may freely mutate them (including removing itself).
    pub fn emit(&mut self, topic: &str, event: &Event) -> Result<bool, BusError> {
        let topic = normalize(topic);
        if self.bus.is_silenced(&topic) {
            return Ok(false);
        }
        if !self.bus.has_topic(&topic) {
            return Err(BusError::UnknownTopic(topic));
        }

        let mut run = self.bus.snapshot(TOPIC_ALL);
        if topic != TOPIC_ALL {
            run.extend(self.bus.snapshot(&topic));
        }

        let mut ran = false;
        for subscriber in run {
            match self.call_supervised(&subscriber.handler, event) {
                Ok(()) => ran = true,
                Err(err) if self.bus.suppresses_faults() => {
                    error!(topic = %topic, error = %err, "event handler failed");
                }
                Err(err) => return Err(err),
            }
        }

        if ran && topic != TOPIC_EMITTED {
            let meta = Event::synthetic(TOPIC_EMITTED, &topic);
            self.emit(TOPIC_EMITTED, &meta)?;
        }

        Ok(ran)
    }

    fn call_supervised(
        &mut self,
        handler: &Rc<HandlerFn>,
        event: &Event,
    ) -> Result<(), BusError> {
        if self.bus.is_isolated() {
            match catch_unwind(AssertUnwindSafe(|| handler(self, event))) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(BusError::Handler(err)),
                Err(payload) => Err(BusError::HandlerPanic(panic_message(payload.as_ref()))),
            }
        } else {
            handler(self, event).map_err(BusError::Handler)
        }
    }
}

/// Best-effort description of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testutil::test_bot;
    use std::cell::RefCell;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Rc<HandlerFn>) {
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let log = Rc::clone(&log);
            move |tag: &'static str| -> Rc<HandlerFn> {
                let log = Rc::clone(&log);
                Rc::new(move |_bot: &mut Bot, _event: &Event| {
                    log.borrow_mut().push(tag);
                    Ok(())
                })
            }
        };
        (log, make)
    }

    #[test]
    fn test_all_runs_before_topic_in_registration_order() {
        let (mut bot, _rx) = test_bot();
        let (log, make) = recorder();

        bot.bus.observe("greeting", make("topic-1"));
        bot.bus.observe(TOPIC_ALL, make("all-1"));
        bot.bus.observe("greeting", make("topic-2"));
        bot.bus.observe(TOPIC_ALL, make("all-2"));

        let event = Event::synthetic("greeting", "hi");
        assert!(bot.emit("greeting", &event).unwrap());
        assert_eq!(*log.borrow(), vec!["all-1", "all-2", "topic-1", "topic-2"]);
    }

    #[test]
    fn test_emit_unknown_topic_errors() {
        let (mut bot, _rx) = test_bot();
        let event = Event::synthetic("ghost", "");
        assert!(matches!(
            bot.emit("ghost", &event),
            Err(BusError::UnknownTopic(_))
        ));
    }

    #[test]
    fn test_silenced_topic_is_a_noop() {
        let (mut bot, _rx) = test_bot();
        let (log, make) = recorder();
        bot.bus.observe("noisy", make("ran"));

        bot.bus.silence("noisy");
        let event = Event::synthetic("noisy", "");
        assert!(!bot.emit("noisy", &event).unwrap());
        assert!(log.borrow().is_empty());

        bot.bus.unsilence("noisy");
        assert!(bot.emit("noisy", &event).unwrap());
        assert_eq!(*log.borrow(), vec!["ran"]);
    }

    #[test]
    fn test_fault_suppression_keeps_later_handlers_running() {
        let (mut bot, _rx) = test_bot();
        let (log, make) = recorder();

        bot.bus.observe(
            "shaky",
            Rc::new(|_bot, _event| anyhow::bail!("first handler blew up")),
        );
        bot.bus.observe("shaky", make("second"));

        let event = Event::synthetic("shaky", "");
        assert!(bot.emit("shaky", &event).unwrap());
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn test_disabled_suppression_propagates_and_aborts() {
        let (mut bot, _rx) = test_bot();
        let (log, make) = recorder();

        bot.bus.observe(
            "shaky",
            Rc::new(|_bot, _event| anyhow::bail!("first handler blew up")),
        );
        bot.bus.observe("shaky", make("second"));
        bot.bus.set_suppress_faults(false);

        let event = Event::synthetic("shaky", "");
        assert!(matches!(
            bot.emit("shaky", &event),
            Err(BusError::Handler(_))
        ));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_isolated_mode_contains_panics() {
        let (mut bot, _rx) = test_bot();
        let (log, make) = recorder();

        bot.bus.set_isolated(true);
        bot.bus
            .observe("explosive", Rc::new(|_bot, _event| panic!("boom")));
        bot.bus.observe("explosive", make("survivor"));

        let event = Event::synthetic("explosive", "");
        assert!(bot.emit("explosive", &event).unwrap());
        assert_eq!(*log.borrow(), vec!["survivor"]);
    }

    #[test]
    fn test_completion_notification_carries_topic() {
        let (mut bot, _rx) = test_bot();
        let (log, make) = recorder();
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

        bot.bus.observe("greeting", make("handler"));
        {
            let seen = Rc::clone(&seen);
            bot.bus.observe(
                TOPIC_EMITTED,
                Rc::new(move |_bot, event| {
                    seen.borrow_mut().push(event.text.clone());
                    Ok(())
                }),
            );
        }

        let event = Event::synthetic("greeting", "");
        bot.emit("greeting", &event).unwrap();
        // one notification for "greeting"; none for the notification itself
        assert_eq!(*seen.borrow(), vec!["greeting".to_string()]);
        assert_eq!(*log.borrow(), vec!["handler"]);
    }

    #[test]
    fn test_empty_run_emits_no_completion() {
        let (mut bot, _rx) = test_bot();
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = Rc::clone(&seen);
            bot.bus.observe(
                TOPIC_EMITTED,
                Rc::new(move |_bot, event| {
                    seen.borrow_mut().push(event.text.clone());
                    Ok(())
                }),
            );
        }

        bot.bus.create("hollow");
        let event = Event::synthetic("hollow", "");
        assert!(!bot.emit("hollow", &event).unwrap());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_handler_can_remove_itself_mid_emit() {
        let (mut bot, _rx) = test_bot();
        let (log, make) = recorder();

        let id: Rc<RefCell<Option<HandlerId>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&id);
        let self_remover: Rc<HandlerFn> = Rc::new(move |bot, _event| {
            if let Some(id) = *slot.borrow() {
                bot.bus.unobserve("oneshot", id);
            }
            Ok(())
        });
        *id.borrow_mut() = Some(bot.bus.observe("oneshot", self_remover));
        bot.bus.observe("oneshot", make("after"));

        let event = Event::synthetic("oneshot", "");
        assert!(bot.emit("oneshot", &event).unwrap());
        // the snapshot still ran the later handler this time around
        assert_eq!(*log.borrow(), vec!["after"]);
        assert_eq!(bot.bus.subscriber_count("oneshot"), 1);
    }

    #[test]
    fn test_topic_normalization() {
        let mut bus = EventBus::new();
        bus.create("Pub Msg");
        assert!(bus.has_topic("pub_msg"));
        assert!(bus.has_topic("PUB_MSG"));
    }
}
