#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

/// Collects tracing events emitted on the current thread while alive.
pub struct TestLogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl TestLogCapture {
    /// Install a thread-local capturing subscriber.
    ///
    /// Only events emitted on this thread are seen, so pair it with
    /// `#[tokio::test]` (current-thread runtime).
    pub fn start() -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(CaptureLayer {
            events: Arc::clone(&events),
        });
        Self {
            events,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events at `level` whose message contains `needle`.
    pub fn matching(&self, level: Level, needle: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level && e.message.contains(needle))
            .collect()
    }

    pub fn assert_logged(&self, needle: &str) {
        let events = self.events();
        assert!(
            events.iter().any(|e| e.message.contains(needle)),
            "Expected an event containing '{needle}'. Captured: {:#?}",
            events.iter().map(|e| &e.message).collect::<Vec<_>>()
        );
    }

    pub fn assert_logged_at_level(&self, level: Level, needle: &str) {
        assert!(
            !self.matching(level, needle).is_empty(),
            "Expected a {level} event containing '{needle}'. Captured: {:#?}",
            self.events()
                .iter()
                .map(|e| format!("{} {}", e.level, e.message))
                .collect::<Vec<_>>()
        );
    }

    pub fn assert_not_logged(&self, needle: &str) {
        let hits: Vec<_> = self
            .events()
            .into_iter()
            .filter(|e| e.message.contains(needle))
            .collect();
        assert!(hits.is_empty(), "Unexpected events: {hits:#?}");
    }

    pub fn assert_no_errors(&self) {
        let errors: Vec<_> = self
            .events()
            .into_iter()
            .filter(|e| e.level == Level::ERROR)
            .collect();
        assert!(errors.is_empty(), "Unexpected errors: {errors:#?}");
    }

    pub fn assert_field_logged(&self, name: &str, value: &str) {
        let events = self.events();
        assert!(
            events
                .iter()
                .any(|e| e.field(name).is_some_and(|v| v.contains(value))),
            "Expected field {name}={value}. Captured fields: {:#?}",
            events.iter().map(|e| &e.fields).collect::<Vec<_>>()
        );
    }
}

struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn push(&mut self, name: &str, value: String) {
        if name == "message" {
            self.message = value;
        } else {
            self.fields.push((name.to_string(), value));
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.push(field.name(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push(field.name(), value.to_string());
    }
}
