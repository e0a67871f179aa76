//! Log capture for tests
//!
//! Installs a capturing subscriber for the current thread only, so tests
//! running in parallel do not see each other's events. Works with
//! `#[tokio::test]`, whose runtime stays on the test thread.

use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

/// One captured event
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
}

#[derive(Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCapture {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Messages at exactly `level` containing `pattern`
    pub fn count_at(&self, level: Level, pattern: &str) -> usize {
        self.records()
            .iter()
            .filter(|r| r.level == level && r.message.contains(pattern))
            .count()
    }

    pub fn assert_contains(&self, pattern: &str) {
        let records = self.records();
        assert!(
            records.iter().any(|r| r.message.contains(pattern)),
            "Expected log matching '{}', got:\n{}",
            pattern,
            records
                .iter()
                .map(|r| format!("{} {}", r.level, r.message))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }
}

impl<S> tracing_subscriber::Layer<S> for LogCapture
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        use tracing::field::{Field, Visit};

        struct MessageVisitor(String);

        impl Visit for MessageVisitor {
            fn record_str(&mut self, field: &Field, value: &str) {
                if field.name() == "message" {
                    self.0 = value.to_string();
                }
            }

            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{:?}", value);
                }
            }
        }

        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);

        self.records.lock().unwrap().push(LogRecord {
            level: *event.metadata().level(),
            message: visitor.0,
        });
    }
}

/// Capture events on this thread until the guard is dropped
pub fn capture_logs() -> (LogCapture, DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
