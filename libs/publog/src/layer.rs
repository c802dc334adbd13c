use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::logger::Logger;
use crate::record::{FieldValue, Fields, Level, LogRecord};

/// Targets самого конвейера пересылки. Их события не пересылаются,
/// иначе каждый flush порождал бы новое сообщение.
const PIPELINE_TARGETS: &[&str] = &["publog", "publish_batcher", "pubsub_memory", "pubsub_api"];

fn is_pipeline_target(target: &str) -> bool {
    PIPELINE_TARGETS.iter().any(|crate_name| {
        target == *crate_name
            || target
                .strip_prefix(crate_name)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

/// `tracing` layer: каждое событие превращается в `LogRecord`
/// и отдаётся `Logger`'у.
#[derive(Debug, Clone)]
pub struct PublogLayer {
    logger: Logger,
}

impl PublogLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S: Subscriber> Layer<S> for PublogLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if is_pipeline_target(meta.target()) {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord {
            timestamp: Utc::now().fixed_offset(),
            message: visitor.message,
            fields: visitor.fields,
            level: Level::from(meta.level()),
        };
        // Ошибки уже залогированы Logger'ом.
        let _ = self.logger.log(&record);
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: Fields,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for RecordVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, FieldValue::F64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, FieldValue::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, FieldValue::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.insert(field, FieldValue::from(value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.insert(field, FieldValue::Str(format!("{value:?}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::layer::SubscriberExt;

    use crate::error::HookError;
    use crate::logger::LogHook;

    #[derive(Default)]
    struct Capture {
        records: Mutex<Vec<LogRecord>>,
    }

    impl LogHook for Capture {
        fn levels(&self) -> &[Level] {
            &Level::ALL
        }

        fn fire(&self, record: &LogRecord) -> Result<(), HookError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn capture() -> (Arc<Capture>, impl Subscriber + Send + Sync) {
        let capture = Arc::new(Capture::default());
        let logger = Logger::new().with_hook(capture.clone());
        let subscriber = tracing_subscriber::registry().with(PublogLayer::new(logger));
        (capture, subscriber)
    }

    #[test]
    fn events_become_records_with_fields() {
        let (capture, subscriber) = capture();
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "app", user = "alice", attempts = 3u64, ok = false, ratio = 0.5, "login failed");
        });

        let records = capture.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, Level::Warn);
        assert_eq!(record.message, "login failed");
        assert_eq!(record.fields.get("user"), Some(&FieldValue::from("alice")));
        assert_eq!(record.fields.get("attempts"), Some(&FieldValue::I64(3)));
        assert_eq!(record.fields.get("ok"), Some(&FieldValue::Bool(false)));
        assert_eq!(record.fields.get("ratio"), Some(&FieldValue::F64(0.5)));
        assert!(!record.fields.contains_key("message"));
    }

    #[test]
    fn debug_formatted_fields_are_strings() {
        let (capture, subscriber) = capture();
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "app", path = ?std::path::Path::new("/tmp/x"), "io");
        });

        let records = capture.records.lock().unwrap();
        assert_eq!(records[0].fields.get("path"), Some(&FieldValue::from("\"/tmp/x\"")));
        assert_eq!(records[0].level, Level::Error);
    }

    #[test]
    fn pipeline_events_are_not_forwarded() {
        let (capture, subscriber) = capture();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "publish_batcher", "flushing batch");
            tracing::info!(target: "publog::logger", "failed to fire hook");
            tracing::info!(target: "publog_demo", "forwarded");
            tracing::info!("from the layer's own module");
        });

        let records = capture.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "forwarded");
    }

    #[test]
    fn pipeline_target_matching_respects_crate_boundaries() {
        assert!(is_pipeline_target("publog"));
        assert!(is_pipeline_target("pubsub_memory::broker"));
        assert!(!is_pipeline_target("publog_demo::cmd"));
        assert!(!is_pipeline_target("app"));
    }
}
