use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};

// ════════════════════════════════════════════════════════════════
//  Level
// ════════════════════════════════════════════════════════════════

/// Уровень важности записи, от самого серьёзного к самому подробному.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Panic,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    pub const ALL: [Level; 7] = [
        Level::Panic,
        Level::Fatal,
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
        Level::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Panic => "panic",
            Level::Fatal => "fatal",
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        if *level == tracing::Level::ERROR {
            Level::Error
        } else if *level == tracing::Level::WARN {
            Level::Warn
        } else if *level == tracing::Level::INFO {
            Level::Info
        } else if *level == tracing::Level::DEBUG {
            Level::Debug
        } else {
            Level::Trace
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Fields
// ════════════════════════════════════════════════════════════════

pub type Fields = BTreeMap<String, FieldValue>;

/// Значение структурированного поля записи.
///
/// Целые сравниваются по значению: `I64(5) == U64(5)`, так как после
/// JSON round-trip число до `i64::MAX` всегда читается как `I64`.
/// Нечисловые `F64` (NaN, бесконечность) в JSON непредставимы:
/// сериализация падает.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum FieldValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Array(Vec<FieldValue>),
    Object(Fields),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::I64(a), FieldValue::I64(b)) => a == b,
            (FieldValue::U64(a), FieldValue::U64(b)) => a == b,
            (FieldValue::I64(a), FieldValue::U64(b)) | (FieldValue::U64(b), FieldValue::I64(a)) => {
                u64::try_from(*a).is_ok_and(|a| a == *b)
            }
            (FieldValue::F64(a), FieldValue::F64(b)) => a == b,
            (FieldValue::Str(a), FieldValue::Str(b)) => a == b,
            (FieldValue::Array(a), FieldValue::Array(b)) => a == b,
            (FieldValue::Object(a), FieldValue::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(v) => serializer.serialize_bool(*v),
            FieldValue::I64(v) => serializer.serialize_i64(*v),
            FieldValue::U64(v) => serializer.serialize_u64(*v),
            FieldValue::F64(v) if !v.is_finite() => {
                Err(S::Error::custom(format!("unsupported float value: {v}")))
            }
            FieldValue::F64(v) => serializer.serialize_f64(*v),
            FieldValue::Str(v) => serializer.serialize_str(v),
            FieldValue::Array(v) => v.serialize(serializer),
            FieldValue::Object(v) => v.serialize(serializer),
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(v) => FieldValue::Bool(v),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    FieldValue::I64(v)
                } else if let Some(v) = n.as_u64() {
                    FieldValue::U64(v)
                } else {
                    n.as_f64().map(FieldValue::F64).unwrap_or(FieldValue::Null)
                }
            }
            serde_json::Value::String(v) => FieldValue::Str(v),
            serde_json::Value::Array(v) => {
                FieldValue::Array(v.into_iter().map(FieldValue::from).collect())
            }
            serde_json::Value::Object(v) => {
                FieldValue::Object(v.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect())
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self { FieldValue::Str(v.to_string()) }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self { FieldValue::Str(v) }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self { FieldValue::Bool(v) }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self { FieldValue::I64(v.into()) }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self { FieldValue::I64(v) }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self { FieldValue::I64(v.into()) }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => FieldValue::I64(v),
            Err(_) => FieldValue::U64(v),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self { FieldValue::F64(v) }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(v: Vec<FieldValue>) -> Self { FieldValue::Array(v) }
}

impl From<Fields> for FieldValue {
    fn from(v: Fields) -> Self { FieldValue::Object(v) }
}

// ════════════════════════════════════════════════════════════════
//  LogRecord
// ════════════════════════════════════════════════════════════════

/// Запись лога, как её видит hook. Принадлежит вызывающему.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub message: String,
    pub fields: Fields,
    pub level: Level,
}

impl LogRecord {
    /// Запись с текущим временем и без полей.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().fixed_offset(),
            message: message.into(),
            fields: Fields::new(),
            level,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
