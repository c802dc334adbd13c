use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HookError;
use crate::record::{Fields, LogRecord};

/// Событие в том виде, в котором оно уходит в topic.
///
/// ```json
/// {"Timestamp":"2024-05-01T10:00:00.5Z","Message":"...","Data":{...},"Level":"INFO"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event<'a> {
    /// RFC3339 с наносекундами, всегда UTC.
    pub timestamp: String,
    pub message: Cow<'a, str>,
    pub data: Cow<'a, Fields>,
    /// Имя уровня в верхнем регистре.
    pub level: String,
}

impl<'a> Event<'a> {
    pub fn from_record(record: &'a LogRecord) -> Self {
        Self {
            timestamp: rfc3339_nano(&record.timestamp),
            message: Cow::Borrowed(record.message.as_str()),
            data: Cow::Borrowed(&record.fields),
            level: record.level.as_str().to_uppercase(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, HookError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Event<'static> {
    /// Разобрать payload сообщения (сторона подписчика).
    pub fn decode(bytes: &[u8]) -> Result<Self, HookError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Запись → байты payload'а.
pub fn encode(record: &LogRecord) -> Result<Vec<u8>, HookError> {
    Event::from_record(record).to_bytes()
}

/// UTC, дробная часть без хвостовых нулей и без точки при нуле наносекунд.
pub fn rfc3339_nano(ts: &DateTime<FixedOffset>) -> String {
    let utc = ts.with_timezone(&Utc);
    let mut out = utc.format("%Y-%m-%dT%H:%M:%S").to_string();
    // nanosecond() > 999_999_999 только для leap second
    let nanos = utc.nanosecond() % 1_000_000_000;
    if nanos != 0 {
        let frac = format!("{nanos:09}");
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out.push('Z');
    out
}
