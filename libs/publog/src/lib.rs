//! Пересылка записей лога в pub/sub topic.
//!
//! `Hook` кодирует каждую запись в JSON-событие и асинхронно публикует
//! его через `pubsub_api::TopicHandle`. `Logger` раздаёт записи
//! зарегистрированным hook'ам, `PublogLayer` подключает всё это к `tracing`.

pub mod error;
pub mod event;
pub mod hook;
pub mod layer;
pub mod logger;
pub mod record;

pub use error::HookError;
pub use event::{encode, Event};
pub use hook::{
    ErrorHandler, Hook, BUFFERED_BYTE_LIMIT, BYTE_THRESHOLD, COUNT_THRESHOLD, DELAY_THRESHOLD,
    PUBLISH_SETTINGS,
};
pub use layer::PublogLayer;
pub use logger::{LogHook, Logger};
pub use record::{FieldValue, Fields, Level, LogRecord};
