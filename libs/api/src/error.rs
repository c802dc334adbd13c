/// Категория ошибки транспорта. Позволяет вызывающему решить,
/// что делать дальше (fail fast, пропустить сообщение, сдаться).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubSubErrorKind {
    /// Topic не существует.
    NotFound,
    /// Topic с таким именем уже создан (в т.ч. конкурентным процессом).
    AlreadyExists,
    /// Сеть / сервис недоступен — transient.
    Unavailable,
    /// Нет прав на операцию.
    PermissionDenied,
    /// Превышен buffered_byte_limit — сообщение отброшено.
    BufferFull,
    /// Контекст публикации отменён.
    Cancelled,
    /// Publisher остановлен, новые сообщения не принимаются.
    Stopped,
    /// Нет tokio runtime для фоновой отправки.
    NoRuntime,
    /// Всё остальное.
    Internal,
}

impl std::fmt::Display for PubSubErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PubSubErrorKind::NotFound => f.write_str("not_found"),
            PubSubErrorKind::AlreadyExists => f.write_str("already_exists"),
            PubSubErrorKind::Unavailable => f.write_str("unavailable"),
            PubSubErrorKind::PermissionDenied => f.write_str("permission_denied"),
            PubSubErrorKind::BufferFull => f.write_str("buffer_full"),
            PubSubErrorKind::Cancelled => f.write_str("cancelled"),
            PubSubErrorKind::Stopped => f.write_str("stopped"),
            PubSubErrorKind::NoRuntime => f.write_str("no_runtime"),
            PubSubErrorKind::Internal => f.write_str("internal"),
        }
    }
}

/// Unified error type for every transport operation.
///
/// Carries a `PubSubErrorKind` for categorization and a human-readable
/// message. Cheap to clone: a failed batch hands the same error to every
/// message it contained.
#[derive(Clone, PartialEq, Eq)]
pub struct PubSubError {
    kind: PubSubErrorKind,
    message: String,
}

impl PubSubError {
    pub fn new(kind: PubSubErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(PubSubErrorKind::NotFound, msg)
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(PubSubErrorKind::AlreadyExists, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(PubSubErrorKind::Unavailable, msg)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::new(PubSubErrorKind::PermissionDenied, msg)
    }

    pub fn buffer_full(msg: impl Into<String>) -> Self {
        Self::new(PubSubErrorKind::BufferFull, msg)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(PubSubErrorKind::Cancelled, msg)
    }

    pub fn stopped(msg: impl Into<String>) -> Self {
        Self::new(PubSubErrorKind::Stopped, msg)
    }

    pub fn no_runtime(msg: impl Into<String>) -> Self {
        Self::new(PubSubErrorKind::NoRuntime, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(PubSubErrorKind::Internal, msg)
    }

    pub fn kind(&self) -> PubSubErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for PubSubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for PubSubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PubSubError {}
