use std::sync::Arc;

use crate::error::HookError;
use crate::record::{Level, LogRecord};

/// Получатель записей лога.
pub trait LogHook: Send + Sync {
    /// Уровни, для которых hook вызывается.
    fn levels(&self) -> &[Level];

    fn fire(&self, record: &LogRecord) -> Result<(), HookError>;
}

/// Упорядоченный набор hook'ов. Регистрация явная, без глобального
/// состояния: каждый владелец логгера сам решает, куда уходят записи.
#[derive(Clone, Default)]
pub struct Logger {
    hooks: Vec<Arc<dyn LogHook>>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hook(&mut self, hook: Arc<dyn LogHook>) {
        self.hooks.push(hook);
    }

    pub fn with_hook(mut self, hook: Arc<dyn LogHook>) -> Self {
        self.add_hook(hook);
        self
    }

    pub fn hooks(&self) -> &[Arc<dyn LogHook>] {
        &self.hooks
    }

    /// Передать запись всем hook'ам её уровня в порядке регистрации.
    /// Ошибка одного hook'а не мешает остальным.
    pub fn log(&self, record: &LogRecord) -> Vec<HookError> {
        let mut errors = Vec::new();
        for (index, hook) in self.hooks.iter().enumerate() {
            if !hook.levels().contains(&record.level) {
                continue;
            }
            if let Err(e) = hook.fire(record) {
                tracing::warn!(hook = index, level = %record.level, error = %e, "failed to fire hook");
                errors.push(e);
            }
        }
        errors
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").field("hooks", &self.hooks.len()).finish()
    }
}
