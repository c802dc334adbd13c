use std::time::Duration;

/// Параметры батчинга публикации для одного topic handle.
///
/// Батч отправляется, как только срабатывает любой из трёх порогов
/// (время, количество, байты). `buffered_byte_limit` ограничивает объём
/// сообщений, ожидающих отправки: сверх лимита publish отклоняется.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishSettings {
    /// Максимальное время ожидания сообщения в батче.
    pub delay_threshold: Duration,
    /// Максимальный размер батча в сообщениях.
    pub count_threshold: usize,
    /// Максимальный размер батча в байтах payload.
    pub byte_threshold: usize,
    /// Максимум байт в памяти, ожидающих отправки.
    pub buffered_byte_limit: usize,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            delay_threshold: Duration::from_millis(10),
            count_threshold: 100,
            byte_threshold: 1_000_000,
            buffered_byte_limit: 100_000_000,
        }
    }
}
