use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::{PubSubError, PublishResult, PublishSettings};

// ════════════════════════════════════════════════════════════════
//  Transport capability traits
// ════════════════════════════════════════════════════════════════

/// Клиент pub/sub сервиса. Минимальный набор операций, нужный
/// для provisioning'а topic'а и публикации.
///
/// Реализации: MemoryPubSub (in-process), сетевые клиенты.
pub trait PubSubClient: Send + Sync {
    /// Handle на topic по имени. Сетевых вызовов не делает,
    /// существование topic'а не проверяется.
    fn topic(&self, name: &str) -> Box<dyn TopicHandle>;

    /// Создать topic. Ошибка `AlreadyExists`, если он уже есть.
    #[allow(clippy::type_complexity)]
    fn create_topic(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn TopicHandle>, PubSubError>> + Send + '_>>;
}

/// Handle на именованный topic с настройками батчинга.
pub trait TopicHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Проверить существование topic'а на стороне сервиса.
    fn exists(&self) -> Pin<Box<dyn Future<Output = Result<bool, PubSubError>> + Send + '_>>;

    /// Установить параметры батчинга. Вызывается до первой публикации.
    fn set_publish_settings(&mut self, settings: PublishSettings);

    fn publish_settings(&self) -> PublishSettings;

    /// Поставить сообщение в очередь на отправку и сразу вернуться.
    ///
    /// Безопасен для конкурентного вызова. Ошибки (отмена `token`,
    /// переполнение буфера, сбой отправки) приходят только через `PublishResult`.
    fn publish(&self, token: &CancellationToken, data: Vec<u8>) -> PublishResult;
}

/// Приёмник готовых батчей — сторона транспорта, куда batcher
/// отправляет накопленные сообщения.
pub trait BatchSink: Send + Sync {
    /// Отправить батч payload'ов в topic. Возвращает server id
    /// для каждого сообщения в том же порядке.
    fn send_batch(
        &self,
        topic: &str,
        batch: Vec<Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, PubSubError>> + Send + '_>>;
}

/// Сообщение, принятое сервисом.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub data: Vec<u8>,
    /// Время приёма в миллисекундах (Unix epoch).
    pub publish_time_ms: i64,
}
