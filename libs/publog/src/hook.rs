use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pubsub_api::{PubSubClient, PubSubError, PublishResult, PublishSettings, TopicHandle};

use crate::error::HookError;
use crate::event;
use crate::logger::LogHook;
use crate::record::{Level, LogRecord};

/// Максимальное время ожидания сообщения до отправки батча.
pub const DELAY_THRESHOLD: Duration = Duration::from_secs(5);
/// Максимальный размер батча в сообщениях.
pub const COUNT_THRESHOLD: usize = 100;
/// Максимальный размер батча в байтах.
pub const BYTE_THRESHOLD: usize = 1_000_000;
/// Максимум байт, ожидающих отправки, после которого publish отклоняется.
pub const BUFFERED_BYTE_LIMIT: usize = 1_000_000_000;

/// Настройки, которые hook применяет к своему topic'у.
pub const PUBLISH_SETTINGS: PublishSettings = PublishSettings {
    delay_threshold: DELAY_THRESHOLD,
    count_threshold: COUNT_THRESHOLD,
    byte_threshold: BYTE_THRESHOLD,
    buffered_byte_limit: BUFFERED_BYTE_LIMIT,
};

/// Callback для асинхронных ошибок публикации.
pub type ErrorHandler = Arc<dyn Fn(&PubSubError) + Send + Sync>;

/// Hook, пересылающий записи лога в pub/sub topic.
///
/// Владеет единственным handle на topic. `fire` только кодирует запись
/// и ставит сообщение в очередь publisher'а, сеть не ждёт.
pub struct Hook {
    token: CancellationToken,
    // Handle может опираться на соединение клиента.
    _client: Arc<dyn PubSubClient>,
    topic: Box<dyn TopicHandle>,
    on_error: Option<ErrorHandler>,
    runtime: Option<tokio::runtime::Handle>,
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook").field("topic", &self.topic.name()).finish()
    }
}

impl Hook {
    /// Подготовить topic (создать, если его нет) и собрать hook.
    ///
    /// Существование проверяется всегда до создания, так что повторный
    /// вызов с тем же именем topic не пересоздаёт. Check-then-create не
    /// атомарен: если topic параллельно создал кто-то ещё, ошибка
    /// `AlreadyExists` вернётся как `TopicCreation`.
    pub async fn new(
        token: CancellationToken,
        client: Arc<dyn PubSubClient>,
        name: &str,
    ) -> Result<Self, HookError> {
        let mut topic = client.topic(name);

        let exists = topic.exists().await.map_err(|source| HookError::TopicLookup {
            topic: name.to_string(),
            source,
        })?;

        if exists {
            tracing::debug!(topic = %name, "topic exists");
        } else {
            topic = client.create_topic(name).await.map_err(|source| HookError::TopicCreation {
                topic: name.to_string(),
                source,
            })?;
            tracing::info!(topic = %name, "created topic");
        }

        topic.set_publish_settings(PUBLISH_SETTINGS);

        Ok(Self {
            token,
            _client: client,
            topic,
            on_error: None,
            runtime: tokio::runtime::Handle::try_current().ok(),
        })
    }

    /// Получать ошибки публикации, которые иначе были бы потеряны.
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&PubSubError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }

    pub fn settings(&self) -> PublishSettings {
        self.topic.publish_settings()
    }

    /// Закодировать запись и поставить её в очередь на публикацию.
    ///
    /// Ошибка возвращается только если запись не сериализуется; тогда
    /// ничего не публикуется.
    pub fn fire(&self, record: &LogRecord) -> Result<(), HookError> {
        let bytes = event::encode(record)?;
        let result = self.topic.publish(&self.token, bytes);
        if let Some(handler) = &self.on_error {
            self.watch(result, handler.clone());
        }
        Ok(())
    }

    /// Hook принимает записи любого уровня.
    pub fn levels(&self) -> &'static [Level] {
        &Level::ALL
    }

    fn watch(&self, mut result: PublishResult, handler: ErrorHandler) {
        match self.runtime.clone().or_else(|| tokio::runtime::Handle::try_current().ok()) {
            Some(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = result.get().await {
                        handler(&e);
                    }
                });
            }
            // Без runtime видны только немедленные отказы.
            None => {
                if let Some(Err(e)) = result.try_get() {
                    handler(&e);
                }
            }
        }
    }
}

impl LogHook for Hook {
    fn levels(&self) -> &[Level] {
        Hook::levels(self)
    }

    fn fire(&self, record: &LogRecord) -> Result<(), HookError> {
        Hook::fire(self, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use pubsub_api::PubSubErrorKind;
    use pubsub_memory::MemoryPubSub;

    use crate::event::Event;
    use crate::record::FieldValue;

    async fn hook(client: &MemoryPubSub, name: &str) -> Result<Hook, HookError> {
        Hook::new(CancellationToken::new(), Arc::new(client.clone()), name).await
    }

    #[tokio::test(start_paused = true)]
    async fn creates_topic_and_publishes_hello_world() {
        let client = MemoryPubSub::default();
        let hook = hook(&client, "test-topic").await.unwrap();

        assert_eq!(client.topic_names(), vec!["test-topic".to_string()]);
        assert_eq!(hook.settings(), PUBLISH_SETTINGS);
        assert_eq!(hook.settings().delay_threshold, Duration::from_secs(5));
        assert_eq!(hook.settings().count_threshold, 100);
        assert_eq!(hook.settings().byte_threshold, 1_000_000);
        assert_eq!(hook.settings().buffered_byte_limit, 1_000_000_000);

        let record = LogRecord::new(Level::Info, "Hello world!").with_field("hello", "world");
        hook.fire(&record).unwrap();

        tokio::time::sleep(DELAY_THRESHOLD + Duration::from_secs(1)).await;

        let messages = client.messages("test-topic");
        assert_eq!(messages.len(), 1);
        let event = Event::decode(&messages[0].data).unwrap();
        assert_eq!(event.message, "Hello world!");
        assert_eq!(event.level, "INFO");
        assert_eq!(event.data.get("hello"), Some(&FieldValue::from("world")));
        assert!(event.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&event.timestamp).is_ok());
    }

    #[tokio::test]
    async fn second_construction_does_not_create_again() {
        let client = MemoryPubSub::default();
        hook(&client, "logs").await.unwrap();
        hook(&client, "logs").await.unwrap();

        assert_eq!(client.create_calls(), 1);
        assert_eq!(client.exists_calls(), 2);
    }

    #[tokio::test]
    async fn lookup_failure_aborts_before_create() {
        let client = MemoryPubSub::default();
        client.fail_exists(PubSubError::unavailable("dns failure"));

        let err = hook(&client, "logs").await.unwrap_err();
        match err {
            HookError::TopicLookup { topic, source } => {
                assert_eq!(topic, "logs");
                assert_eq!(source.kind(), PubSubErrorKind::Unavailable);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.create_calls(), 0);
    }

    #[tokio::test]
    async fn creation_failure_is_surfaced() {
        let client = MemoryPubSub::default();
        client.fail_create(PubSubError::already_exists("created concurrently"));

        let err = hook(&client, "logs").await.unwrap_err();
        assert!(matches!(
            err,
            HookError::TopicCreation { ref source, .. } if source.kind() == PubSubErrorKind::AlreadyExists
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn serialization_failure_publishes_nothing() {
        let client = MemoryPubSub::default();
        let hook = hook(&client, "logs").await.unwrap();

        let bad = LogRecord::new(Level::Info, "bad").with_field("value", f64::NAN);
        assert!(matches!(hook.fire(&bad), Err(HookError::Serialization(_))));

        // Hook остаётся рабочим.
        hook.fire(&LogRecord::new(Level::Info, "good")).unwrap();
        tokio::time::sleep(DELAY_THRESHOLD * 2).await;

        let messages = client.messages("logs");
        assert_eq!(messages.len(), 1);
        assert_eq!(Event::decode(&messages[0].data).unwrap().message, "good");
    }

    #[tokio::test]
    async fn levels_cover_every_severity() {
        let client = MemoryPubSub::default();
        let hook = hook(&client, "logs").await.unwrap();
        assert_eq!(hook.levels(), &Level::ALL);
        assert_eq!(LogHook::levels(&hook).len(), 7);
    }

    #[tokio::test]
    async fn cancelled_context_reports_through_error_handler() {
        let client = MemoryPubSub::default();
        let token = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let hook = Hook::new(token.clone(), Arc::new(client.clone()), "logs")
            .await
            .unwrap()
            .with_error_handler(move |e| sink.lock().unwrap().push(e.kind()));

        token.cancel();
        hook.fire(&LogRecord::new(Level::Error, "lost")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*seen.lock().unwrap(), vec![PubSubErrorKind::Cancelled]);
    }

    #[tokio::test(start_paused = true)]
    async fn background_flush_failure_reaches_error_handler() {
        let client = MemoryPubSub::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let hook = hook(&client, "logs")
            .await
            .unwrap()
            .with_error_handler(move |e| sink.lock().unwrap().push(e.kind()));
        client.fail_publish(PubSubError::unavailable("backend down"));

        hook.fire(&LogRecord::new(Level::Warn, "dropped by transport")).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(DELAY_THRESHOLD + Duration::from_secs(1)).await;

        assert_eq!(*seen.lock().unwrap(), vec![PubSubErrorKind::Unavailable]);
        assert!(client.messages("logs").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_fire_enqueues_one_message_per_call() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 50;

        let client = MemoryPubSub::default();
        let hook = hook(&client, "logs").await.unwrap();

        std::thread::scope(|s| {
            for t in 0..THREADS {
                let hook = &hook;
                s.spawn(move || {
                    for i in 0..PER_THREAD {
                        let record = LogRecord::new(Level::Info, "tick")
                            .with_field("thread", t as i64)
                            .with_field("i", i as i64);
                        hook.fire(&record).unwrap();
                    }
                });
            }
        });

        // 400 сообщений = 4 полных батча по COUNT_THRESHOLD, таймер не нужен.
        let expected = THREADS * PER_THREAD;
        for _ in 0..200 {
            if client.messages("logs").len() == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(client.messages("logs").len(), expected);
    }
}
