use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use publish_batcher::Batcher;
use pubsub_api::{
    BatchSink, Message, PubSubClient, PubSubError, PublishResult, PublishSettings, TopicHandle,
    now_ms,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryPubSubConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_retained() -> usize {
    100_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryPubSubConfig {
    /// Сколько последних сообщений хранит каждый topic.
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
}

impl Default for MemoryPubSubConfig {
    fn default() -> Self {
        Self {
            max_retained: default_max_retained(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Broker — общее состояние всех клонов клиента
// ═══════════════════════════════════════════════════════════════

struct TopicState {
    messages: VecDeque<Message>,
    subscribers: Vec<mpsc::Sender<Message>>,
}

impl TopicState {
    fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(65536)),
            subscribers: Vec::new(),
        }
    }
}

/// Инъекция ошибок: действует на все последующие вызовы до `clear_faults`.
#[derive(Default)]
struct Faults {
    exists: Option<PubSubError>,
    create: Option<PubSubError>,
    publish: Option<PubSubError>,
}

struct Broker {
    topics: RwLock<HashMap<String, TopicState>>,
    faults: Mutex<Faults>,
    max_retained: usize,
    next_id: AtomicU64,
    exists_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl Broker {
    fn read_topics(&self) -> RwLockReadGuard<'_, HashMap<String, TopicState>> {
        match self.topics.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("topic map read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_topics(&self) -> RwLockWriteGuard<'_, HashMap<String, TopicState>> {
        match self.topics.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("topic map write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        match self.faults.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn exists(&self, name: &str) -> Result<bool, PubSubError> {
        self.exists_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(e) = self.faults().exists.clone() {
            return Err(e);
        }
        Ok(self.read_topics().contains_key(name))
    }

    fn create(&self, name: &str) -> Result<(), PubSubError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(e) = self.faults().create.clone() {
            return Err(e);
        }
        let mut topics = self.write_topics();
        if topics.contains_key(name) {
            return Err(PubSubError::already_exists(format!("topic '{name}' already exists")));
        }
        topics.insert(name.to_string(), TopicState::new(self.max_retained));
        Ok(())
    }

    /// Сохранить батч и разослать подписчикам.
    fn accept(&self, topic: &str, batch: Vec<Vec<u8>>) -> Result<Vec<String>, PubSubError> {
        if let Some(e) = self.faults().publish.clone() {
            return Err(e);
        }
        let mut topics = self.write_topics();
        let state = topics
            .get_mut(topic)
            .ok_or_else(|| PubSubError::not_found(format!("topic '{topic}' not found")))?;

        let publish_time_ms = now_ms();
        let mut ids = Vec::with_capacity(batch.len());
        for data in batch {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            let message = Message {
                id: id.to_string(),
                data,
                publish_time_ms,
            };

            state.subscribers.retain(|tx| match tx.try_send(message.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(topic = %topic, "subscriber channel full, dropping");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });

            if state.messages.len() >= self.max_retained {
                state.messages.pop_front();
            }
            state.messages.push_back(message);
            ids.push(id.to_string());
        }
        Ok(ids)
    }
}

impl BatchSink for Broker {
    fn send_batch(
        &self,
        topic: &str,
        batch: Vec<Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, PubSubError>> + Send + '_>> {
        let result = self.accept(topic, batch);
        Box::pin(async move { result })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryPubSub
// ═══════════════════════════════════════════════════════════════

/// In-process pub/sub сервис. Клоны разделяют одно состояние,
/// так что тест может держать клон для инспекции, а hook — свой.
#[derive(Clone)]
pub struct MemoryPubSub {
    broker: Arc<Broker>,
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new(MemoryPubSubConfig::default())
    }
}

impl MemoryPubSub {
    pub fn new(config: MemoryPubSubConfig) -> Self {
        Self {
            broker: Arc::new(Broker {
                topics: RwLock::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                max_retained: config.max_retained.max(1),
                next_id: AtomicU64::new(0),
                exists_calls: AtomicUsize::new(0),
                create_calls: AtomicUsize::new(0),
            }),
        }
    }

    fn handle(&self, name: &str) -> MemoryTopic {
        let sink: Arc<dyn BatchSink> = self.broker.clone();
        MemoryTopic {
            name: name.to_string(),
            broker: self.broker.clone(),
            batcher: Batcher::new(name, sink),
        }
    }

    /// Подписаться на новые сообщения topic'а.
    /// Переполненный канал подписчика теряет сообщения.
    pub fn subscribe(&self, topic: &str, buffer: usize) -> Result<MemorySubscription, PubSubError> {
        let mut topics = self.broker.write_topics();
        let state = topics
            .get_mut(topic)
            .ok_or_else(|| PubSubError::not_found(format!("topic '{topic}' not found")))?;
        let (tx, rx) = mpsc::channel(buffer.max(1));
        state.subscribers.push(tx);
        Ok(MemorySubscription { rx })
    }

    /// Сохранённые сообщения topic'а, от старых к новым.
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.broker
            .read_topics()
            .get(topic)
            .map(|state| state.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.broker.read_topics().keys().cloned().collect()
    }

    pub fn delete_topic(&self, name: &str) -> bool {
        self.broker.write_topics().remove(name).is_some()
    }

    pub fn exists_calls(&self) -> usize {
        self.broker.exists_calls.load(Ordering::Relaxed)
    }

    pub fn create_calls(&self) -> usize {
        self.broker.create_calls.load(Ordering::Relaxed)
    }

    pub fn fail_exists(&self, err: PubSubError) {
        self.broker.faults().exists = Some(err);
    }

    pub fn fail_create(&self, err: PubSubError) {
        self.broker.faults().create = Some(err);
    }

    pub fn fail_publish(&self, err: PubSubError) {
        self.broker.faults().publish = Some(err);
    }

    pub fn clear_faults(&self) {
        *self.broker.faults() = Faults::default();
    }
}

impl PubSubClient for MemoryPubSub {
    fn topic(&self, name: &str) -> Box<dyn TopicHandle> {
        Box::new(self.handle(name))
    }

    fn create_topic(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn TopicHandle>, PubSubError>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            self.broker.create(&name)?;
            tracing::info!(topic = %name, "topic created");
            Ok(Box::new(self.handle(&name)) as Box<dyn TopicHandle>)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryTopic
// ═══════════════════════════════════════════════════════════════

pub struct MemoryTopic {
    name: String,
    broker: Arc<Broker>,
    batcher: Batcher,
}

impl TopicHandle for MemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self) -> Pin<Box<dyn Future<Output = Result<bool, PubSubError>> + Send + '_>> {
        Box::pin(async move { self.broker.exists(&self.name) })
    }

    fn set_publish_settings(&mut self, settings: PublishSettings) {
        self.batcher.set_settings(settings);
    }

    fn publish_settings(&self) -> PublishSettings {
        self.batcher.settings()
    }

    fn publish(&self, token: &CancellationToken, data: Vec<u8>) -> PublishResult {
        self.batcher.publish(token, data)
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemorySubscription
// ═══════════════════════════════════════════════════════════════

pub struct MemorySubscription {
    rx: mpsc::Receiver<Message>,
}

impl MemorySubscription {
    /// Следующее сообщение. None — topic удалён или клиент дропнут.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pubsub_api::PubSubErrorKind;

    fn immediate() -> PublishSettings {
        PublishSettings {
            delay_threshold: Duration::from_millis(1),
            count_threshold: 1,
            ..PublishSettings::default()
        }
    }

    #[tokio::test]
    async fn topic_handle_does_not_create_topic() {
        let client = MemoryPubSub::default();
        let handle = client.topic("logs");
        assert!(!handle.exists().await.unwrap());
        assert!(client.topic_names().is_empty());
        assert_eq!(client.exists_calls(), 1);
    }

    #[tokio::test]
    async fn create_twice_reports_already_exists() {
        let client = MemoryPubSub::default();
        client.create_topic("logs").await.unwrap();
        let err = client.create_topic("logs").await.err().unwrap();
        assert_eq!(err.kind(), PubSubErrorKind::AlreadyExists);
        assert_eq!(client.create_calls(), 2);
    }

    #[tokio::test]
    async fn published_messages_are_retained_and_fanned_out() {
        let client = MemoryPubSub::default();
        let mut handle = client.create_topic("logs").await.unwrap();
        handle.set_publish_settings(immediate());
        let mut sub = client.subscribe("logs", 8).unwrap();

        let id = handle
            .publish(&CancellationToken::new(), b"hello".to_vec())
            .get()
            .await
            .unwrap();

        let received = sub.recv().await.unwrap();
        assert_eq!(received.id, id);
        assert_eq!(received.data, b"hello");
        assert_eq!(client.messages("logs"), vec![received]);
    }

    #[tokio::test]
    async fn retention_keeps_latest_messages() {
        let client = MemoryPubSub::new(MemoryPubSubConfig { max_retained: 2 });
        let mut handle = client.create_topic("logs").await.unwrap();
        handle.set_publish_settings(immediate());
        let token = CancellationToken::new();

        for payload in [b"a", b"b", b"c"] {
            handle.publish(&token, payload.to_vec()).get().await.unwrap();
        }

        let data: Vec<_> = client.messages("logs").into_iter().map(|m| m.data).collect();
        assert_eq!(data, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn publish_to_deleted_topic_fails_asynchronously() {
        let client = MemoryPubSub::default();
        let mut handle = client.create_topic("logs").await.unwrap();
        handle.set_publish_settings(immediate());
        assert!(client.delete_topic("logs"));

        let err = handle
            .publish(&CancellationToken::new(), b"x".to_vec())
            .get()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PubSubErrorKind::NotFound);
    }

    #[tokio::test]
    async fn injected_faults_apply_until_cleared() {
        let client = MemoryPubSub::default();
        client.fail_exists(PubSubError::permission_denied("no access"));
        let err = client.topic("logs").exists().await.unwrap_err();
        assert_eq!(err.kind(), PubSubErrorKind::PermissionDenied);

        client.clear_faults();
        assert!(!client.topic("logs").exists().await.unwrap());
    }

    #[test]
    fn config_defaults_when_field_missing() {
        let config: MemoryPubSubConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_retained, 100_000);
    }
}
