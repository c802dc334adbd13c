//! Батчинг публикаций: bounded по байтам очередь + фоновая задача,
//! отправляющая батчи по порогам времени, количества и размера.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use pubsub_api::{BatchSink, PubSubError, PublishResult, PublishResultSender, PublishSettings};

// ═══════════════════════════════════════════════════════════════
//  Pending batch
// ═══════════════════════════════════════════════════════════════

struct Pending {
    data: Vec<u8>,
    sender: PublishResultSender,
}

#[derive(Default)]
struct Batch {
    items: Vec<Pending>,
    bytes: usize,
}

impl Batch {
    fn push(&mut self, item: Pending) {
        self.bytes += item.data.len();
        self.items.push(item);
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn is_full(&self, settings: &PublishSettings) -> bool {
        self.items.len() >= settings.count_threshold || self.bytes >= settings.byte_threshold
    }

    /// Следующее сообщение не поместится в byte_threshold.
    fn overflows_with(&self, size: usize, settings: &PublishSettings) -> bool {
        !self.is_empty() && self.bytes + size > settings.byte_threshold
    }
}

// ═══════════════════════════════════════════════════════════════
//  Batcher
// ═══════════════════════════════════════════════════════════════

/// Publisher одного topic'а.
///
/// `publish` только ставит сообщение в очередь. Фоновая задача стартует
/// лениво при первой публикации и забирает настройки, действующие в этот
/// момент. Задача запускается на runtime, в котором создан batcher, иначе
/// на runtime вызывающего потока.
pub struct Batcher {
    topic: String,
    sink: Arc<dyn BatchSink>,
    settings: PublishSettings,
    runtime: Option<tokio::runtime::Handle>,
    tx: OnceLock<mpsc::UnboundedSender<Pending>>,
    task: Mutex<Option<JoinHandle<()>>>,
    buffered: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Batcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("topic", &self.topic)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Batcher {
    pub fn new(topic: impl Into<String>, sink: Arc<dyn BatchSink>) -> Self {
        Self {
            topic: topic.into(),
            sink,
            settings: PublishSettings::default(),
            runtime: tokio::runtime::Handle::try_current().ok(),
            tx: OnceLock::new(),
            task: Mutex::new(None),
            buffered: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn settings(&self) -> PublishSettings {
        self.settings
    }

    /// Изменения после первой публикации не влияют на запущенную задачу.
    pub fn set_settings(&mut self, settings: PublishSettings) {
        if self.tx.get().is_some() {
            tracing::warn!(topic = %self.topic, "publish settings changed after first publish, ignored");
        }
        self.settings = settings;
    }

    /// Байты, принятые в очередь и ещё не отправленные.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    pub fn publish(&self, token: &CancellationToken, data: Vec<u8>) -> PublishResult {
        if token.is_cancelled() {
            return PublishResult::ready(Err(PubSubError::cancelled(format!(
                "publish to '{}': context cancelled",
                self.topic
            ))));
        }
        if self.shutdown.is_cancelled() {
            return PublishResult::ready(Err(self.stopped_error()));
        }

        let tx = match self.sender() {
            Ok(tx) => tx,
            Err(e) => return PublishResult::ready(Err(e)),
        };

        let size = data.len();
        let limit = self.settings.buffered_byte_limit;
        let reserved = self.buffered.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            current.checked_add(size).filter(|total| *total <= limit)
        });
        if reserved.is_err() {
            return PublishResult::ready(Err(PubSubError::buffer_full(format!(
                "publish to '{}': buffered byte limit {limit} exceeded",
                self.topic
            ))));
        }

        let (sender, result) = PublishResult::pending();
        if let Err(mpsc::error::SendError(pending)) = tx.send(Pending { data, sender }) {
            self.buffered.fetch_sub(size, Ordering::AcqRel);
            pending.sender.resolve(Err(self.stopped_error()));
        }
        result
    }

    /// Отправить накопленный батч и остановить фоновую задачу.
    /// Последующие публикации завершаются ошибкой `Stopped`.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(topic = %self.topic, error = %e, "flush task failed");
            }
        }
    }

    fn stopped_error(&self) -> PubSubError {
        PubSubError::stopped(format!("publisher for '{}' is stopped", self.topic))
    }

    fn sender(&self) -> Result<&mpsc::UnboundedSender<Pending>, PubSubError> {
        if let Some(tx) = self.tx.get() {
            return Ok(tx);
        }
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => tokio::runtime::Handle::try_current()
                .map_err(|e| PubSubError::no_runtime(format!("publish to '{}': {e}", self.topic)))?,
        };
        Ok(self.tx.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let task = FlushTask {
                topic: self.topic.clone(),
                sink: self.sink.clone(),
                settings: self.settings,
                buffered: self.buffered.clone(),
            };
            let handle = runtime.spawn(task.run(rx, self.shutdown.clone()));
            match self.task.lock() {
                Ok(mut guard) => *guard = Some(handle),
                Err(poisoned) => *poisoned.into_inner() = Some(handle),
            }
            tracing::debug!(topic = %self.topic, settings = ?self.settings, "flush task started");
            tx
        }))
    }
}

impl Drop for Batcher {
    fn drop(&mut self) {
        // Задача сама дофлашит очередь и завершится.
        self.shutdown.cancel();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Flush task
// ═══════════════════════════════════════════════════════════════

struct FlushTask {
    topic: String,
    sink: Arc<dyn BatchSink>,
    settings: PublishSettings,
    buffered: Arc<AtomicUsize>,
}

impl FlushTask {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Pending>, shutdown: CancellationToken) {
        let mut batch = Batch::default();
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                pending = rx.recv() => {
                    match pending {
                        Some(pending) => {
                            self.accept(&mut batch, &mut deadline, pending).await;
                        }
                        None => break,
                    }
                }
                _ = wait_until(deadline) => {
                    self.flush(&mut batch).await;
                    deadline = None;
                }
                _ = shutdown.cancelled() => break,
            }
        }

        // Дренаж: всё, что успели поставить в очередь, отправляется.
        rx.close();
        while let Ok(pending) = rx.try_recv() {
            self.accept(&mut batch, &mut deadline, pending).await;
        }
        self.flush(&mut batch).await;
        tracing::debug!(topic = %self.topic, "flush task stopped");
    }

    async fn accept(&self, batch: &mut Batch, deadline: &mut Option<Instant>, pending: Pending) {
        if batch.overflows_with(pending.data.len(), &self.settings) {
            self.flush(batch).await;
            *deadline = None;
        }
        if batch.is_empty() {
            *deadline = Some(Instant::now() + self.settings.delay_threshold);
        }
        batch.push(pending);
        if batch.is_full(&self.settings) {
            self.flush(batch).await;
            *deadline = None;
        }
    }

    async fn flush(&self, batch: &mut Batch) {
        if batch.is_empty() {
            return;
        }
        let Batch { items, bytes } = std::mem::take(batch);
        let count = items.len();
        let (payloads, senders): (Vec<Vec<u8>>, Vec<PublishResultSender>) =
            items.into_iter().map(|p| (p.data, p.sender)).unzip();

        tracing::debug!(topic = %self.topic, count, bytes, "flushing batch");
        let outcome = self.sink.send_batch(&self.topic, payloads).await;
        self.buffered.fetch_sub(bytes, Ordering::AcqRel);

        match outcome {
            Ok(ids) => {
                if ids.len() != count {
                    tracing::warn!(topic = %self.topic, expected = count, got = ids.len(), "sink returned unexpected id count");
                }
                let mut ids = ids.into_iter();
                for sender in senders {
                    match ids.next() {
                        Some(id) => sender.resolve(Ok(id)),
                        None => sender.resolve(Err(PubSubError::internal(format!(
                            "publish to '{}': no message id returned",
                            self.topic
                        )))),
                    }
                }
            }
            Err(e) => {
                tracing::warn!(topic = %self.topic, count, error = ?e, "batch publish failed");
                for sender in senders {
                    sender.resolve(Err(e.clone()));
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
