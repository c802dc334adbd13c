use tokio::sync::oneshot;

use crate::PubSubError;

type Outcome = Result<String, PubSubError>;

/// Асинхронный результат одной публикации.
///
/// Разрешается server id сообщения после отправки батча или ошибкой.
/// Если результат не нужен, его можно просто дропнуть: отправка от
/// этого не отменяется.
#[derive(Debug)]
pub struct PublishResult {
    rx: oneshot::Receiver<Outcome>,
}

/// Сторона, разрешающая `PublishResult`. Живёт рядом с сообщением в очереди.
#[derive(Debug)]
pub struct PublishResultSender {
    tx: oneshot::Sender<Outcome>,
}

impl PublishResult {
    /// Пара sender/result для сообщения, поставленного в очередь.
    pub fn pending() -> (PublishResultSender, Self) {
        let (tx, rx) = oneshot::channel();
        (PublishResultSender { tx }, Self { rx })
    }

    /// Уже разрешённый результат (сообщение отклонено до постановки в очередь).
    pub fn ready(outcome: Outcome) -> Self {
        let (sender, result) = Self::pending();
        sender.resolve(outcome);
        result
    }

    /// Дождаться результата. Sender, дропнутый без ответа, означает
    /// остановленный publisher.
    pub async fn get(self) -> Outcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(PubSubError::stopped("publish result dropped before completion")),
        }
    }

    /// Неблокирующая проверка. `None` — результат ещё не готов.
    pub fn try_get(&mut self) -> Option<Outcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(PubSubError::stopped("publish result dropped before completion")))
            }
        }
    }
}

impl PublishResultSender {
    pub fn resolve(self, outcome: Outcome) {
        // Получатель мог быть дропнут (fire-and-forget), это нормально.
        let _ = self.tx.send(outcome);
    }
}
