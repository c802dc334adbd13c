use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;

use publog::{Event, FieldValue, Hook, Level, LogRecord, Logger, PublogLayer, DELAY_THRESHOLD};
use pubsub_memory::MemoryPubSub;

async fn forwarder(client: &MemoryPubSub, topic: &str) -> Arc<Hook> {
    Arc::new(
        Hook::new(CancellationToken::new(), Arc::new(client.clone()), topic)
            .await
            .expect("hook"),
    )
}

#[tokio::test(start_paused = true)]
async fn tracing_events_arrive_on_the_topic() {
    let client = MemoryPubSub::default();
    let mut subscription = {
        let hook = forwarder(&client, "app-logs").await;
        let subscription = client.subscribe("app-logs", 16).unwrap();
        let subscriber = tracing_subscriber::registry()
            .with(PublogLayer::new(Logger::new().with_hook(hook)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(hello = "world", "Hello world!");
            tracing::error!(code = 500, "request failed");
        });
        subscription
    };

    let first = tokio::time::timeout(DELAY_THRESHOLD * 2, subscription.recv())
        .await
        .expect("first message")
        .expect("subscription open");
    let second = subscription.recv().await.expect("second message");

    let first = Event::decode(&first.data).unwrap();
    assert_eq!(first.message, "Hello world!");
    assert_eq!(first.level, "INFO");
    assert_eq!(first.data.get("hello"), Some(&FieldValue::from("world")));

    let second = Event::decode(&second.data).unwrap();
    assert_eq!(second.level, "ERROR");
    assert_eq!(second.data.get("code"), Some(&FieldValue::I64(500)));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_hook_flushes_pending_messages() {
    let client = MemoryPubSub::default();
    {
        let hook = forwarder(&client, "short-lived").await;
        hook.fire(&LogRecord::new(Level::Debug, "last words")).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    let messages = client.messages("short-lived");
    assert_eq!(messages.len(), 1);
    assert_eq!(Event::decode(&messages[0].data).unwrap().message, "last words");
}

#[tokio::test]
async fn existing_topic_is_reused() {
    let client = MemoryPubSub::default();
    let first = forwarder(&client, "shared").await;
    let second = forwarder(&client, "shared").await;

    assert_eq!(client.create_calls(), 1);
    assert_eq!(first.topic_name(), second.topic_name());
}
