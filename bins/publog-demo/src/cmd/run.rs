use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{reload, Registry};

use publog::{Hook, Logger, PublogLayer};
use pubsub_memory::{MemoryPubSub, MemoryPubSubConfig};

use crate::config::{DemoConfig, RunArgs};
use crate::error::DemoError;

pub type ForwardHandle = reload::Handle<Option<PublogLayer>, Registry>;

pub async fn run(args: RunArgs, forward: ForwardHandle) -> Result<(), DemoError> {
    let config = DemoConfig::resolve(&args)?;
    tracing::info!(topic = %config.topic, messages = config.messages, "publog-demo starting");

    let client = MemoryPubSub::new(MemoryPubSubConfig { max_retained: config.max_retained });
    let token = CancellationToken::new();

    // --- Provision topic + hook ---
    let hook = Hook::new(token.clone(), Arc::new(client.clone()), &config.topic)
        .await?
        .with_error_handler(|e| tracing::error!(target: "publog", error = ?e, "publish failed"));
    let settings = hook.settings();
    tracing::info!(
        topic = %hook.topic_name(),
        delay = ?settings.delay_threshold,
        count = settings.count_threshold,
        bytes = settings.byte_threshold,
        buffered_limit = settings.buffered_byte_limit,
        "hook ready"
    );

    let mut subscription = client.subscribe(&config.topic, config.subscriber_buffer)?;

    // --- Forward tracing events ---
    let logger = Logger::new().with_hook(Arc::new(hook));
    forward.reload(Some(PublogLayer::new(logger)))?;

    for seq in 0..config.messages {
        tracing::info!(seq, kind = "demo", "demo event");
    }
    tracing::warn!(total = config.messages, "demo events emitted");

    // Снятие layer'а дропает hook: batcher дофлашит очередь.
    forward.reload(None)?;

    // --- Read them back ---
    let expected = config.messages + 1;
    let mut received = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(config.wait_ms);
    while received < expected {
        match tokio::time::timeout_at(deadline, subscription.recv()).await {
            Ok(Some(message)) => {
                received += 1;
                println!("{}", String::from_utf8_lossy(&message.data));
            }
            Ok(None) | Err(_) => break,
        }
    }

    token.cancel();
    if received < expected {
        return Err(DemoError::Incomplete { received, expected });
    }
    tracing::info!(received, "all events delivered");
    Ok(())
}
