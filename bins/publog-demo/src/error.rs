#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("hook: {0}")]
    Hook(#[from] publog::HookError),

    #[error("pubsub: {0}")]
    PubSub(#[from] pubsub_api::PubSubError),

    #[error("tracing reload: {0}")]
    Reload(#[from] tracing_subscriber::reload::Error),

    #[error("received {received} of {expected} messages before timeout")]
    Incomplete { received: usize, expected: usize },
}
