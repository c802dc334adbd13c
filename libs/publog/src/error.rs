use pubsub_api::PubSubError;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("topic lookup ({topic}): {source}")]
    TopicLookup { topic: String, source: PubSubError },

    #[error("topic creation ({topic}): {source}")]
    TopicCreation { topic: String, source: PubSubError },

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
