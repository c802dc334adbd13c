//! Контракт между publisher'ами логов и pub/sub транспортом.

pub mod error;
pub mod result;
pub mod settings;
pub mod topic;
pub mod util;

pub use error::{PubSubError, PubSubErrorKind};
pub use result::{PublishResult, PublishResultSender};
pub use settings::PublishSettings;
pub use topic::{BatchSink, Message, PubSubClient, TopicHandle};
pub use util::now_ms;
