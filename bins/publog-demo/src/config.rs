use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::error::DemoError;

#[derive(Parser)]
#[command(name = "publog-demo", about = "Пересылка tracing-событий в pub/sub topic")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Создать topic, отправить события и прочитать их подписчиком
    Run(RunArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Путь к TOML конфиг файлу. Без него — значения по умолчанию
    #[arg(long, env = "PUBLOG_CONFIG")]
    pub config: Option<String>,

    /// Имя topic'а (перекрывает конфиг)
    #[arg(long)]
    pub topic: Option<String>,

    /// Сколько событий отправить (перекрывает конфиг)
    #[arg(long)]
    pub messages: Option<usize>,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_messages")]
    pub messages: usize,
    /// Сколько сообщений хранит in-memory topic.
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
    /// Размер буфера подписчика.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    /// Сколько ждать доставки всех сообщений.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
}

fn default_topic() -> String {
    "app-logs".into()
}
fn default_messages() -> usize {
    10
}
fn default_max_retained() -> usize {
    100_000
}
fn default_subscriber_buffer() -> usize {
    1024
}
fn default_wait_ms() -> u64 {
    6_000
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            messages: default_messages(),
            max_retained: default_max_retained(),
            subscriber_buffer: default_subscriber_buffer(),
            wait_ms: default_wait_ms(),
        }
    }
}

impl DemoConfig {
    pub fn load(path: &str) -> Result<Self, DemoError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DemoError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        toml::from_str(&content)
            .map_err(|e| DemoError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(toml_str: &str) -> Result<Self, DemoError> {
        toml::from_str(toml_str)
            .map_err(|e| DemoError::Config { context: "parse", detail: e.to_string() })
    }

    /// Конфиг из файла (если задан) с перекрытием аргументами CLI.
    pub fn resolve(args: &RunArgs) -> Result<Self, DemoError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(topic) = &args.topic {
            config.topic = topic.clone();
        }
        if let Some(messages) = args.messages {
            config.messages = messages;
        }
        if config.topic.is_empty() {
            return Err(DemoError::Config { context: "validate", detail: "topic must not be empty".into() });
        }
        Ok(config)
    }
}
