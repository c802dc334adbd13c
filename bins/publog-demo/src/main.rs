mod cmd;
mod config;
mod error;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::{Cli, Commands};

#[tokio::main]
async fn main() {
    // Forwarding layer подключается позже, когда topic готов.
    let (forward, forward_handle) = tracing_subscriber::reload::Layer::new(None::<publog::PublogLayer>);
    tracing_subscriber::registry()
        .with(forward)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(args, forward_handle).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
