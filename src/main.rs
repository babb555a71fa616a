//! yxml - command line front end for the Yandex XML search client.

mod cli;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (credentials usually live there)
    let _ = dotenvy::dotenv();

    let default_filter = if cli::is_verbose() {
        "yandex_xml=info,yxml=info"
    } else {
        "yandex_xml=warn,yxml=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::run().await
}
