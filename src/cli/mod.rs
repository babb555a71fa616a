//! CLI parser and dispatch.

mod helpers;
mod limits;
mod search;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use yandex_xml::config::StoreBackend;
use yandex_xml::{Config, SearchQuery, Server, YandexXml};

/// Backend type for the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreBackendType {
    /// In-memory (single process, not persisted)
    Memory,
    /// SQLite file (persisted, multi-process)
    Sqlite,
    /// Redis (distributed, requires redis-backend feature)
    #[cfg(feature = "redis-backend")]
    Redis,
}

impl From<StoreBackendType> for StoreBackend {
    fn from(value: StoreBackendType) -> Self {
        match value {
            StoreBackendType::Memory => StoreBackend::Memory,
            StoreBackendType::Sqlite => StoreBackend::Sqlite,
            #[cfg(feature = "redis-backend")]
            StoreBackendType::Redis => StoreBackend::Redis,
        }
    }
}

#[derive(Parser)]
#[command(name = "yxml")]
#[command(about = "Rate-limit aware Yandex XML search client")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Search endpoint: yandex.ru, yandex.com.tr or yandex.com
    #[arg(short, long, global = true)]
    server: Option<Server>,

    /// Store backend for quota, cache and pacing state (overrides config)
    #[arg(long, value_enum, global = true)]
    store: Option<StoreBackendType>,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Show the quota schedule and the request cadence derived from it
    Limits {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a search query
    Search {
        /// Query text (words are joined with spaces)
        #[arg(required = true)]
        query: Vec<String>,
        /// Notification language (ru, uk, be, kk, tr, en)
        #[arg(long)]
        lang: Option<String>,
        /// Region id (yandex.ru and yandex.com.tr only)
        #[arg(long, allow_negative_numbers = true)]
        region: Option<i64>,
        /// Adult filter: none, moderate, strict
        #[arg(long)]
        filter: Option<String>,
        /// Sort by relevance (rlv) or time (tm)
        #[arg(long)]
        sort: Option<String>,
        /// Time sort order: ascending, descending
        #[arg(long)]
        order: Option<String>,
        /// Grouping: flat or deep
        #[arg(long)]
        group: Option<String>,
        /// Documents per group (1-3)
        #[arg(long, allow_negative_numbers = true)]
        docs: Option<i64>,
        /// Passages per document (1-5)
        #[arg(long, allow_negative_numbers = true)]
        snippets: Option<i64>,
        /// Groups per page (1-100)
        #[arg(short, long, allow_negative_numbers = true)]
        limit: Option<i64>,
        /// Page number, starting at 0
        #[arg(short, long, allow_negative_numbers = true)]
        page: Option<i64>,
        /// Ask the provider to return a captcha instead of an error
        #[arg(long)]
        captcha: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_with(cli.config.as_deref()).await?;
    if let Some(server) = cli.server {
        config.server = server;
    }
    if let Some(store) = cli.store {
        config.store.backend = store.into();
    }

    let client = YandexXml::from_config(&config).await?;

    match cli.command {
        Commands::Limits { json } => limits::cmd_limits(&client, json).await,
        Commands::Search {
            query,
            lang,
            region,
            filter,
            sort,
            order,
            group,
            docs,
            snippets,
            limit,
            page,
            captcha,
            json,
        } => {
            let query = SearchQuery {
                query: query.join(" "),
                lang,
                region,
                filter,
                sort,
                order,
                group,
                docs,
                snippets,
                limit,
                page,
                show_captcha: captcha.then_some(true),
            };
            search::cmd_search(&client, &query, json).await
        }
    }
}
