use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loqa_speech::catalog::{FileCatalogSource, LanguageResourceCatalog, LanguageResourceScope};
use loqa_speech::http::{create_router, AppState, NatsEngineFactory, SessionDefaults};
use loqa_speech::Config;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Loqa speech recognition service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/loqa-speech")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP control API
    Serve,

    /// Print available languages and voices as JSON
    Languages {
        /// Comma-separated scopes: speech, text, tts
        #[arg(short, long, default_value = "speech,text,tts")]
        scopes: String,

        /// Locale for display names
        #[arg(short, long)]
        accept: Option<String>,
    },
}

fn build_catalog(cfg: &Config) -> Result<Arc<LanguageResourceCatalog>> {
    let path = cfg.catalog.expanded_path()?;
    info!("Language catalog: {}", path);
    Ok(Arc::new(LanguageResourceCatalog::new(
        Arc::new(FileCatalogSource::new(path)),
        cfg.catalog.default_locale.clone(),
    )))
}

async fn serve(cfg: Config) -> Result<()> {
    let catalog = build_catalog(&cfg)?;

    info!("Connecting to NATS at {}", cfg.nats.url);
    let client = async_nats::connect(cfg.nats.url.as_str())
        .await
        .context("Failed to connect to NATS")?;

    let state = AppState::new(Arc::new(NatsEngineFactory::new(client)), catalog).with_defaults(
        SessionDefaults {
            recognition_language: cfg.recognition.language.clone(),
            output_format: cfg.recognition.output_format,
        },
    );
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}

async fn languages(cfg: Config, scopes: &str, accept: Option<&str>) -> Result<()> {
    let scopes = LanguageResourceScope::parse_list(scopes)?;
    let catalog = build_catalog(&cfg)?;

    let resource = catalog.get_language_resource(scopes, accept).await?;
    println!("{}", serde_json::to_string_pretty(&resource)?);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("loqa_speech=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loqa Speech v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Languages { scopes, accept } => languages(cfg, &scopes, accept.as_deref()).await,
    }
}
