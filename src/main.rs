use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use filings_themes::{
    api,
    app_state::{AppState, Status},
    config::{capitalize, AppConfig, RunConfig},
    llm::{CompletionProvider, EmbeddingProvider, LlmManager},
    models::{ThemeCreate, DEFAULT_CATEGORY},
    pipeline::ThemePipeline,
    qa::ThemeQa,
    theme_store::{write_markdown, ThemeStore},
    tokenizer::Tokenizer,
};

#[derive(Parser)]
#[command(name = "filings-themes", version, about = "Extrae temas de negocio de los informes de una empresa y responde preguntas sobre ellos")]
struct Cli {
    /// API key de OpenAI (por defecto OPENAI_API_KEY).
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[arg(long, global = true, default_value = "netflix")]
    company_id: String,

    /// Por defecto `{data}/trackedcompanies/{Empresa}`.
    #[arg(long, global = true)]
    input_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Por defecto `{output}/cache/{empresa}`.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ejecuta el pipeline de extracción de temas.
    Extract,
    /// Responde una pregunta sobre los temas de la empresa.
    Ask {
        #[arg(long)]
        question: String,
        /// Descarta texto, hashes e índice cacheados antes de cargar.
        #[arg(long)]
        invalidate_cache: bool,
    },
    /// Añade un tema manual.
    AddTheme {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = DEFAULT_CATEGORY)]
        category: String,
        /// Sustituye un tema existente con el mismo nombre.
        #[arg(long)]
        replace: bool,
    },
    /// Arranca la API HTTP.
    Serve,
}

fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    // Antes de arrancar el runtime: el cliente de OpenAI lee la clave del entorno.
    if let Some(key) = &cli.api_key {
        std::env::set_var("OPENAI_API_KEY", key);
    }

    let runtime = tokio::runtime::Runtime::new().context("No se pudo crear el runtime de tokio")?;
    runtime.block_on(run(cli))
}

fn run_config(cli: &Cli, cfg: &AppConfig) -> RunConfig {
    let company_id = cli.company_id.to_lowercase();
    let input_dir = cli
        .input_dir
        .clone()
        .unwrap_or_else(|| cfg.tracked_companies_dir().join(capitalize(&company_id)));
    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| cfg.default_output_dir());
    RunConfig::new(&company_id, input_dir, output_dir, cli.cache_dir.clone())
}

async fn run(cli: Cli) -> Result<()> {
    // 2. Cargar configuración
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    let run = run_config(&cli, &cfg);

    match cli.command {
        Command::Extract => {
            let llm = Arc::new(LlmManager::from_config(&cfg)?);
            let tokenizer = Arc::new(Tokenizer::cl100k()?);
            info!("Entrada: {} | Salida: {}", run.input_dir.display(), run.output_dir.display());
            let summary = ThemePipeline::new(run, tokenizer, llm).run().await?;
            println!("{summary}");
        }
        Command::Ask {
            question,
            invalidate_cache,
        } => {
            let llm = Arc::new(LlmManager::from_config(&cfg)?);
            let embedder: Arc<dyn EmbeddingProvider> = llm.clone();
            let completion: Arc<dyn CompletionProvider> = llm;
            let company = run.company_name.clone();
            let mut qa = ThemeQa::new(
                run,
                cfg.embedding_dimensions,
                Arc::new(Tokenizer::cl100k()?),
                embedder,
                completion,
            )?;
            if invalidate_cache {
                qa.invalidate_cache()?;
            }
            qa.load_documents().await?;

            let answer = qa.answer(&format!("Question about {company}: {question}")).await;
            println!("\nQuestion: {question}\n");
            println!("Answer:\n{answer}");
        }
        Command::AddTheme {
            name,
            description,
            category,
            replace,
        } => {
            let store = ThemeStore::new(&run.output_dir);
            let theme = store.add_manual(
                ThemeCreate {
                    name,
                    description,
                    category,
                    company_id: run.company_id.clone(),
                },
                replace,
            )?;
            write_markdown(
                &run.themes_markdown_file(),
                &run.company_id,
                &store.load(&run.company_id),
            )?;
            println!("Tema manual '{}' añadido para '{}'", theme.name, run.company_id);
        }
        Command::Serve => serve(cfg).await?,
    }
    Ok(())
}

async fn serve(cfg: AppConfig) -> Result<()> {
    let llm_manager = Arc::new(LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?);
    let tokenizer = Arc::new(Tokenizer::cl100k()?);

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app_state = AppState {
        config: cfg.clone(),
        llm_manager,
        tokenizer,
        status: Arc::new(Mutex::new(Status::idle("Servidor listo."))),
        qa_engine: Arc::new(tokio::sync::Mutex::new(None)),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    let app = Router::new()
        .merge(api::create_router(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::select! {
                _ = shutdown_rx => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
