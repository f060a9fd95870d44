use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use multimodal_rag::{
    api, bootstrap,
    config::{self, Config, EmbeddingProvider, LlmProvider},
    console,
    extraction::{self, DocumentSource},
    export,
    logging,
    pipeline::{RagApi, RagService},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const OLLAMA_START_WAIT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(
    name = "mmrag",
    about = "Multimodal RAG over PDFs: ingest documents, then ask questions about them"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest PDF files or directories of PDFs.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer one question and exit.
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Interactive chat over the ingested documents.
    Chat,
    /// Serve the HTTP API.
    Serve,
    /// Delete every stored element and drop the summary collection.
    Reset,
    /// Extract PDFs and append their chunks to a JSON Lines file.
    ExportChunks {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long, default_value = "chunks.jsonl")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing(!matches!(cli.command, Command::Chat));
    let config = config::get_config();

    match cli.command {
        Command::ExportChunks { paths, output } => {
            let extractor = extraction::build_extractor(config)?;
            let sources = collect_sources(&paths)?;
            let written = export::export_documents(extractor.as_ref(), &sources, &output).await?;
            println!("Wrote {written} chunk record(s) to {}", output.display());
        }
        Command::Reset => {
            let service = RagService::from_config(config).await?;
            service.reset().await.context("reset failed")?;
            println!("All ingested content deleted.");
        }
        Command::Ingest { paths } => {
            check_ollama(config, true).await;
            let service = RagService::from_config(config).await?;
            let report = service.ingest(collect_sources(&paths)?).await?;
            println!("{}", console::describe_report(&report));
        }
        Command::Ask { question } => {
            check_ollama(config, false).await;
            let service = RagService::from_config(config).await?;
            println!("{}", service.ask(&question.join(" ")).await.text);
        }
        Command::Chat => {
            check_ollama(config, true).await;
            let service = RagService::from_config(config).await?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            console::run_chat(&service, stdin, tokio::io::stdout()).await?;
        }
        Command::Serve => {
            check_ollama(config, true).await;
            let service = Arc::new(RagService::from_config(config).await?);
            let app = api::create_router(service);
            let (listener, port) = bind_listener(config).await.context("Failed to bind listener")?;
            tracing::info!("Listening on http://0.0.0.0:{}", port);
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}

fn collect_sources(paths: &[PathBuf]) -> Result<Vec<DocumentSource>> {
    let mut sources = Vec::new();
    for path in paths {
        let found = extraction::collect_pdf_sources(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        sources.extend(found);
    }
    if sources.is_empty() {
        bail!("no PDF files found under {}", display_paths(paths));
    }
    Ok(sources)
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| Path::display(path).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Probe (and optionally start) Ollama when the command talks to it. Failures are logged and the
/// command continues; collaborator calls then fail with their own typed errors.
async fn check_ollama(config: &Config, summarizes: bool) {
    let needed = summarizes
        || config.llm_provider == LlmProvider::Ollama
        || config.embedding_provider == EmbeddingProvider::Ollama;
    if !needed {
        return;
    }
    if let Err(error) =
        bootstrap::ensure_ollama(&config.ollama_url, config.ollama_autostart, OLLAMA_START_WAIT)
            .await
    {
        tracing::warn!(error = %error, "Ollama runtime unavailable");
    }
}

async fn bind_listener(config: &Config) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
