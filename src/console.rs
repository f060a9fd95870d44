//! Interactive chat loop over a [`RagApi`] service.
//!
//! Every non-empty line is a question, except:
//! - `end`, `break`, `finish`, `exit`, `quit` leave the loop;
//! - `ingest <path>` ingests a PDF file or every PDF under a directory (a bare `ingest` asks for
//!   the path on the next line);
//! - `reset` clears every stored element and summary;
//! - `help` prints the command list.

use crate::extraction::collect_pdf_sources;
use crate::pipeline::{IngestReport, RagApi};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const EXIT_WORDS: [&str; 5] = ["end", "break", "finish", "exit", "quit"];

const HELP: &str = "Commands:\n  \
    <question>      ask about the ingested documents\n  \
    ingest <path>   add a PDF file or a directory of PDFs\n  \
    reset           delete all ingested content\n  \
    exit            leave (also: end, break, finish, quit)\n";

/// One-line description of an ingestion report.
pub fn describe_report(report: &IngestReport) -> String {
    let mut line = format!(
        "Ingested {} document(s): {} text, {} table, {} image summaries ({} stored, {} indexed)",
        report.documents,
        report.text_count,
        report.table_count,
        report.image_count,
        report.stored(),
        report.indexed()
    );
    for failure in &report.failed_documents {
        line.push_str(&format!("\n  skipped {}: {}", failure.source, failure.error));
    }
    for (kind, message) in report.bucket_failures() {
        line.push_str(&format!("\n  {kind} bucket not indexed: {message}"));
    }
    line
}

/// Ingest a file or directory through `service`, returning the message to show the user.
pub async fn ingest_path<S>(service: &S, path: &Path) -> String
where
    S: RagApi + ?Sized,
{
    let sources = match collect_pdf_sources(path) {
        Ok(sources) if sources.is_empty() => {
            return format!("No PDF files found under {}", path.display());
        }
        Ok(sources) => sources,
        Err(error) => return format!("Cannot read {}: {error}", path.display()),
    };
    match service.ingest(sources).await {
        Ok(report) => describe_report(&report),
        Err(error) => format!("Ingestion failed: {error}"),
    }
}

/// Run the chat loop until an exit word or end of input.
pub async fn run_chat<S, R, W>(service: &S, input: R, mut output: W) -> std::io::Result<()>
where
    S: RagApi + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output.write_all(HELP.as_bytes()).await?;

    loop {
        output.write_all(b"\nYou: ").await?;
        output.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let lowered = line.to_lowercase();
        if EXIT_WORDS.contains(&lowered.as_str()) {
            output.write_all(b"Ending chat session.\n").await?;
            break;
        }

        let reply = match lowered.as_str() {
            "help" => HELP.to_string(),
            "reset" => match service.reset().await {
                Ok(()) => "All ingested content deleted.".to_string(),
                Err(error) => format!("Reset failed: {error}"),
            },
            "ingest" => {
                output
                    .write_all(b"Enter PDF file or directory path: ")
                    .await?;
                output.flush().await?;
                match lines.next_line().await? {
                    Some(path) if !path.trim().is_empty() => {
                        ingest_path(service, Path::new(path.trim())).await
                    }
                    _ => "No path given.".to_string(),
                }
            }
            _ if lowered.starts_with("ingest ") => {
                let path = line.get("ingest ".len()..).unwrap_or_default().trim();
                ingest_path(service, Path::new(path)).await
            }
            _ => format!("Bot: {}", service.ask(line).await.text),
        };
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }
    output.flush().await
}
