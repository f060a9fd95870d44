//! Local model runtime check, run once before the service is wired.
//!
//! The summarizer (and, when selected, the answering model and embedder) talk to an Ollama
//! runtime. [`ensure_ollama`] probes `GET /api/tags`; when the runtime is down and autostart is
//! enabled it spawns `ollama serve` detached and polls until the probe succeeds.

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How the runtime was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OllamaStatus {
    /// Already reachable.
    Running,
    /// Started by this process and reachable.
    Started,
}

/// Runtime could not be made reachable.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Runtime is down and autostart is disabled.
    #[error("Ollama is not reachable at {url}; start it with `ollama serve` or set OLLAMA_AUTOSTART=true")]
    Unreachable {
        /// Probed base URL.
        url: String,
    },
    /// The `ollama` binary could not be launched.
    #[error("Failed to launch `ollama serve`: {0}")]
    Spawn(#[source] std::io::Error),
    /// Launched runtime did not answer in time.
    #[error("Ollama did not become reachable at {url} within {waited:?}")]
    StartTimeout {
        /// Probed base URL.
        url: String,
        /// Total wait.
        waited: Duration,
    },
    /// HTTP client construction failed.
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Whether the runtime at `base_url` answers its model listing endpoint.
pub async fn ollama_reachable(client: &reqwest::Client, base_url: &str) -> bool {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(error) => {
            tracing::debug!(url = %url, error = %error, "Ollama probe failed");
            false
        }
    }
}

/// Make sure the runtime at `base_url` is reachable, optionally starting it.
pub async fn ensure_ollama(
    base_url: &str,
    autostart: bool,
    wait: Duration,
) -> Result<OllamaStatus, BootstrapError> {
    let client = reqwest::Client::builder().build()?;
    if ollama_reachable(&client, base_url).await {
        tracing::info!(url = base_url, "Ollama is running");
        return Ok(OllamaStatus::Running);
    }
    if !autostart {
        return Err(BootstrapError::Unreachable {
            url: base_url.to_string(),
        });
    }

    tracing::warn!(url = base_url, "Ollama not running; starting `ollama serve`");
    tokio::process::Command::new("ollama")
        .arg("serve")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(BootstrapError::Spawn)?;

    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;
        if ollama_reachable(&client, base_url).await {
            tracing::info!(url = base_url, "Ollama started");
            return Ok(OllamaStatus::Started);
        }
    }
    Err(BootstrapError::StartTimeout {
        url: base_url.to_string(),
        waited: wait,
    })
}
