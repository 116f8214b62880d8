//! Local Ollama server as the vision model backend.

use anyhow::{bail, Context, Result};
use base64::Engine;
use once_cell::sync::Lazy;
use std::time::Duration;

const LIST_TIMEOUT: Duration = Duration::from_secs(3);

/// Generation has no overall timeout: vision models on CPU can take minutes.
static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

static RUNTIME: Lazy<Option<tokio::runtime::Runtime>> = Lazy::new(|| {
    match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
    {
        Ok(rt) => Some(rt),
        Err(e) => {
            log::error!("tokio runtime failed to start: {}", e);
            None
        }
    }
});

/// Something that turns an image plus an instruction into text.
///
/// Calls block the calling thread; the UI only invokes them from workers.
pub trait VisionBackend: Send + Sync {
    fn list_models(&self) -> Result<Vec<String>>;
    fn generate(&self, model: &str, prompt: &str, image_png: &[u8]) -> Result<String>;
}

#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(serde::Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(serde::Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    error: String,
}

/// Port Ollama listens on when the address names none and has no scheme.
const DEFAULT_PORT: &str = "11434";

/// Turns an `OLLAMA_HOST`-style address into a base URL.
///
/// Accepts what the Ollama CLI accepts: `127.0.0.1:11434`, `0.0.0.0`,
/// `:11434`, `localhost`, or a full `http(s)://` URL. A wildcard bind address
/// is reached through loopback.
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');
    let (scheme, rest, default_port) = match raw.split_once("://") {
        Some((scheme, rest)) => (scheme, rest, None),
        None => ("http", raw, Some(DEFAULT_PORT)),
    };
    let (authority, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) if !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) => (h, Some(p)),
        _ => (authority, None),
    };
    let host = match host {
        "" | "0.0.0.0" => "127.0.0.1",
        "[::]" => "[::1]",
        h => h,
    };
    match port.or(default_port) {
        Some(port) => format!("{}://{}:{}{}", scheme, host, port, path),
        None => format!("{}://{}{}", scheme, host, path),
    }
}

pub struct OllamaBackend {
    host: String,
}

impl OllamaBackend {
    pub fn new(host: &str) -> Self {
        Self { host: normalize_host(host) }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), path)
    }

    fn block_on<F: std::future::Future<Output = Result<T>>, T>(&self, fut: F) -> Result<T> {
        match RUNTIME.as_ref() {
            Some(rt) => rt.block_on(fut),
            None => bail!("async runtime unavailable"),
        }
    }

    async fn list_models_async(&self) -> Result<Vec<String>> {
        let resp = CLIENT
            .get(self.url("/api/tags"))
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("Ollama not reachable at {}", self.host))?;
        if !resp.status().is_success() {
            bail!("Ollama error {}", resp.status());
        }
        let tags: TagsResponse = resp.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate_async(&self, model: &str, prompt: &str, image_png: &[u8]) -> Result<String> {
        let req = GenerateRequest {
            model,
            prompt,
            images: vec![base64::engine::general_purpose::STANDARD.encode(image_png)],
            stream: false,
        };
        let resp = CLIENT
            .post(self.url("/api/generate"))
            .json(&req)
            .send()
            .await
            .with_context(|| format!("Ollama request failed (is Ollama running at {}?)", self.host))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let msg = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            bail!("Ollama error {}: {}", status, msg);
        }
        let parsed: GenerateResponse = resp.json().await?;
        Ok(parsed.response)
    }
}

impl VisionBackend for OllamaBackend {
    fn list_models(&self) -> Result<Vec<String>> {
        self.block_on(self.list_models_async())
    }

    fn generate(&self, model: &str, prompt: &str, image_png: &[u8]) -> Result<String> {
        log::info!("Generating with {} ({} byte image)", model, image_png.len());
        self.block_on(self.generate_async(model, prompt, image_png))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendStatus {
    Ready,
    ModelMissing(String),
    Unreachable,
}

impl BackendStatus {
    pub fn message(&self) -> String {
        match self {
            BackendStatus::Ready => "Ready".to_string(),
            BackendStatus::ModelMissing(m) => {
                format!("⚠ Model '{}' not found. Run: ollama pull {}", m, m)
            }
            BackendStatus::Unreachable => "⚠ Ollama not running. Please start Ollama.".to_string(),
        }
    }
}

/// Startup readiness check. A listed name containing the configured one counts as
/// present, so `minicpm-v` matches `minicpm-v:latest`.
pub fn check_readiness(backend: &dyn VisionBackend, model: &str) -> BackendStatus {
    match backend.list_models() {
        Ok(models) => {
            if models.iter().any(|name| name.contains(model)) {
                BackendStatus::Ready
            } else {
                BackendStatus::ModelMissing(model.to_string())
            }
        }
        Err(e) => {
            log::warn!("Readiness check failed: {:#}", e);
            BackendStatus::Unreachable
        }
    }
}
