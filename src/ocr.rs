use crate::ollama::VisionBackend;
use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use image::{ImageFormat, RgbImage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub const NO_TEXT_PLACEHOLDER: &str = "No text detected. Try capturing a clearer region.";

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([^_]+)_").unwrap());

/// Removes the markdown the model likes to add. One pass per pattern, in a
/// fixed order; nested markers come out however that order leaves them.
pub fn strip_markdown(text: &str) -> String {
    let text = HEADING.replace_all(text, "");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC_STAR.replace_all(&text, "$1");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "$1");
    text.into_owned()
}

/// Joins cleaned texts; labels each block only for a multi-image batch.
pub fn assemble(texts: &[String], multi_mode: bool) -> String {
    let labeled = multi_mode && texts.len() > 1;
    let blocks: Vec<String> = texts
        .iter()
        .enumerate()
        .map(|(idx, text)| {
            if labeled {
                format!("--- Screenshot {} ---\n{}\n", idx + 1, text)
            } else {
                text.clone()
            }
        })
        .collect();
    let combined = blocks.join("\n");
    if combined.trim().is_empty() {
        NO_TEXT_PLACEHOLDER.to_string()
    } else {
        combined
    }
}

pub fn error_message(err: &anyhow::Error, model: &str) -> String {
    format!(
        "OCR Error: {:#}\n\nPlease ensure:\n1. Ollama is running\n2. Model '{}' is installed",
        err, model
    )
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .context("PNG encoding failed")?;
    Ok(buf.into_inner())
}

/// Everything a worker needs, copied out of the app state at dispatch time.
#[derive(Clone)]
pub struct OcrJob {
    pub images: Vec<RgbImage>,
    pub model: String,
    pub prompt: String,
    pub multi_mode: bool,
}

impl OcrJob {
    /// Stops at the first failing image.
    pub fn run(&self, backend: &dyn VisionBackend) -> Result<String> {
        let mut texts = Vec::with_capacity(self.images.len());
        for (idx, image) in self.images.iter().enumerate() {
            let png = encode_png(image)?;
            let raw = backend
                .generate(&self.model, &self.prompt, &png)
                .with_context(|| format!("screenshot {}", idx + 1))?;
            texts.push(strip_markdown(&raw));
        }
        Ok(assemble(&texts, self.multi_mode))
    }

    /// The text shown to the user: the result, or a formatted error.
    pub fn run_to_text(&self, backend: &dyn VisionBackend) -> String {
        match self.run(backend) {
            Ok(text) => {
                log::info!("OCR finished: {} image(s), {} chars", self.images.len(), text.len());
                text
            }
            Err(e) => {
                log::error!("OCR failed: {:#}", e);
                error_message(&e, &self.model)
            }
        }
    }
}

/// Runs `job` on its own thread and sends exactly one message built by `wrap`.
pub fn spawn_worker<M: Send + 'static>(
    job: OcrJob,
    backend: Arc<dyn VisionBackend>,
    tx: Sender<M>,
    wrap: fn(String) -> M,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("ocr-worker".into())
        .spawn(move || {
            let text = job.run_to_text(backend.as_ref());
            if tx.send(wrap(text)).is_err() {
                log::warn!("OCR result dropped: UI loop is gone");
            }
        })
        .context("failed to spawn OCR worker")?;
    Ok(handle)
}
