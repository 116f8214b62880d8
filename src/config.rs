use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_WINDOW_SIZE: (f32, f32) = (600.0, 700.0);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub ui: UiConfig,
    pub ocr: OcrConfig,
    /// Environment values for this run only; never written back.
    #[serde(skip)]
    pub overrides: EnvOverrides,
}

/// `PCOR_MODEL` and `OLLAMA_HOST`, when set and non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub model: Option<String>,
    pub ollama_host: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            model: get("PCOR_MODEL"),
            ollama_host: get("OLLAMA_HOST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub alternatives: Vec<String>,
    pub ollama_host: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Stored as `"<W>x<H>"`.
    pub window_size: String,
    pub start_minimized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "minicpm-v:2b".to_string(),
            alternatives: vec!["minicpm-v:8b".to_string()],
            ollama_host: "http://localhost:11434".to_string(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_size: format_window_size(DEFAULT_WINDOW_SIZE.0, DEFAULT_WINDOW_SIZE.1),
            start_minimized: false,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            prompt: "Extract all text from this image. Preserve the original layout and formatting. Return only the extracted text, line by line.".to_string(),
        }
    }
}

impl Config {
    pub fn path() -> PathBuf {
        let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
        let dir = exe.parent().unwrap_or(Path::new("."));
        dir.join("config.json")
    }

    pub fn load() -> Self {
        let mut cfg = Self::load_from(&Self::path());
        cfg.overrides = EnvOverrides::from_env();
        if cfg.model.name.trim().is_empty() {
            cfg.model.name = ModelConfig::default().name;
        }
        cfg
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(e) => {
                    log::warn!("Config at {} unparsable, using defaults: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No config at {} ({}), using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Model used for OCR: `PCOR_MODEL` if set, else the configured one.
    pub fn active_model(&self) -> &str {
        self.overrides.model.as_deref().unwrap_or(&self.model.name)
    }

    pub fn active_host(&self) -> &str {
        self.overrides.ollama_host.as_deref().unwrap_or(&self.model.ollama_host)
    }

    /// Makes `name` the configured model. An environment override stops
    /// applying once the user picks a model by hand.
    pub fn set_model(&mut self, name: &str) {
        self.overrides.model = None;
        let previous = std::mem::replace(&mut self.model.name, name.to_string());
        self.model.alternatives.retain(|m| m != name);
        if !previous.is_empty() && !self.model.alternatives.contains(&previous) {
            self.model.alternatives.insert(0, previous);
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let s = serde_json::to_string_pretty(self)?;
        fs::write(path, s).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Selector entries: the active model first, then alternatives, no duplicates.
    pub fn model_choices(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(1 + self.model.alternatives.len());
        let names = [self.active_model(), self.model.name.as_str()]
            .into_iter()
            .chain(self.model.alternatives.iter().map(String::as_str));
        for name in names {
            if !name.is_empty() && !out.iter().any(|m| m == name) {
                out.push(name.to_string());
            }
        }
        out
    }

    pub fn set_window_size(&mut self, width: f32, height: f32) {
        self.ui.window_size = format_window_size(width, height);
    }

    pub fn window_size(&self) -> (f32, f32) {
        parse_window_size(&self.ui.window_size).unwrap_or(DEFAULT_WINDOW_SIZE)
    }
}

fn format_window_size(width: f32, height: f32) -> String {
    format!("{}x{}", width.round() as i64, height.round() as i64)
}

pub fn parse_window_size(s: &str) -> Option<(f32, f32)> {
    let (w, h) = s.trim().split_once(['x', 'X'])?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w as f32, h as f32))
}
