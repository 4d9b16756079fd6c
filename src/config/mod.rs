use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::llm::{DEFAULT_CHAT_MODEL, DEFAULT_IMAGE_MODEL};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. You can generate images with DALL-E 3 and analyze images that the user sends you.";
pub const CONFIG_ENV: &str = "CHAT_RELAY_CONFIG";

pub fn default_allowed_origins() -> Vec<String> {
    [
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: SocketAddr,
    pub base_url: String,
    pub model: String,
    pub image_model: String,
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub allowed_origins: Vec<String>,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub connect_timeout_ms: u64,
    // Max silence between two reads of a streamed response
    pub read_idle_timeout_ms: u64,
    pub image_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            read_idle_timeout_ms: 60_000,
            image_timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub listen: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub image_model: Option<String>,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    pub allowed_origins: Option<Vec<String>>,
    pub llm: Option<PartialLlmConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialLlmConfig {
    pub connect_timeout_ms: Option<u64>,
    pub read_idle_timeout_ms: Option<u64>,
    pub image_timeout_ms: Option<u64>,
}

/// Values picked up from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub listen: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub image_model: Option<String>,
    pub api_key: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        Self {
            listen: var("CHAT_RELAY_LISTEN"),
            base_url: var("OPENAI_BASE_URL"),
            model: var("OPENAI_MODEL"),
            image_model: var("OPENAI_IMAGE_MODEL"),
            api_key: var("OPENAI_API_KEY"),
        }
    }
}

impl AppConfig {
    pub fn from_cli(cli: &crate::Cli) -> Result<Self> {
        let file_cfg = match &cli.config {
            Some(path) => load_config_from(path)?,
            None => load_file_config().unwrap_or_default(),
        };
        Self::merge(cli, EnvConfig::from_env(), file_cfg)
    }

    /// Priority: CLI args -> environment -> config file -> defaults.
    pub fn merge(cli: &crate::Cli, env: EnvConfig, file_cfg: FileConfig) -> Result<Self> {
        let listen_raw = cli
            .listen
            .clone()
            .or(env.listen)
            .or(file_cfg.listen)
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen: SocketAddr = listen_raw
            .parse()
            .with_context(|| format!("invalid listen address: {listen_raw}"))?;

        let base_url = cli
            .base_url
            .clone()
            .or(env.base_url)
            .or(file_cfg.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = cli
            .model
            .clone()
            .or(env.model)
            .or(file_cfg.model)
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let image_model = cli
            .image_model
            .clone()
            .or(env.image_model)
            .or(file_cfg.image_model)
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());
        let api_key = cli.api_key.clone().or(env.api_key).or(file_cfg.api_key);

        let llm_defaults = LlmConfig::default();
        let llm = match file_cfg.llm {
            Some(p) => LlmConfig {
                connect_timeout_ms: p
                    .connect_timeout_ms
                    .unwrap_or(llm_defaults.connect_timeout_ms),
                read_idle_timeout_ms: p
                    .read_idle_timeout_ms
                    .unwrap_or(llm_defaults.read_idle_timeout_ms),
                image_timeout_ms: p.image_timeout_ms.unwrap_or(llm_defaults.image_timeout_ms),
            },
            None => llm_defaults,
        };

        Ok(Self {
            listen,
            base_url,
            model,
            image_model,
            api_key,
            system_prompt: file_cfg
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            allowed_origins: file_cfg
                .allowed_origins
                .unwrap_or_else(default_allowed_origins),
            llm,
        })
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("OPENAI_API_KEY not set; pass --api-key or set it in the environment")
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut v = Vec::new();
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        v.push(PathBuf::from(p));
    }
    if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
        v.push(Path::new(&xdg_home).join("chat-relay/config.toml"));
    } else if let Some(dir) = dirs::config_dir() {
        v.push(dir.join("chat-relay/config.toml"));
    }
    v
}

pub fn load_file_config() -> Result<FileConfig> {
    for p in candidate_paths() {
        if !p.exists() {
            continue;
        }
        let s = fs::read_to_string(&p)
            .with_context(|| format!("read config file: {}", p.display()))?;
        match toml::from_str::<FileConfig>(&s) {
            Ok(cfg) => {
                info!(path=%p.display(), "loaded config file");
                return Ok(cfg);
            }
            Err(e) => {
                warn!(path=%p.display(), error=%e.to_string(), "parse config failed");
                continue;
            }
        }
    }
    Ok(FileConfig::default())
}

/// Load an explicitly requested config file. Unlike the search path, a missing file is an error.
pub fn load_config_from(path: &Path) -> Result<FileConfig> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    let cfg = toml::from_str::<FileConfig>(&s)
        .with_context(|| format!("parse config file: {}", path.display()))?;
    info!(path=%path.display(), "loaded config file");
    Ok(cfg)
}
