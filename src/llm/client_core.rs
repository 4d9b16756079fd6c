use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::Duration;

use crate::config::LlmConfig;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    pub base_url: String,
    pub api_key: String,
    pub(crate) inner: reqwest::Client,
    // Image responses arrive in one piece after generation; no read-idle timeout here
    pub(crate) images_inner: reqwest::Client,
    pub llm_cfg: LlmConfig,
    pub image_model: String,
}

impl OpenAIClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .build()
            .context("build http client")?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            images_inner: inner.clone(),
            inner,
            llm_cfg: LlmConfig::default(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
        })
    }

    pub fn with_llm_config(mut self, cfg: LlmConfig) -> Result<Self> {
        // No total request timeout: chat streams stay open as long as tokens keep arriving.
        self.inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .read_timeout(Duration::from_millis(cfg.read_idle_timeout_ms))
            .build()
            .context("build http client")?;
        self.images_inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .build()
            .context("build image http client")?;
        self.llm_cfg = cfg;
        Ok(self)
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    fn api_base(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        base.strip_suffix("/v1")
            .unwrap_or(base)
            .trim_end_matches('/')
            .to_string()
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.api_base())
    }

    pub(crate) fn images_endpoint(&self) -> String {
        format!("{}/v1/images/generations", self.api_base())
    }

    pub(crate) fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .context("api key is not a valid header value")?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }
}
