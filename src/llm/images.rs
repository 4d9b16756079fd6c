use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::llm::client_core::OpenAIClient;
use crate::llm::types::{ImageRequest, ImageResponse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    #[default]
    Standard,
    Hd,
}

impl ImageQuality {
    /// Lenient parse of the model-supplied value; anything other than `hd` is `standard`.
    pub fn from_arg(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            None => ImageQuality::Standard,
            Some(v) if v == "hd" => ImageQuality::Hd,
            Some(v) if v == "standard" || v.is_empty() => ImageQuality::Standard,
            Some(other) => {
                warn!(quality=%other, "unknown image quality, using standard");
                ImageQuality::Standard
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageQuality::Standard => "standard",
            ImageQuality::Hd => "hd",
        }
    }
}

impl fmt::Display for ImageQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OpenAIClient {
    /// Request exactly one image and return its public URL.
    pub async fn generate_image(&self, prompt: &str, quality: ImageQuality) -> Result<String> {
        let url = self.images_endpoint();
        let req = ImageRequest {
            model: self.image_model.clone(),
            prompt: prompt.to_string(),
            quality: quality.as_str().to_string(),
            n: 1,
        };
        debug!(endpoint=%url, model=%req.model, %quality, "sending images.generations request");

        let resp = self
            .images_inner
            .post(url)
            .headers(self.headers()?)
            .timeout(Duration::from_millis(self.llm_cfg.image_timeout_ms))
            .json(&req)
            .send()
            .await
            .context("send image request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let e = anyhow::anyhow!("image error: {} - {}", status, text);
            let kind = crate::llm::classify_error(Some(status), &e);
            error!(status=%status.as_u16(), %kind, body=%text, "image generation failed");
            return Err(e);
        }

        let body: ImageResponse = resp.json().await.context("parse image response")?;
        let first = body
            .data
            .into_iter()
            .next()
            .context("no image returned")?;
        if let Some(revised) = &first.revised_prompt {
            debug!(revised_prompt=%revised, "provider revised image prompt");
        }
        let image_url = first.url.context("image response has no url")?;
        info!("image generated successfully");
        Ok(image_url)
    }
}
