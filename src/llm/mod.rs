mod client_core;
pub mod images;
pub mod stream;
pub mod tool_def;
pub mod types;

use reqwest::StatusCode;

pub use client_core::*;
pub use images::ImageQuality;
pub use stream::{ChatEventStream, StreamEvent};
pub use tool_def::*;
pub use types::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmErrorKind {
    RateLimited,
    Server,
    Network,
    Timeout,
    Client,
    Deserialize,
    Unknown,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LlmErrorKind::RateLimited => "rate limited",
            LlmErrorKind::Server => "server error",
            LlmErrorKind::Network => "network error",
            LlmErrorKind::Timeout => "timeout",
            LlmErrorKind::Client => "client error",
            LlmErrorKind::Deserialize => "deserialize error",
            LlmErrorKind::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

pub fn classify_error(status: Option<StatusCode>, err: &anyhow::Error) -> LlmErrorKind {
    if let Some(st) = status {
        if st == StatusCode::TOO_MANY_REQUESTS {
            return LlmErrorKind::RateLimited;
        }
        if st.is_server_error() {
            return LlmErrorKind::Server;
        }
        if st.is_client_error() {
            return LlmErrorKind::Client;
        }
    }
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if e.is_timeout() {
                return LlmErrorKind::Timeout;
            }
            if e.is_decode() {
                return LlmErrorKind::Deserialize;
            }
            if e.is_connect() || e.is_body() || e.is_request() {
                return LlmErrorKind::Network;
            }
        }
        if cause.is::<serde_json::Error>() {
            return LlmErrorKind::Deserialize;
        }
    }
    LlmErrorKind::Unknown
}
