use anyhow::Result;
use std::io;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_ENV: &str = "CHAT_RELAY_LOG";

/// Resolve the filter directive: explicit flag, then `CHAT_RELAY_LOG`, then `info`.
pub fn resolve_level(flag: Option<&str>) -> String {
    pick_level(flag, std::env::var(LOG_ENV).ok())
}

fn pick_level(flag: Option<&str>, env: Option<String>) -> String {
    let non_blank = |s: &String| !s.trim().is_empty();
    flag.map(String::from)
        .filter(non_blank)
        .or_else(|| env.filter(non_blank))
        .unwrap_or_else(|| "info".to_string())
}

pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_writer(io::stderr))
            .try_init()?;
    }
    info!(level, json, "logging initialized");
    Ok(())
}
