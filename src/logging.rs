//! Inicialização do `tracing`.
//!
//! `RUST_LOG` tem precedência sobre o nível configurado. Os logs vão para
//! stderr para que a saída JSON dos comandos continue limpa em stdout.

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_FORMATS: &[&str] = &["pretty", "json"];

pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("failed to initialise json logging")?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()
            .context("failed to initialise pretty logging")?,
        other => bail!("unsupported log format: {other}"),
    }

    Ok(())
}
