pub mod retry;

use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::common::{
    Config, DEFAULT_CONNECT_RETRIES, DEFAULT_MAX_WINDOW_SIZE, DEFAULT_TIMEOUT_SECS,
};

pub const ENV_PREFIX: &str = "LOGRECON";

/// Values supplied on the command line. They take precedence over the file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub chain_1: Option<String>,
    pub chain_2: Option<String>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub address: Option<String>,
    pub topics: Option<Vec<String>>,
    pub ignore_order: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub max_window_size: Option<u64>,
    pub report_path: Option<PathBuf>,
}

pub fn load_config(file_name: Option<&Path>, overrides: ConfigOverrides) -> Result<Config> {
    let mut builder = config::Config::builder()
        .set_default("to_block", 0u64)?
        .set_default("ignore_order", true)?
        .set_default("timeout_secs", DEFAULT_TIMEOUT_SECS)?
        .set_default("max_window_size", DEFAULT_MAX_WINDOW_SIZE)?
        .set_default("connect_retries", u64::from(DEFAULT_CONNECT_RETRIES))?;

    if let Some(path) = file_name {
        info!("Config path: {}", path.to_string_lossy());
        builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
    }

    // e.g. LOGRECON_CHAIN_1, LOGRECON_METRICS__ENABLED
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let builder = builder
        .set_override_option("chain_1", overrides.chain_1)?
        .set_override_option("chain_2", overrides.chain_2)?
        .set_override_option("from_block", overrides.from_block)?
        .set_override_option("to_block", overrides.to_block)?
        .set_override_option("address", overrides.address)?
        .set_override_option("topics", overrides.topics)?
        .set_override_option("ignore_order", overrides.ignore_order)?
        .set_override_option("timeout_secs", overrides.timeout_secs)?
        .set_override_option("max_window_size", overrides.max_window_size)?
        .set_override_option(
            "report_path",
            overrides
                .report_path
                .map(|path| path.to_string_lossy().into_owned()),
        )?;

    let config: Config = builder
        .build()
        .context("failed to read config")?
        .try_deserialize()
        .context("failed to parse config")?;

    Ok(config)
}

pub fn strip_html(error: &str) -> String {
    // If the error contains HTML tags, extract just the text content
    if error.contains("<!doctype html>") || error.contains("<html>") {
        // Remove all HTML tags and return the first non-empty line of text
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && !line.starts_with("<!")
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        // Return original error if no HTML
        error.to_string()
    }
}
