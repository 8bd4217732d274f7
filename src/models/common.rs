use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_WINDOW_SIZE: u64 = 300;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chain_1: String,
    pub chain_2: String,
    pub from_block: u64,
    #[serde(default)]
    pub to_block: u64, // 0 means latest on each chain
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>, // One entry per position, comma-separated OR-set
    #[serde(default = "default_ignore_order")]
    pub ignore_order: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_window_size")]
    pub max_window_size: u64,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_ignore_order() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_window_size() -> u64 {
    DEFAULT_MAX_WINDOW_SIZE
}

fn default_connect_retries() -> u32 {
    DEFAULT_CONNECT_RETRIES
}

/// Which of the two reconciled endpoints a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::First => "chain1",
            Side::Second => "chain2",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inclusive block range queried in a single provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: u64,
    pub end: u64,
}

impl Window {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, block_number: u64) -> bool {
        (self.start..=self.end).contains(&block_number)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_windows: u64,
    pub ok_windows: u64,
    pub mismatched_windows: u64,
    pub total_logs_first: u64,
    pub total_logs_second: u64,
}

impl RunSummary {
    pub fn record(&mut self, equal: bool, logs_first: usize, logs_second: usize) {
        self.total_windows += 1;
        if equal {
            self.ok_windows += 1;
        } else {
            self.mismatched_windows += 1;
        }
        self.total_logs_first += logs_first as u64;
        self.total_logs_second += logs_second as u64;
    }

    pub fn is_consistent(&self) -> bool {
        self.ok_windows + self.mismatched_windows == self.total_windows
    }

    pub fn is_success(&self) -> bool {
        self.mismatched_windows == 0
    }
}
