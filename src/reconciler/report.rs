use std::fs;
use std::path::Path;

use alloy_primitives::B256;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::common::{RunSummary, Window};
use crate::reconciler::comparator::{Comparison, Divergence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    Equal,
    Mismatch,
}

/// Outcome of comparing one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowReport {
    pub window: Window,
    pub status: WindowStatus,
    pub count_first: usize,
    pub count_second: usize,
    pub digest_first: B256,
    pub digest_second: B256,
    pub divergence: Option<Divergence>,
}

impl WindowReport {
    pub fn new(window: Window, comparison: &Comparison) -> Self {
        Self {
            window,
            status: if comparison.is_equal() {
                WindowStatus::Equal
            } else {
                WindowStatus::Mismatch
            },
            count_first: comparison.first.len(),
            count_second: comparison.second.len(),
            digest_first: comparison.first.digest,
            digest_second: comparison.second.digest,
            divergence: comparison.divergence().cloned(),
        }
    }

    pub fn is_equal(&self) -> bool {
        self.status == WindowStatus::Equal
    }
}

/// Everything a concluded run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub range: Window,
    pub ignore_order: bool,
    pub summary: RunSummary,
    pub windows: Vec<WindowReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    pub fn mismatched(&self) -> impl Iterator<Item = &WindowReport> {
        self.windows.iter().filter(|report| !report.is_equal())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize run report")?;
        fs::write(path, json)
            .with_context(|| format!("failed to write run report to {}", path.display()))
    }
}
