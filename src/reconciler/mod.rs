pub mod canonical;
pub mod comparator;
pub mod report;
pub mod sources;
pub mod windows;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::metrics::Metrics;
use crate::models::common::{Config, RunSummary, Window};
use crate::models::errors::ReconcileError;
use crate::models::filter::LogFilter;
use crate::models::logs::LogEvent;
use crate::reconciler::comparator::{Comparison, Divergence, compare};
use crate::reconciler::report::{RunReport, WindowReport};
use crate::reconciler::sources::{DualSourceFetcher, LogSource};
use crate::reconciler::windows::Windows;

/// Validated inputs of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileParams {
    pub from_block: u64,
    pub to_block: u64, // 0 means the lower of both sources' latest blocks
    pub filter: LogFilter,
    pub ignore_order: bool,
    pub max_window_size: u64,
    pub timeout: Duration,
}

impl ReconcileParams {
    pub fn from_config(config: &Config) -> Result<Self, ReconcileError> {
        if config.from_block == 0 {
            return Err(ReconcileError::MissingFromBlock);
        }
        if config.to_block != 0 && config.to_block < config.from_block {
            return Err(ReconcileError::InvalidRange {
                from: config.from_block,
                to: config.to_block,
            });
        }
        if config.max_window_size == 0 {
            return Err(ReconcileError::InvalidWindowSize);
        }

        Ok(Self {
            from_block: config.from_block,
            to_block: config.to_block,
            filter: LogFilter::new(config.address.as_deref(), &config.topics)?,
            ignore_order: config.ignore_order,
            max_window_size: config.max_window_size,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

/// One timeout budget shared by every phase of a run, from dialing the sources to the last window.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: tokio::time::Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: tokio::time::Instant::now() + budget,
            budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at
            .saturating_duration_since(tokio::time::Instant::now())
    }

    /// Runs `fut` until the deadline; expiry yields `Timeout` carrying the full budget.
    pub async fn bound<T, F>(&self, fut: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, ReconcileError>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Timeout(self.budget)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Resolving,
    Windowing,
    Fetching(Window),
    Comparing(Window),
    Concluded,
    Aborted,
}

/// State of a single run. Owned by the caller so partial progress stays visible after an abort.
#[derive(Debug, Clone)]
pub struct RunContext {
    state: RunState,
    started_at: DateTime<Utc>,
    range: Option<Window>,
    summary: RunSummary,
    windows: Vec<WindowReport>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            state: RunState::Resolving,
            started_at: Utc::now(),
            range: None,
            summary: RunSummary::default(),
            windows: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn range(&self) -> Option<Window> {
        self.range
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn windows(&self) -> &[WindowReport] {
        &self.windows
    }

    fn transition(&mut self, next: RunState) {
        debug!("Run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn record(&mut self, report: WindowReport) {
        self.summary
            .record(report.is_equal(), report.count_first, report.count_second);
        self.windows.push(report);
    }

    fn discard_partial(&mut self) {
        self.summary = RunSummary::default();
        self.windows.clear();
    }

    fn report(&self, range: Window, ignore_order: bool) -> RunReport {
        RunReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            range,
            ignore_order,
            summary: self.summary.clone(),
            windows: self.windows.clone(),
        }
    }
}

pub struct Reconciler<A, B> {
    fetcher: DualSourceFetcher<A, B>,
    params: ReconcileParams,
    metrics: Option<Arc<Metrics>>,
}

impl<A, B> Reconciler<A, B>
where
    A: LogSource,
    B: LogSource,
{
    pub fn new(first: A, second: B, params: ReconcileParams, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            fetcher: DualSourceFetcher::new(first, second),
            params,
            metrics,
        }
    }

    /// Runs to completion or until the configured timeout expires.
    pub async fn run_with_deadline(&self, ctx: &mut RunContext) -> Result<RunReport, ReconcileError> {
        self.run_before(&Deadline::after(self.params.timeout), ctx)
            .await
    }

    /// Runs against a deadline that may already be partly spent, e.g. by connecting.
    /// On expiry, windows already compared are dropped from the context.
    pub async fn run_before(
        &self,
        deadline: &Deadline,
        ctx: &mut RunContext,
    ) -> Result<RunReport, ReconcileError> {
        let outcome = deadline.bound(self.run(ctx)).await;
        if let Err(ReconcileError::Timeout(_)) = &outcome {
            ctx.transition(RunState::Aborted);
            ctx.discard_partial();
        }
        outcome
    }

    pub async fn run(&self, ctx: &mut RunContext) -> Result<RunReport, ReconcileError> {
        match self.run_windows(ctx).await {
            Ok(report) => Ok(report),
            Err(e) => {
                ctx.transition(RunState::Aborted);
                Err(e)
            }
        }
    }

    /// Effective inclusive range; the end is the lower of both latest blocks when unset.
    pub async fn resolve_range(&self) -> Result<Window, ReconcileError> {
        let from = self.params.from_block;
        let (end_first, end_second) = if self.params.to_block == 0 {
            let (latest_first, latest_second) = self.fetcher.latest_blocks().await?;
            if latest_first != latest_second {
                warn!(
                    "Chains latest blocks differ: chain1={} chain2={}; comparing up to the lower of the two",
                    latest_first, latest_second
                );
            }
            (latest_first, latest_second)
        } else {
            (self.params.to_block, self.params.to_block)
        };

        if from > end_first || from > end_second {
            return Err(ReconcileError::StartBeyondLatest {
                from,
                latest_first: end_first,
                latest_second: end_second,
            });
        }

        Ok(Window::new(from, end_first.min(end_second)))
    }

    async fn run_windows(&self, ctx: &mut RunContext) -> Result<RunReport, ReconcileError> {
        ctx.transition(RunState::Resolving);
        let range = self.resolve_range().await?;
        ctx.range = Some(range);

        ctx.transition(RunState::Windowing);
        let windows = Windows::new(range.start, range.end, self.params.max_window_size)?;
        info!(
            "Comparing logs in blocks {} across {} windows of at most {} blocks",
            range,
            windows.total(),
            self.params.max_window_size
        );

        for window in windows {
            let window_start = Instant::now();

            ctx.transition(RunState::Fetching(window));
            let (first, second) = self.fetcher.fetch(&self.params.filter, window).await?;

            ctx.transition(RunState::Comparing(window));
            if !self.params.ignore_order {
                self.check_source_order(window, &first, &second);
            }
            let comparison = compare(&first, &second, self.params.ignore_order);
            self.log_verdict(window, &comparison);

            if let Some(metrics) = &self.metrics {
                let [label_first, label_second] = self.fetcher.labels();
                metrics.record_window(
                    window.end,
                    comparison.is_equal(),
                    [(label_first, first.len()), (label_second, second.len())],
                    window_start.elapsed(),
                );
            }

            ctx.record(WindowReport::new(window, &comparison));
        }

        ctx.transition(RunState::Concluded);
        let report = ctx.report(range, self.params.ignore_order);
        let summary = &report.summary;
        info!(
            "comparelogs summary: ranges={} ok={} mismatch={} totalLogs(chain1)={} totalLogs(chain2)={}",
            summary.total_windows,
            summary.ok_windows,
            summary.mismatched_windows,
            summary.total_logs_first,
            summary.total_logs_second
        );

        Ok(report)
    }

    // Positional comparison assumes both providers return logs in chain order
    fn check_source_order(&self, window: Window, first: &[LogEvent], second: &[LogEvent]) {
        let [label_first, label_second] = self.fetcher.labels();
        for (label, logs) in [(label_first, first), (label_second, second)] {
            if !is_chain_ordered(logs) {
                warn!(
                    "[range {}] {} returned logs out of (block, logIndex) order; positional comparison may report spurious mismatches",
                    window, label
                );
            }
        }
    }

    fn log_verdict(&self, window: Window, comparison: &Comparison) {
        let [label_first, label_second] = self.fetcher.labels();

        if comparison.is_equal() {
            info!(
                "[range {}] Logs equal. count={} sha256={}",
                window,
                comparison.first.len(),
                comparison.first.digest
            );
            return;
        }

        error!(
            "[range {}] Logs differ (sha256 {}={} {}={}) count({})={} count({})={}",
            window,
            label_first,
            comparison.first.digest,
            label_second,
            comparison.second.digest,
            label_first,
            comparison.first.len(),
            label_second,
            comparison.second.len()
        );

        match comparison.divergence() {
            Some(Divergence::At {
                index,
                first,
                second,
            }) => error!(
                "[range {}] First mismatch at index {}:\n{}: {}\n{}: {}",
                window, index, label_first, first, label_second, second
            ),
            Some(Divergence::LengthDiffers { first, second }) => error!(
                "[range {}] Log count differs: {}={} {}={}",
                window, label_first, first, label_second, second
            ),
            None => {}
        }
    }
}

/// True when logs ascend by block number, then log index.
pub fn is_chain_ordered(logs: &[LogEvent]) -> bool {
    logs.windows(2).all(|pair| {
        (pair[0].block_number, pair[0].log_index) < (pair[1].block_number, pair[1].log_index)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, Bytes};

    fn config() -> Config {
        Config {
            chain_1: "http://localhost:8545".to_string(),
            chain_2: "http://localhost:9545".to_string(),
            from_block: 100,
            to_block: 0,
            address: None,
            topics: vec![],
            ignore_order: true,
            timeout_secs: 30,
            max_window_size: 300,
            connect_retries: 3,
            report_path: None,
            metrics: Default::default(),
        }
    }

    fn log_at(block_number: u64, log_index: u64) -> LogEvent {
        LogEvent {
            block_number,
            block_hash: B256::ZERO,
            tx_index: 0,
            tx_hash: B256::ZERO,
            log_index,
            address: Address::ZERO,
            data: Bytes::new(),
            topics: vec![],
        }
    }

    #[test]
    fn params_from_valid_config() {
        let params = ReconcileParams::from_config(&config()).unwrap();
        assert_eq!(params.from_block, 100);
        assert_eq!(params.to_block, 0);
        assert_eq!(params.timeout, Duration::from_secs(30));
        assert_eq!(params.filter, LogFilter::default());
    }

    #[test]
    fn params_reject_bad_input() {
        let mut zero_from = config();
        zero_from.from_block = 0;
        assert!(matches!(
            ReconcileParams::from_config(&zero_from),
            Err(ReconcileError::MissingFromBlock)
        ));

        let mut inverted = config();
        inverted.to_block = 99;
        let err = ReconcileParams::from_config(&inverted).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidRange { from: 100, to: 99 }));
        assert!(err.is_invalid_input());

        let mut zero_window = config();
        zero_window.max_window_size = 0;
        assert!(matches!(
            ReconcileParams::from_config(&zero_window),
            Err(ReconcileError::InvalidWindowSize)
        ));

        let mut bad_topic = config();
        bad_topic.topics = vec!["0xnothex".to_string()];
        assert!(matches!(
            ReconcileParams::from_config(&bad_topic),
            Err(ReconcileError::InvalidTopic { .. })
        ));
    }

    #[test]
    fn chain_order_detection() {
        assert!(is_chain_ordered(&[]));
        assert!(is_chain_ordered(&[log_at(1, 0), log_at(1, 1), log_at(2, 0)]));
        assert!(!is_chain_ordered(&[log_at(1, 1), log_at(1, 0)]));
        assert!(!is_chain_ordered(&[log_at(2, 0), log_at(1, 5)]));
    }

    #[tokio::test]
    async fn deadline_cuts_off_pending_work() {
        let deadline = Deadline::after(Duration::from_millis(20));
        let result: Result<(), _> = deadline
            .bound(std::future::pending::<Result<(), ReconcileError>>())
            .await;

        assert!(matches!(
            result,
            Err(ReconcileError::Timeout(budget)) if budget == Duration::from_millis(20)
        ));
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn deadline_passes_through_results() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let value = deadline.bound(async { Ok::<_, ReconcileError>(7) }).await;

        assert!(matches!(value, Ok(7)));
        assert!(deadline.remaining() > Duration::ZERO);
    }

    #[test]
    fn context_records_windows() {
        let mut ctx = RunContext::new();
        let comparison = compare(&[log_at(1, 0)], &[log_at(1, 0)], true);
        ctx.record(WindowReport::new(Window::new(1, 10), &comparison));

        assert_eq!(ctx.summary().total_windows, 1);
        assert_eq!(ctx.summary().ok_windows, 1);
        assert!(ctx.summary().is_consistent());

        ctx.discard_partial();
        assert_eq!(ctx.summary(), &RunSummary::default());
        assert!(ctx.windows().is_empty());
    }
}
