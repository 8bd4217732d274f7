use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use alloy_network::AnyNetwork;
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use tracing::{info, warn};
use url::Url;

use crate::metrics::Metrics;
use crate::models::common::{Side, Window};
use crate::models::errors::{ReconcileError, SourceError};
use crate::models::filter::LogFilter;
use crate::models::logs::LogEvent;
use crate::utils::retry::{RetryConfig, retry};

/// One endpoint whose log history takes part in a reconciliation.
pub trait LogSource: Send + Sync {
    fn label(&self) -> &str;

    fn latest_block(&self) -> impl Future<Output = Result<u64, SourceError>> + Send;

    /// Logs in `window` matching `filter`, in the order the source returns them.
    fn logs(
        &self,
        filter: &LogFilter,
        window: Window,
    ) -> impl Future<Output = Result<Vec<LogEvent>, SourceError>> + Send;
}

/// A [`LogSource`] backed by a JSON-RPC provider.
pub struct RpcLogSource<P> {
    label: String,
    provider: P,
    metrics: Option<Arc<Metrics>>,
}

impl<P> RpcLogSource<P>
where
    P: Provider<AnyNetwork>,
{
    pub fn new(label: impl Into<String>, provider: P, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            label: label.into(),
            provider,
            metrics,
        }
    }

    pub async fn chain_id(&self) -> Result<u64, SourceError> {
        let start = Instant::now();
        let result = self.provider.get_chain_id().await;
        self.record("eth_chainId", start, result.is_err());
        Ok(result?)
    }

    fn record(&self, method: &'static str, start: Instant, is_err: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rpc(&self.label, method, start.elapsed(), is_err);
        }
    }
}

impl<P> LogSource for RpcLogSource<P>
where
    P: Provider<AnyNetwork>,
{
    fn label(&self) -> &str {
        &self.label
    }

    async fn latest_block(&self) -> Result<u64, SourceError> {
        let start = Instant::now();
        let result = self.provider.get_block_number().await;
        self.record("eth_blockNumber", start, result.is_err());

        result.map_err(|e| {
            warn!("Failed to get latest block number from {}. Error details:\n{:#?}", self.label, e);
            SourceError::from(e)
        })
    }

    async fn logs(&self, filter: &LogFilter, window: Window) -> Result<Vec<LogEvent>, SourceError> {
        let start = Instant::now();
        let result = self.provider.get_logs(&filter.for_window(window)).await;
        self.record("eth_getLogs", start, result.is_err());

        let logs = result.map_err(|e| {
            warn!("Failed to get logs for [{}] from {}. Error details:\n{:#?}", window, self.label, e);
            SourceError::from(e)
        })?;

        logs.into_iter().map(LogEvent::try_from).collect()
    }
}

/// Dials `endpoint` and probes it with `eth_chainId`, retrying the probe with backoff.
pub async fn connect(
    side: Side,
    endpoint: &str,
    metrics: Option<Arc<Metrics>>,
    retry_config: &RetryConfig,
) -> Result<(RpcLogSource<DynProvider<AnyNetwork>>, u64), ReconcileError> {
    let url: Url = endpoint.parse().map_err(|_| ReconcileError::InvalidEndpoint {
        side,
        endpoint: endpoint.to_string(),
    })?;
    info!("{} RPC URL: {}", side, url);

    let provider = ProviderBuilder::new()
        .network::<AnyNetwork>()
        .connect(url.as_str())
        .await
        .map_err(|e| ReconcileError::Connection {
            side,
            cause: SourceError::from(e),
        })?
        .erased();

    let source = RpcLogSource::new(side.label(), provider, metrics);
    let chain_id = retry(|| source.chain_id(), retry_config, &format!("{side} eth_chainId"))
        .await
        .map_err(|cause| ReconcileError::Connection { side, cause })?;
    info!("{} chain ID: {}", side, chain_id);

    Ok((source, chain_id))
}

/// Issues the same query against both sources concurrently.
pub struct DualSourceFetcher<A, B> {
    first: A,
    second: B,
}

impl<A, B> DualSourceFetcher<A, B>
where
    A: LogSource,
    B: LogSource,
{
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    pub fn labels(&self) -> [&str; 2] {
        [self.first.label(), self.second.label()]
    }

    pub async fn latest_blocks(&self) -> Result<(u64, u64), ReconcileError> {
        let first = async {
            self.first
                .latest_block()
                .await
                .map_err(|cause| ReconcileError::Connection {
                    side: Side::First,
                    cause,
                })
        };
        let second = async {
            self.second
                .latest_block()
                .await
                .map_err(|cause| ReconcileError::Connection {
                    side: Side::Second,
                    cause,
                })
        };
        tokio::try_join!(first, second)
    }

    pub async fn fetch(
        &self,
        filter: &LogFilter,
        window: Window,
    ) -> Result<(Vec<LogEvent>, Vec<LogEvent>), ReconcileError> {
        let first = async {
            self.first
                .logs(filter, window)
                .await
                .map_err(|cause| ReconcileError::Fetch {
                    side: Side::First,
                    window,
                    cause,
                })
        };
        let second = async {
            self.second
                .logs(filter, window)
                .await
                .map_err(|cause| ReconcileError::Fetch {
                    side: Side::Second,
                    window,
                    cause,
                })
        };
        tokio::try_join!(first, second)
    }
}
