use std::time::Duration;

use alloy_transport::TransportError;
use thiserror::Error;

use crate::models::common::{Side, Window};

/// Failures raised by a single log source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("RPC error: {0}")]
    Rpc(#[from] TransportError),
    #[error("Missing required field in log: {field}")]
    MissingField { field: &'static str },
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid block range: from ({from}) is greater than to ({to})")]
    InvalidRange { from: u64, to: u64 },
    #[error("Invalid window size: must be greater than 0")]
    InvalidWindowSize,
    #[error("from_block is required (must be > 0)")]
    MissingFromBlock,
    #[error("Not a topic hash: {topic}")]
    InvalidTopic { topic: String },
    #[error("Too many topic positions: got {got}, at most 4 are supported")]
    TooManyTopics { got: usize },
    #[error("Invalid contract address: {address}")]
    InvalidAddress { address: String },
    #[error("Invalid endpoint for {side}: {endpoint}")]
    InvalidEndpoint { side: Side, endpoint: String },
    #[error(
        "from-block ({from}) is greater than chain latest (chain1={latest_first} chain2={latest_second})"
    )]
    StartBeyondLatest {
        from: u64,
        latest_first: u64,
        latest_second: u64,
    },
    #[error("{side} connection failed: {cause}")]
    Connection {
        side: Side,
        #[source]
        cause: SourceError,
    },
    #[error("{side} FilterLogs [{window}]: {cause}")]
    Fetch {
        side: Side,
        window: Window,
        #[source]
        cause: SourceError,
    },
    #[error("Run timed out after {0:?}")]
    Timeout(Duration),
}

impl ReconcileError {
    /// True for errors caused by caller input, raised before any source is queried.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. }
                | Self::InvalidWindowSize
                | Self::MissingFromBlock
                | Self::InvalidTopic { .. }
                | Self::TooManyTopics { .. }
                | Self::InvalidAddress { .. }
                | Self::InvalidEndpoint { .. }
        )
    }
}
