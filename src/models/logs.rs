use alloy_primitives::{Address, B256, Bytes};
use alloy_rpc_types_eth::Log;
use serde::Serialize;

use crate::models::errors::SourceError;

/// A single mined log, as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub block_number: u64,
    pub block_hash: B256,
    pub tx_index: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub address: Address,
    pub data: Bytes,
    pub topics: Vec<B256>,
}

impl TryFrom<Log> for LogEvent {
    type Error = SourceError;

    // Pending logs carry no block or transaction position and cannot be compared
    fn try_from(log: Log) -> Result<Self, Self::Error> {
        Ok(Self {
            block_number: log
                .block_number
                .ok_or(SourceError::MissingField { field: "block_number" })?,
            block_hash: log
                .block_hash
                .ok_or(SourceError::MissingField { field: "block_hash" })?,
            tx_index: log
                .transaction_index
                .ok_or(SourceError::MissingField { field: "transaction_index" })?,
            tx_hash: log
                .transaction_hash
                .ok_or(SourceError::MissingField { field: "transaction_hash" })?,
            log_index: log
                .log_index
                .ok_or(SourceError::MissingField { field: "log_index" })?,
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data,
        })
    }
}
