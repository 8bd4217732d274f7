use alloy_primitives::hex;

use crate::models::logs::LogEvent;

const FIELD_SEPARATOR: char = '|';
const TOPIC_SEPARATOR: char = ',';

/// Encodes every field of a log into a single comparable key.
///
/// Hashes are fixed-width 0x-prefixed hex, the address is EIP-55 checksummed and the payload is
/// bare hex, so no field can contain either separator.
pub fn canonical_key(log: &LogEvent) -> String {
    let topics = log
        .topics
        .iter()
        .map(hex::encode_prefixed)
        .collect::<Vec<_>>()
        .join(&TOPIC_SEPARATOR.to_string());

    [
        log.block_number.to_string(),
        hex::encode_prefixed(log.block_hash),
        log.tx_index.to_string(),
        hex::encode_prefixed(log.tx_hash),
        log.log_index.to_string(),
        log.address.to_checksum(None),
        hex::encode(&log.data),
        topics,
    ]
    .join(&FIELD_SEPARATOR.to_string())
}

pub fn canonical_keys(logs: &[LogEvent]) -> Vec<String> {
    logs.iter().map(canonical_key).collect()
}
