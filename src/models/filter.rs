use std::str::FromStr;

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, B256};
use alloy_rpc_types_eth::Filter;

use crate::models::common::Window;
use crate::models::errors::ReconcileError;
use crate::models::logs::LogEvent;

// eth_getLogs accepts at most four topic positions
pub const MAX_TOPIC_POSITIONS: usize = 4;

/// Address and topic constraints applied identically to both sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub topics: Vec<Vec<B256>>,
}

impl LogFilter {
    pub fn new(address: Option<&str>, raw_topics: &[String]) -> Result<Self, ReconcileError> {
        let address = match address.map(str::trim).filter(|a| !a.is_empty()) {
            Some(raw) => Some(Address::from_str(raw).map_err(|_| {
                ReconcileError::InvalidAddress {
                    address: raw.to_string(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            address,
            topics: parse_topics(raw_topics)?,
        })
    }

    /// Builds the `eth_getLogs` filter for one window.
    pub fn for_window(&self, window: Window) -> Filter {
        let mut filter = Filter::new()
            .from_block(BlockNumberOrTag::Number(window.start))
            .to_block(BlockNumberOrTag::Number(window.end));

        if let Some(address) = self.address {
            filter = filter.address(address);
        }

        // Empty positions stay wildcards
        for (position, values) in self.topics.iter().enumerate() {
            if !values.is_empty() {
                filter.topics[position] = values.clone().into();
            }
        }

        filter
    }

    /// Evaluates the filter locally, with the same semantics a node applies.
    pub fn matches(&self, log: &LogEvent) -> bool {
        if let Some(address) = self.address {
            if log.address != address {
                return false;
            }
        }

        self.topics
            .iter()
            .enumerate()
            .all(|(position, allowed)| {
                allowed.is_empty()
                    || log
                        .topics
                        .get(position)
                        .is_some_and(|topic| allowed.contains(topic))
            })
    }
}

/// Parses one entry per topic position; each entry is a comma-separated OR-set of hashes.
/// An empty entry leaves that position unconstrained.
pub fn parse_topics(raw: &[String]) -> Result<Vec<Vec<B256>>, ReconcileError> {
    if raw.len() > MAX_TOPIC_POSITIONS {
        return Err(ReconcileError::TooManyTopics { got: raw.len() });
    }

    raw.iter()
        .map(|position| {
            position
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(parse_topic_hash)
                .collect::<Result<Vec<_>, _>>()
        })
        .collect()
}

fn parse_topic_hash(raw: &str) -> Result<B256, ReconcileError> {
    let invalid = || ReconcileError::InvalidTopic {
        topic: raw.to_string(),
    };

    // Require 0x + 64 hex chars
    if raw.len() != 66 || !(raw.starts_with("0x") || raw.starts_with("0X")) {
        return Err(invalid());
    }
    B256::from_str(&raw[2..]).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, address, b256, hex};

    const TRANSFER: B256 =
        b256!("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");
    const APPROVAL: B256 =
        b256!("0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925");

    fn event(topics: Vec<B256>) -> LogEvent {
        LogEvent {
            block_number: 10,
            block_hash: B256::ZERO,
            tx_index: 0,
            tx_hash: B256::ZERO,
            log_index: 0,
            address: address!("0xdac17f958d2ee523a2206206994597c13d831ec7"),
            data: Bytes::new(),
            topics,
        }
    }

    #[test]
    fn parses_or_sets_and_wildcards() {
        let raw = vec![
            format!("{}, {}", hex::encode_prefixed(TRANSFER), hex::encode_prefixed(APPROVAL)),
            String::new(),
            hex::encode_prefixed(B256::repeat_byte(0xab)),
        ];

        let topics = parse_topics(&raw).unwrap();

        assert_eq!(topics.len(), 3);
        assert_eq!(topics[0], vec![TRANSFER, APPROVAL]);
        assert!(topics[1].is_empty());
        assert_eq!(topics[2], vec![B256::repeat_byte(0xab)]);
    }

    #[test]
    fn rejects_malformed_topic() {
        let short = vec!["0xddf252ad".to_string()];
        assert!(matches!(
            parse_topics(&short),
            Err(ReconcileError::InvalidTopic { .. })
        ));

        let unprefixed = vec![hex::encode(TRANSFER) + "00"];
        assert!(matches!(
            parse_topics(&unprefixed),
            Err(ReconcileError::InvalidTopic { .. })
        ));

        let not_hex = vec![format!("0x{}", "zz".repeat(32))];
        assert!(matches!(
            parse_topics(&not_hex),
            Err(ReconcileError::InvalidTopic { .. })
        ));
    }

    #[test]
    fn rejects_more_than_four_positions() {
        let raw = vec![String::new(); 5];
        assert!(matches!(
            parse_topics(&raw),
            Err(ReconcileError::TooManyTopics { got: 5 })
        ));
    }

    #[test]
    fn rejects_malformed_address() {
        let err = LogFilter::new(Some("0x1234"), &[]).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidAddress { .. }));

        let blank = LogFilter::new(Some("  "), &[]).unwrap();
        assert_eq!(blank.address, None);
    }

    #[test]
    fn builds_rpc_filter_for_window() {
        let filter = LogFilter::new(
            Some("0xdac17f958d2ee523a2206206994597c13d831ec7"),
            &[String::new(), hex::encode_prefixed(TRANSFER)],
        )
        .unwrap();

        let rpc = filter.for_window(Window::new(100, 399));

        assert_eq!(rpc.get_from_block(), Some(100));
        assert_eq!(rpc.get_to_block(), Some(399));
        assert!(rpc.topics[0].is_empty());
        assert!(rpc.topics[1].matches(&TRANSFER));
        assert!(!rpc.topics[1].matches(&APPROVAL));
    }

    #[test]
    fn matches_address_and_positions() {
        let filter = LogFilter::new(None, &[format!("{},{}", hex::encode_prefixed(TRANSFER), hex::encode_prefixed(APPROVAL))]).unwrap();

        assert!(filter.matches(&event(vec![TRANSFER])));
        assert!(filter.matches(&event(vec![APPROVAL, B256::ZERO])));
        assert!(!filter.matches(&event(vec![B256::ZERO])));
        assert!(!filter.matches(&event(vec![])));

        let by_address =
            LogFilter::new(Some("0x0000000000000000000000000000000000000001"), &[]).unwrap();
        assert!(!by_address.matches(&event(vec![TRANSFER])));
        assert!(LogFilter::default().matches(&event(vec![])));
    }
}
