use alloy::primitives::{Address, LogData};
use alloy::sol_types::SolEvent;
use thiserror::Error;
use tracing::debug;

use crate::events::abi;
use crate::events::{Catalog, DecodedEvent, EventKind, RawLog};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed {event} log: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: alloy::sol_types::Error,
    },
    #[error("malformed {event} log: expected {expected} topics, found {found}")]
    TopicCount {
        event: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Maps raw logs of one contract onto [`DecodedEvent`]s.
#[derive(Debug)]
pub struct EventDecoder {
    catalog: Catalog,
    contract: Address,
}

impl EventDecoder {
    pub fn new(catalog: Catalog, contract: Address) -> Self {
        Self { catalog, contract }
    }

    /// Returns `Ok(None)` for logs that are not ours to decode: foreign
    /// emitters, unknown selectors, anonymous logs and retracted logs.
    pub fn decode(&self, log: &RawLog) -> Result<Option<DecodedEvent>, DecodeError> {
        if log.removed {
            debug!(tx = ?log.tx_hash, "Ignoring log removed by reorg");
            return Ok(None);
        }
        if log.inner.address != self.contract {
            debug!(emitter = %log.inner.address, "Ignoring log from foreign contract");
            return Ok(None);
        }
        let data = &log.inner.data;
        let Some(selector) = data.topics().first() else {
            debug!(tx = ?log.tx_hash, "Ignoring anonymous log");
            return Ok(None);
        };
        let Some((kind, signature)) = self.catalog.lookup(selector) else {
            debug!("Unknown event signature: {:?}", selector);
            return Ok(None);
        };
        let expected = signature.topic_count();
        if data.topics().len() != expected {
            return Err(DecodeError::TopicCount {
                event: kind.name(),
                expected,
                found: data.topics().len(),
            });
        }

        let event = match kind {
            EventKind::RebaseFailed => {
                let e = decode_as::<abi::RebaseFailed>(data, kind)?;
                DecodedEvent::RebaseFailed { reason: e.reason }
            }
            EventKind::TargetPriceUpdated => {
                let e = decode_as::<abi::TargetPriceUpdated>(data, kind)?;
                DecodedEvent::TargetPriceUpdated {
                    new_target_price: e.newTargetPrice.into(),
                }
            }
            EventKind::MintExecuted => {
                let e = decode_as::<abi::MintExecuted>(data, kind)?;
                DecodedEvent::MintExecuted {
                    to: e.to,
                    amount: e.amount.into(),
                }
            }
            EventKind::BurnExecuted => {
                let e = decode_as::<abi::BurnExecuted>(data, kind)?;
                DecodedEvent::BurnExecuted {
                    from: e.from,
                    amount: e.amount.into(),
                }
            }
            EventKind::Transfer => {
                let e = decode_as::<abi::Transfer>(data, kind)?;
                DecodedEvent::Transfer {
                    from: e.from,
                    to: e.to,
                    amount: e.amount.into(),
                }
            }
        };
        Ok(Some(event))
    }
}

fn decode_as<E: SolEvent>(data: &LogData, kind: EventKind) -> Result<E, DecodeError> {
    E::decode_log_data(data, true).map_err(|source| DecodeError::Malformed {
        event: kind.name(),
        source,
    })
}
