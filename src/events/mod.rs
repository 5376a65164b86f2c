mod amount;
mod catalog;

use alloy::primitives::{Address, B256};

pub use amount::TokenAmount;
pub use catalog::{Catalog, EventKind};

/// Typed bindings for the monitored contract's events.
pub mod abi {
    use alloy::sol;

    sol! {
        #[derive(Debug)]
        event RebaseFailed(string reason);

        #[derive(Debug)]
        event TargetPriceUpdated(uint256 newTargetPrice);

        #[derive(Debug)]
        event MintExecuted(address to, uint256 amount);

        #[derive(Debug)]
        event BurnExecuted(address from, uint256 amount);

        #[derive(Debug)]
        event Transfer(address indexed from, address indexed to, uint256 amount);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Dedicated contract event, always forwarded.
    Info,
    /// Derived from a transfer crossing the large-transfer threshold.
    Threshold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    RebaseFailed { reason: String },
    TargetPriceUpdated { new_target_price: TokenAmount },
    MintExecuted { to: Address, amount: TokenAmount },
    BurnExecuted { from: Address, amount: TokenAmount },
    Transfer { from: Address, to: Address, amount: TokenAmount },
}

impl DecodedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RebaseFailed { .. } => EventKind::RebaseFailed,
            Self::TargetPriceUpdated { .. } => EventKind::TargetPriceUpdated,
            Self::MintExecuted { .. } => EventKind::MintExecuted,
            Self::BurnExecuted { .. } => EventKind::BurnExecuted,
            Self::Transfer { .. } => EventKind::Transfer,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

/// A log entry as delivered by the ledger subscription.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub inner: alloy::primitives::Log,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    /// Set when the node retracts the log after a reorg.
    pub removed: bool,
}

impl RawLog {
    #[cfg(test)]
    pub fn new(inner: alloy::primitives::Log) -> Self {
        Self {
            inner,
            tx_hash: None,
            block_number: None,
            removed: false,
        }
    }
}

impl From<alloy::rpc::types::Log> for RawLog {
    fn from(log: alloy::rpc::types::Log) -> Self {
        Self {
            inner: log.inner,
            tx_hash: log.transaction_hash,
            block_number: log.block_number,
            removed: log.removed,
        }
    }
}
