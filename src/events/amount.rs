use alloy::primitives::U256;
use std::fmt;

const TOKEN_DECIMALS: usize = 18;

/// 10^18, one whole token in its smallest unit.
const ONE_TOKEN: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Token amount in its smallest unit at a fixed scale of 18 decimals.
///
/// Comparison and rendering stay in integer arithmetic, so threshold checks are
/// exact for the full 256-bit range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(U256);

impl TokenAmount {
    pub const fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    pub fn from_whole_tokens(tokens: u64) -> Self {
        Self(U256::from(tokens) * ONE_TOKEN)
    }

    #[cfg(test)]
    pub const fn raw(&self) -> U256 {
        self.0
    }
}

impl From<U256> for TokenAmount {
    fn from(raw: U256) -> Self {
        Self::from_raw(raw)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / ONE_TOKEN;
        let fraction = self.0 % ONE_TOKEN;
        if fraction.is_zero() {
            return write!(f, "{whole}.0");
        }
        let digits = fraction.to_string();
        let padded = format!("{digits:0>width$}", width = TOKEN_DECIMALS);
        write!(f, "{whole}.{}", padded.trim_end_matches('0'))
    }
}
