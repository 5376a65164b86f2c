use crate::events::{DecodedEvent, EventKind, Severity, TokenAmount};
use std::fmt::{self, Debug, Write};
use thiserror::Error;
use tracing::warn;

/// Large-transfer boundary used when none is configured, in whole tokens.
pub const DEFAULT_TRANSFER_THRESHOLD: u64 = 100_000;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to render {event} alert")]
    Render {
        event: &'static str,
        #[source]
        source: fmt::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub text: String,
    pub severity: Severity,
}

impl fmt::Display for AlertMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdConfig {
    pub min_amount: TokenAmount,
}

impl ThresholdConfig {
    pub fn whole_tokens(tokens: u64) -> Self {
        Self {
            min_amount: TokenAmount::from_whole_tokens(tokens),
        }
    }

    pub fn is_met(&self, amount: &TokenAmount) -> bool {
        *amount >= self.min_amount
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self::whole_tokens(DEFAULT_TRANSFER_THRESHOLD)
    }
}

pub trait Rule: Send + Sync + Debug {
    fn check(&self, event: &DecodedEvent) -> Result<Option<AlertMessage>, ClassifyError>;
}

// Renders through `fmt::Write` so a failing `Display` impl surfaces as an
// error instead of a panic inside `format!`.
fn render(
    kind: EventKind,
    severity: Severity,
    args: fmt::Arguments<'_>,
) -> Result<Option<AlertMessage>, ClassifyError> {
    let mut text = String::new();
    text.write_fmt(args).map_err(|source| ClassifyError::Render {
        event: kind.name(),
        source,
    })?;
    Ok(Some(AlertMessage { text, severity }))
}

#[derive(Debug)]
pub struct RebaseFailedRule;

impl Rule for RebaseFailedRule {
    fn check(&self, event: &DecodedEvent) -> Result<Option<AlertMessage>, ClassifyError> {
        match event {
            DecodedEvent::RebaseFailed { reason } => render(
                event.kind(),
                Severity::Info,
                format_args!("Rebase Failed: {reason}"),
            ),
            _ => Ok(None),
        }
    }
}

#[derive(Debug)]
pub struct TargetPriceRule;

impl Rule for TargetPriceRule {
    fn check(&self, event: &DecodedEvent) -> Result<Option<AlertMessage>, ClassifyError> {
        match event {
            DecodedEvent::TargetPriceUpdated { new_target_price } => render(
                event.kind(),
                Severity::Info,
                format_args!("Target Price Updated to: {new_target_price} USD"),
            ),
            _ => Ok(None),
        }
    }
}

/// Mint and burn both change the supply and alert unconditionally.
#[derive(Debug)]
pub struct SupplyChangeRule {
    pub symbol: String,
}

impl SupplyChangeRule {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

impl Rule for SupplyChangeRule {
    fn check(&self, event: &DecodedEvent) -> Result<Option<AlertMessage>, ClassifyError> {
        let symbol = &self.symbol;
        match event {
            DecodedEvent::MintExecuted { to, amount } => render(
                event.kind(),
                Severity::Info,
                format_args!("Mint Executed: {amount} {symbol} minted to {to}"),
            ),
            DecodedEvent::BurnExecuted { from, amount } => render(
                event.kind(),
                Severity::Info,
                format_args!("Burn Executed: {amount} {symbol} burned from {from}"),
            ),
            _ => Ok(None),
        }
    }
}

#[derive(Debug)]
pub struct ThresholdRule {
    pub threshold: ThresholdConfig,
    pub symbol: String,
}

impl ThresholdRule {
    pub fn new(threshold: ThresholdConfig, symbol: impl Into<String>) -> Self {
        Self {
            threshold,
            symbol: symbol.into(),
        }
    }
}

impl Rule for ThresholdRule {
    fn check(&self, event: &DecodedEvent) -> Result<Option<AlertMessage>, ClassifyError> {
        match event {
            DecodedEvent::Transfer { from, to, amount } if self.threshold.is_met(amount) => {
                render(
                    event.kind(),
                    Severity::Threshold,
                    format_args!(
                        "Large Transfer Alert: {amount} {} transferred from {from} to {to}",
                        self.symbol
                    ),
                )
            }
            _ => Ok(None),
        }
    }
}

/// Runs every rule against an event. Holds no state between calls.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// The standard AlgoUSD rule set.
    pub fn algousd(symbol: &str, threshold: ThresholdConfig) -> Self {
        let mut engine = Self::new();
        engine.add_rule(Box::new(RebaseFailedRule));
        engine.add_rule(Box::new(TargetPriceRule));
        engine.add_rule(Box::new(SupplyChangeRule::new(symbol)));
        engine.add_rule(Box::new(ThresholdRule::new(threshold, symbol)));
        engine
    }

    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// A rule that fails to render contributes nothing; the failure is logged.
    pub fn process(&self, event: &DecodedEvent) -> Vec<AlertMessage> {
        let mut alerts = Vec::new();
        for rule in &self.rules {
            match rule.check(event) {
                Ok(Some(alert)) => alerts.push(alert),
                Ok(None) => {}
                Err(e) => warn!(?rule, "Dropping alert for {}: {}", event.name(), e),
            }
        }
        alerts
    }
}
