use eyre::{Result, WrapErr};
use futures_util::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::alerts::{Notifier, RetryPolicy, WebhookDispatcher};
use crate::config::AppConfig;
use crate::decoder::EventDecoder;
use crate::events::{Catalog, RawLog};
use crate::listener::{self, Backoff, LedgerConnection, LogSource};
use crate::rules::{RuleEngine, ThresholdConfig};

const LOG_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Initializing,
    Subscribed,
    Running,
    Terminated,
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Decode, classify and dispatch, one task per log.
#[derive(Clone)]
pub struct Pipeline {
    decoder: Arc<EventDecoder>,
    engine: Arc<RuleEngine>,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(decoder: EventDecoder, engine: RuleEngine, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            decoder: Arc::new(decoder),
            engine: Arc::new(engine),
            notifier,
        }
    }

    /// Consumes logs until the sender side closes, then waits for the
    /// in-flight handlers. A handler never holds up the receipt of the next log.
    pub async fn run(&self, mut rx: Receiver<RawLog>) {
        let mut handlers = JoinSet::new();
        loop {
            tokio::select! {
                maybe_log = rx.recv() => match maybe_log {
                    Some(log) => {
                        let pipeline = self.clone();
                        handlers.spawn(async move { pipeline.handle(log).await });
                    }
                    None => break,
                },
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    report_handler(joined);
                }
            }
        }
        while let Some(joined) = handlers.join_next().await {
            report_handler(joined);
        }
    }

    pub async fn handle(&self, log: RawLog) {
        let event = match self.decoder.decode(&log) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                warn!(tx = ?log.tx_hash, block = ?log.block_number, "Skipping log: {}", e);
                return;
            }
        };
        info!(tx = ?log.tx_hash, block = ?log.block_number, "Detected {}: {:?}", event.name(), event);

        let name = event.name();
        let alerts = self.engine.process(&event);
        let deliveries = alerts.iter().map(|alert| async move {
            info!("RISK LEVEL {:?}: {}", alert.severity, alert);
            if let Err(e) = self.notifier.notify(alert).await {
                error!(event = name, "Failed to deliver alert: {}", e);
            }
        });
        join_all(deliveries).await;
    }
}

fn report_handler(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!("Event handler aborted: {}", e);
    }
}

/// Owns the ledger connection and the pipeline for the lifetime of the process.
pub struct Monitor {
    phase: MonitorPhase,
    connection: LedgerConnection,
    pipeline: Pipeline,
}

impl Monitor {
    pub async fn init(config: &AppConfig) -> Result<Self> {
        info!(phase = %MonitorPhase::Initializing, "Monitor starting");
        Self::build(config).await.inspect_err(|e| {
            error!(phase = %MonitorPhase::Terminated, "Initialization failed: {:#}", e);
        })
    }

    async fn build(config: &AppConfig) -> Result<Self> {
        let catalog = Catalog::algousd()?;
        for signature in catalog.signatures() {
            info!(selector = %signature.selector(), "Registered handler for {}", signature);
        }
        let selectors = catalog.selectors();
        let decoder = EventDecoder::new(catalog, config.contract_address);

        let threshold = ThresholdConfig::whole_tokens(config.transfer_threshold);
        info!(
            "Large transfer threshold: {} {}",
            threshold.min_amount, config.token_symbol
        );
        let engine = RuleEngine::algousd(&config.token_symbol, threshold);

        let dispatcher = WebhookDispatcher::new(
            config.webhook_url.clone(),
            config.webhook_timeout,
            RetryPolicy::with_max_attempts(config.webhook_max_attempts),
        )
        .wrap_err("failed to build webhook client")?;

        let connection =
            LedgerConnection::open(&config.rpc_url, config.contract_address, selectors).await?;

        Ok(Self {
            phase: MonitorPhase::Initializing,
            connection,
            pipeline: Pipeline::new(decoder, engine, Arc::new(dispatcher)),
        })
    }

    fn enter(&mut self, next: MonitorPhase) {
        info!("Monitor phase {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Runs until the process is stopped from outside.
    pub async fn run(mut self) -> Result<()> {
        let first = match self.connection.subscribe().await {
            Ok(sub) => sub,
            Err(e) => {
                self.enter(MonitorPhase::Terminated);
                return Err(e);
            }
        };
        self.enter(MonitorPhase::Subscribed);

        let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        self.enter(MonitorPhase::Running);
        info!("Watchdog Active. Waiting for events...");
        tokio::join!(
            listener::watch_logs(&mut self.connection, first, tx, Backoff::default()),
            self.pipeline.run(rx)
        );

        warn!("Monitor stopped");
        Ok(())
    }
}
