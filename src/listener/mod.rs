use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, ReqwestProvider, RootProvider, WsConnect};
use alloy::pubsub::PubSubFrontend;
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};
use url::Url;

use crate::events::RawLog;

pub type WsProvider = RootProvider<PubSubFrontend>;

pub type LogStream = BoxStream<'static, Log>;

/// Something that can (re)open a connection to a node and stream the
/// contract's logs from it.
#[async_trait]
pub trait LogSource: Send {
    /// Replaces the current connection with a fresh one.
    async fn connect(&mut self) -> Result<()>;

    async fn subscribe(&mut self) -> Result<LogStream>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

enum NodeProvider {
    /// Pub/sub over WebSocket, `eth_subscribe("logs")`.
    Ws(WsProvider),
    /// Plain JSON-RPC, polled through `eth_getFilterChanges`.
    Http(ReqwestProvider),
}

async fn connect(rpc_url: &Url) -> Result<NodeProvider> {
    match rpc_url.scheme() {
        "ws" | "wss" => {
            let ws = WsConnect::new(rpc_url.as_str());
            let provider = ProviderBuilder::new().on_ws(ws).await?;
            Ok(NodeProvider::Ws(provider))
        }
        "http" | "https" => Ok(NodeProvider::Http(
            ProviderBuilder::new().on_http(rpc_url.clone()),
        )),
        other => Err(eyre!("unsupported RPC scheme {other}")),
    }
}

/// The open ledger connection and the log filter for the monitored contract.
/// Dropping it closes the connection.
pub struct LedgerConnection {
    rpc_url: Url,
    filter: Filter,
    provider: NodeProvider,
}

impl LedgerConnection {
    pub async fn open(rpc_url: &Url, contract: Address, selectors: Vec<B256>) -> Result<Self> {
        let provider = connect(rpc_url)
            .await
            .wrap_err("failed to open ledger connection")?;
        let filter = Filter::new()
            .address(contract)
            .event_signature(selectors)
            .from_block(BlockNumberOrTag::Latest);
        Ok(Self {
            rpc_url: rpc_url.clone(),
            filter,
            provider,
        })
    }
}

#[async_trait]
impl LogSource for LedgerConnection {
    async fn connect(&mut self) -> Result<()> {
        self.provider = connect(&self.rpc_url)
            .await
            .wrap_err("failed to reopen ledger connection")?;
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<LogStream> {
        let logs = match &self.provider {
            NodeProvider::Ws(provider) => provider
                .subscribe_logs(&self.filter)
                .await
                .wrap_err("failed to subscribe to contract logs")?
                .into_stream()
                .boxed(),
            NodeProvider::Http(provider) => provider
                .watch_logs(&self.filter)
                .await
                .wrap_err("failed to install contract log filter")?
                .into_stream()
                .flat_map(stream::iter)
                .boxed(),
        };
        Ok(logs)
    }
}

/// Forwards logs until `tx` is closed.
///
/// A stream only ends when the node connection is gone, so every recovery
/// attempt opens a fresh connection before subscribing again. Logs emitted
/// in between are not replayed.
pub async fn watch_logs<S: LogSource>(
    source: &mut S,
    first: LogStream,
    tx: Sender<RawLog>,
    backoff: Backoff,
) {
    let mut next = Some(first);
    let mut delay = backoff.initial;
    loop {
        let logs = match next.take() {
            Some(logs) => logs,
            None => match reopen(source).await {
                Ok(logs) => {
                    info!("Log subscription re-established");
                    logs
                }
                Err(e) => {
                    warn!(?delay, "Reconnect failed: {:#}", e);
                    tokio::time::sleep(delay).await;
                    delay = backoff.next(delay);
                    continue;
                }
            },
        };

        let forwarded = forward(logs, &tx).await;
        if tx.is_closed() {
            info!("Log consumer closed, stopping subscription");
            return;
        }
        if forwarded > 0 {
            delay = backoff.initial;
        }
        warn!(forwarded, ?delay, "Log subscription ended, reconnecting");
        tokio::time::sleep(delay).await;
        delay = backoff.next(delay);
    }
}

async fn reopen<S: LogSource>(source: &mut S) -> Result<LogStream> {
    source.connect().await?;
    source.subscribe().await
}

async fn forward(mut logs: LogStream, tx: &Sender<RawLog>) -> usize {
    let mut forwarded = 0;
    while let Some(log) = logs.next().await {
        debug!(tx = ?log.transaction_hash, block = ?log.block_number, "Received log");
        if tx.send(RawLog::from(log)).await.is_err() {
            break;
        }
        forwarded += 1;
    }
    forwarded
}
