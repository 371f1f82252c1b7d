//! Routing, fallback, and caching across data sources
//!
//! For each call the manager filters its sources to those declaring the
//! required capability on the requested network, attempts them in rank
//! order under a bounded timeout, and surfaces a typed error only when the
//! whole chain is exhausted. Read-only responses are cached for a short
//! TTL; broadcasts are never cached and invalidate the affected addresses.

use super::cache::{CacheKey, ResponseCache};
use super::{DataSource, SourceCapability};
use crate::network::Network;
use crate::types::{FeeEstimate, Inscription, MetaBalance, TokenProtocol, TransactionInfo, Utxo};
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Consecutive failures after which a source sits out the cooldown window.
const UNHEALTHY_STREAK: u32 = 3;
const HEALTH_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Clone)]
struct Health {
    streak: u32,
    last_failure: Option<Instant>,
}

impl Health {
    fn cooling_down(&self) -> bool {
        self.streak >= UNHEALTHY_STREAK
            && self
                .last_failure
                .map(|at| at.elapsed() < HEALTH_COOLDOWN)
                .unwrap_or(false)
    }
}

/// Ordered, capability-tagged set of data sources with transparent fallback.
///
/// Custom sources may be registered at runtime under a name and participate
/// identically in ranking and fallback; a per-call provider override routes
/// exclusively to the named source, bypassing ranking.
pub struct DataSourceManager {
    sources: RwLock<Vec<Arc<dyn DataSource>>>,
    health: Mutex<HashMap<String, Health>>,
    cache: ResponseCache,
    call_timeout: Duration,
}

impl DataSourceManager {
    pub fn new() -> Self {
        Self::with_tuning(DEFAULT_CACHE_TTL, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_tuning(cache_ttl: Duration, call_timeout: Duration) -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            health: Mutex::new(HashMap::new()),
            cache: ResponseCache::new(cache_ttl),
            call_timeout,
        }
    }

    /// Register a source. An existing source with the same id is replaced;
    /// ordering by rank is maintained.
    pub fn register(&self, source: Arc<dyn DataSource>) {
        let mut sources = self.sources.write().unwrap();
        let id = source.descriptor().id.clone();
        sources.retain(|s| s.descriptor().id != id);
        sources.push(source);
        sources.sort_by_key(|s| s.descriptor().rank);
        debug!("registered data source {id}");
    }

    /// Register the built-in provider set. Maestro is only added when an
    /// API key is supplied.
    pub fn register_defaults(&self, maestro_api_key: Option<&str>) {
        if let Some(key) = maestro_api_key {
            self.register(Arc::new(super::MaestroSource::new(key)));
        }
        self.register(Arc::new(super::SandshrewSource::new(None)));
        self.register(Arc::new(super::MempoolSource::new()));
        self.register(Arc::new(super::EsploraSource::new()));
    }

    /// Descriptors of every registered source, in rank order.
    pub fn sources(&self) -> Vec<super::DataSourceDescriptor> {
        self.sources
            .read()
            .unwrap()
            .iter()
            .map(|s| s.descriptor().clone())
            .collect()
    }

    fn candidates(
        &self,
        capability: SourceCapability,
        network: Network,
        provider: Option<&str>,
    ) -> Result<Vec<Arc<dyn DataSource>>> {
        let sources = self.sources.read().unwrap();

        if let Some(id) = provider {
            let source = sources
                .iter()
                .find(|s| s.descriptor().id == id)
                .cloned()
                .ok_or_else(|| Error::InvalidParameter(format!("unknown data source: {id}")))?;
            if !source.descriptor().supports(capability) {
                return Err(Error::unsupported(id, capability.as_str()));
            }
            return Ok(vec![source]);
        }

        let capable: Vec<Arc<dyn DataSource>> = sources
            .iter()
            .filter(|s| {
                s.descriptor().supports(capability) && s.descriptor().supports_network(network)
            })
            .cloned()
            .collect();
        if capable.is_empty() {
            return Err(Error::unsupported(
                format!("no registered data source on {network}"),
                capability.as_str(),
            ));
        }

        let health = self.health.lock().unwrap();
        let healthy: Vec<Arc<dyn DataSource>> = capable
            .iter()
            .filter(|s| {
                !health
                    .get(&s.descriptor().id)
                    .map(Health::cooling_down)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        // a chain of cooling sources still beats no chain at all
        Ok(if healthy.is_empty() { capable } else { healthy })
    }

    fn mark_success(&self, id: &str) {
        self.health.lock().unwrap().remove(id);
    }

    fn mark_failure(&self, id: &str) {
        let mut health = self.health.lock().unwrap();
        let entry = health.entry(id.to_string()).or_default();
        entry.streak += 1;
        entry.last_failure = Some(Instant::now());
    }

    async fn execute<T, F>(
        &self,
        call: &'static str,
        capability: SourceCapability,
        network: Network,
        provider: Option<&str>,
        op: F,
    ) -> Result<T>
    where
        T: Send,
        F: Fn(Arc<dyn DataSource>) -> BoxFuture<'static, Result<T>>,
    {
        let candidates = self.candidates(capability, network, provider)?;
        let forced = provider.is_some();

        let mut attempts = 0u32;
        let mut rate_limited = 0u32;
        let mut network_errors = 0u32;
        let mut last_error: Option<Error> = None;

        for source in candidates {
            let id = source.descriptor().id.clone();
            debug!("routing {call} on {network} to {id}");
            let outcome = match tokio::time::timeout(self.call_timeout, op(source)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Network(format!(
                    "{id} timed out after {:?}",
                    self.call_timeout
                ))),
            };
            match outcome {
                Ok(value) => {
                    self.mark_success(&id);
                    return Ok(value);
                }
                Err(err) => {
                    // input-shape errors fail identically everywhere; a
                    // forced provider's capability gap is the caller's to see
                    if matches!(err, Error::InvalidParameter(_) | Error::InvalidAddress(_))
                        || (forced && matches!(err, Error::Unsupported { .. }))
                    {
                        return Err(err);
                    }
                    warn!("{id} failed {call} on {network}: {err}");
                    self.mark_failure(&id);
                    attempts += 1;
                    if err.is_rate_limit() {
                        rate_limited += 1;
                    }
                    if matches!(err, Error::Network(_)) {
                        network_errors += 1;
                    }
                    last_error = Some(err);
                }
            }
        }

        let last = last_error.expect("at least one candidate was attempted");
        if rate_limited == attempts {
            Err(Error::RateLimited(format!(
                "every capable data source is rate limiting {call}"
            )))
        } else if network_errors == attempts {
            Err(Error::Network(format!(
                "every capable data source is unreachable: {last}"
            )))
        } else {
            Err(Error::Provider(format!(
                "all capable data sources failed {call}: {last}"
            )))
        }
    }

    /// Confirmed balance of an address, in sats.
    pub async fn get_balance(
        &self,
        address: &str,
        network: Network,
        provider: Option<&str>,
    ) -> Result<u64> {
        let key = CacheKey::new("balance", address, network);
        if provider.is_none() {
            if let Some(balance) = self.cache.get::<u64>(&key) {
                return Ok(balance);
            }
        }
        let address = address.to_string();
        let balance = self
            .execute(
                "get_balance",
                SourceCapability::Balance,
                network,
                provider,
                move |source| {
                    let address = address.clone();
                    async move { source.get_balance(&address, network).await }.boxed()
                },
            )
            .await?;
        if provider.is_none() {
            self.cache.put(key, &balance);
        }
        Ok(balance)
    }

    pub async fn get_utxos(
        &self,
        address: &str,
        network: Network,
        provider: Option<&str>,
    ) -> Result<Vec<Utxo>> {
        let key = CacheKey::new("utxos", address, network);
        if provider.is_none() {
            if let Some(utxos) = self.cache.get::<Vec<Utxo>>(&key) {
                return Ok(utxos);
            }
        }
        let address = address.to_string();
        let utxos = self
            .execute(
                "get_utxos",
                SourceCapability::Utxos,
                network,
                provider,
                move |source| {
                    let address = address.clone();
                    async move { source.get_utxos(&address, network).await }.boxed()
                },
            )
            .await?;
        if provider.is_none() {
            self.cache.put(key, &utxos);
        }
        Ok(utxos)
    }

    pub async fn get_transaction(
        &self,
        txid: &str,
        network: Network,
        provider: Option<&str>,
    ) -> Result<TransactionInfo> {
        let txid = txid.to_string();
        self.execute(
            "get_transaction",
            SourceCapability::Transactions,
            network,
            provider,
            move |source| {
                let txid = txid.clone();
                async move { source.get_transaction(&txid, network).await }.boxed()
            },
        )
        .await
    }

    /// Submit a raw transaction and invalidate the cached balance and UTXO
    /// entries of every address the transaction's outputs pay.
    pub async fn broadcast_transaction(
        &self,
        tx_hex: &str,
        network: Network,
        provider: Option<&str>,
    ) -> Result<String> {
        let raw = hex::decode(tx_hex)?;
        let tx_hex_owned = tx_hex.to_string();
        let txid = self
            .execute(
                "broadcast_transaction",
                SourceCapability::Broadcast,
                network,
                provider,
                move |source| {
                    let tx_hex = tx_hex_owned.clone();
                    async move { source.broadcast_transaction(&tx_hex, network).await }.boxed()
                },
            )
            .await?;

        if let Ok(tx) = bitcoin::consensus::encode::deserialize::<bitcoin::Transaction>(&raw) {
            for output in &tx.output {
                if let Ok(address) =
                    bitcoin::Address::from_script(&output.script_pubkey, network.to_bitcoin())
                {
                    self.invalidate_address(&address.to_string(), network);
                }
            }
        }
        Ok(txid)
    }

    /// Drop the cached balance and UTXO entries for an address. Called by
    /// the client after sends and inscriptions, where the spending address
    /// is not visible in the broadcast outputs.
    pub fn invalidate_address(&self, address: &str, network: Network) {
        debug!("invalidating cached reads for {address} on {network}");
        self.cache.invalidate_address(address, network);
    }

    pub async fn get_inscriptions(
        &self,
        address: &str,
        network: Network,
        provider: Option<&str>,
    ) -> Result<Vec<Inscription>> {
        let address = address.to_string();
        self.execute(
            "get_inscriptions",
            SourceCapability::Ordinals,
            network,
            provider,
            move |source| {
                let address = address.clone();
                async move { source.get_inscriptions(&address, network).await }.boxed()
            },
        )
        .await
    }

    pub async fn get_meta_balances(
        &self,
        address: &str,
        protocol: TokenProtocol,
        network: Network,
        provider: Option<&str>,
    ) -> Result<Vec<MetaBalance>> {
        let capability = match protocol {
            TokenProtocol::Brc20 => SourceCapability::Brc20,
            TokenProtocol::Runes => SourceCapability::Runes,
        };
        let address = address.to_string();
        self.execute(
            "get_meta_balances",
            capability,
            network,
            provider,
            move |source| {
                let address = address.clone();
                async move { source.get_meta_balances(&address, protocol, network).await }.boxed()
            },
        )
        .await
    }

    pub async fn estimate_fee(
        &self,
        target_blocks: u32,
        network: Network,
        provider: Option<&str>,
    ) -> Result<FeeEstimate> {
        let key = CacheKey::new("fee", target_blocks.to_string(), network);
        if provider.is_none() {
            if let Some(estimate) = self.cache.get::<FeeEstimate>(&key) {
                return Ok(estimate);
            }
        }
        let estimate = self
            .execute(
                "estimate_fee",
                SourceCapability::FeeEstimate,
                network,
                provider,
                move |source| {
                    async move { source.estimate_fee(target_blocks, network).await }.boxed()
                },
            )
            .await?;
        if provider.is_none() {
            self.cache.put(key, &estimate);
        }
        Ok(estimate)
    }

    pub async fn get_block_height(
        &self,
        network: Network,
        provider: Option<&str>,
    ) -> Result<u64> {
        let key = CacheKey::new("height", "", network);
        if provider.is_none() {
            if let Some(height) = self.cache.get::<u64>(&key) {
                return Ok(height);
            }
        }
        let height = self
            .execute(
                "get_block_height",
                SourceCapability::BlockHeight,
                network,
                provider,
                move |source| async move { source.get_block_height(network).await }.boxed(),
            )
            .await?;
        if provider.is_none() {
            self.cache.put(key, &height);
        }
        Ok(height)
    }
}

impl Default for DataSourceManager {
    fn default() -> Self {
        Self::new()
    }
}
