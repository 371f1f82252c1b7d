//! Blockstream Esplora data source
//!
//! REST client for the Esplora HTTP API. Covers the base read set plus
//! broadcast; ordinals and token balances are not part of the Esplora
//! surface and stay undeclared.

use super::{DataSource, DataSourceDescriptor, SourceCapability, SourceCapabilitySet};
use crate::network::Network;
use crate::types::{FeeEstimate, TransactionInfo, Utxo};
use crate::{Error, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const CAPABILITIES: SourceCapabilitySet = SourceCapabilitySet::EMPTY
    .with(SourceCapability::Balance)
    .with(SourceCapability::Utxos)
    .with(SourceCapability::Transactions)
    .with(SourceCapability::Broadcast)
    .with(SourceCapability::FeeEstimate)
    .with(SourceCapability::BlockHeight);

#[derive(Debug, Deserialize)]
struct AddressStats {
    chain_stats: TxoStats,
}

#[derive(Debug, Deserialize)]
struct TxoStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
    status: EsploraStatus,
}

#[derive(Debug, Deserialize)]
struct EsploraStatus {
    confirmed: bool,
    block_height: Option<u64>,
    block_time: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EsploraTx {
    txid: String,
    fee: Option<u64>,
    status: EsploraStatus,
}

pub struct EsploraSource {
    client: Client,
    descriptor: DataSourceDescriptor,
    base_urls: HashMap<Network, String>,
}

impl EsploraSource {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        let mut base_urls = HashMap::new();
        base_urls.insert(
            Network::Mainnet,
            "https://blockstream.info/api".to_string(),
        );
        base_urls.insert(
            Network::Testnet,
            "https://blockstream.info/testnet/api".to_string(),
        );
        let networks = base_urls.keys().copied().collect();
        Self {
            client,
            descriptor: DataSourceDescriptor {
                id: "esplora".to_string(),
                capabilities: CAPABILITIES,
                rank: 4,
                networks,
            },
            base_urls,
        }
    }

    /// Point a network at a different Esplora deployment (self-hosted
    /// instances, additional networks).
    pub fn with_url(mut self, network: Network, url: impl Into<String>) -> Self {
        self.base_urls.insert(network, url.into());
        if !self.descriptor.networks.contains(&network) {
            self.descriptor.networks.push(network);
        }
        self
    }

    fn base_url(&self, network: Network) -> Result<&str> {
        self.base_urls
            .get(&network)
            .map(String::as_str)
            .ok_or_else(|| Error::unsupported("esplora", format!("network {network}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, network: Network, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url(network)?.trim_end_matches('/'), path);
        debug!("esplora GET {url}");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("esplora", status, response.text().await.ok()));
        }
        Ok(response.json::<T>().await?)
    }

    async fn get_text(&self, network: Network, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url(network)?.trim_end_matches('/'), path);
        debug!("esplora GET {url}");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("esplora", status, response.text().await.ok()));
        }
        Ok(response.text().await?)
    }
}

impl Default for EsploraSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Translate an HTTP failure status into the typed error the fallback chain
/// routes on.
pub(crate) fn status_error(
    provider: &str,
    status: reqwest::StatusCode,
    body: Option<String>,
) -> Error {
    let detail = body.unwrap_or_default();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Error::RateLimited(format!("{provider}: {detail}"))
    } else if status.is_server_error() {
        Error::Network(format!("{provider} returned {status}: {detail}"))
    } else {
        Error::Provider(format!("{provider} returned {status}: {detail}"))
    }
}

#[async_trait]
impl DataSource for EsploraSource {
    fn descriptor(&self) -> &DataSourceDescriptor {
        &self.descriptor
    }

    async fn get_balance(&self, address: &str, network: Network) -> Result<u64> {
        let stats: AddressStats = self
            .get_json(network, &format!("/address/{address}"))
            .await?;
        Ok(stats
            .chain_stats
            .funded_txo_sum
            .saturating_sub(stats.chain_stats.spent_txo_sum))
    }

    async fn get_utxos(&self, address: &str, network: Network) -> Result<Vec<Utxo>> {
        let utxos: Vec<EsploraUtxo> = self
            .get_json(network, &format!("/address/{address}/utxo"))
            .await?;
        Ok(utxos
            .into_iter()
            .map(|u| Utxo {
                txid: u.txid,
                vout: u.vout,
                value: u.value,
                confirmed: u.status.confirmed,
            })
            .collect())
    }

    async fn get_transaction(&self, txid: &str, network: Network) -> Result<TransactionInfo> {
        let tx: EsploraTx = self.get_json(network, &format!("/tx/{txid}")).await?;
        Ok(TransactionInfo {
            txid: tx.txid,
            confirmed: tx.status.confirmed,
            block_height: tx.status.block_height,
            block_time: tx.status.block_time,
            fee: tx.fee,
        })
    }

    async fn broadcast_transaction(&self, tx_hex: &str, network: Network) -> Result<String> {
        let url = format!("{}/tx", self.base_url(network)?.trim_end_matches('/'));
        debug!("esplora POST {url}");
        let response = self
            .client
            .post(&url)
            .body(tx_hex.to_string())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("esplora", status, response.text().await.ok()));
        }
        Ok(response.text().await?.trim().to_string())
    }

    async fn estimate_fee(&self, target_blocks: u32, network: Network) -> Result<FeeEstimate> {
        let estimates: HashMap<String, f64> = self.get_json(network, "/fee-estimates").await?;
        // pick the closest available confirmation target at or below the
        // requested one, falling back to the smallest offered
        let mut targets: Vec<u32> = estimates
            .keys()
            .filter_map(|k| k.parse::<u32>().ok())
            .collect();
        targets.sort_unstable();
        let chosen = targets
            .iter()
            .rev()
            .find(|t| **t <= target_blocks)
            .or_else(|| targets.first())
            .copied()
            .ok_or_else(|| Error::Provider("esplora returned no fee estimates".to_string()))?;
        let rate = estimates
            .get(&chosen.to_string())
            .copied()
            .unwrap_or_default();
        Ok(FeeEstimate {
            fee_rate: rate as f32,
            target_blocks: chosen,
        })
    }

    async fn get_block_height(&self, network: Network) -> Result<u64> {
        let text = self.get_text(network, "/blocks/tip/height").await?;
        text.trim()
            .parse::<u64>()
            .map_err(|_| Error::Provider(format!("esplora returned invalid tip height: {text}")))
    }
}
