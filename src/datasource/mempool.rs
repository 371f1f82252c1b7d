//! mempool.space data source
//!
//! Esplora-compatible REST surface with mempool.space's own recommended-fee
//! endpoint. Covers the newer test networks (testnet4, signet) that the
//! Blockstream deployment does not.

use super::esplora::status_error;
use super::{DataSource, DataSourceDescriptor, SourceCapability, SourceCapabilitySet};
use crate::network::Network;
use crate::types::{FeeEstimate, TransactionInfo, Utxo};
use crate::Result;
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
struct MempoolUtxo {
    txid: String,
    vout: u32,
    value: u64,
    status: MempoolStatus,
}

#[derive(Debug, Deserialize)]
struct MempoolStatus {
    confirmed: bool,
    block_height: Option<u64>,
    block_time: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MempoolTx {
    txid: String,
    fee: Option<u64>,
    status: MempoolStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendedFees {
    fastest_fee: f64,
    half_hour_fee: f64,
    hour_fee: f64,
    economy_fee: f64,
}

pub struct MempoolSource {
    client: Client,
    descriptor: DataSourceDescriptor,
    base_urls: HashMap<Network, String>,
}

impl MempoolSource {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        let mut base_urls = HashMap::new();
        base_urls.insert(Network::Mainnet, "https://mempool.space/api".to_string());
        base_urls.insert(
            Network::Testnet,
            "https://mempool.space/testnet/api".to_string(),
        );
        base_urls.insert(
            Network::Testnet4,
            "https://mempool.space/testnet4/api".to_string(),
        );
        base_urls.insert(
            Network::Signet,
            "https://mempool.space/signet/api".to_string(),
        );
        let networks = base_urls.keys().copied().collect();
        Self {
            client,
            descriptor: DataSourceDescriptor {
                id: "mempool".to_string(),
                capabilities: CAPABILITIES,
                rank: 3,
                networks,
            },
            base_urls,
        }
    }

    /// Point a network at a self-hosted mempool instance.
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
            .ok_or_else(|| crate::Error::unsupported("mempool", format!("network {network}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, network: Network, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url(network)?.trim_end_matches('/'), path);
        debug!("mempool GET {url}");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("mempool", status, response.text().await.ok()));
        }
        Ok(response.json::<T>().await?)
    }
}

impl Default for MempoolSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for MempoolSource {
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
        let utxos: Vec<MempoolUtxo> = self
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
        let tx: MempoolTx = self.get_json(network, &format!("/tx/{txid}")).await?;
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
        debug!("mempool POST {url}");
        let response = self
            .client
            .post(&url)
            .body(tx_hex.to_string())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("mempool", status, response.text().await.ok()));
        }
        Ok(response.text().await?.trim().to_string())
    }

    async fn estimate_fee(&self, target_blocks: u32, network: Network) -> Result<FeeEstimate> {
        let fees: RecommendedFees = self.get_json(network, "/v1/fees/recommended").await?;
        let fee_rate = match target_blocks {
            0..=1 => fees.fastest_fee,
            2..=3 => fees.half_hour_fee,
            4..=6 => fees.hour_fee,
            _ => fees.economy_fee,
        };
        Ok(FeeEstimate {
            fee_rate: fee_rate as f32,
            target_blocks,
        })
    }

    async fn get_block_height(&self, network: Network) -> Result<u64> {
        let url = format!(
            "{}/blocks/tip/height",
            self.base_url(network)?.trim_end_matches('/')
        );
        debug!("mempool GET {url}");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("mempool", status, response.text().await.ok()));
        }
        let text = response.text().await?;
        text.trim()
            .parse::<u64>()
            .map_err(|_| crate::Error::Provider(format!("mempool returned invalid tip height: {text}")))
    }
}
