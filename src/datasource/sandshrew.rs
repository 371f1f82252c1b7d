//! Sandshrew data source
//!
//! JSON-RPC provider multiplexing Bitcoin Core, Esplora, and ord-style
//! namespaces behind one endpoint. The only built-in source that indexes
//! the fractal networks, and the default provider for ordinals and rune
//! balances.

use super::{DataSource, DataSourceDescriptor, SourceCapability, SourceCapabilitySet};
use crate::network::Network;
use crate::types::{
    FeeEstimate, Inscription, MetaBalance, TokenProtocol, TransactionInfo, Utxo,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::DateTime;
use log::debug;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const CAPABILITIES: SourceCapabilitySet = SourceCapabilitySet::EMPTY
    .with(SourceCapability::Balance)
    .with(SourceCapability::Utxos)
    .with(SourceCapability::Transactions)
    .with(SourceCapability::Broadcast)
    .with(SourceCapability::Ordinals)
    .with(SourceCapability::Runes)
    .with(SourceCapability::FeeEstimate)
    .with(SourceCapability::BlockHeight);

/// JSON-RPC request envelope
#[derive(Serialize, Debug)]
struct RpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

/// JSON-RPC response envelope
#[derive(Deserialize, Debug)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize, Debug)]
struct RpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcUtxo {
    txid: String,
    vout: u32,
    value: u64,
    #[serde(default)]
    confirmed: bool,
}

#[derive(Debug, Deserialize)]
struct RpcAddressStats {
    funded: u64,
    spent: u64,
}

#[derive(Debug, Deserialize)]
struct RpcTx {
    txid: String,
    confirmed: bool,
    block_height: Option<u64>,
    block_time: Option<u64>,
    fee: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OrdAddress {
    #[serde(default)]
    inscriptions: Vec<OrdInscription>,
}

#[derive(Debug, Deserialize)]
struct OrdInscription {
    id: String,
    number: Option<i64>,
    content_type: Option<String>,
    content_length: Option<u64>,
    output: Option<String>,
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RuneEntry {
    rune_id: String,
    #[serde(default)]
    symbol: Option<String>,
    amount: u128,
    #[serde(default)]
    divisibility: u8,
}

pub struct SandshrewSource {
    client: Client,
    descriptor: DataSourceDescriptor,
    urls: HashMap<Network, String>,
    request_id: AtomicU64,
}

impl SandshrewSource {
    /// `project_key` selects the hosted deployment path; without one the
    /// public endpoints are used.
    pub fn new(project_key: Option<&str>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        let key = project_key.unwrap_or("public");
        let mut urls = HashMap::new();
        urls.insert(
            Network::Mainnet,
            format!("https://mainnet.sandshrew.io/v2/{key}"),
        );
        urls.insert(
            Network::Signet,
            format!("https://signet.sandshrew.io/v2/{key}"),
        );
        urls.insert(
            Network::FractalMainnet,
            format!("https://fractal.sandshrew.io/v2/{key}"),
        );
        urls.insert(
            Network::FractalTestnet,
            format!("https://fractal-testnet.sandshrew.io/v2/{key}"),
        );
        let networks = urls.keys().copied().collect();
        Self {
            client,
            descriptor: DataSourceDescriptor {
                id: "sandshrew".to_string(),
                capabilities: CAPABILITIES,
                rank: 2,
                networks,
            },
            urls,
            request_id: AtomicU64::new(0),
        }
    }

    /// Point a network at a different deployment (self-hosted instances).
    pub fn with_url(mut self, network: Network, url: impl Into<String>) -> Self {
        self.urls.insert(network, url.into());
        if !self.descriptor.networks.contains(&network) {
            self.descriptor.networks.push(network);
        }
        self
    }

    fn url(&self, network: Network) -> Result<&str> {
        self.urls
            .get(&network)
            .map(String::as_str)
            .ok_or_else(|| Error::unsupported("sandshrew", format!("network {network}")))
    }

    async fn call(&self, network: Network, method: &str, params: Value) -> Result<Value> {
        let url = self.url(network)?;
        debug!("sandshrew call {method} on {network}");
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: self.request_id.fetch_add(1, Ordering::SeqCst),
        };
        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(super::esplora::status_error(
                "sandshrew",
                status,
                response.text().await.ok(),
            ));
        }
        let body: RpcResponse = response.json().await?;
        match body.result {
            Some(result) => Ok(result),
            None => {
                let error = body.error.unwrap_or(RpcError {
                    code: -1,
                    message: "unknown error".to_string(),
                });
                Err(Error::Provider(format!(
                    "sandshrew rpc error {}: {}",
                    error.code, error.message
                )))
            }
        }
    }
}

#[async_trait]
impl DataSource for SandshrewSource {
    fn descriptor(&self) -> &DataSourceDescriptor {
        &self.descriptor
    }

    async fn get_balance(&self, address: &str, network: Network) -> Result<u64> {
        let result = self
            .call(network, "esplora_getaddress", json!([address]))
            .await?;
        let stats: RpcAddressStats = serde_json::from_value(result)?;
        Ok(stats.funded.saturating_sub(stats.spent))
    }

    async fn get_utxos(&self, address: &str, network: Network) -> Result<Vec<Utxo>> {
        let result = self
            .call(network, "esplora_getutxos", json!([address]))
            .await?;
        let utxos: Vec<RpcUtxo> = serde_json::from_value(result)?;
        Ok(utxos
            .into_iter()
            .map(|u| Utxo {
                txid: u.txid,
                vout: u.vout,
                value: u.value,
                confirmed: u.confirmed,
            })
            .collect())
    }

    async fn get_transaction(&self, txid: &str, network: Network) -> Result<TransactionInfo> {
        let result = self
            .call(network, "esplora_gettransaction", json!([txid]))
            .await?;
        let tx: RpcTx = serde_json::from_value(result)?;
        Ok(TransactionInfo {
            txid: tx.txid,
            confirmed: tx.confirmed,
            block_height: tx.block_height,
            block_time: tx.block_time,
            fee: tx.fee,
        })
    }

    async fn broadcast_transaction(&self, tx_hex: &str, network: Network) -> Result<String> {
        let result = self
            .call(network, "esplora_broadcast", json!([tx_hex]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Provider("sandshrew returned an invalid txid".to_string()))
    }

    async fn get_inscriptions(&self, address: &str, network: Network) -> Result<Vec<Inscription>> {
        let result = self.call(network, "ord_address", json!([address])).await?;
        let ord: OrdAddress = serde_json::from_value(result)?;
        Ok(ord
            .inscriptions
            .into_iter()
            .map(|i| Inscription {
                id: i.id,
                number: i.number,
                address: Some(address.to_string()),
                content_type: i.content_type,
                content_length: i.content_length,
                output: i.output,
                timestamp: i.timestamp.and_then(|secs| DateTime::from_timestamp(secs, 0)),
            })
            .collect())
    }

    async fn get_meta_balances(
        &self,
        address: &str,
        protocol: TokenProtocol,
        network: Network,
    ) -> Result<Vec<MetaBalance>> {
        if protocol != TokenProtocol::Runes {
            return Err(self.unsupported(SourceCapability::Brc20));
        }
        let result = self
            .call(network, "ord_runesbyaddress", json!([address]))
            .await?;
        let entries: Vec<RuneEntry> = serde_json::from_value(result)?;
        Ok(entries
            .into_iter()
            .map(|entry| MetaBalance {
                protocol: TokenProtocol::Runes,
                id: entry.rune_id,
                symbol: entry.symbol,
                balance: entry.amount,
                divisibility: entry.divisibility,
            })
            .collect())
    }

    async fn estimate_fee(&self, target_blocks: u32, network: Network) -> Result<FeeEstimate> {
        let result = self
            .call(network, "esplora_getfeeestimates", json!([]))
            .await?;
        let estimates: HashMap<String, f64> = serde_json::from_value(result)?;
        let rate = estimates
            .get(&target_blocks.to_string())
            .or_else(|| estimates.get("6"))
            .copied()
            .ok_or_else(|| Error::Provider("sandshrew returned no fee estimates".to_string()))?;
        Ok(FeeEstimate {
            fee_rate: rate as f32,
            target_blocks,
        })
    }

    async fn get_block_height(&self, network: Network) -> Result<u64> {
        let result = self.call(network, "btc_getblockcount", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| Error::Provider("sandshrew returned an invalid block height".to_string()))
    }
}
