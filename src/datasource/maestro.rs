//! Maestro data source
//!
//! API-key-authenticated REST indexer. The richest built-in surface:
//! ordinals, BRC-20, and rune balances on top of the base read set, so it
//! ranks first when configured.

use super::esplora::status_error;
use super::{DataSource, DataSourceDescriptor, SourceCapability, SourceCapabilitySet};
use crate::network::Network;
use crate::types::{
    FeeEstimate, Inscription, MetaBalance, TokenProtocol, TransactionInfo, Utxo,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::DateTime;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const API_KEY_HEADER: &str = "api-key";

const CAPABILITIES: SourceCapabilitySet = SourceCapabilitySet::EMPTY
    .with(SourceCapability::Balance)
    .with(SourceCapability::Utxos)
    .with(SourceCapability::Transactions)
    .with(SourceCapability::Broadcast)
    .with(SourceCapability::Ordinals)
    .with(SourceCapability::Brc20)
    .with(SourceCapability::Runes)
    .with(SourceCapability::FeeEstimate)
    .with(SourceCapability::BlockHeight);

/// Every Maestro payload is wrapped in a `data` envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MaestroUtxo {
    tx_hash: String,
    index: u32,
    satoshis: u64,
    height: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MaestroTx {
    tx_hash: String,
    block_height: Option<u64>,
    block_time: Option<u64>,
    fee: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MaestroInscription {
    inscription_id: String,
    number: Option<i64>,
    content_type: Option<String>,
    content_length: Option<u64>,
    output: Option<String>,
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MaestroBrc20Balance {
    ticker: String,
    overall_balance: u128,
    #[serde(default)]
    decimals: u8,
}

#[derive(Debug, Deserialize)]
struct MaestroRuneBalance {
    rune_id: String,
    #[serde(default)]
    symbol: Option<String>,
    amount: u128,
    #[serde(default)]
    divisibility: u8,
}

#[derive(Debug, Deserialize)]
struct MaestroTip {
    height: u64,
}

pub struct MaestroSource {
    client: Client,
    descriptor: DataSourceDescriptor,
    base_urls: HashMap<Network, String>,
    api_key: String,
}

impl MaestroSource {
    pub fn new(api_key: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        let mut base_urls = HashMap::new();
        base_urls.insert(
            Network::Mainnet,
            "https://xbt-mainnet.gomaestro-api.org/v0".to_string(),
        );
        base_urls.insert(
            Network::Testnet4,
            "https://xbt-testnet.gomaestro-api.org/v0".to_string(),
        );
        let networks = base_urls.keys().copied().collect();
        Self {
            client,
            descriptor: DataSourceDescriptor {
                id: "maestro".to_string(),
                capabilities: CAPABILITIES,
                rank: 1,
                networks,
            },
            base_urls,
            api_key: api_key.to_string(),
        }
    }

    fn base_url(&self, network: Network) -> Result<&str> {
        self.base_urls
            .get(&network)
            .map(String::as_str)
            .ok_or_else(|| Error::unsupported("maestro", format!("network {network}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, network: Network, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url(network)?.trim_end_matches('/'), path);
        debug!("maestro GET {url}");
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("maestro", status, response.text().await.ok()));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl DataSource for MaestroSource {
    fn descriptor(&self) -> &DataSourceDescriptor {
        &self.descriptor
    }

    async fn get_balance(&self, address: &str, network: Network) -> Result<u64> {
        let balance: Envelope<u64> = self
            .get_json(network, &format!("/addresses/{address}/balance"))
            .await?;
        Ok(balance.data)
    }

    async fn get_utxos(&self, address: &str, network: Network) -> Result<Vec<Utxo>> {
        let utxos: Envelope<Vec<MaestroUtxo>> = self
            .get_json(network, &format!("/addresses/{address}/utxos"))
            .await?;
        Ok(utxos
            .data
            .into_iter()
            .map(|u| Utxo {
                txid: u.tx_hash,
                vout: u.index,
                value: u.satoshis,
                confirmed: u.height.is_some(),
            })
            .collect())
    }

    async fn get_transaction(&self, txid: &str, network: Network) -> Result<TransactionInfo> {
        let tx: Envelope<MaestroTx> = self
            .get_json(network, &format!("/transactions/{txid}"))
            .await?;
        Ok(TransactionInfo {
            txid: tx.data.tx_hash,
            confirmed: tx.data.block_height.is_some(),
            block_height: tx.data.block_height,
            block_time: tx.data.block_time,
            fee: tx.data.fee,
        })
    }

    async fn broadcast_transaction(&self, tx_hex: &str, network: Network) -> Result<String> {
        let url = format!(
            "{}/rpc/transaction/submit",
            self.base_url(network)?.trim_end_matches('/')
        );
        debug!("maestro POST {url}");
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&serde_json::json!(tx_hex))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("maestro", status, response.text().await.ok()));
        }
        let envelope: Envelope<String> = response.json().await?;
        Ok(envelope.data)
    }

    async fn get_inscriptions(&self, address: &str, network: Network) -> Result<Vec<Inscription>> {
        let inscriptions: Envelope<Vec<MaestroInscription>> = self
            .get_json(network, &format!("/addresses/{address}/inscriptions"))
            .await?;
        Ok(inscriptions
            .data
            .into_iter()
            .map(|i| Inscription {
                id: i.inscription_id,
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
        match protocol {
            TokenProtocol::Brc20 => {
                let balances: Envelope<Vec<MaestroBrc20Balance>> = self
                    .get_json(network, &format!("/addresses/{address}/brc20"))
                    .await?;
                Ok(balances
                    .data
                    .into_iter()
                    .map(|b| MetaBalance {
                        protocol: TokenProtocol::Brc20,
                        id: b.ticker.clone(),
                        symbol: Some(b.ticker),
                        balance: b.overall_balance,
                        divisibility: b.decimals,
                    })
                    .collect())
            }
            TokenProtocol::Runes => {
                let balances: Envelope<Vec<MaestroRuneBalance>> = self
                    .get_json(network, &format!("/addresses/{address}/runes"))
                    .await?;
                Ok(balances
                    .data
                    .into_iter()
                    .map(|b| MetaBalance {
                        protocol: TokenProtocol::Runes,
                        id: b.rune_id,
                        symbol: b.symbol,
                        balance: b.amount,
                        divisibility: b.divisibility,
                    })
                    .collect())
            }
        }
    }

    async fn estimate_fee(&self, target_blocks: u32, network: Network) -> Result<FeeEstimate> {
        let estimate: Envelope<f64> = self
            .get_json(
                network,
                &format!("/rpc/transaction/estimatefee/{target_blocks}"),
            )
            .await?;
        Ok(FeeEstimate {
            fee_rate: estimate.data as f32,
            target_blocks,
        })
    }

    async fn get_block_height(&self, network: Network) -> Result<u64> {
        let tip: Envelope<MaestroTip> = self.get_json(network, "/rpc/block/latest").await?;
        Ok(tip.data.height)
    }
}
