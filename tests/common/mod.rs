//! Shared mock backends and data sources for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use corral::datasource::{DataSource, DataSourceDescriptor, SourceCapability, SourceCapabilitySet};
use corral::types::{
    Account, AddressPurpose, FeeEstimate, Inscription, MetaBalance, SignatureScheme,
    TokenProtocol, TransactionInfo, Utxo,
};
use corral::{Error, Network, Result, WalletBackend};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// BIP-350 taproot test vector
pub const ORD_MAIN: &str = "bc1p5d7rjq7g6rdk2yhzks9smlaqtedr4dekq08ge8ztwac72sfr9rusxg3297";
/// Genesis-era legacy address, used to exercise the ECDSA scheme path
pub const PAY_MAIN: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
/// BIP-173 P2WPKH test vector; also the output of `RAW_TX_HEX`
pub const SEGWIT_MAIN: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
/// BIP-173 testnet P2WPKH test vector
pub const TEST_ADDR: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

/// One-input/one-output raw transaction paying 1000 sats to `SEGWIT_MAIN`.
pub const RAW_TX_HEX: &str = "020000000100000000000000000000000000000000000000000000000000000000000000000000000000ffffffff01e803000000000000160014751e76e8199196d454941c45d1b3a323f1433bd600000000";

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ---------------------------------------------------------------------------
// Wallet backend mock

pub struct MockBackend {
    pub available: bool,
    pub reject: bool,
    pub wallet_network: Mutex<Network>,
    pub op_delay: Option<Duration>,
    pub signed_hex: String,
    pub request_accounts_calls: AtomicUsize,
    pub sign_message_calls: AtomicUsize,
    pub sign_psbt_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub inscribe_calls: AtomicUsize,
    pub switch_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(network: Network) -> Self {
        Self {
            available: true,
            reject: false,
            wallet_network: Mutex::new(network),
            op_delay: None,
            signed_hex: RAW_TX_HEX.to_string(),
            request_accounts_calls: AtomicUsize::new(0),
            sign_message_calls: AtomicUsize::new(0),
            sign_psbt_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            inscribe_calls: AtomicUsize::new(0),
            switch_calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(network: Network) -> Self {
        Self {
            available: false,
            ..Self::new(network)
        }
    }

    pub fn rejecting(network: Network) -> Self {
        Self {
            reject: true,
            ..Self::new(network)
        }
    }

    pub fn with_delay(network: Network, delay: Duration) -> Self {
        Self {
            op_delay: Some(delay),
            ..Self::new(network)
        }
    }

    fn accounts_for(network: Network) -> Vec<Account> {
        if network.to_bitcoin() == bitcoin::Network::Bitcoin {
            vec![
                Account {
                    address: ORD_MAIN.to_string(),
                    public_key: Some("02".repeat(33)),
                    purpose: AddressPurpose::Ordinals,
                },
                Account {
                    address: PAY_MAIN.to_string(),
                    public_key: Some("03".repeat(33)),
                    purpose: AddressPurpose::Payment,
                },
            ]
        } else {
            vec![Account {
                address: TEST_ADDR.to_string(),
                public_key: Some("02".repeat(33)),
                purpose: AddressPurpose::Ordinals,
            }]
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.op_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl WalletBackend for MockBackend {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn request_accounts(&self, network: Network) -> Result<Vec<Account>> {
        self.request_accounts_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.reject {
            return Err(Error::UserRejected);
        }
        Ok(Self::accounts_for(network))
    }

    async fn current_network(&self) -> Result<Network> {
        Ok(*self.wallet_network.lock().unwrap())
    }

    async fn switch_network(&self, network: Network) -> Result<()> {
        self.switch_calls.fetch_add(1, Ordering::SeqCst);
        *self.wallet_network.lock().unwrap() = network;
        Ok(())
    }

    async fn sign_message(
        &self,
        message: &str,
        _address: &str,
        scheme: SignatureScheme,
    ) -> Result<String> {
        self.sign_message_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("sig:{scheme:?}:{message}"))
    }

    async fn sign_psbt(&self, _psbt_hex: &str, _finalize: bool) -> Result<String> {
        self.sign_psbt_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self.signed_hex.clone())
    }

    async fn send_bitcoin(&self, _to: &str, _amount_sats: u64) -> Result<String> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok("txid-send".to_string())
    }

    async fn inscribe(&self, _content_base64: &str, _mime_type: &str) -> Result<String> {
        self.inscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok("txid-inscribe".to_string())
    }
}

// ---------------------------------------------------------------------------
// Data source mock

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed(u64),
    Fail,
    RateLimit,
}

pub struct MockSource {
    descriptor: DataSourceDescriptor,
    pub behavior: Behavior,
    pub delay: Option<Duration>,
    pub balance_calls: AtomicUsize,
    pub utxo_calls: AtomicUsize,
    pub broadcast_calls: AtomicUsize,
    pub inscription_calls: AtomicUsize,
    pub meta_calls: AtomicUsize,
    pub fee_calls: AtomicUsize,
    pub height_calls: AtomicUsize,
}

pub fn full_caps() -> SourceCapabilitySet {
    [
        SourceCapability::Balance,
        SourceCapability::Utxos,
        SourceCapability::Transactions,
        SourceCapability::Broadcast,
        SourceCapability::Ordinals,
        SourceCapability::Brc20,
        SourceCapability::Runes,
        SourceCapability::FeeEstimate,
        SourceCapability::BlockHeight,
    ]
    .into_iter()
    .collect()
}

impl MockSource {
    pub fn new(id: &str, rank: u8, behavior: Behavior) -> Self {
        Self::with_caps(id, rank, behavior, full_caps())
    }

    pub fn with_caps(
        id: &str,
        rank: u8,
        behavior: Behavior,
        capabilities: SourceCapabilitySet,
    ) -> Self {
        Self {
            descriptor: DataSourceDescriptor {
                id: id.to_string(),
                capabilities,
                rank,
                networks: vec![Network::Mainnet, Network::Testnet],
            },
            behavior,
            delay: None,
            balance_calls: AtomicUsize::new(0),
            utxo_calls: AtomicUsize::new(0),
            broadcast_calls: AtomicUsize::new(0),
            inscription_calls: AtomicUsize::new(0),
            meta_calls: AtomicUsize::new(0),
            fee_calls: AtomicUsize::new(0),
            height_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn outcome(&self) -> Result<u64> {
        match self.behavior {
            Behavior::Succeed(balance) => Ok(balance),
            Behavior::Fail => Err(Error::Provider(format!(
                "{} is malfunctioning",
                self.descriptor.id
            ))),
            Behavior::RateLimit => Err(Error::RateLimited(format!(
                "{} is rate limiting",
                self.descriptor.id
            ))),
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DataSource for MockSource {
    fn descriptor(&self) -> &DataSourceDescriptor {
        &self.descriptor
    }

    async fn get_balance(&self, _address: &str, _network: Network) -> Result<u64> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.outcome()
    }

    async fn get_utxos(&self, _address: &str, _network: Network) -> Result<Vec<Utxo>> {
        self.utxo_calls.fetch_add(1, Ordering::SeqCst);
        let value = self.outcome()?;
        Ok(vec![Utxo {
            txid: "aa".repeat(32),
            vout: 0,
            value,
            confirmed: true,
        }])
    }

    async fn get_transaction(&self, txid: &str, _network: Network) -> Result<TransactionInfo> {
        self.outcome()?;
        Ok(TransactionInfo {
            txid: txid.to_string(),
            confirmed: true,
            block_height: Some(850_000),
            block_time: Some(1_700_000_000),
            fee: Some(141),
        })
    }

    async fn broadcast_transaction(&self, _tx_hex: &str, _network: Network) -> Result<String> {
        self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome()?;
        Ok("txid-broadcast".to_string())
    }

    async fn get_inscriptions(&self, address: &str, _network: Network) -> Result<Vec<Inscription>> {
        self.inscription_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome()?;
        Ok(vec![Inscription {
            id: "abc123i0".to_string(),
            number: Some(1),
            address: Some(address.to_string()),
            content_type: Some("image/png".to_string()),
            content_length: Some(1024),
            output: Some(format!("{}:0", "ab".repeat(32))),
            timestamp: None,
        }])
    }

    async fn get_meta_balances(
        &self,
        _address: &str,
        protocol: TokenProtocol,
        _network: Network,
    ) -> Result<Vec<MetaBalance>> {
        self.meta_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome()?;
        Ok(vec![MetaBalance {
            protocol,
            id: format!("{}-token", self.descriptor.id),
            symbol: None,
            balance: 1_000_000,
            divisibility: 8,
        }])
    }

    async fn estimate_fee(&self, target_blocks: u32, _network: Network) -> Result<FeeEstimate> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome()?;
        Ok(FeeEstimate {
            fee_rate: 7.5,
            target_blocks,
        })
    }

    async fn get_block_height(&self, _network: Network) -> Result<u64> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}
