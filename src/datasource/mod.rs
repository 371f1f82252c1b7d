//! Data providers and the routing manager
//!
//! Each [`DataSource`] wraps one HTTP indexing/broadcast service behind a
//! normalized contract. The [`DataSourceManager`] holds an ordered,
//! capability-tagged set of sources and routes every call to the best
//! available one, falling back transparently on failure.

mod cache;
mod esplora;
mod maestro;
mod manager;
mod mempool;
mod sandshrew;

pub use esplora::EsploraSource;
pub use maestro::MaestroSource;
pub use manager::DataSourceManager;
pub use mempool::MempoolSource;
pub use sandshrew::SandshrewSource;

use crate::network::Network;
use crate::types::{FeeEstimate, Inscription, MetaBalance, TokenProtocol, TransactionInfo, Utxo};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A declared feature of a data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceCapability {
    Balance,
    Utxos,
    Transactions,
    Broadcast,
    Ordinals,
    Brc20,
    Runes,
    FeeEstimate,
    BlockHeight,
}

impl SourceCapability {
    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceCapability::Balance => "balance",
            SourceCapability::Utxos => "utxos",
            SourceCapability::Transactions => "transactions",
            SourceCapability::Broadcast => "broadcast",
            SourceCapability::Ordinals => "ordinals",
            SourceCapability::Brc20 => "brc20",
            SourceCapability::Runes => "runes",
            SourceCapability::FeeEstimate => "fee-estimate",
            SourceCapability::BlockHeight => "block-height",
        }
    }
}

/// Capability bitset for a data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceCapabilitySet(u16);

impl SourceCapabilitySet {
    pub const EMPTY: SourceCapabilitySet = SourceCapabilitySet(0);

    pub const fn with(self, capability: SourceCapability) -> Self {
        SourceCapabilitySet(self.0 | capability.bit())
    }

    pub const fn contains(self, capability: SourceCapability) -> bool {
        self.0 & capability.bit() != 0
    }
}

impl FromIterator<SourceCapability> for SourceCapabilitySet {
    fn from_iter<I: IntoIterator<Item = SourceCapability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(SourceCapabilitySet::EMPTY, |set, cap| set.with(cap))
    }
}

/// Identity, declared capabilities, and priority rank of a data provider.
/// Lower rank means higher priority.
#[derive(Debug, Clone)]
pub struct DataSourceDescriptor {
    pub id: String,
    pub capabilities: SourceCapabilitySet,
    pub rank: u8,
    pub networks: Vec<Network>,
}

impl DataSourceDescriptor {
    pub fn supports(&self, capability: SourceCapability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn supports_network(&self, network: Network) -> bool {
        self.networks.contains(&network)
    }
}

/// Normalized contract over one blockchain data provider.
///
/// Every implementation translates its provider-specific response shape into
/// the common types before returning. Methods for undeclared capabilities
/// keep the default implementation, which reports the gap as a capability
/// error rather than attempting the call.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn descriptor(&self) -> &DataSourceDescriptor;

    /// Confirmed balance of an address, in sats.
    async fn get_balance(&self, address: &str, network: Network) -> Result<u64> {
        let _ = (address, network);
        Err(self.unsupported(SourceCapability::Balance))
    }

    async fn get_utxos(&self, address: &str, network: Network) -> Result<Vec<Utxo>> {
        let _ = (address, network);
        Err(self.unsupported(SourceCapability::Utxos))
    }

    async fn get_transaction(&self, txid: &str, network: Network) -> Result<TransactionInfo> {
        let _ = (txid, network);
        Err(self.unsupported(SourceCapability::Transactions))
    }

    /// Submit a raw transaction. Returns the txid.
    async fn broadcast_transaction(&self, tx_hex: &str, network: Network) -> Result<String> {
        let _ = (tx_hex, network);
        Err(self.unsupported(SourceCapability::Broadcast))
    }

    async fn get_inscriptions(&self, address: &str, network: Network) -> Result<Vec<Inscription>> {
        let _ = (address, network);
        Err(self.unsupported(SourceCapability::Ordinals))
    }

    async fn get_meta_balances(
        &self,
        address: &str,
        protocol: TokenProtocol,
        network: Network,
    ) -> Result<Vec<MetaBalance>> {
        let _ = (address, network);
        let capability = match protocol {
            TokenProtocol::Brc20 => SourceCapability::Brc20,
            TokenProtocol::Runes => SourceCapability::Runes,
        };
        Err(self.unsupported(capability))
    }

    async fn estimate_fee(&self, target_blocks: u32, network: Network) -> Result<FeeEstimate> {
        let _ = (target_blocks, network);
        Err(self.unsupported(SourceCapability::FeeEstimate))
    }

    async fn get_block_height(&self, network: Network) -> Result<u64> {
        let _ = network;
        Err(self.unsupported(SourceCapability::BlockHeight))
    }

    #[doc(hidden)]
    fn unsupported(&self, capability: SourceCapability) -> Error {
        Error::unsupported(&self.descriptor().id, capability.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_capability_set() {
        let set = SourceCapabilitySet::EMPTY
            .with(SourceCapability::Balance)
            .with(SourceCapability::Runes);
        assert!(set.contains(SourceCapability::Balance));
        assert!(!set.contains(SourceCapability::Broadcast));
    }

    #[test]
    fn test_descriptor_network_filter() {
        let descriptor = DataSourceDescriptor {
            id: "test".to_string(),
            capabilities: [SourceCapability::Balance].into_iter().collect(),
            rank: 1,
            networks: vec![Network::Mainnet],
        };
        assert!(descriptor.supports_network(Network::Mainnet));
        assert!(!descriptor.supports_network(Network::Signet));
    }
}
