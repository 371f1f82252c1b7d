//! Corral
//!
//! Corral lets an application talk to any of a dozen Bitcoin wallet
//! browser-extensions and several independent blockchain data providers
//! through one stable, provider-agnostic contract.
//!
//! The library is organized into several key modules:
//! - `wallet`: wallet brand descriptors, the injected capability surface,
//!   and the normalizing adapter layer
//! - `datasource`: data provider contracts, the built-in HTTP sources, and
//!   the routing/fallback manager
//! - `client`: the wallet connection manager, its state machine, and the
//!   reactive state store
//! - `network`: the closed network enumeration shared by both layers
//! - `types`: the common data model (UTXOs, inscriptions, token balances)
//!
//! ## Architecture
//!
//! A consumer asks the [`client::Client`] to connect to a named wallet. The
//! client selects the matching [`wallet::WalletAdapter`], which performs the
//! handshake with the injected wallet capability. Subsequent reads (balance,
//! UTXOs, inscriptions) go through the [`datasource::DataSourceManager`],
//! which routes each call to the best available provider and falls back
//! transparently on failure; writes (sign, send, inscribe) go through the
//! active wallet adapter.

pub mod client;
pub mod datasource;
pub mod network;
pub mod types;
pub mod wallet;

// Re-export key types for convenience
pub use client::{Client, ClientBuilder, ConnectionStatus, Snapshot, StateStore};
pub use datasource::{DataSource, DataSourceDescriptor, DataSourceManager, SourceCapability};
pub use network::Network;
pub use types::{
    Account, FeeEstimate, Inscription, MetaBalance, SignatureScheme, SignedPsbt, TokenProtocol,
    TransactionInfo, Utxo,
};
pub use wallet::{Capability, CapabilitySet, WalletAdapter, WalletBackend, WalletDescriptor};

use thiserror::Error as ThisError;

/// Error type shared across the wallet and data-source layers.
///
/// The connection-level kinds (`WalletNotFound`, `UserRejected`,
/// `NetworkMismatch`) are terminal for the call that raised them and leave
/// the state machine in a known-good state. Data-source kinds (`Provider`,
/// `RateLimited`, `Network`) only surface after the fallback chain is
/// exhausted. Input-shape kinds (`InvalidAddress`, `InvalidParameter`,
/// `Unsupported`) are raised before any wallet or network call is issued.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("user rejected the request")]
    UserRejected,

    #[error("network mismatch: wallet is on {active}, {requested} was requested")]
    NetworkMismatch { active: Network, requested: Network },

    #[error("insufficient funds: {required} sats required, {available} available")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("{provider} does not support {capability}")]
    Unsupported { provider: String, capability: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no wallet connected")]
    NotConnected,

    #[error("a connect is already in flight")]
    ConnectPending,

    #[error("a signing request is already in flight")]
    SigningPending,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("hex error: {0}")]
    Hex(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a capability error naming the refusing provider.
    pub fn unsupported(provider: impl Into<String>, capability: impl Into<String>) -> Self {
        Error::Unsupported {
            provider: provider.into(),
            capability: capability.into(),
        }
    }

    /// True for rate-limit responses, which the data-source manager tracks
    /// separately so callers can tell "retry later" from "provider broken".
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }

    /// True when the same call against another provider could still succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Provider(_) | Error::RateLimited(_) | Error::Network(_) | Error::Serialization(_)
        )
    }
}

/// Result type for corral operations
pub type Result<T> = core::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::Hex(err.to_string())
    }
}

impl From<bitcoin::address::ParseError> for Error {
    fn from(err: bitcoin::address::ParseError) -> Self {
        Error::InvalidAddress(err.to_string())
    }
}

impl From<bitcoin::consensus::encode::Error> for Error {
    fn from(err: bitcoin::consensus::encode::Error) -> Self {
        Error::TransactionFailed(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            Error::RateLimited(err.to_string())
        } else if err.is_timeout() || err.is_connect() {
            Error::Network(err.to_string())
        } else {
            Error::Provider(err.to_string())
        }
    }
}

/// Custom adapter implementations frequently use `anyhow` internally; their
/// failures surface as generic provider-side errors.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Utility re-exports for common operations
pub mod prelude {
    pub use crate::client::{Client, ClientBuilder, ConnectionStatus, Snapshot};
    pub use crate::datasource::{DataSource, DataSourceManager, SourceCapability};
    pub use crate::network::Network;
    pub use crate::types::*;
    pub use crate::wallet::{Capability, WalletAdapter, WalletBackend, WalletDescriptor};
    pub use crate::{Error, Result};
}
