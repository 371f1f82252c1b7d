//! Connection state machine data
//!
//! Exactly one [`Snapshot`] is live per client instance. It is owned by the
//! connection manager and mutated only through its transition functions;
//! consumers read it through the state store.

use crate::network::Network;
use crate::types::Account;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Connection lifecycle states.
///
/// `Disconnected` is both initial and terminal. `SwitchingNetwork` is
/// transient and returns to `Connected`. `Error` is recoverable back to
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    SwitchingNetwork,
    Error,
}

/// The authoritative reactive state of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: ConnectionStatus,
    /// Active wallet brand id
    pub provider: Option<String>,
    /// Ordinals address of the connected wallet
    pub address: Option<String>,
    /// Payment address, for brands that expose a separate one
    pub payment_address: Option<String>,
    pub public_key: Option<String>,
    pub payment_public_key: Option<String>,
    pub balance: Option<u64>,
    pub network: Network,
    pub accounts: Vec<Account>,
    /// Per-brand availability, probed once at client construction
    pub installed: BTreeMap<String, bool>,
    /// Reason carried by the transient `Error` status
    pub last_error: Option<String>,
}

impl Snapshot {
    /// The empty disconnected form. Network and the install-probe map are
    /// configuration, not connection state, and survive resets.
    pub fn disconnected(network: Network, installed: BTreeMap<String, bool>) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            provider: None,
            address: None,
            payment_address: None,
            public_key: None,
            payment_public_key: None,
            balance: None,
            network,
            accounts: Vec::new(),
            installed,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Reset back to the empty disconnected form in place.
    pub(crate) fn reset(&mut self) {
        *self = Snapshot::disconnected(self.network, std::mem::take(&mut self.installed));
    }
}
