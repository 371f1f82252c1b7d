//! Wallet brand descriptors and the adapter layer
//!
//! One [`WalletDescriptor`] per supported brand, configured once and
//! immutable for the client's lifetime. The injected capability surface is
//! the [`WalletBackend`] trait, supplied by the host environment; the
//! [`WalletAdapter`] normalizes each backend behind the uniform contract the
//! connection manager drives.

mod adapter;
mod backend;
pub mod brands;

pub use adapter::{scheme_for_address, WalletAdapter};
pub use backend::WalletBackend;

use crate::network::Network;
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A declared feature of a wallet brand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    SignMessage,
    SignPsbt,
    Bip322,
    SendBitcoin,
    Inscribe,
    SwitchNetwork,
    Ordinals,
    Brc20,
    Runes,
}

impl Capability {
    const ALL: [Capability; 9] = [
        Capability::SignMessage,
        Capability::SignPsbt,
        Capability::Bip322,
        Capability::SendBitcoin,
        Capability::Inscribe,
        Capability::SwitchNetwork,
        Capability::Ordinals,
        Capability::Brc20,
        Capability::Runes,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::SignMessage => "sign-message",
            Capability::SignPsbt => "sign-psbt",
            Capability::Bip322 => "bip322",
            Capability::SendBitcoin => "send-bitcoin",
            Capability::Inscribe => "inscribe",
            Capability::SwitchNetwork => "switch-network",
            Capability::Ordinals => "ordinals",
            Capability::Brc20 => "brc20",
            Capability::Runes => "runes",
        }
    }
}

/// An immutable set of [`Capability`] flags, declared once per descriptor
/// instead of scattered per-brand booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub const EMPTY: CapabilitySet = CapabilitySet(0);

    pub const fn with(self, capability: Capability) -> Self {
        CapabilitySet(self.0 | capability.bit())
    }

    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |cap| self.contains(*cap))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::EMPTY, |set, cap| set.with(cap))
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for cap in self.iter() {
            seq.serialize_element(&cap)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = CapabilitySet;

            fn expecting(&self, formatter: &mut core::fmt::Formatter) -> core::fmt::Result {
                formatter.write_str("a sequence of capability names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut set = CapabilitySet::EMPTY;
                while let Some(cap) = seq.next_element::<Capability>()? {
                    set = set.with(cap);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_seq(SetVisitor)
    }
}

/// Immutable identity of a wallet brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletDescriptor {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub install_url: String,
    /// Property name under which the extension injects its capability object
    pub injection_key: String,
    pub capabilities: CapabilitySet,
    pub networks: Vec<Network>,
}

impl WalletDescriptor {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn supports_network(&self, network: Network) -> bool {
        self.networks.contains(&network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_set_operations() {
        let set = CapabilitySet::EMPTY
            .with(Capability::SignPsbt)
            .with(Capability::Inscribe);
        assert!(set.contains(Capability::SignPsbt));
        assert!(set.contains(Capability::Inscribe));
        assert!(!set.contains(Capability::SwitchNetwork));
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn test_capability_set_from_iter() {
        let set: CapabilitySet = [Capability::SignMessage, Capability::Runes]
            .into_iter()
            .collect();
        assert!(set.contains(Capability::Runes));
        assert!(!set.contains(Capability::Brc20));
    }

    #[test]
    fn test_capability_set_serde() {
        let set = CapabilitySet::EMPTY
            .with(Capability::Bip322)
            .with(Capability::SwitchNetwork);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "[\"bip322\",\"switch-network\"]");
        let back: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_empty_set() {
        assert!(CapabilitySet::EMPTY.is_empty());
        assert_eq!(CapabilitySet::default(), CapabilitySet::EMPTY);
    }
}
