//! Built-in wallet brand descriptors
//!
//! The capability table for every supported browser extension. Each entry is
//! immutable brand identity; actual availability is discovered by probing
//! the matching [`crate::wallet::WalletBackend`] at client construction.

use super::{Capability, CapabilitySet, WalletDescriptor};
use crate::network::Network;

pub const UNISAT: &str = "unisat";
pub const XVERSE: &str = "xverse";
pub const OYL: &str = "oyl";
pub const MAGIC_EDEN: &str = "magic-eden";
pub const OKX: &str = "okx";
pub const LEATHER: &str = "leather";
pub const PHANTOM: &str = "phantom";
pub const WIZZ: &str = "wizz";
pub const ORANGE: &str = "orange";
pub const OP_NET: &str = "op-net";
pub const TOKEO: &str = "tokeo";
pub const KEPLR: &str = "keplr";

const SIGNING: CapabilitySet = CapabilitySet::EMPTY
    .with(Capability::SignMessage)
    .with(Capability::SignPsbt)
    .with(Capability::SendBitcoin);

fn descriptor(
    id: &str,
    name: &str,
    install_url: &str,
    injection_key: &str,
    capabilities: CapabilitySet,
    networks: &[Network],
) -> WalletDescriptor {
    WalletDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        icon: format!("wallets/{id}.svg"),
        install_url: install_url.to_string(),
        injection_key: injection_key.to_string(),
        capabilities,
        networks: networks.to_vec(),
    }
}

/// The full built-in brand table.
pub fn builtin_descriptors() -> Vec<WalletDescriptor> {
    vec![
        descriptor(
            UNISAT,
            "Unisat Wallet",
            "https://unisat.io/download",
            "unisat",
            SIGNING
                .with(Capability::Bip322)
                .with(Capability::Inscribe)
                .with(Capability::SwitchNetwork)
                .with(Capability::Ordinals)
                .with(Capability::Brc20)
                .with(Capability::Runes),
            &Network::all(),
        ),
        descriptor(
            XVERSE,
            "Xverse Wallet",
            "https://www.xverse.app/download",
            "XverseProviders",
            SIGNING
                .with(Capability::Bip322)
                .with(Capability::Ordinals)
                .with(Capability::Runes),
            &[Network::Mainnet, Network::Testnet4, Network::Signet],
        ),
        descriptor(
            OYL,
            "Oyl Wallet",
            "https://www.oyl.io/",
            "oyl",
            SIGNING
                .with(Capability::Bip322)
                .with(Capability::Ordinals)
                .with(Capability::Brc20)
                .with(Capability::Runes),
            &[Network::Mainnet],
        ),
        descriptor(
            MAGIC_EDEN,
            "Magic Eden Wallet",
            "https://wallet.magiceden.io/",
            "magicEden",
            CapabilitySet::EMPTY
                .with(Capability::SignMessage)
                .with(Capability::SignPsbt)
                .with(Capability::Bip322)
                .with(Capability::Ordinals),
            &[Network::Mainnet],
        ),
        descriptor(
            OKX,
            "OKX Wallet",
            "https://www.okx.com/web3",
            "okxwallet",
            SIGNING
                .with(Capability::Bip322)
                .with(Capability::Inscribe)
                .with(Capability::Ordinals)
                .with(Capability::Brc20)
                .with(Capability::Runes),
            &[Network::Mainnet, Network::FractalMainnet],
        ),
        descriptor(
            LEATHER,
            "Leather Wallet",
            "https://leather.io/install-extension",
            "LeatherProvider",
            SIGNING.with(Capability::Ordinals),
            &[Network::Mainnet, Network::Testnet],
        ),
        descriptor(
            PHANTOM,
            "Phantom Wallet",
            "https://phantom.app/download",
            "phantom",
            SIGNING,
            &[Network::Mainnet],
        ),
        descriptor(
            WIZZ,
            "Wizz Wallet",
            "https://wizzwallet.io/#extension",
            "wizz",
            SIGNING
                .with(Capability::Inscribe)
                .with(Capability::SwitchNetwork)
                .with(Capability::Ordinals)
                .with(Capability::Brc20),
            &[
                Network::Mainnet,
                Network::Testnet,
                Network::Testnet4,
                Network::FractalMainnet,
            ],
        ),
        descriptor(
            ORANGE,
            "Orange Wallet",
            "https://www.orangewallet.com/",
            "OrangeBitcoinProvider",
            SIGNING.with(Capability::Ordinals),
            &[Network::Mainnet, Network::Testnet],
        ),
        descriptor(
            OP_NET,
            "OP_NET Wallet",
            "https://opnet.org/",
            "opnet",
            CapabilitySet::EMPTY
                .with(Capability::SignMessage)
                .with(Capability::SignPsbt),
            &[Network::Mainnet, Network::Testnet],
        ),
        descriptor(
            TOKEO,
            "Tokeo Wallet",
            "https://tokeo.io/",
            "tokeo",
            SIGNING.with(Capability::Runes),
            &[Network::Mainnet],
        ),
        descriptor(
            KEPLR,
            "Keplr Wallet",
            "https://keplr.app/download",
            "keplr",
            CapabilitySet::EMPTY
                .with(Capability::SignMessage)
                .with(Capability::SignPsbt),
            &[Network::Mainnet],
        ),
    ]
}

/// Look up a built-in descriptor by brand id.
pub fn find(id: &str) -> Option<WalletDescriptor> {
    builtin_descriptors().into_iter().find(|d| d.id == id)
}

/// The token a brand's injected API uses for a network. Most brands take
/// the canonical name; the legacy Unisat-style APIs call mainnet `livenet`.
/// Returns `None` when the brand does not recognize the network at all.
pub fn wire_token(wallet_id: &str, network: Network) -> Option<&'static str> {
    let descriptor = find(wallet_id)?;
    if !descriptor.supports_network(network) {
        return None;
    }
    match (wallet_id, network) {
        (UNISAT | OKX | WIZZ, Network::Mainnet) => Some("livenet"),
        (XVERSE, Network::Mainnet) => Some("Mainnet"),
        (XVERSE, Network::Testnet4) => Some("Testnet4"),
        (XVERSE, Network::Signet) => Some("Signet"),
        _ => Some(network.as_str()),
    }
}
