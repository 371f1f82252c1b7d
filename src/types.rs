//! Common data model shared by the wallet and data-source layers
//!
//! Every data-source adapter translates its provider-specific response shape
//! into these types before returning, so the manager and its callers stay
//! provider-agnostic. Wallet adapters likewise normalize account material
//! into [`Account`] values.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// An unspent transaction output. Immutable once fetched; a fresh fetch
/// replaces, never patches, the prior set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
    pub confirmed: bool,
}

/// Normalized transaction lookup result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub txid: String,
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub block_time: Option<u64>,
    /// Fee in satoshis, where the provider reports it
    pub fee: Option<u64>,
}

/// An inscription attached to a satoshi, as reported by an ordinals-capable
/// data source. Read-only projection; never mutated by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inscription {
    pub id: String,
    pub number: Option<i64>,
    pub address: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// Outpoint currently holding the inscription, `txid:vout`
    pub output: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Fungible-token protocols layered on top of Bitcoin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenProtocol {
    Brc20,
    Runes,
}

impl TokenProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenProtocol::Brc20 => "brc20",
            TokenProtocol::Runes => "runes",
        }
    }
}

impl fmt::Display for TokenProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "brc20" | "brc-20" => Ok(TokenProtocol::Brc20),
            "runes" | "rune" => Ok(TokenProtocol::Runes),
            _ => Err(Error::InvalidParameter(format!(
                "unknown token protocol: {s}"
            ))),
        }
    }
}

/// A BRC-20 or Rune token balance held by an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaBalance {
    pub protocol: TokenProtocol,
    /// Protocol-level identifier: the ticker for BRC-20, `block:tx` for runes
    pub id: String,
    pub symbol: Option<String>,
    /// Raw balance in the token's atomic unit
    pub balance: u128,
    pub divisibility: u8,
}

/// Fee estimate, normalized to sat/vB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub fee_rate: f32,
    pub target_blocks: u32,
}

/// Result of a PSBT signing call. `txid` is present only when the call also
/// broadcast the finalized transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPsbt {
    pub signed_hex: String,
    pub signed_base64: String,
    pub txid: Option<String>,
}

/// What an address is used for within a wallet. Several brands expose a
/// taproot address for ordinals alongside a segwit payment address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressPurpose {
    Ordinals,
    Payment,
}

/// One account granted by a wallet during connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub public_key: Option<String>,
    pub purpose: AddressPurpose,
}

/// Message-signing schemes. The scheme is chosen by inspecting the signing
/// address, never by a caller-supplied flag; several wallet brands reject
/// the wrong scheme silently or with a cryptic error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureScheme {
    Ecdsa,
    Bip322Simple,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_protocol_parsing() {
        assert_eq!("brc-20".parse::<TokenProtocol>().unwrap(), TokenProtocol::Brc20);
        assert_eq!("runes".parse::<TokenProtocol>().unwrap(), TokenProtocol::Runes);
        assert!("erc20".parse::<TokenProtocol>().is_err());
    }

    #[test]
    fn test_utxo_serde_round_trip() {
        let utxo = Utxo {
            txid: "ab".repeat(32),
            vout: 1,
            value: 546,
            confirmed: true,
        };
        let json = serde_json::to_string(&utxo).unwrap();
        assert_eq!(serde_json::from_str::<Utxo>(&json).unwrap(), utxo);
    }
}
