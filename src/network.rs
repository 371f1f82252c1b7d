//! Network identifiers shared by the wallet and data-source layers
//!
//! Both layers speak the same closed enumeration. A wallet or provider that
//! does not recognize a given network reports a capability error instead of
//! silently defaulting to mainnet; the network is always an explicit
//! parameter or construction-time value, never inferred.

use crate::{Error, Result};
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// The networks corral can operate on.
///
/// Fractal networks reuse mainnet address encoding and testnet4 reuses
/// testnet encoding, so every variant maps onto a `bitcoin::Network` for
/// address validation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Mainnet,
    Testnet,
    Testnet4,
    Signet,
    FractalMainnet,
    FractalTestnet,
}

impl Network {
    /// All supported networks, in declaration order.
    pub fn all() -> [Network; 6] {
        [
            Network::Mainnet,
            Network::Testnet,
            Network::Testnet4,
            Network::Signet,
            Network::FractalMainnet,
            Network::FractalTestnet,
        ]
    }

    /// The `bitcoin` crate network governing address encoding.
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            Network::Mainnet | Network::FractalMainnet => bitcoin::Network::Bitcoin,
            Network::Testnet | Network::Testnet4 | Network::FractalTestnet => {
                bitcoin::Network::Testnet
            }
            Network::Signet => bitcoin::Network::Signet,
        }
    }

    /// Canonical string form, also used as the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Testnet4 => "testnet4",
            Network::Signet => "signet",
            Network::FractalMainnet => "fractal-mainnet",
            Network::FractalTestnet => "fractal-testnet",
        }
    }

    pub fn is_testnet(self) -> bool {
        matches!(
            self,
            Network::Testnet | Network::Testnet4 | Network::Signet | Network::FractalTestnet
        )
    }

    pub fn is_fractal(self) -> bool {
        matches!(self, Network::FractalMainnet | Network::FractalTestnet)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" | "bitcoin" | "livenet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "testnet4" => Ok(Network::Testnet4),
            "signet" => Ok(Network::Signet),
            "fractal-mainnet" | "fractal" => Ok(Network::FractalMainnet),
            "fractal-testnet" => Ok(Network::FractalTestnet),
            _ => Err(Error::InvalidParameter(format!("unknown network: {s}"))),
        }
    }
}
