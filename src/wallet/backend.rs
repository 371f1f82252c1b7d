//! The injected wallet capability surface
//!
//! A [`WalletBackend`] is the externally-injected object a wallet extension
//! exposes, one implementation per brand, supplied by the host environment.
//! Implementations translate each brand's exact shape (method names,
//! network vocabulary, error strings) into this normalized contract; nothing
//! above this trait ever sees a brand-specific surface.

use crate::network::Network;
use crate::types::{Account, SignatureScheme};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// Probe whether the wallet capability is present in the host
    /// environment. This is a live probe, not a cached flag.
    async fn is_available(&self) -> bool;

    /// Request account access. A human may take arbitrary time to approve or
    /// reject in the extension UI, so this call is not time-boxed.
    async fn request_accounts(&self, network: Network) -> Result<Vec<Account>>;

    /// The network the wallet is currently on.
    async fn current_network(&self) -> Result<Network>;

    /// Ask the wallet to switch networks. Brands that cannot switch
    /// programmatically return [`crate::Error::Unsupported`].
    async fn switch_network(&self, network: Network) -> Result<()>;

    /// Sign a message with the given scheme. The scheme has already been
    /// chosen by the adapter from the address's script type.
    async fn sign_message(
        &self,
        message: &str,
        address: &str,
        scheme: SignatureScheme,
    ) -> Result<String>;

    /// Sign a PSBT, returning the signed transaction hex. `finalize` asks
    /// the wallet to also finalize every input it signed.
    async fn sign_psbt(&self, psbt_hex: &str, finalize: bool) -> Result<String>;

    /// Build, sign, and broadcast a simple payment. Returns the txid.
    async fn send_bitcoin(&self, to: &str, amount_sats: u64) -> Result<String>;

    /// Create an inscription reveal for the given content. Returns the txid.
    async fn inscribe(&self, content_base64: &str, mime_type: &str) -> Result<String>;

    /// Release the session. Many brands have no notion of disconnecting;
    /// the default is a no-op.
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    /// Wallet-reported balance in sats, where the brand exposes one.
    async fn balance(&self) -> Result<Option<u64>> {
        Ok(None)
    }
}
