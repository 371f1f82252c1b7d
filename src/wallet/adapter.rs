//! Normalizing adapter over an injected wallet backend
//!
//! The adapter is where brand quirks stop: capability gaps fail fast before
//! the wallet is ever invoked, input-shape problems are caught up front, and
//! the message-signing scheme is chosen from the address itself rather than
//! a caller-supplied flag.

use super::{Capability, WalletBackend, WalletDescriptor};
use crate::network::Network;
use crate::types::{Account, AddressPurpose, SignatureScheme, SignedPsbt};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, AddressType};
use log::{debug, warn};
use std::sync::{Arc, Mutex};

/// Floor added to the requested amount when pre-checking a spend against the
/// known balance: one-input/two-output P2WPKH at 1 sat/vB, rounded up. The
/// wallet extension chooses the real fee.
const SEND_FEE_FLOOR_SATS: u64 = 200;

#[derive(Debug, Clone)]
struct Session {
    accounts: Vec<Account>,
    network: Network,
}

/// Parse and network-check an address string.
fn validate_address(address: &str, network: Network) -> Result<Address> {
    let unchecked: Address<NetworkUnchecked> = address.parse()?;
    Ok(unchecked.require_network(network.to_bitcoin())?)
}

/// Choose the message-signing scheme for an address by inspecting its script
/// type: segwit and taproot outputs take BIP-322 simple, legacy outputs take
/// plain ECDSA.
pub fn scheme_for_address(address: &str, network: Network) -> Result<SignatureScheme> {
    let address = validate_address(address, network)?;
    match address.address_type() {
        Some(AddressType::P2pkh) | Some(AddressType::P2sh) => Ok(SignatureScheme::Ecdsa),
        // Unknown script types are future witness versions, all bech32m
        _ => Ok(SignatureScheme::Bip322Simple),
    }
}

/// One wallet brand behind the uniform operation set.
///
/// Adapters never share mutable state with one another; the connection
/// manager holds exactly one active adapter at a time.
pub struct WalletAdapter {
    descriptor: WalletDescriptor,
    backend: Arc<dyn WalletBackend>,
    session: Mutex<Option<Session>>,
}

impl WalletAdapter {
    pub fn new(descriptor: WalletDescriptor, backend: Arc<dyn WalletBackend>) -> Self {
        Self {
            descriptor,
            backend,
            session: Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &WalletDescriptor {
        &self.descriptor
    }

    /// Probe the host environment for the wallet capability.
    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    /// Perform the handshake with the injected wallet.
    ///
    /// If the wallet reports a different active network, the adapter switches
    /// it when the brand supports programmatic switching and otherwise fails
    /// with [`Error::NetworkMismatch`].
    pub async fn connect(&self, network: Network) -> Result<Vec<Account>> {
        if !self.descriptor.supports_network(network) {
            return Err(Error::unsupported(
                &self.descriptor.name,
                format!("network {network}"),
            ));
        }
        if !self.backend.is_available().await {
            return Err(Error::WalletNotFound(self.descriptor.name.clone()));
        }

        let mut accounts = self.backend.request_accounts(network).await?;

        // Some brands cannot report their network; trust the grant then.
        let active = match self.backend.current_network().await {
            Ok(active) => active,
            Err(err) => {
                debug!("{}: network query failed ({err}), assuming {network}", self.descriptor.id);
                network
            }
        };
        if active != network {
            if self.descriptor.supports(Capability::SwitchNetwork) {
                debug!("{}: wallet on {active}, switching to {network}", self.descriptor.id);
                self.backend.switch_network(network).await?;
                accounts = self.backend.request_accounts(network).await?;
            } else {
                return Err(Error::NetworkMismatch {
                    active,
                    requested: network,
                });
            }
        }

        if accounts.iter().all(|a| a.address.is_empty()) {
            return Err(Error::Provider(format!(
                "{} granted access but returned no accounts",
                self.descriptor.name
            )));
        }

        *self.session.lock().unwrap() = Some(Session {
            accounts: accounts.clone(),
            network,
        });
        Ok(accounts)
    }

    /// Forget the session. Always succeeds; a backend that errors on
    /// disconnect is only logged.
    pub async fn disconnect(&self) {
        self.session.lock().unwrap().take();
        if let Err(err) = self.backend.disconnect().await {
            warn!("{}: disconnect reported {err}", self.descriptor.id);
        }
    }

    /// Accounts granted by the last successful connect. Never re-prompts.
    pub fn accounts(&self) -> Vec<Account> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.accounts.clone())
            .unwrap_or_default()
    }

    pub fn connected_network(&self) -> Option<Network> {
        self.session.lock().unwrap().as_ref().map(|s| s.network)
    }

    fn account_for(&self, purpose: AddressPurpose) -> Option<Account> {
        let session = self.session.lock().unwrap();
        let session = session.as_ref()?;
        session
            .accounts
            .iter()
            .find(|a| a.purpose == purpose)
            .or_else(|| session.accounts.first())
            .cloned()
    }

    /// Ordinals address from the last successful connect.
    pub fn address(&self) -> Option<String> {
        self.account_for(AddressPurpose::Ordinals).map(|a| a.address)
    }

    /// Payment address from the last successful connect.
    pub fn payment_address(&self) -> Option<String> {
        self.account_for(AddressPurpose::Payment).map(|a| a.address)
    }

    pub fn public_key(&self) -> Option<String> {
        self.account_for(AddressPurpose::Ordinals)?.public_key
    }

    pub fn payment_public_key(&self) -> Option<String> {
        self.account_for(AddressPurpose::Payment)?.public_key
    }

    /// Sign a message with the scheme derived from the signing address.
    pub async fn sign_message(&self, message: &str, address: Option<&str>) -> Result<String> {
        if !self.descriptor.supports(Capability::SignMessage) {
            return Err(Error::unsupported(&self.descriptor.name, "message signing"));
        }
        let network = self.connected_network().ok_or(Error::NotConnected)?;
        let target = match address {
            Some(addr) => addr.to_string(),
            None => self.address().ok_or(Error::NotConnected)?,
        };

        let mut scheme = scheme_for_address(&target, network)?;
        if scheme == SignatureScheme::Bip322Simple && !self.descriptor.supports(Capability::Bip322)
        {
            warn!(
                "{}: no BIP-322 support, falling back to ECDSA for {target}",
                self.descriptor.id
            );
            scheme = SignatureScheme::Ecdsa;
        }
        self.backend.sign_message(message, &target, scheme).await
    }

    /// Sign a PSBT. The transaction hex is treated as opaque; broadcasting
    /// is performed by the data-source manager on the adapter's behalf, so
    /// the returned `txid` is always `None` here.
    pub async fn sign_psbt(
        &self,
        psbt_hex: &str,
        finalize: bool,
        broadcast: bool,
    ) -> Result<SignedPsbt> {
        if !self.descriptor.supports(Capability::SignPsbt) {
            return Err(Error::unsupported(&self.descriptor.name, "PSBT signing"));
        }
        if broadcast && !finalize {
            return Err(Error::InvalidParameter(
                "broadcast requires finalize: an unfinalized transaction cannot be broadcast"
                    .to_string(),
            ));
        }
        if self.session.lock().unwrap().is_none() {
            return Err(Error::NotConnected);
        }
        hex::decode(psbt_hex)?;

        let signed_hex = self.backend.sign_psbt(psbt_hex, finalize).await?;
        let signed_base64 = BASE64.encode(hex::decode(&signed_hex)?);
        Ok(SignedPsbt {
            signed_hex,
            signed_base64,
            txid: None,
        })
    }

    /// Build and send a simple payment through the wallet.
    ///
    /// The recipient is validated against the active network and, when the
    /// current balance is known, the spend is pre-checked so the wallet is
    /// never invoked for an amount it cannot cover.
    pub async fn send_bitcoin(
        &self,
        to: &str,
        amount_sats: u64,
        available_sats: Option<u64>,
    ) -> Result<String> {
        if !self.descriptor.supports(Capability::SendBitcoin) {
            return Err(Error::unsupported(&self.descriptor.name, "sending bitcoin"));
        }
        let network = self.connected_network().ok_or(Error::NotConnected)?;
        validate_address(to, network)?;
        if amount_sats == 0 {
            return Err(Error::InvalidParameter(
                "amount must be greater than zero".to_string(),
            ));
        }
        if let Some(available) = available_sats {
            let required = amount_sats.saturating_add(SEND_FEE_FLOOR_SATS);
            if required > available {
                return Err(Error::InsufficientFunds {
                    required,
                    available,
                });
            }
        }
        self.backend.send_bitcoin(to, amount_sats).await
    }

    /// Create an inscription. Fails fast on brands that do not declare
    /// inscription support instead of forwarding to a wallet that will
    /// reject it.
    pub async fn inscribe(&self, content_base64: &str, mime_type: &str) -> Result<String> {
        if !self.descriptor.supports(Capability::Inscribe) {
            return Err(Error::unsupported(&self.descriptor.name, "inscribing"));
        }
        if self.session.lock().unwrap().is_none() {
            return Err(Error::NotConnected);
        }
        BASE64
            .decode(content_base64)
            .map_err(|e| Error::InvalidParameter(format!("content is not valid base64: {e}")))?;
        if !mime_type.contains('/') {
            return Err(Error::InvalidParameter(format!(
                "malformed MIME type: {mime_type}"
            )));
        }
        self.backend.inscribe(content_base64, mime_type).await
    }

    /// Switch the wallet to another network and re-read the granted
    /// accounts, since some brands derive different addresses per network.
    ///
    /// Brands that cannot switch programmatically report a capability
    /// limitation, not a transient failure.
    pub async fn switch_network(&self, network: Network) -> Result<Vec<Account>> {
        if !self.descriptor.supports(Capability::SwitchNetwork) {
            return Err(Error::unsupported(&self.descriptor.name, "network switching"));
        }
        if !self.descriptor.supports_network(network) {
            return Err(Error::unsupported(
                &self.descriptor.name,
                format!("network {network}"),
            ));
        }
        if self.session.lock().unwrap().is_none() {
            return Err(Error::NotConnected);
        }

        self.backend.switch_network(network).await?;
        let accounts = self.backend.request_accounts(network).await?;
        *self.session.lock().unwrap() = Some(Session {
            accounts: accounts.clone(),
            network,
        });
        Ok(accounts)
    }
}
