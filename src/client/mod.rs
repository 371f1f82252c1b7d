//! Wallet connection manager
//!
//! The [`Client`] owns the connection state machine, the currently-selected
//! wallet adapter, and the reactive snapshot. Signing, sending, and
//! inscribing delegate to the active adapter; blockchain reads go through
//! the data-source manager. `connect` and sign/send calls are serialized so
//! two concurrent handshakes (or a double-click double-spend) can never
//! race; data-source reads carry no such exclusivity and may overlap.

mod state;
mod store;

pub use state::{ConnectionStatus, Snapshot};
pub use store::{StateStore, SubscriptionId};

use crate::datasource::{DataSource, DataSourceManager};
use crate::network::Network;
use crate::types::{Inscription, MetaBalance, SignedPsbt, TokenProtocol, Utxo};
use crate::wallet::{brands, Capability, WalletAdapter, WalletBackend, WalletDescriptor};
use crate::{Error, Result};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// RAII guard over an exclusivity flag; releases on drop.
struct Flag<'a>(&'a AtomicBool);

impl<'a> Flag<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then(|| Flag(flag))
    }
}

impl Drop for Flag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Builder for [`Client`]. The network is a required construction
/// parameter; it is never inferred.
pub struct ClientBuilder {
    network: Network,
    wallets: Vec<(Option<WalletDescriptor>, String, Arc<dyn WalletBackend>)>,
    sources: Vec<Arc<dyn DataSource>>,
    maestro_api_key: Option<String>,
    default_sources: bool,
    cache_ttl: Duration,
    call_timeout: Duration,
}

impl ClientBuilder {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            wallets: Vec::new(),
            sources: Vec::new(),
            maestro_api_key: None,
            default_sources: true,
            cache_ttl: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Attach the injected backend for a built-in wallet brand.
    pub fn wallet(mut self, id: impl Into<String>, backend: Arc<dyn WalletBackend>) -> Self {
        self.wallets.push((None, id.into(), backend));
        self
    }

    /// Attach a wallet with a caller-supplied descriptor.
    pub fn custom_wallet(
        mut self,
        descriptor: WalletDescriptor,
        backend: Arc<dyn WalletBackend>,
    ) -> Self {
        let id = descriptor.id.clone();
        self.wallets.push((Some(descriptor), id, backend));
        self
    }

    /// Register an additional data source alongside the built-in set.
    pub fn datasource(mut self, source: Arc<dyn DataSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn maestro_api_key(mut self, key: impl Into<String>) -> Self {
        self.maestro_api_key = Some(key.into());
        self
    }

    /// Skip the built-in provider set; only explicitly registered sources
    /// participate in routing.
    pub fn without_default_sources(mut self) -> Self {
        self.default_sources = false;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Build the client, probing each attached backend once for
    /// availability. The probe map is immutable for the client's lifetime.
    pub async fn build(self) -> Result<Client> {
        let datasources = Arc::new(DataSourceManager::with_tuning(
            self.cache_ttl,
            self.call_timeout,
        ));
        if self.default_sources {
            datasources.register_defaults(self.maestro_api_key.as_deref());
        }
        for source in self.sources {
            datasources.register(source);
        }

        let mut adapters = HashMap::new();
        let mut installed = BTreeMap::new();
        for (descriptor, id, backend) in self.wallets {
            let descriptor = match descriptor {
                Some(descriptor) => descriptor,
                None => brands::find(&id).ok_or_else(|| {
                    Error::InvalidParameter(format!("unknown wallet brand: {id}"))
                })?,
            };
            let adapter = Arc::new(WalletAdapter::new(descriptor, backend));
            installed.insert(id.clone(), adapter.is_available().await);
            adapters.insert(id, adapter);
        }

        let store = Arc::new(StateStore::new(Snapshot::disconnected(
            self.network,
            installed,
        )));
        Ok(Client {
            adapters,
            datasources,
            store,
            active: Mutex::new(None),
            connecting: AtomicBool::new(false),
            signing: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        })
    }
}

/// The wallet connection manager.
pub struct Client {
    adapters: HashMap<String, Arc<WalletAdapter>>,
    datasources: Arc<DataSourceManager>,
    store: Arc<StateStore>,
    active: Mutex<Option<Arc<WalletAdapter>>>,
    connecting: AtomicBool,
    signing: AtomicBool,
    epoch: AtomicU64,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder(network: Network) -> ClientBuilder {
        ClientBuilder::new(network)
    }

    /// The reactive state store. UI layers subscribe here.
    pub fn store(&self) -> Arc<StateStore> {
        self.store.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&Snapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.store.subscribe(listener)
    }

    /// Descriptors of every attached wallet brand.
    pub fn wallets(&self) -> Vec<WalletDescriptor> {
        self.adapters
            .values()
            .map(|a| a.descriptor().clone())
            .collect()
    }

    /// The data-source manager, for direct reads, provider overrides, and
    /// runtime registration of custom sources.
    pub fn datasources(&self) -> &Arc<DataSourceManager> {
        &self.datasources
    }

    fn active_adapter(&self) -> Result<Arc<WalletAdapter>> {
        if self.store.snapshot().status != ConnectionStatus::Connected {
            return Err(Error::NotConnected);
        }
        self.active
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::NotConnected)
    }

    /// Address and network to read against; fails fast while not connected
    /// so no data-source call is ever issued with an empty address.
    fn read_target(&self) -> Result<(String, Network)> {
        let snapshot = self.store.snapshot();
        if snapshot.status != ConnectionStatus::Connected {
            return Err(Error::NotConnected);
        }
        let address = snapshot.address.ok_or(Error::NotConnected)?;
        Ok((address, snapshot.network))
    }

    /// Connect to a wallet brand by id.
    ///
    /// Legal from `Disconnected` and from `Connected` (switching wallets).
    /// A second `connect` while one is in flight is rejected with
    /// [`Error::ConnectPending`] rather than racing a second handshake.
    pub async fn connect(&self, wallet_id: &str) -> Result<Snapshot> {
        let adapter = self
            .adapters
            .get(wallet_id)
            .cloned()
            .ok_or_else(|| Error::WalletNotFound(wallet_id.to_string()))?;

        let _guard = Flag::acquire(&self.connecting).ok_or(Error::ConnectPending)?;

        // switching wallets: release the previous adapter and discard any
        // in-flight results addressed to it
        let previous = self.active.lock().unwrap().take();
        if let Some(previous) = previous {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            previous.disconnect().await;
            self.store.update(|s| s.reset());
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let network = self.store.snapshot().network;
        self.store.update(|s| {
            s.status = ConnectionStatus::Connecting;
            s.provider = Some(wallet_id.to_string());
            s.last_error = None;
        });

        match adapter.connect(network).await {
            Ok(accounts) => {
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    // disconnected while the handshake was in flight
                    adapter.disconnect().await;
                    return Err(Error::NotConnected);
                }
                *self.active.lock().unwrap() = Some(adapter.clone());
                self.store.update(|s| {
                    s.status = ConnectionStatus::Connected;
                    s.address = adapter.address();
                    s.payment_address = adapter.payment_address();
                    s.public_key = adapter.public_key();
                    s.payment_public_key = adapter.payment_public_key();
                    s.accounts = accounts;
                    s.balance = None;
                });
                debug!("connected to {wallet_id} on {network}");

                // initial balance; a failed read stays None and a later
                // get_balance surfaces the typed error
                if let Some(address) = adapter.address() {
                    match self.datasources.get_balance(&address, network, None).await {
                        Ok(balance) => {
                            if self.epoch.load(Ordering::SeqCst) == epoch {
                                self.store.update(|s| s.balance = Some(balance));
                            }
                        }
                        Err(err) => warn!("initial balance read failed: {err}"),
                    }
                }
                Ok(self.store.snapshot())
            }
            Err(err) => {
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    self.store.update(|s| {
                        s.status = ConnectionStatus::Error;
                        s.last_error = Some(err.to_string());
                    });
                    self.store.update(|s| s.reset());
                }
                Err(err)
            }
        }
    }

    /// Drop the active adapter and reset the snapshot. Always legal; any
    /// late-arriving result from a call issued before this point is
    /// discarded rather than applied to the cleared snapshot.
    pub async fn disconnect(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let adapter = self.active.lock().unwrap().take();
        if let Some(adapter) = adapter {
            adapter.disconnect().await;
        }
        self.store.update(|s| s.reset());
    }

    /// Switch the active wallet to another network.
    ///
    /// Valid only while `Connected`. A brand that cannot switch
    /// programmatically yields [`Error::Unsupported`] with the state left
    /// `Connected` on its prior network.
    pub async fn switch_network(&self, network: Network) -> Result<Snapshot> {
        let adapter = self.active_adapter()?;
        let descriptor = adapter.descriptor();
        if !descriptor.supports(Capability::SwitchNetwork) {
            return Err(Error::unsupported(&descriptor.name, "network switching"));
        }
        if !descriptor.supports_network(network) {
            return Err(Error::unsupported(
                &descriptor.name,
                format!("network {network}"),
            ));
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.store
            .update(|s| s.status = ConnectionStatus::SwitchingNetwork);

        match adapter.switch_network(network).await {
            Ok(accounts) => {
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    return Err(Error::NotConnected);
                }
                self.store.update(|s| {
                    s.status = ConnectionStatus::Connected;
                    s.network = network;
                    s.address = adapter.address();
                    s.payment_address = adapter.payment_address();
                    s.public_key = adapter.public_key();
                    s.payment_public_key = adapter.payment_public_key();
                    s.accounts = accounts;
                    s.balance = None;
                });
                Ok(self.store.snapshot())
            }
            Err(err) => {
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    self.store.update(|s| s.status = ConnectionStatus::Connected);
                }
                Err(err)
            }
        }
    }

    /// Sign a message with the active wallet.
    pub async fn sign_message(&self, message: &str, address: Option<&str>) -> Result<String> {
        let adapter = self.active_adapter()?;
        adapter.sign_message(message, address).await
    }

    /// Sign (and optionally broadcast) a PSBT.
    ///
    /// `broadcast` without `finalize` is rejected before any adapter is
    /// reached. While one sign/send call is outstanding, a second is
    /// refused with [`Error::SigningPending`].
    pub async fn sign_psbt(
        &self,
        psbt_hex: &str,
        finalize: bool,
        broadcast: bool,
    ) -> Result<SignedPsbt> {
        if broadcast && !finalize {
            return Err(Error::InvalidParameter(
                "broadcast requires finalize: an unfinalized transaction cannot be broadcast"
                    .to_string(),
            ));
        }
        let adapter = self.active_adapter()?;
        let _guard = Flag::acquire(&self.signing).ok_or(Error::SigningPending)?;

        let mut signed = adapter.sign_psbt(psbt_hex, finalize, broadcast).await?;
        if broadcast {
            let snapshot = self.store.snapshot();
            let txid = self
                .datasources
                .broadcast_transaction(&signed.signed_hex, snapshot.network, None)
                .await?;
            for address in [&snapshot.address, &snapshot.payment_address].into_iter().flatten() {
                self.datasources.invalidate_address(address, snapshot.network);
            }
            signed.txid = Some(txid);
        }
        Ok(signed)
    }

    /// Send a simple payment through the active wallet.
    pub async fn send_bitcoin(&self, to: &str, amount_sats: u64) -> Result<String> {
        let adapter = self.active_adapter()?;
        let _guard = Flag::acquire(&self.signing).ok_or(Error::SigningPending)?;
        let (address, network) = self.read_target()?;

        let available = match self.store.snapshot().balance {
            Some(balance) => Some(balance),
            None => self
                .datasources
                .get_balance(&address, network, None)
                .await
                .ok(),
        };
        let txid = adapter.send_bitcoin(to, amount_sats, available).await?;

        let snapshot = self.store.snapshot();
        for addr in [&snapshot.address, &snapshot.payment_address].into_iter().flatten() {
            self.datasources.invalidate_address(addr, network);
        }
        Ok(txid)
    }

    /// Create an inscription through the active wallet.
    pub async fn inscribe(&self, content_base64: &str, mime_type: &str) -> Result<String> {
        let adapter = self.active_adapter()?;
        let _guard = Flag::acquire(&self.signing).ok_or(Error::SigningPending)?;
        let (address, network) = self.read_target()?;

        let txid = adapter.inscribe(content_base64, mime_type).await?;
        self.datasources.invalidate_address(&address, network);
        Ok(txid)
    }

    /// Balance of the connected address, routed through the data sources.
    pub async fn get_balance(&self) -> Result<u64> {
        let (address, network) = self.read_target()?;
        let epoch = self.epoch.load(Ordering::SeqCst);
        let balance = self.datasources.get_balance(&address, network, None).await?;
        if self.epoch.load(Ordering::SeqCst) == epoch {
            self.store.update(|s| s.balance = Some(balance));
        }
        Ok(balance)
    }

    /// UTXOs of the connected address. Each fetch replaces, never patches,
    /// the prior set.
    pub async fn get_utxos(&self) -> Result<Vec<Utxo>> {
        let (address, network) = self.read_target()?;
        self.datasources.get_utxos(&address, network, None).await
    }

    pub async fn get_inscriptions(&self) -> Result<Vec<Inscription>> {
        let (address, network) = self.read_target()?;
        self.datasources
            .get_inscriptions(&address, network, None)
            .await
    }

    pub async fn get_meta_balances(&self, protocol: TokenProtocol) -> Result<Vec<MetaBalance>> {
        let (address, network) = self.read_target()?;
        self.datasources
            .get_meta_balances(&address, protocol, network, None)
            .await
    }
}
