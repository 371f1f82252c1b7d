//! Connection state machine behavior against mock wallet backends.

mod common;

use common::*;
use corral::client::ConnectionStatus;
use corral::wallet::brands;
use corral::{Client, Error, Network};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn client_with(
    wallet_id: &str,
    backend: Arc<MockBackend>,
    source: Arc<MockSource>,
) -> Client {
    Client::builder(Network::Mainnet)
        .wallet(wallet_id, backend)
        .without_default_sources()
        .datasource(source)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn connect_populates_snapshot() {
    init_logs();
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(5_000)));
    let client = client_with(brands::UNISAT, backend, source).await;

    let snapshot = client.connect(brands::UNISAT).await.unwrap();

    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    assert_eq!(snapshot.provider.as_deref(), Some(brands::UNISAT));
    assert_eq!(snapshot.address.as_deref(), Some(ORD_MAIN));
    assert_eq!(snapshot.payment_address.as_deref(), Some(PAY_MAIN));
    assert!(snapshot.public_key.is_some());
    assert_eq!(snapshot.balance, Some(5_000));
    assert_eq!(snapshot.network, Network::Mainnet);
    assert_eq!(snapshot.accounts.len(), 2);
}

#[tokio::test]
async fn absent_wallet_yields_not_found_and_stays_disconnected() {
    let backend = Arc::new(MockBackend::unavailable(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend, source).await;

    let err = client.connect(brands::UNISAT).await.unwrap_err();
    assert!(matches!(err, Error::WalletNotFound(_)));
    assert_eq!(client.snapshot().status, ConnectionStatus::Disconnected);
    assert!(client.snapshot().address.is_none());
}

#[tokio::test]
async fn rejected_connect_passes_through_error_state() {
    let backend = Arc::new(MockBackend::rejecting(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend, source).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client.subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.status));

    let err = client.connect(brands::UNISAT).await.unwrap_err();
    assert!(matches!(err, Error::UserRejected));

    let statuses = seen.lock().unwrap().clone();
    assert_eq!(
        statuses,
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Error,
            ConnectionStatus::Disconnected,
        ]
    );
}

#[tokio::test]
async fn concurrent_connect_is_rejected_not_raced() {
    let backend = Arc::new(MockBackend::with_delay(
        Network::Mainnet,
        Duration::from_millis(100),
    ));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend.clone(), source).await;

    let (first, second) = tokio::join!(client.connect(brands::UNISAT), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.connect(brands::UNISAT).await
    });

    assert!(first.is_ok());
    assert!(matches!(second.unwrap_err(), Error::ConnectPending));
    // the second call never reached the wallet
    assert_eq!(backend.request_accounts_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.snapshot().status, ConnectionStatus::Connected);
}

#[tokio::test]
async fn disconnect_always_resets_to_empty_snapshot() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(9)));
    let client = client_with(brands::UNISAT, backend, source).await;

    // legal while already disconnected
    client.disconnect().await;
    assert_eq!(client.snapshot().status, ConnectionStatus::Disconnected);

    client.connect(brands::UNISAT).await.unwrap();
    assert!(client.snapshot().is_connected());

    client.disconnect().await;
    let snapshot = client.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
    assert!(snapshot.address.is_none());
    assert!(snapshot.balance.is_none());
    assert!(snapshot.accounts.is_empty());
    assert!(snapshot.provider.is_none());
}

#[tokio::test]
async fn reads_while_disconnected_issue_no_datasource_calls() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(1)));
    let client = client_with(brands::UNISAT, backend, source.clone()).await;

    assert!(matches!(
        client.get_balance().await.unwrap_err(),
        Error::NotConnected
    ));
    assert!(matches!(
        client.get_utxos().await.unwrap_err(),
        Error::NotConnected
    ));
    assert!(matches!(
        client.get_inscriptions().await.unwrap_err(),
        Error::NotConnected
    ));

    assert_eq!(source.balance_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.utxo_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.inscription_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn broadcast_without_finalize_never_reaches_the_wallet() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend.clone(), source).await;
    client.connect(brands::UNISAT).await.unwrap();

    let err = client
        .sign_psbt(RAW_TX_HEX, false, true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
    assert_eq!(backend.sign_psbt_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sign_and_broadcast_returns_txid_and_hits_datasource() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend.clone(), source.clone()).await;
    client.connect(brands::UNISAT).await.unwrap();

    let signed = client.sign_psbt(RAW_TX_HEX, true, true).await.unwrap();
    assert_eq!(signed.signed_hex, RAW_TX_HEX);
    assert!(!signed.signed_base64.is_empty());
    assert_eq!(signed.txid.as_deref(), Some("txid-broadcast"));
    assert_eq!(backend.sign_psbt_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.broadcast_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sign_without_broadcast_has_no_txid() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend, source.clone()).await;
    client.connect(brands::UNISAT).await.unwrap();

    let signed = client.sign_psbt(RAW_TX_HEX, true, false).await.unwrap();
    assert!(signed.txid.is_none());
    assert_eq!(source.broadcast_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn switch_network_unsupported_leaves_state_untouched() {
    // xverse declares no programmatic network switching
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::XVERSE, backend.clone(), source).await;
    client.connect(brands::XVERSE).await.unwrap();

    let err = client.switch_network(Network::Signet).await.unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));

    let snapshot = client.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    assert_eq!(snapshot.network, Network::Mainnet);
    assert_eq!(backend.switch_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn switch_network_rereads_accounts() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend.clone(), source).await;
    client.connect(brands::UNISAT).await.unwrap();
    assert_eq!(client.snapshot().address.as_deref(), Some(ORD_MAIN));

    let snapshot = client.switch_network(Network::Testnet).await.unwrap();

    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    assert_eq!(snapshot.network, Network::Testnet);
    // the wallet derives different addresses on the new network
    assert_eq!(snapshot.address.as_deref(), Some(TEST_ADDR));
    assert_eq!(backend.switch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn switch_network_requires_connected() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend, source).await;

    assert!(matches!(
        client.switch_network(Network::Testnet).await.unwrap_err(),
        Error::NotConnected
    ));
}

#[tokio::test]
async fn message_scheme_follows_address_script_type() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend, source).await;
    client.connect(brands::UNISAT).await.unwrap();

    // default signing address is the taproot ordinals address
    let sig = client.sign_message("hello", None).await.unwrap();
    assert_eq!(sig, "sig:Bip322Simple:hello");

    // the legacy payment address downgrades to plain ECDSA
    let sig = client.sign_message("hello", Some(PAY_MAIN)).await.unwrap();
    assert_eq!(sig, "sig:Ecdsa:hello");
}

#[tokio::test]
async fn segwit_message_falls_back_to_ecdsa_without_bip322() {
    // phantom declares no BIP-322 support
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::PHANTOM, backend, source).await;
    client.connect(brands::PHANTOM).await.unwrap();

    let sig = client
        .sign_message("hello", Some(SEGWIT_MAIN))
        .await
        .unwrap();
    assert_eq!(sig, "sig:Ecdsa:hello");
}

#[tokio::test]
async fn insufficient_funds_checked_before_the_wallet() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(1_000)));
    let client = client_with(brands::UNISAT, backend.clone(), source).await;
    client.connect(brands::UNISAT).await.unwrap();

    let err = client
        .send_bitcoin(SEGWIT_MAIN, 5_000)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds { .. }));
    assert_eq!(backend.send_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_recipient_checked_before_the_wallet() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(100_000)));
    let client = client_with(brands::UNISAT, backend.clone(), source).await;
    client.connect(brands::UNISAT).await.unwrap();

    let err = client
        .send_bitcoin("definitely-not-an-address", 1_000)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAddress(_)));

    // a testnet recipient is just as malformed on mainnet
    let err = client.send_bitcoin(TEST_ADDR, 1_000).await.unwrap_err();
    assert!(matches!(err, Error::InvalidAddress(_)));
    assert_eq!(backend.send_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn send_succeeds_with_funds() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(100_000)));
    let client = client_with(brands::UNISAT, backend.clone(), source).await;
    client.connect(brands::UNISAT).await.unwrap();

    let txid = client.send_bitcoin(SEGWIT_MAIN, 5_000).await.unwrap();
    assert_eq!(txid, "txid-send");
    assert_eq!(backend.send_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn inscribe_gated_on_capability() {
    // xverse does not declare inscription support
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::XVERSE, backend.clone(), source).await;
    client.connect(brands::XVERSE).await.unwrap();

    let err = client.inscribe("aGVsbG8=", "text/plain").await.unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
    assert_eq!(backend.inscribe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn inscribe_validates_content_before_the_wallet() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend.clone(), source).await;
    client.connect(brands::UNISAT).await.unwrap();

    let err = client
        .inscribe("!!!not-base64!!!", "text/plain")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));

    let err = client.inscribe("aGVsbG8=", "textplain").await.unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
    assert_eq!(backend.inscribe_calls.load(Ordering::SeqCst), 0);

    let txid = client.inscribe("aGVsbG8=", "text/plain").await.unwrap();
    assert_eq!(txid, "txid-inscribe");
}

#[tokio::test]
async fn concurrent_signing_is_refused() {
    let backend = Arc::new(MockBackend::with_delay(
        Network::Mainnet,
        Duration::from_millis(100),
    ));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(1_000_000)));
    let client = client_with(brands::UNISAT, backend.clone(), source).await;
    client.connect(brands::UNISAT).await.unwrap();

    let (first, second) = tokio::join!(client.send_bitcoin(SEGWIT_MAIN, 1_000), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.send_bitcoin(SEGWIT_MAIN, 1_000).await
    });

    assert!(first.is_ok());
    assert!(matches!(second.unwrap_err(), Error::SigningPending));
    assert_eq!(backend.send_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn late_connect_result_is_discarded_after_disconnect() {
    let backend = Arc::new(MockBackend::with_delay(
        Network::Mainnet,
        Duration::from_millis(100),
    ));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend, source).await;

    let (connect_result, _) = tokio::join!(client.connect(brands::UNISAT), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.disconnect().await;
    });

    assert!(matches!(
        connect_result.unwrap_err(),
        Error::NotConnected
    ));
    let snapshot = client.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
    assert!(snapshot.address.is_none());
}

#[tokio::test]
async fn unknown_brand_is_rejected_at_build() {
    let backend = Arc::new(MockBackend::new(Network::Mainnet));
    let err = Client::builder(Network::Mainnet)
        .wallet("definitely-not-a-wallet", backend)
        .without_default_sources()
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
}

#[tokio::test]
async fn install_probe_is_part_of_the_snapshot() {
    let present = Arc::new(MockBackend::new(Network::Mainnet));
    let absent = Arc::new(MockBackend::unavailable(Network::Mainnet));
    let client = Client::builder(Network::Mainnet)
        .wallet(brands::UNISAT, present)
        .wallet(brands::LEATHER, absent)
        .without_default_sources()
        .datasource(Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0))))
        .build()
        .await
        .unwrap();

    let snapshot = client.snapshot();
    assert_eq!(snapshot.installed.get(brands::UNISAT), Some(&true));
    assert_eq!(snapshot.installed.get(brands::LEATHER), Some(&false));
}

#[tokio::test]
async fn network_mismatch_without_switch_support() {
    // wallet reports testnet4, brand cannot switch programmatically
    let backend = Arc::new(MockBackend::new(Network::Testnet4));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::XVERSE, backend, source).await;

    let err = client.connect(brands::XVERSE).await.unwrap_err();
    assert!(matches!(err, Error::NetworkMismatch { .. }));
    assert_eq!(client.snapshot().status, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn mismatched_wallet_network_is_switched_when_supported() {
    // unisat can switch programmatically; the handshake heals the mismatch
    let backend = Arc::new(MockBackend::new(Network::Testnet));
    let source = Arc::new(MockSource::new("mock", 1, Behavior::Succeed(0)));
    let client = client_with(brands::UNISAT, backend.clone(), source).await;

    let snapshot = client.connect(brands::UNISAT).await.unwrap();
    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    assert_eq!(snapshot.network, Network::Mainnet);
    assert_eq!(backend.switch_calls.load(Ordering::SeqCst), 1);
}
