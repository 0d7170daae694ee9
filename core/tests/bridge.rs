/// Bridge provider against a fake extension on the other end of a duplex pipe.
use std::sync::Arc;
use std::time::Duration;

use monad_wallet_core::provider::methods;
use monad_wallet_core::{
    BridgeProvider, ChainConfig, ChainId, Provider, ProviderError, ProviderEvent, RpcRequest,
    SessionOptions, SessionState, WalletSession,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

const ALICE: &str = "0xABC0000000000000000000000000000000000001";

async fn read_json(stream: &mut DuplexStream) -> Option<Value> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.ok()?;
    let mut buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    stream.read_exact(&mut buf).await.ok()?;
    serde_json::from_slice(&buf).ok()
}

async fn write_json(stream: &mut DuplexStream, value: &Value) {
    let bytes = serde_json::to_vec(value).unwrap();
    stream
        .write_all(&(bytes.len() as u32).to_le_bytes())
        .await
        .unwrap();
    stream.write_all(&bytes).await.unwrap();
}

/// Answer every request with `handler(method, params)`; `Err` becomes an error frame.
fn serve<F>(mut stream: DuplexStream, mut handler: F)
where
    F: FnMut(&str, &Value) -> Result<Value, Value> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(req) = read_json(&mut stream).await {
            let id = req["id"].clone();
            let method = req["method"].as_str().unwrap_or_default().to_string();
            let reply = match handler(&method, &req["params"]) {
                Ok(result) => json!({ "id": id, "result": result }),
                Err(error) => json!({ "id": id, "error": error }),
            };
            write_json(&mut stream, &reply).await;
        }
    });
}

#[tokio::test]
async fn request_round_trip() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let provider = BridgeProvider::spawn(client);
    serve(server, |method, _| match method {
        "eth_chainId" => Ok(json!("0x279f")),
        _ => Err(json!({ "code": 4200, "message": "unsupported" })),
    });

    let res = provider
        .request(RpcRequest::bare(methods::CHAIN_ID))
        .await
        .unwrap();
    assert_eq!(res, json!("0x279f"));
}

#[tokio::test]
async fn null_result_is_success() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let provider = BridgeProvider::spawn(client);
    serve(server, |_, _| Ok(Value::Null));

    let res = provider
        .request(RpcRequest::new(
            methods::SWITCH_CHAIN,
            json!([{ "chainId": "0x279f" }]),
        ))
        .await
        .unwrap();
    assert!(res.is_null());
}

#[tokio::test]
async fn error_frame_maps_to_provider_error() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let provider = BridgeProvider::spawn(client);
    serve(server, |_, _| {
        Err(json!({ "code": 4001, "message": "User rejected the request." }))
    });

    let err = provider
        .request(RpcRequest::bare(methods::REQUEST_ACCOUNTS))
        .await
        .unwrap_err();
    assert_eq!(err.code, ProviderError::USER_REJECTED);
    assert_eq!(err.message, "User rejected the request.");
}

#[tokio::test]
async fn concurrent_requests_are_correlated_by_id() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let provider = Arc::new(BridgeProvider::spawn(client));

    // Answer two requests in reverse order.
    tokio::spawn(async move {
        let first = read_json(&mut server).await.unwrap();
        let second = read_json(&mut server).await.unwrap();
        for req in [second, first] {
            let reply = json!({ "id": req["id"], "result": req["method"] });
            write_json(&mut server, &reply).await;
        }
    });

    let (a, b) = tokio::join!(
        provider.request(RpcRequest::bare(methods::CHAIN_ID)),
        provider.request(RpcRequest::bare(methods::ACCOUNTS)),
    );
    assert_eq!(a.unwrap(), json!("eth_chainId"));
    assert_eq!(b.unwrap(), json!("eth_accounts"));
}

#[tokio::test]
async fn events_reach_subscribers() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let provider = BridgeProvider::spawn(client);
    let (tx, mut rx) = mpsc::unbounded_channel();
    provider.subscribe(tx);

    write_json(&mut server, &json!({ "event": "accountsChanged", "data": [ALICE] })).await;
    write_json(&mut server, &json!({ "event": "chainChanged", "data": "0x279F" })).await;
    write_json(&mut server, &json!({ "event": "connect", "data": {} })).await;

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert_eq!(first, Some(ProviderEvent::AccountsChanged(vec![ALICE.to_string()])));
    let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert_eq!(second, Some(ProviderEvent::ChainChanged(ChainId::MONAD_TESTNET)));
}

#[tokio::test]
async fn closed_stream_fails_pending_and_later_requests() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let provider = BridgeProvider::spawn(client);

    // Read the request, then hang up without answering.
    tokio::spawn(async move {
        let _ = read_json(&mut server).await;
        drop(server);
    });

    let err = provider
        .request(RpcRequest::bare(methods::REQUEST_ACCOUNTS))
        .await
        .unwrap_err();
    assert_eq!(err.code, ProviderError::DISCONNECTED);
    assert!(provider.is_closed());

    let err = provider
        .request(RpcRequest::bare(methods::CHAIN_ID))
        .await
        .unwrap_err();
    assert_eq!(err.code, ProviderError::DISCONNECTED);
}

#[tokio::test]
async fn half_closed_bridge_fails_fast() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let provider = BridgeProvider::spawn(client);

    // The extension stops sending but its read side stays open, so writes still succeed.
    server.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        while !provider.is_closed() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(1),
        provider.request(RpcRequest::bare(methods::CHAIN_ID)),
    )
    .await
    .expect("request must not hang on a closed bridge")
    .unwrap_err();
    assert_eq!(err.code, ProviderError::DISCONNECTED);
    drop(server);
}

#[tokio::test]
async fn session_over_bridge_adds_unknown_chain() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let provider: Arc<dyn Provider> = Arc::new(BridgeProvider::spawn(client));

    let mut known_monad = false;
    let mut active = "0x1";
    serve(server, move |method, params| match method {
        "eth_accounts" => Ok(json!([])),
        "eth_requestAccounts" => Ok(json!([ALICE])),
        "eth_chainId" => Ok(json!(active)),
        "wallet_switchEthereumChain" => {
            if known_monad && params[0]["chainId"] == "0x279f" {
                active = "0x279f";
                Ok(Value::Null)
            } else {
                Err(json!({ "code": 4902, "message": "Unrecognized chain ID" }))
            }
        }
        "wallet_addEthereumChain" => {
            known_monad = params[0]["chainName"] == "Monad Testnet";
            Ok(Value::Null)
        }
        _ => Err(json!({ "code": 4200, "message": "unsupported" })),
    });

    let (session, _listener) =
        WalletSession::start(Some(provider), ChainConfig::monad_testnet(), SessionOptions::default())
            .await;
    assert_eq!(session.state(), SessionState::Disconnected);

    let state = session.connect().await.unwrap();
    assert!(state.is_connected());
    assert!(!state.is_correct_network());

    let state = session.switch_network().await.unwrap();
    assert!(state.is_correct_network());
}
