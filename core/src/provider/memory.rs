/// In-process wallet provider.
///
/// Behaves like a browser wallet that answers instantly (or after a fixed
/// latency): accounts must be granted through `eth_requestAccounts`, switches
/// to unknown chains fail with 4902, and revocation can be turned off to model
/// wallets without `wallet_revokePermissions`. Used by the test suite and the
/// CLI's demo mode.
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::watch;

use super::{methods, EventSender, Listeners, Provider, ProviderError, ProviderEvent, RpcRequest, SubscriptionId};
use crate::chain::ChainId;

struct WalletState {
    accounts: Vec<String>,
    granted: bool,
    chain_id: ChainId,
    known_chains: Vec<ChainId>,
    balances: HashMap<String, u128>,
    reject_connections: bool,
    revoke_supported: bool,
    scripted_failures: HashMap<String, VecDeque<ProviderError>>,
    held: HashMap<String, watch::Sender<bool>>,
    requests: Vec<RpcRequest>,
}

pub struct MemoryProvider {
    state: Mutex<WalletState>,
    latency: Option<Duration>,
    listeners: Listeners,
}

impl MemoryProvider {
    /// Empty wallet on `chain_id`; only that chain is known.
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            state: Mutex::new(WalletState {
                accounts: Vec::new(),
                granted: false,
                chain_id,
                known_chains: vec![chain_id],
                balances: HashMap::new(),
                reject_connections: false,
                revoke_supported: true,
                scripted_failures: HashMap::new(),
                held: HashMap::new(),
                requests: Vec::new(),
            }),
            latency: None,
            listeners: Listeners::default(),
        }
    }

    pub fn with_account(self, account: &str) -> Self {
        self.lock().accounts.push(account.to_string());
        self
    }

    /// Start with permissions already granted, as after a previous visit.
    pub fn with_granted_permissions(self) -> Self {
        self.lock().granted = true;
        self
    }

    pub fn with_known_chain(self, chain_id: ChainId) -> Self {
        {
            let mut state = self.lock();
            if !state.known_chains.contains(&chain_id) {
                state.known_chains.push(chain_id);
            }
        }
        self
    }

    pub fn with_balance(self, account: &str, wei: u128) -> Self {
        self.lock().balances.insert(account.to_lowercase(), wei);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn without_revoke_support(self) -> Self {
        self.lock().revoke_supported = false;
        self
    }

    /// Make `eth_requestAccounts` fail with 4001 until turned off again.
    pub fn reject_connections(&self, reject: bool) {
        self.lock().reject_connections = reject;
    }

    /// Queue a one-shot failure for the next request to `method`.
    pub fn fail_next(&self, method: &str, error: ProviderError) {
        self.lock()
            .scripted_failures
            .entry(method.to_string())
            .or_default()
            .push_back(error);
    }

    /// Park every request to `method` until [`release`](Self::release).
    /// Parked requests are already listed in [`requests`](Self::requests).
    pub fn hold(&self, method: &str) {
        self.lock()
            .held
            .entry(method.to_string())
            .or_insert_with(|| watch::channel(false).0);
    }

    pub fn release(&self, method: &str) {
        if let Some(gate) = self.lock().held.remove(method) {
            gate.send_replace(true);
        }
    }

    /// Replace the account list and notify observers, like a user picking a
    /// different account (or locking the wallet, for an empty list).
    pub fn set_accounts(&self, accounts: &[&str]) {
        let accounts: Vec<String> = accounts.iter().map(|a| a.to_string()).collect();
        {
            let mut state = self.lock();
            state.accounts = accounts.clone();
            if accounts.is_empty() {
                state.granted = false;
            }
        }
        self.listeners.emit(&ProviderEvent::AccountsChanged(accounts));
    }

    /// Change the active chain from the wallet side and notify observers.
    pub fn set_chain(&self, chain_id: ChainId) {
        {
            let mut state = self.lock();
            state.chain_id = chain_id;
            if !state.known_chains.contains(&chain_id) {
                state.known_chains.push(chain_id);
            }
        }
        self.listeners.emit(&ProviderEvent::ChainChanged(chain_id));
    }

    pub fn emit(&self, event: ProviderEvent) {
        self.listeners.emit(&event);
    }

    pub fn chain_id(&self) -> ChainId {
        self.lock().chain_id
    }

    pub fn is_granted(&self) -> bool {
        self.lock().granted
    }

    pub fn knows_chain(&self, chain_id: ChainId) -> bool {
        self.lock().known_chains.contains(&chain_id)
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<RpcRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests received for `method`.
    pub fn request_count(&self, method: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, request: &RpcRequest) -> Result<Value, ProviderError> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.lock();
            if let Some(err) = state
                .scripted_failures
                .get_mut(&request.method)
                .and_then(|q| q.pop_front())
            {
                return Err(err);
            }

            match request.method.as_str() {
                methods::REQUEST_ACCOUNTS => {
                    if state.reject_connections {
                        Err(ProviderError::user_rejected())
                    } else {
                        state.granted = true;
                        Ok(json!(state.accounts))
                    }
                }
                methods::ACCOUNTS => {
                    if state.granted {
                        Ok(json!(state.accounts))
                    } else {
                        Ok(json!([]))
                    }
                }
                methods::CHAIN_ID => Ok(json!(state.chain_id.to_hex())),
                methods::GET_BALANCE => {
                    let account = request
                        .params
                        .get(0)
                        .and_then(Value::as_str)
                        .ok_or_else(|| ProviderError::invalid_params("Missing account."))?;
                    let wei = state
                        .balances
                        .get(&account.to_lowercase())
                        .copied()
                        .unwrap_or(0);
                    Ok(json!(format!("{wei:#x}")))
                }
                methods::SWITCH_CHAIN => {
                    let target = chain_id_param(request)?;
                    if !state.known_chains.contains(&target) {
                        Err(ProviderError::unrecognized_chain(target))
                    } else {
                        if state.chain_id != target {
                            state.chain_id = target;
                            events.push(ProviderEvent::ChainChanged(target));
                        }
                        Ok(Value::Null)
                    }
                }
                methods::ADD_CHAIN => {
                    let target = chain_id_param(request)?;
                    if !state.known_chains.contains(&target) {
                        state.known_chains.push(target);
                    }
                    Ok(Value::Null)
                }
                methods::REVOKE_PERMISSIONS => {
                    if state.revoke_supported {
                        state.granted = false;
                        Ok(Value::Null)
                    } else {
                        Err(ProviderError::unsupported_method(&request.method))
                    }
                }
                other => Err(ProviderError::unsupported_method(other)),
            }
        };

        for event in &events {
            self.listeners.emit(event);
        }
        result
    }
}

/// Extract `params[0].chainId` from a switch/add request.
fn chain_id_param(request: &RpcRequest) -> Result<ChainId, ProviderError> {
    let raw = request
        .params
        .get(0)
        .and_then(|p| p.get("chainId"))
        .ok_or_else(|| ProviderError::invalid_params("Missing chainId."))?;
    ChainId::from_json(raw).map_err(|e| ProviderError::invalid_params(e.to_string()))
}

impl Provider for MemoryProvider {
    fn request(&self, request: RpcRequest) -> BoxFuture<'_, Result<Value, ProviderError>> {
        Box::pin(async move {
            let gate = {
                let mut state = self.lock();
                state.requests.push(request.clone());
                state.held.get(&request.method).map(watch::Sender::subscribe)
            };
            if let Some(mut gate) = gate {
                // Released or dropped, either way the request proceeds.
                let _ = gate.wait_for(|open| *open).await;
            }
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.handle(&request)
        })
    }

    fn subscribe(&self, sender: EventSender) -> SubscriptionId {
        self.listeners.add(sender)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";

    async fn call(provider: &MemoryProvider, method: &str, params: Value) -> Result<Value, ProviderError> {
        provider.request(RpcRequest::new(method, params)).await
    }

    #[tokio::test]
    async fn accounts_hidden_until_granted() {
        let provider = MemoryProvider::new(ChainId::new(1)).with_account(ACCOUNT);
        assert_eq!(call(&provider, methods::ACCOUNTS, json!([])).await.unwrap(), json!([]));

        let granted = call(&provider, methods::REQUEST_ACCOUNTS, json!([])).await.unwrap();
        assert_eq!(granted, json!([ACCOUNT]));
        assert_eq!(call(&provider, methods::ACCOUNTS, json!([])).await.unwrap(), json!([ACCOUNT]));
    }

    #[tokio::test]
    async fn switch_to_unknown_chain_fails_with_4902() {
        let provider = MemoryProvider::new(ChainId::new(1));
        let err = call(&provider, methods::SWITCH_CHAIN, json!([{ "chainId": "0x279f" }]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderError::UNRECOGNIZED_CHAIN);

        call(&provider, methods::ADD_CHAIN, json!([{ "chainId": "0x279F" }]))
            .await
            .unwrap();
        call(&provider, methods::SWITCH_CHAIN, json!([{ "chainId": "0x279f" }]))
            .await
            .unwrap();
        assert_eq!(provider.chain_id(), ChainId::MONAD_TESTNET);
    }

    #[tokio::test]
    async fn switch_emits_chain_changed() {
        let provider = MemoryProvider::new(ChainId::new(1)).with_known_chain(ChainId::MONAD_TESTNET);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        provider.subscribe(tx);

        call(&provider, methods::SWITCH_CHAIN, json!([{ "chainId": "0x279f" }]))
            .await
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), ProviderEvent::ChainChanged(ChainId::MONAD_TESTNET));
    }

    #[tokio::test]
    async fn scripted_failure_is_one_shot() {
        let provider = MemoryProvider::new(ChainId::new(1));
        provider.fail_next(methods::CHAIN_ID, ProviderError::disconnected("gone"));
        assert!(call(&provider, methods::CHAIN_ID, json!([])).await.is_err());
        assert_eq!(call(&provider, methods::CHAIN_ID, json!([])).await.unwrap(), json!("0x1"));
    }

    #[tokio::test]
    async fn revoke_unsupported() {
        let provider = MemoryProvider::new(ChainId::new(1)).without_revoke_support();
        let err = call(&provider, methods::REVOKE_PERMISSIONS, json!([{ "eth_accounts": {} }]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderError::UNSUPPORTED_METHOD);
    }

    #[tokio::test]
    async fn held_request_waits_for_release() {
        let provider = std::sync::Arc::new(MemoryProvider::new(ChainId::new(1)));
        provider.hold(methods::CHAIN_ID);

        let pending = {
            let provider = provider.clone();
            tokio::spawn(async move { call(&provider, methods::CHAIN_ID, json!([])).await })
        };
        while provider.request_count(methods::CHAIN_ID) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!pending.is_finished());

        provider.release(methods::CHAIN_ID);
        assert_eq!(pending.await.unwrap().unwrap(), json!("0x1"));
        // Later requests are not held.
        assert_eq!(call(&provider, methods::CHAIN_ID, json!([])).await.unwrap(), json!("0x1"));
    }

    #[tokio::test]
    async fn balance_is_hex_quantity() {
        let provider = MemoryProvider::new(ChainId::new(1)).with_balance(ACCOUNT, 255);
        let res = call(&provider, methods::GET_BALANCE, json!([ACCOUNT, "latest"])).await.unwrap();
        assert_eq!(res, json!("0xff"));
    }
}
