/// Wallet provider capability: the EIP-1193 surface the session talks to.
///
/// The session never reaches for a global provider object; it is handed an
/// `Arc<dyn Provider>` and registers for events through a [`Subscription`]
/// that unregisters itself on drop.
mod bridge;
mod memory;

pub use bridge::BridgeProvider;
pub use memory::MemoryProvider;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::chain::ChainId;

/// JSON-RPC method names used by the session.
pub mod methods {
    pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    pub const ACCOUNTS: &str = "eth_accounts";
    pub const CHAIN_ID: &str = "eth_chainId";
    pub const GET_BALANCE: &str = "eth_getBalance";
    pub const SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
    pub const ADD_CHAIN: &str = "wallet_addEthereumChain";
    pub const REVOKE_PERMISSIONS: &str = "wallet_revokePermissions";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(method: &str, params: serde_json::Value) -> Self {
        Self {
            method: method.to_string(),
            params,
        }
    }

    /// Request with an empty positional parameter list.
    pub fn bare(method: &str) -> Self {
        Self::new(method, serde_json::Value::Array(Vec::new()))
    }
}

/// Error returned by a provider, carrying the EIP-1193 / JSON-RPC code.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProviderError {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(Self::USER_REJECTED, "User rejected the request.")
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::new(
            Self::UNSUPPORTED_METHOD,
            format!("The provider does not support '{method}'."),
        )
    }

    pub fn unrecognized_chain(chain_id: ChainId) -> Self {
        Self::new(
            Self::UNRECOGNIZED_CHAIN,
            format!("Unrecognized chain ID {}.", chain_id.to_hex()),
        )
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(Self::DISCONNECTED, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }

    /// True when the wallet does not know the requested chain.
    /// Some mobile wallets wrap the code in `data.originalError.code`.
    pub fn is_unrecognized_chain(&self) -> bool {
        if self.code == Self::UNRECOGNIZED_CHAIN {
            return true;
        }
        self.data
            .as_ref()
            .and_then(|d| d.get("originalError"))
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_i64())
            == Some(Self::UNRECOGNIZED_CHAIN)
    }
}

/// Events pushed by the provider outside any request.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(ChainId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type EventSender = mpsc::UnboundedSender<ProviderEvent>;

pub trait Provider: Send + Sync {
    /// Issue one request and resolve with its JSON result.
    fn request(&self, request: RpcRequest) -> BoxFuture<'_, Result<serde_json::Value, ProviderError>>;

    /// Register an observer for provider events.
    fn subscribe(&self, sender: EventSender) -> SubscriptionId;

    /// Remove an observer. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Scoped event registration; unsubscribes when dropped.
pub struct Subscription {
    provider: Arc<dyn Provider>,
    id: SubscriptionId,
}

impl Subscription {
    pub fn new(provider: Arc<dyn Provider>, sender: EventSender) -> Self {
        let id = provider.subscribe(sender);
        Self { provider, id }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.provider.unsubscribe(self.id);
    }
}

/// Observer registry shared by the provider implementations.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    senders: Mutex<Vec<(SubscriptionId, EventSender)>>,
}

impl Listeners {
    pub(crate) fn add(&self, sender: EventSender) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, sender));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sid, _)| *sid != id);
    }

    /// Deliver to every live observer, pruning closed channels.
    pub(crate) fn emit(&self, event: &ProviderEvent) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
