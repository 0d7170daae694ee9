/// Wallet session: connection and network-match state of one injected provider.
///
/// The state lives in a `watch` channel owned by the session; view code reads
/// or observes it but can only change it through the operations below.
/// Provider round trips for `connect`, `switch_network` and `disconnect` are
/// serialized by `op_lock`, so two of them never interleave on the wire.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::chain::{ChainConfig, ChainId};
use crate::error::{Result, SessionError};
use crate::notify::Notification;
use crate::provider::{methods, Provider, ProviderError, ProviderEvent, RpcRequest, Subscription};

const NOTIFICATION_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected { account: Address, network_match: bool },
}

impl SessionState {
    pub fn account(&self) -> Option<&Address> {
        match self {
            Self::Connected { account, .. } => Some(account),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Always `false` without an account.
    pub fn is_correct_network(&self) -> bool {
        matches!(self, Self::Connected { network_match: true, .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionOptions {
    /// Switch to the target chain right after a connect lands on another one.
    pub auto_switch: bool,
}

/// Native balance of the connected account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub wei: u128,
    pub symbol: String,
    pub decimals: u8,
}

pub struct WalletSession {
    provider: Option<Arc<dyn Provider>>,
    target: ChainConfig,
    options: SessionOptions,
    state: watch::Sender<SessionState>,
    /// Bumped on every reset; a connect whose epoch went stale drops its result.
    epoch: AtomicU64,
    op_lock: Mutex<()>,
    notices: broadcast::Sender<Notification>,
}

impl WalletSession {
    pub fn new(
        provider: Option<Arc<dyn Provider>>,
        target: ChainConfig,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (notices, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Arc::new(Self {
            provider,
            target,
            options,
            state,
            epoch: AtomicU64::new(0),
            op_lock: Mutex::new(()),
            notices,
        })
    }

    /// Create a session, register for provider events, then probe for
    /// already-granted accounts. Must be called from within a tokio runtime.
    pub async fn start(
        provider: Option<Arc<dyn Provider>>,
        target: ChainConfig,
        options: SessionOptions,
    ) -> (Arc<Self>, Option<EventListener>) {
        let session = Self::new(provider, target, options);
        let listener = session.listen();
        session.probe().await;
        (session, listener)
    }

    pub fn target(&self) -> &ChainConfig {
        &self.target
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn account(&self) -> Option<Address> {
        self.state.borrow().account().cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.state.borrow().is_connecting()
    }

    pub fn is_correct_network(&self) -> bool {
        self.state.borrow().is_correct_network()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notices.subscribe()
    }

    /// Register for `accountsChanged` / `chainChanged`. Events are applied one
    /// at a time on a dedicated task until the returned guard is dropped.
    /// Returns `None` when there is no provider to listen to.
    pub fn listen(self: &Arc<Self>) -> Option<EventListener> {
        let provider = self.provider.clone()?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = Subscription::new(provider, tx);
        let session: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                session.handle_event(event).await;
            }
        });
        Some(EventListener {
            _subscription: subscription,
            task,
        })
    }

    /// Pick up accounts the wallet already granted (`eth_accounts`). Failures
    /// are logged and leave the session as it was. The answer is dropped if
    /// the session was reset or connected while the request was in flight.
    pub async fn probe(&self) -> SessionState {
        let Some(provider) = self.provider.as_ref() else {
            return self.state();
        };
        let epoch = self.epoch.load(Ordering::SeqCst);
        let probed = provider
            .request(RpcRequest::bare(methods::ACCOUNTS))
            .await
            .and_then(|v| parse_accounts(&v));
        match probed {
            Ok(accounts) => match accounts.into_iter().next() {
                Some(account) => {
                    let applied = self.state.send_if_modified(|s| {
                        if matches!(s, SessionState::Disconnected)
                            && self.epoch.load(Ordering::SeqCst) == epoch
                        {
                            *s = SessionState::Connected {
                                account: account.clone(),
                                network_match: false,
                            };
                            true
                        } else {
                            false
                        }
                    });
                    if applied {
                        debug!(account = %account, "probe: found granted account");
                        self.refresh_network(provider).await;
                    } else {
                        debug!("probe: session changed while probing, dropping result");
                    }
                }
                None => debug!("probe: no granted accounts"),
            },
            Err(e) => warn!("probe: eth_accounts failed: {e}"),
        }
        self.state()
    }

    pub async fn connect(&self) -> Result<SessionState> {
        let Some(provider) = self.provider.clone() else {
            self.notify(Notification::error(
                "Wallet not detected",
                "Please install a browser wallet to continue.",
            ));
            return Err(SessionError::ProviderUnavailable);
        };

        let mut started_at = None;
        self.state.send_if_modified(|s| {
            if matches!(s, SessionState::Disconnected) {
                *s = SessionState::Connecting;
                started_at = Some(self.epoch.load(Ordering::SeqCst));
                true
            } else {
                false
            }
        });
        let Some(epoch) = started_at else {
            debug!(state = ?self.state(), "connect ignored");
            return Ok(self.state());
        };

        let _op = self.op_lock.lock().await;
        debug!("connect: requesting accounts");
        let granted = provider
            .request(RpcRequest::bare(methods::REQUEST_ACCOUNTS))
            .await
            .and_then(|v| parse_accounts(&v))
            .and_then(|accounts| {
                accounts
                    .into_iter()
                    .next()
                    .ok_or_else(|| ProviderError::invalid_response("Wallet returned no accounts."))
            });

        let account = match granted {
            Ok(account) => account,
            Err(err) => {
                self.state.send_if_modified(|s| {
                    if s.is_connecting() && self.epoch.load(Ordering::SeqCst) == epoch {
                        *s = SessionState::Disconnected;
                        true
                    } else {
                        false
                    }
                });
                warn!("connect failed: {err}");
                self.notify(Notification::error("Connection error", err.message.clone()));
                return Err(SessionError::ConnectionRejected(err));
            }
        };

        let network_match = self.query_network_match(provider.as_ref()).await;
        let applied = self.state.send_if_modified(|s| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            *s = SessionState::Connected {
                account: account.clone(),
                network_match,
            };
            true
        });
        if !applied {
            debug!("connect: session was reset while waiting, dropping result");
            return Ok(self.state());
        }

        info!(account = %account, network_match, "wallet connected");
        self.notify(Notification::info(
            "Wallet connected",
            format!("Connected as {}.", account.short()),
        ));

        if !network_match && self.options.auto_switch {
            match self.switch_locked(provider.as_ref()).await {
                Ok(()) => self.notify_switched(),
                Err(e) => {
                    warn!("auto-switch after connect failed: {e}");
                    self.notify(Notification::error("Network error", e.to_string()));
                }
            }
        }
        Ok(self.state())
    }

    /// Needs a connected account. Queues behind an in-flight connect and
    /// judges the outcome of that connect.
    pub async fn switch_network(&self) -> Result<SessionState> {
        let Some(provider) = self.provider.clone() else {
            self.notify(Notification::error(
                "Wallet not detected",
                "Please install a browser wallet to continue.",
            ));
            return Err(SessionError::ProviderUnavailable);
        };

        let _op = self.op_lock.lock().await;
        if !self.is_connected() {
            debug!("switch ignored: no connected account");
            return Err(SessionError::NotConnected);
        }
        match self.switch_locked(provider.as_ref()).await {
            Ok(()) => {
                self.notify_switched();
                Ok(self.state())
            }
            Err(e) => {
                warn!("network switch failed: {e}");
                self.notify(Notification::error("Network error", e.to_string()));
                Err(e)
            }
        }
    }

    /// Clear local state, then ask the wallet to drop its permission grant.
    /// The revocation is best effort: wallets without
    /// `wallet_revokePermissions` just keep their grant.
    pub async fn disconnect(&self) -> SessionState {
        self.reset("disconnect requested");
        self.notify(Notification::info(
            "Wallet disconnected",
            "You have been disconnected.",
        ));

        if let Some(provider) = self.provider.as_ref() {
            let _op = self.op_lock.lock().await;
            let params = json!([{ "eth_accounts": {} }]);
            if let Err(e) = provider
                .request(RpcRequest::new(methods::REVOKE_PERMISSIONS, params))
                .await
            {
                debug!("permission revocation unavailable: {e}");
            }
        }
        self.state()
    }

    pub async fn balance(&self) -> Result<Balance> {
        let account = self.account().ok_or(SessionError::NotConnected)?;
        let provider = self
            .provider
            .as_ref()
            .ok_or(SessionError::ProviderUnavailable)?;
        let raw = provider
            .request(RpcRequest::new(
                methods::GET_BALANCE,
                json!([account.as_str(), "latest"]),
            ))
            .await
            .map_err(SessionError::BalanceQueryFailed)?;
        let wei = parse_quantity(&raw).map_err(SessionError::BalanceQueryFailed)?;
        Ok(Balance {
            wei,
            symbol: self.target.native_currency.symbol.clone(),
            decimals: self.target.native_currency.decimals,
        })
    }

    pub(crate) async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                None => self.reset("wallet reported no accounts"),
                Some(raw) => match Address::parse(raw) {
                    Ok(account) => {
                        debug!(account = %account, "accountsChanged");
                        self.set_account(account);
                        if let Some(provider) = self.provider.as_ref() {
                            self.refresh_network(provider).await;
                        }
                    }
                    Err(e) => warn!("ignoring accountsChanged: {e}"),
                },
            },
            ProviderEvent::ChainChanged(chain_id) => self.apply_chain(chain_id),
        }
    }

    fn notify(&self, notification: Notification) {
        // No receivers is fine.
        let _ = self.notices.send(notification);
    }

    fn notify_switched(&self) {
        self.notify(Notification::info(
            "Network switched",
            format!("Now on {}.", self.target.chain_name),
        ));
    }

    fn reset(&self, reason: &str) {
        self.state.send_modify(|s| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *s = SessionState::Disconnected;
        });
        info!(reason, "session disconnected");
    }

    /// Enter `Connected` with `account`, keeping the last known network match.
    fn set_account(&self, account: Address) {
        self.state.send_modify(|s| {
            let network_match = match s {
                SessionState::Connected { network_match, .. } => *network_match,
                _ => false,
            };
            *s = SessionState::Connected {
                account,
                network_match,
            };
        });
    }

    fn apply_chain(&self, chain_id: ChainId) {
        let matches = chain_id == self.target.chain_id;
        let changed = self.state.send_if_modified(|s| match s {
            SessionState::Connected { network_match, .. } if *network_match != matches => {
                *network_match = matches;
                true
            }
            _ => false,
        });
        debug!(chain = %chain_id, matches, changed, "chainChanged");
    }

    /// Re-read the wallet's chain; skipped if the session was reset meanwhile.
    async fn refresh_network(&self, provider: &Arc<dyn Provider>) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let matches = self.query_network_match(provider.as_ref()).await;
        self.state.send_if_modified(|s| match s {
            SessionState::Connected { network_match, .. }
                if *network_match != matches && self.epoch.load(Ordering::SeqCst) == epoch =>
            {
                *network_match = matches;
                true
            }
            _ => false,
        });
    }

    /// Compare the wallet's active chain with the target. Unreadable answers
    /// count as a mismatch.
    async fn query_network_match(&self, provider: &dyn Provider) -> bool {
        match provider.request(RpcRequest::bare(methods::CHAIN_ID)).await {
            Ok(raw) => match ChainId::from_json(&raw) {
                Ok(chain_id) => chain_id == self.target.chain_id,
                Err(e) => {
                    warn!("eth_chainId returned {raw}: {e}");
                    false
                }
            },
            Err(e) => {
                warn!("eth_chainId failed: {e}");
                false
            }
        }
    }

    /// Switch flow without taking `op_lock`; callers must hold it.
    /// An unknown chain is registered first and the switch retried once.
    async fn switch_locked(&self, provider: &dyn Provider) -> Result<()> {
        match self.request_switch(provider).await {
            Ok(()) => {}
            Err(err) if err.is_unrecognized_chain() => {
                info!(chain = %self.target.chain_name, "wallet does not know the target chain, adding it");
                let definition = serde_json::to_value(&self.target).map_err(|e| {
                    SessionError::NetworkAddFailed(ProviderError::invalid_params(e.to_string()))
                })?;
                provider
                    .request(RpcRequest::new(methods::ADD_CHAIN, json!([definition])))
                    .await
                    .map_err(SessionError::NetworkAddFailed)?;
                self.request_switch(provider)
                    .await
                    .map_err(SessionError::NetworkSwitchFailed)?;
            }
            Err(err) => return Err(SessionError::NetworkSwitchFailed(err)),
        }

        self.state.send_if_modified(|s| match s {
            SessionState::Connected { network_match, .. } if !*network_match => {
                *network_match = true;
                true
            }
            _ => false,
        });
        Ok(())
    }

    async fn request_switch(&self, provider: &dyn Provider) -> std::result::Result<(), ProviderError> {
        let params = json!([{ "chainId": self.target.chain_id.to_hex() }]);
        provider
            .request(RpcRequest::new(methods::SWITCH_CHAIN, params))
            .await
            .map(|_| ())
    }
}

/// Guard for the session's provider event registration.
/// Dropping it unregisters the observer and stops the event task.
pub struct EventListener {
    _subscription: Subscription,
    task: JoinHandle<()>,
}

impl EventListener {
    /// Stop listening; same as dropping the guard.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Decode an account list; the first entry is the active account.
fn parse_accounts(value: &Value) -> std::result::Result<Vec<Address>, ProviderError> {
    let list = value
        .as_array()
        .ok_or_else(|| ProviderError::invalid_response(format!("Expected an account list, got {value}")))?;
    list.iter()
        .map(|entry| {
            entry
                .as_str()
                .ok_or_else(|| ProviderError::invalid_response(format!("Invalid account entry {entry}")))
                .and_then(|s| {
                    Address::parse(s).map_err(|e| ProviderError::invalid_response(e.to_string()))
                })
        })
        .collect()
}

/// Decode a JSON-RPC hex quantity such as `"0x1bc16d674ec80000"`.
fn parse_quantity(value: &Value) -> std::result::Result<u128, ProviderError> {
    let invalid = || ProviderError::invalid_response(format!("Invalid quantity {value}"));
    match value {
        Value::String(s) => {
            let hex = s.strip_prefix("0x").ok_or_else(invalid)?;
            if hex.is_empty() {
                return Err(invalid());
            }
            u128::from_str_radix(hex, 16).map_err(|_| invalid())
        }
        Value::Number(n) => n.as_u64().map(u128::from).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}
