//! Domain error type for wallet session operations.

use thiserror::Error;

use crate::provider::ProviderError;

/// Failures surfaced by [`WalletSession`](crate::WalletSession) operations.
///
/// None of them is fatal: after any variant the session is back in a
/// well-defined state and can be retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    /// No wallet provider is present; nothing was requested.
    #[error("No wallet provider detected. Install a browser wallet to continue.")]
    ProviderUnavailable,

    /// The wallet declined or failed the account request.
    #[error("Wallet connection rejected: {0}")]
    ConnectionRejected(ProviderError),

    /// `wallet_switchEthereumChain` failed for a reason other than an unknown chain,
    /// or still failed after registering the chain.
    #[error("Network switch failed: {0}")]
    NetworkSwitchFailed(ProviderError),

    /// Registering the target chain with `wallet_addEthereumChain` failed.
    #[error("Adding the network failed: {0}")]
    NetworkAddFailed(ProviderError),

    /// The operation needs a connected account.
    #[error("Wallet is not connected.")]
    NotConnected,

    /// Balance lookup failed or returned an unreadable quantity.
    #[error("Balance query failed: {0}")]
    BalanceQueryFailed(ProviderError),
}

/// Alias for `std::result::Result<T, SessionError>`.
pub type Result<T> = std::result::Result<T, SessionError>;
