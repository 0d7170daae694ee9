use std::path::PathBuf;

use anyhow::Context;

pub mod address;
pub mod chain;
pub mod commands;
pub mod display;
pub mod error;
pub mod notify;
pub mod provider;
pub mod session;

pub use address::Address;
pub use chain::{ChainConfig, ChainId, NativeCurrency};
pub use commands::Command;
pub use error::SessionError;
pub use notify::{Notification, Severity};
pub use provider::{BridgeProvider, MemoryProvider, Provider, ProviderError, ProviderEvent, RpcRequest};
pub use session::{Balance, EventListener, SessionOptions, SessionState, WalletSession};

/// XDG-compliant data directory for the bridge socket.
/// Linux: `~/.local/share/monad-wallet/`, macOS: `~/Library/Application Support/monad-wallet/`
pub fn data_dir() -> anyhow::Result<PathBuf> {
    let dir = dirs::data_dir()
        .context("Cannot determine data directory")?
        .join("monad-wallet");
    Ok(dir)
}

/// Default path of the Unix socket the browser bridge listens on.
pub fn default_socket_path() -> anyhow::Result<PathBuf> {
    Ok(data_dir()?.join("bridge.sock"))
}
