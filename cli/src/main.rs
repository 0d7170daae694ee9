mod logging;
mod repl;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use monad_wallet_core::commands::Command;
use monad_wallet_core::{ChainConfig, ChainId, MemoryProvider, Provider, SessionOptions, WalletSession};
use tracing::{debug, warn};

/// Account preloaded into the `--demo` wallet.
const DEMO_ACCOUNT: &str = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";

#[derive(Parser)]
#[command(
    name = "monad-wallet",
    about = "Monad Testnet wallet session: connect a browser wallet from the terminal",
    version
)]
pub(crate) struct Cli {
    /// Wallet bridge socket (default: <data dir>/monad-wallet/bridge.sock)
    #[arg(long, env = "MONAD_WALLET_SOCKET")]
    socket: Option<PathBuf>,

    /// Chain definition JSON to use instead of Monad Testnet
    #[arg(long, env = "MONAD_WALLET_CHAIN")]
    chain: Option<PathBuf>,

    /// Use a built-in demo wallet instead of the browser bridge
    #[arg(long)]
    demo: bool,

    /// Switch to the target network right after connecting
    #[arg(long)]
    auto_switch: bool,

    /// Run a single command and exit
    #[arg(long)]
    cmd: Option<String>,

    /// Output in JSON format (useful with --cmd)
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn socket_path(&self) -> Result<PathBuf> {
        match &self.socket {
            Some(path) => Ok(path.clone()),
            None => monad_wallet_core::default_socket_path(),
        }
    }

    fn target_chain(&self) -> Result<ChainConfig> {
        match &self.chain {
            Some(path) => ChainConfig::load(path),
            None => Ok(ChainConfig::monad_testnet()),
        }
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            auto_switch: self.auto_switch,
        }
    }

    /// Demo wallet, or the bridge if it is reachable. No provider at all is
    /// a valid outcome: the session then reports "Wallet not detected".
    async fn provider(&self) -> Result<Option<Arc<dyn Provider>>> {
        if self.demo {
            return Ok(Some(Arc::new(demo_provider())));
        }
        let path = self.socket_path()?;
        Ok(connect_bridge(&path).await)
    }
}

/// Wallet on Ethereum mainnet that has never seen the target chain, so the
/// switch flow has to register it first.
fn demo_provider() -> MemoryProvider {
    MemoryProvider::new(ChainId::new(1))
        .with_account(DEMO_ACCOUNT)
        .with_balance(DEMO_ACCOUNT, 12_345_600_000_000_000_000)
}

#[cfg(unix)]
async fn connect_bridge(path: &Path) -> Option<Arc<dyn Provider>> {
    match tokio::net::UnixStream::connect(path).await {
        Ok(stream) => {
            debug!(path = %path.display(), "connected to wallet bridge");
            Some(Arc::new(monad_wallet_core::BridgeProvider::spawn(stream)))
        }
        Err(e) => {
            warn!(path = %path.display(), "wallet bridge not reachable: {e}");
            None
        }
    }
}

#[cfg(not(unix))]
async fn connect_bridge(path: &Path) -> Option<Arc<dyn Provider>> {
    warn!(path = %path.display(), "wallet bridge needs Unix domain sockets");
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    let target = cli.target_chain()?;
    let provider = cli.provider().await?;
    let (session, listener) =
        WalletSession::start(provider, target, cli.session_options()).await;

    let result = if let Some(cmd_str) = &cli.cmd {
        // One-shot mode
        run_oneshot(&cli, &session, cmd_str).await
    } else {
        // REPL mode
        repl::run_repl(&cli, &session).await
    };

    drop(listener);
    result
}

async fn run_oneshot(cli: &Cli, session: &WalletSession, cmd_str: &str) -> Result<()> {
    let cmd = Command::parse(cmd_str)?;
    if cmd == Command::Exit {
        return Ok(());
    }
    let output = cmd.execute(session, cli.json).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
