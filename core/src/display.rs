/// Output formatting: native unit conversion and status lines.
///
/// MON uses 18 decimal places (wei). 1 MON = 10^18 wei.
use crate::chain::ChainConfig;
use crate::session::{Balance, SessionState};

/// Fraction digits shown in balance summaries.
const DISPLAY_DECIMALS: usize = 4;

/// Convert a raw integer amount to a decimal string with full precision.
/// Examples (18 decimals): 1_500_000_000_000_000_000 -> "1.500000000000000000", 0 -> "0.000000000000000000"
#[must_use]
pub fn format_units(value: u128, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let Some(divisor) = 10u128.checked_pow(u32::from(decimals)) else {
        return value.to_string();
    };
    let whole = value / divisor;
    let frac = value % divisor;
    format!("{whole}.{frac:0width$}", width = decimals as usize)
}

/// Balance for display, truncated to four fraction digits: "1.2345 MON".
#[must_use]
pub fn format_balance(balance: &Balance) -> String {
    let full = format_units(balance.wei, balance.decimals);
    let shown = match full.split_once('.') {
        Some((whole, frac)) => {
            let digits = &frac[..frac.len().min(DISPLAY_DECIMALS)];
            format!("{whole}.{digits}")
        }
        None => full,
    };
    format!("{shown} {}", balance.symbol)
}

pub fn format_balance_json(balance: &Balance) -> String {
    serde_json::json!({
        "wei": balance.wei.to_string(),
        "formatted": format_units(balance.wei, balance.decimals),
        "symbol": balance.symbol,
    })
    .to_string()
}

/// One-line session status, the text equivalent of the header badge.
#[must_use]
pub fn format_status(state: &SessionState, target: &ChainConfig) -> String {
    match state {
        SessionState::Disconnected => "Not connected".to_string(),
        SessionState::Connecting => "Connecting...".to_string(),
        SessionState::Connected {
            account,
            network_match: true,
        } => format!("Connected to {} as {}", target.chain_name, account.short()),
        SessionState::Connected {
            account,
            network_match: false,
        } => format!(
            "Wrong network: {} is connected, switch to {}",
            account.short(),
            target.chain_name
        ),
    }
}

pub fn format_status_json(state: &SessionState, target: &ChainConfig) -> String {
    serde_json::json!({
        "account": state.account().map(|a| a.to_string()),
        "is_connected": state.is_connected(),
        "is_connecting": state.is_connecting(),
        "is_correct_network": state.is_correct_network(),
        "target_chain": target.chain_id.to_hex(),
    })
    .to_string()
}

/// Human-readable summary of the target chain.
#[must_use]
pub fn format_chain(target: &ChainConfig) -> String {
    let mut out = format!(
        "{}\n  Chain ID:  {}\n  Currency:  {} ({} decimals)\n",
        target.chain_name,
        target.chain_id,
        target.native_currency.symbol,
        target.native_currency.decimals,
    );
    for url in &target.rpc_urls {
        out.push_str(&format!("  RPC:       {url}\n"));
    }
    for url in &target.block_explorer_urls {
        out.push_str(&format!("  Explorer:  {url}\n"));
    }
    out
}
