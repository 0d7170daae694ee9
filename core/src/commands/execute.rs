use anyhow::{bail, Context, Result};

use super::help::help_text;
use super::Command;
use crate::display;
use crate::session::{SessionState, WalletSession};

impl Command {
    /// Execute a command against the session and return the output string.
    pub async fn execute(&self, session: &WalletSession, json_output: bool) -> Result<String> {
        match self {
            Command::Connect => {
                let state = session.connect().await?;
                Ok(render_state(&state, session, json_output))
            }

            Command::Disconnect => {
                let state = session.disconnect().await;
                if json_output {
                    Ok(display::format_status_json(&state, session.target()))
                } else {
                    Ok("Wallet disconnected.".to_string())
                }
            }

            Command::SwitchNetwork => {
                let state = session.switch_network().await?;
                Ok(render_state(&state, session, json_output))
            }

            Command::Status => Ok(render_state(&session.state(), session, json_output)),

            Command::Account => {
                let Some(account) = session.account() else {
                    bail!("Wallet is not connected. Use 'connect' first.");
                };
                if json_output {
                    Ok(serde_json::json!({ "address": account.as_str() }).to_string())
                } else {
                    Ok(account.to_string())
                }
            }

            Command::Balance => {
                let balance = session.balance().await?;
                if json_output {
                    Ok(display::format_balance_json(&balance))
                } else {
                    Ok(display::format_balance(&balance))
                }
            }

            Command::Network => {
                if json_output {
                    serde_json::to_string(session.target())
                        .context("Failed to encode chain definition")
                } else {
                    Ok(display::format_chain(session.target()))
                }
            }

            Command::Help { command } => Ok(help_text(command.as_deref())),

            Command::Exit => Ok(String::new()),
        }
    }
}

fn render_state(state: &SessionState, session: &WalletSession, json_output: bool) -> String {
    if json_output {
        display::format_status_json(state, session.target())
    } else {
        display::format_status(state, session.target())
    }
}
