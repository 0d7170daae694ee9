#[must_use]
pub fn help_text(command: Option<&str>) -> String {
    match command {
        Some("connect") => {
            "connect\n  Ask the wallet for account access.\n  Shows whether the wallet is on the target network.".to_string()
        }
        Some("disconnect") => {
            "disconnect\n  Forget the connected account and ask the wallet to revoke\n  this session's permission (ignored by wallets without support).".to_string()
        }
        Some("switch") | Some("switch_network") => {
            "switch\n  Ask the wallet to switch to the target network.\n  If the wallet does not know it yet, the network is added first.\n  Alias: switch_network".to_string()
        }
        Some("status") => {
            "status\n  Show connection state, account and network match.".to_string()
        }
        Some("account") | Some("addr") => {
            "account\n  Show the connected account address.\n  Alias: addr".to_string()
        }
        Some("balance") | Some("bal") => {
            "balance\n  Show the native balance of the connected account.\n  Alias: bal".to_string()
        }
        Some("network") | Some("chain") => {
            "network\n  Show the target network: chain ID, currency, RPC and explorer URLs.\n  Alias: chain".to_string()
        }
        Some("help") => {
            "help [command]\n  Show all commands, or details for one command.".to_string()
        }
        Some("exit") | Some("quit") | Some("q") => {
            "exit\n  Leave the session.\n  Aliases: quit, q".to_string()
        }
        Some(other) => format!("Unknown command: '{other}'. Type 'help' for a list of commands."),
        None => "\
Commands:
  connect              Connect the browser wallet
  disconnect           Disconnect and revoke permissions
  switch               Switch the wallet to the target network
  status               Show connection and network status
  account              Show the connected account
  balance              Show the native balance
  network              Show the target network
  help [command]       Show help
  exit                 Quit

Type 'help <command>' for details."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overview_lists_commands() {
        let text = help_text(None);
        for cmd in ["connect", "disconnect", "switch", "status", "balance", "exit"] {
            assert!(text.contains(cmd), "overview should mention '{cmd}'");
        }
    }

    #[test]
    fn alias_topic_matches() {
        assert_eq!(help_text(Some("bal")), help_text(Some("balance")));
    }

    #[test]
    fn unknown_topic() {
        assert!(help_text(Some("swap")).starts_with("Unknown command"));
    }
}
