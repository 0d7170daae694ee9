/// Command definitions and parsing for the REPL and one-shot mode.
mod execute;
mod help;
mod parse;

pub use help::help_text;

/// Names offered by the REPL completer.
pub const COMMAND_NAMES: &[&str] = &[
    "connect",
    "disconnect",
    "switch",
    "switch_network",
    "status",
    "account",
    "addr",
    "balance",
    "bal",
    "network",
    "chain",
    "help",
    "exit",
    "quit",
    "q",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Request account access from the wallet
    Connect,
    /// Drop the session and revoke the wallet's permission grant
    Disconnect,
    /// Ask the wallet to switch to the target network
    SwitchNetwork,
    /// Show connection and network status
    Status,
    /// Show the connected account
    Account,
    /// Show the native balance of the connected account
    Balance,
    /// Show the target network definition
    Network,
    /// Print help
    Help { command: Option<String> },
    /// Exit
    Exit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_completion_parses() {
        for name in COMMAND_NAMES {
            assert!(Command::parse(name).is_ok(), "'{name}' should parse");
        }
    }
}
