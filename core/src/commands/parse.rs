use anyhow::{bail, Result};

use super::Command;

impl Command {
    /// Parse a command from a raw input string.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("No command entered. Type 'help' for a list of commands.");
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or_default().to_lowercase();
        let arg1 = parts.next();
        let extra = parts.next();

        let command = match cmd.as_str() {
            "connect" => Command::Connect,
            "disconnect" => Command::Disconnect,
            "switch" | "switch_network" => Command::SwitchNetwork,
            "status" => Command::Status,
            "account" | "addr" => Command::Account,
            "balance" | "bal" => Command::Balance,
            "network" | "chain" => Command::Network,
            "help" | "h" | "?" => {
                return Ok(Command::Help {
                    command: arg1.map(|s| s.to_lowercase()),
                })
            }
            "exit" | "quit" | "q" => Command::Exit,
            other => bail!("Unknown command: '{other}'. Type 'help' for a list of commands."),
        };

        if let Some(arg) = arg1.or(extra) {
            bail!("'{cmd}' takes no arguments (got '{arg}').");
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_connect() {
        assert_eq!(Command::parse("connect").unwrap(), Command::Connect);
        assert_eq!(Command::parse("  CONNECT  ").unwrap(), Command::Connect);
    }

    #[test]
    fn parse_aliases() {
        assert_eq!(Command::parse("switch_network").unwrap(), Command::SwitchNetwork);
        assert_eq!(Command::parse("bal").unwrap(), Command::Balance);
        assert_eq!(Command::parse("addr").unwrap(), Command::Account);
        assert_eq!(Command::parse("chain").unwrap(), Command::Network);
        assert_eq!(Command::parse("q").unwrap(), Command::Exit);
    }

    #[test]
    fn parse_help_with_topic() {
        assert_eq!(
            Command::parse("help Switch").unwrap(),
            Command::Help {
                command: Some("switch".into())
            }
        );
        assert_eq!(Command::parse("help").unwrap(), Command::Help { command: None });
    }

    #[test]
    fn parse_empty_fails() {
        let err = Command::parse("   ").unwrap_err();
        assert!(err.to_string().contains("help"));
    }

    #[test]
    fn parse_unknown_fails() {
        let err = Command::parse("swap 1 MON").unwrap_err();
        assert!(err.to_string().contains("Unknown command"));
    }

    #[test]
    fn parse_rejects_arguments() {
        assert!(Command::parse("connect now").is_err());
        assert!(Command::parse("balance 0x1234").is_err());
    }
}
