use crate::Cli;
/// REPL shell: Reedline-based interactive wallet session.
use anyhow::Result;
use monad_wallet_core::commands::{Command, COMMAND_NAMES};
use monad_wallet_core::{display, Notification, SessionState, WalletSession};
use reedline::{DefaultCompleter, DefaultPrompt, DefaultPromptSegment, Reedline, Signal};
use tokio::sync::broadcast;

pub async fn run_repl(cli: &Cli, session: &WalletSession) -> Result<()> {
    println!("Monad Wallet v{}", env!("CARGO_PKG_VERSION"));
    println!("Network: {}", session.target().chain_name);
    if !session.has_provider() {
        println!("No wallet bridge found. Start the browser bridge or use --demo.");
    }
    println!("{}", display::format_status(&session.state(), session.target()));
    println!("Type 'help' for a list of commands.");
    println!();

    let mut notices = session.notifications();
    let commands: Vec<String> = COMMAND_NAMES.iter().map(|c| c.to_string()).collect();
    let completer = Box::new(DefaultCompleter::new(commands));
    let mut line_editor = Reedline::create().with_completer(completer);

    loop {
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic(prompt_label(&session.state())),
            DefaultPromptSegment::Empty,
        );

        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match Command::parse(line) {
                    Ok(Command::Exit) => {
                        println!("Goodbye.");
                        break;
                    }
                    Ok(cmd) => {
                        let result = cmd.execute(session, cli.json).await;
                        let reported_error = print_notifications(&mut notices);
                        match result {
                            Ok(output) if !output.is_empty() => println!("{output}"),
                            Ok(_) => {}
                            Err(e) if !reported_error => eprintln!("Error: {e}"),
                            Err(_) => {}
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                }
            }
            Ok(Signal::CtrlD) | Ok(Signal::CtrlC) => {
                println!("Goodbye.");
                break;
            }
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        }
    }

    Ok(())
}

fn prompt_label(state: &SessionState) -> String {
    match state {
        SessionState::Connected {
            account,
            network_match: true,
        } => format!("[monad {}]", account.short()),
        SessionState::Connected { account, .. } => format!("[monad {} !network]", account.short()),
        SessionState::Connecting => "[monad connecting]".to_string(),
        SessionState::Disconnected => "[monad]".to_string(),
    }
}

/// Print queued session notices. Returns true if any of them was an error,
/// in which case the caller skips repeating the same failure.
fn print_notifications(notices: &mut broadcast::Receiver<Notification>) -> bool {
    let mut saw_error = false;
    loop {
        match notices.try_recv() {
            Ok(notice) if notice.is_error() => {
                saw_error = true;
                eprintln!("{notice}");
            }
            Ok(notice) => println!("{notice}"),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    saw_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use monad_wallet_core::Address;

    #[test]
    fn prompt_marks_wrong_network() {
        let account = Address::parse("0x8ba1f109551bD432803012645Ac136ddd64DBA72").unwrap();
        let label = prompt_label(&SessionState::Connected {
            account,
            network_match: false,
        });
        assert_eq!(label, "[monad 0x8ba1...BA72 !network]");
        assert_eq!(prompt_label(&SessionState::Disconnected), "[monad]");
    }

    #[test]
    fn notifications_flag_errors() {
        let (tx, mut rx) = broadcast::channel(4);
        tx.send(Notification::info("Wallet connected", "ok")).unwrap();
        assert!(!print_notifications(&mut rx));
        tx.send(Notification::error("Network error", "nope")).unwrap();
        assert!(print_notifications(&mut rx));
    }
}
