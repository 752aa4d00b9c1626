use anyhow::{Context, Result};
use futures_util::StreamExt;
use lanchat::protocol::MAX_REPLY_BYTES;
use lanchat::{ChatClient, InboundEvent, SessionEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::codec::{FramedRead, LinesCodec};

const USAGE: &str = "usage: <to> <message>";

/// What one line of user input asks for.
#[derive(Debug, PartialEq, Eq)]
enum LineAction<'a> {
    Skip,
    Quit,
    Usage,
    Send { to: &'a str, message: &'a str },
}

/// Interactive session: register, start the wait loop, then multiplex stdin
/// lines and inbound events until EOF, `/quit` or Ctrl-C.
pub async fn run(
    client: &ChatClient,
    mut events: UnboundedReceiver<SessionEvent>,
    json: bool,
) -> Result<()> {
    let session = client.session();
    eprintln!(
        "Connecting to {} as {}",
        session.server_addr(),
        session.username()
    );

    let reply = client.register().await.context("registration failed")?;
    println!("[Server] {reply}");
    client.start_loop()?;
    eprintln!("Type `<to> <message>` to send, `/quit` to leave.");

    let mut stdin = FramedRead::new(
        tokio::io::stdin(),
        LinesCodec::new_with_max_length(MAX_REPLY_BYTES),
    );
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event, json)?;
            }
            line = stdin.next() => {
                match line {
                    Some(Ok(line)) => {
                        if !handle_line(client, &line).await {
                            break;
                        }
                    }
                    Some(Err(e)) => eprintln!("[Input Error] {e}"),
                    None => break,
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    match client.shutdown().await {
        Ok(reply) => {
            println!("[Server] {reply}");
            println!("[Unregistered]");
        }
        Err(e) => println!("[Unregister attempt failed] {e}"),
    }

    while let Ok(event) = events.try_recv() {
        print_event(&event, json)?;
    }
    Ok(())
}

fn parse_line(line: &str) -> LineAction<'_> {
    let line = line.trim();
    if line.is_empty() {
        return LineAction::Skip;
    }
    if line.eq_ignore_ascii_case("/quit") {
        return LineAction::Quit;
    }
    match line.split_once(char::is_whitespace) {
        Some((to, message)) if !message.trim().is_empty() => LineAction::Send {
            to,
            message: message.trim(),
        },
        _ => LineAction::Usage,
    }
}

/// Returns `false` when the user asked to leave.
async fn handle_line(client: &ChatClient, line: &str) -> bool {
    match parse_line(line) {
        LineAction::Skip => {}
        LineAction::Quit => return false,
        LineAction::Usage => eprintln!("{USAGE}"),
        LineAction::Send { to, message } => match client.send(to, message).await {
            Ok(reply) => {
                println!("[Sent to {to}] {message}");
                println!("[Server] {reply}");
            }
            Err(e) => println!("[Send Error] {e}"),
        },
    }
    true
}

/// One output line for `event`, or `None` for events that are not shown.
fn render_event(event: &SessionEvent, json: bool) -> Result<Option<String>> {
    if matches!(
        event,
        SessionEvent::Inbound {
            event: InboundEvent::NoEvent
        }
    ) {
        return Ok(None);
    }
    let line = if json {
        serde_json::to_string(event)?
    } else {
        event.to_string()
    };
    Ok(Some(line))
}

fn print_event(event: &SessionEvent, json: bool) -> Result<()> {
    if let Some(line) = render_event(event, json)? {
        println!("{line}");
    }
    Ok(())
}
