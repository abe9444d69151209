//! Agent Chat terminal client
//!
//! Entry point: a line-oriented front-end over the session coordinator.
//! Plain lines are sent on the active thread; `/help` lists the commands.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use agent_chat_client::config::AppConfig;
use agent_chat_client::conversation::{Message, MessageLog, Role, ThreadId};
use agent_chat_client::coordinator::SessionCoordinator;
use agent_chat_client::telemetry;

const HELP: &str = "\
commands:
  /threads        list threads (refreshes from the service)
  /new            start a new thread
  /switch <id>    show another thread
  /state          session state per thread
  /quit           exit
anything else is sent on the active thread";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(String),
    Threads,
    New,
    Switch(ThreadId),
    State,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

impl Command {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return if trimmed.is_empty() {
                Self::Empty
            } else {
                Self::Send(line.to_string())
            };
        };
        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("threads"), None) => Self::Threads,
            (Some("new"), None) => Self::New,
            (Some("switch"), Some(id)) => Self::Switch(ThreadId::from(id)),
            (Some("state"), None) => Self::State,
            (Some("help"), None) => Self::Help,
            (Some("quit" | "exit"), None) => Self::Quit,
            _ => Self::Unknown(trimmed.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init(&config.logging);

    info!(
        name: "config.loaded",
        base_url = %config.service.base_url,
        handshake_timeout_secs = ?config.stream.handshake_timeout_secs,
        idle_timeout_secs = ?config.stream.idle_timeout_secs,
        "Configuration loaded"
    );

    let coordinator = Arc::new(agent_chat_client::connect(&config)?);
    let renderer = tokio::spawn(render(Arc::clone(&coordinator)));

    let threads = coordinator.refresh_threads().await;
    print_threads(&coordinator, &threads);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Send(text) => {
                let Some(active) = coordinator.active_thread() else {
                    println!("no active thread; use /new");
                    continue;
                };
                if let Err(e) = coordinator.send(&active, &text) {
                    println!("not sent: {e}");
                }
            }
            Command::Threads => {
                let threads = coordinator.refresh_threads().await;
                print_threads(&coordinator, &threads);
            }
            Command::New => {
                coordinator.new_thread().await;
            }
            Command::Switch(id) => {
                if !coordinator.switch_active(&id).await {
                    println!("unknown thread {id}; try /threads");
                }
            }
            Command::State => {
                for id in coordinator.registry().threads() {
                    match coordinator.session(&id) {
                        Some(s) => println!("  {id}: {} ({} received)", s.state(), s.received()),
                        None => println!("  {id}: no session"),
                    }
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Unknown(cmd) => println!("unknown command {cmd}; /help lists commands"),
            Command::Empty => {}
        }
    }

    coordinator.shutdown();
    renderer.abort();
    info!(name: "client.stopped", "Client stopped");
    Ok(())
}

/// Print the active thread: its backlog on activation, then each append.
///
/// Messages are tracked by log position so a backlog and an append
/// notification for the same message never print twice.
async fn render(coordinator: Arc<SessionCoordinator>) {
    let log = coordinator.log().clone();
    let mut registry = coordinator.registry().subscribe();
    let mut events = log.subscribe();
    let mut active: Option<ThreadId> = None;
    let mut printed = 0usize;

    loop {
        tokio::select! {
            changed = registry.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = registry.borrow_and_update().active.clone();
                if next != active {
                    active = next;
                    printed = 0;
                    if let Some(id) = &active {
                        println!("── thread {id} ──");
                        printed = print_from(&log, id, 0);
                    }
                }
            }
            event = events.recv() => match event {
                Ok(event) if active.as_ref() == Some(&event.thread_id) && event.index >= printed => {
                    print_message(&event.message);
                    printed = event.index + 1;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {
                    if let Some(id) = &active {
                        printed = print_from(&log, id, printed);
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

fn print_from(log: &MessageLog, id: &ThreadId, from: usize) -> usize {
    let snapshot = log.snapshot(id);
    for message in snapshot.iter().skip(from) {
        print_message(message);
    }
    snapshot.len()
}

fn print_message(message: &Message) {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    let at = message.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");
    println!("[{at}] {who}: {}", message.content);
}

fn print_threads(coordinator: &SessionCoordinator, threads: &[ThreadId]) {
    let active = coordinator.active_thread();
    for id in threads {
        let marker = if active.as_ref() == Some(id) { "*" } else { " " };
        println!("{marker} {id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_sent_verbatim() {
        assert_eq!(Command::parse("  hi there "), Command::Send("  hi there ".into()));
    }

    #[test]
    fn test_commands() {
        assert_eq!(Command::parse("/threads"), Command::Threads);
        assert_eq!(Command::parse("/new"), Command::New);
        assert_eq!(Command::parse("/switch 42"), Command::Switch(ThreadId::from("42")));
        assert_eq!(Command::parse("/state"), Command::State);
        assert_eq!(Command::parse("/exit"), Command::Quit);
        assert_eq!(Command::parse("   "), Command::Empty);
    }

    #[test]
    fn test_malformed_commands() {
        assert_eq!(Command::parse("/switch"), Command::Unknown("/switch".into()));
        assert_eq!(Command::parse("/bogus"), Command::Unknown("/bogus".into()));
    }
}
