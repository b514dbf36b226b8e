use std::{collections::HashSet, sync::Arc};

use anyhow::{Context, Result};
use chat_sync::{
    load_settings, ChatEvent, ChatSession, HttpChatBackend, ReactionError, SendError,
};
use clap::Parser;
use shared::domain::{Identity, Message, MessageId, ReactionKind, RoomTopic};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Overrides `server_url` from chat_sync.toml and CHAT_SYNC__SERVER_URL.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    user_id: String,
    #[arg(long)]
    display_name: String,
    /// Room to join on start; the global room when omitted.
    #[arg(long)]
    topic: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(String),
    React {
        message_id: MessageId,
        kind: ReactionKind,
    },
    Room(Option<RoomTopic>),
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };

    let mut parts = rest.split_whitespace();
    match parts.next() {
        Some("quit") => Ok(Some(Command::Quit)),
        Some("room") => Ok(Some(Command::Room(parts.next().map(RoomTopic::new)))),
        Some("react") => {
            let (Some(id), Some(emoji)) = (parts.next(), parts.next()) else {
                return Err("usage: /react <message-id> <emoji>".into());
            };
            let kind = ReactionKind::from_emoji(emoji).ok_or_else(|| {
                let choices: Vec<&str> = ReactionKind::ALL.iter().map(|k| k.emoji()).collect();
                format!("unsupported reaction {emoji}; pick one of {}", choices.join(" "))
            })?;
            Ok(Some(Command::React {
                message_id: MessageId::confirmed(id),
                kind,
            }))
        }
        Some(other) => Err(format!("unknown command /{other}")),
        None => Err("empty command".into()),
    }
}

fn render_message(message: &Message) -> String {
    let marker = if message.is_pending() { " (sending)" } else { "" };
    format!(
        "[{}] {} {}: {}{}",
        message.id,
        message.created_at.format("%H:%M:%S"),
        message.sender_display_name,
        message.body,
        marker
    )
}

async fn print_events(session: Arc<ChatSession>, identity: Identity) {
    let mut events = session.subscribe_events();
    let mut shown: HashSet<MessageId> = HashSet::new();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer lagging");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            ChatEvent::MessagesChanged { .. } => {
                let messages = session.messages().await;
                for message in &messages {
                    if shown.insert(message.id.clone()) {
                        println!("{}", render_message(message));
                    }
                }
                shown.retain(|id| messages.iter().any(|m| &m.id == id));
            }
            ChatEvent::ReactionsChanged { message_ids, .. } => {
                for id in message_ids {
                    let summary = session
                        .reaction_summary(&id, Some(&identity.user_id))
                        .await;
                    if summary.is_empty() {
                        continue;
                    }
                    let rendered: Vec<String> = summary
                        .iter()
                        .map(|(kind, s)| {
                            let mine = if s.current_user_reacted { "*" } else { "" };
                            format!("{kind}{}{mine}", s.count)
                        })
                        .collect();
                    println!("    [{id}] {}", rendered.join(" "));
                }
            }
            ChatEvent::ConnectionChanged { room, state } => {
                println!("-- {} channel: {state:?}", room_label(room.as_ref()));
            }
            ChatEvent::SendFailed { local_id, reason } => {
                println!("!! message {local_id} was not sent: {reason}");
            }
            ChatEvent::Error(message) => println!("!! {message}"),
        }
    }
}

fn room_label(room: Option<&RoomTopic>) -> String {
    room.map_or_else(|| "global".to_string(), |topic| format!("#{topic}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    let backend = HttpChatBackend::new(&settings.server_url)
        .with_context(|| format!("cannot use server {}", settings.server_url))?;
    info!(server_url = %settings.server_url, "chat client starting");

    let identity = Identity::new(args.user_id, args.display_name);
    let session = Arc::new(ChatSession::new(Arc::new(backend), settings));
    let printer = tokio::spawn(print_events(Arc::clone(&session), identity.clone()));

    let topic = args.topic.map(RoomTopic::new);
    println!("joining {}", room_label(topic.as_ref()));
    session.open_room(topic).await;

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("!! {message}");
                continue;
            }
        };
        match command {
            Command::Send(body) => {
                // Backend failures arrive as ChatEvent::SendFailed.
                match session.send(&body, Some(&identity)).await {
                    Ok(_) | Err(SendError::Backend(_)) => {}
                    Err(err) => println!("!! {err}"),
                }
            }
            Command::React { message_id, kind } => {
                match session
                    .toggle_reaction(&message_id, kind, Some(&identity))
                    .await
                {
                    Ok(_) => {}
                    Err(ReactionError::UnknownMessage(id)) => {
                        println!("!! no message {id} in this room");
                    }
                    Err(err) => println!("!! {err}"),
                }
            }
            Command::Room(topic) => {
                println!("joining {}", room_label(topic.as_ref()));
                session.open_room(topic).await;
            }
            Command::Quit => break,
        }
    }

    session.close_room().await;
    printer.abort();
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
