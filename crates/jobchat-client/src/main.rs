//! # jobchat
//!
//! Line-oriented driver for the chat widget. Reads commands from stdin and
//! prints the widget after each one:
//!
//! ```text
//! open | close | back | minimize | list | quit
//! select <id> [name]    bar <id>    search <text>    pick <n>    send <text>
//! away | here           (simulate the app leaving / entering the foreground)
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use jobchat_client::notify::{Notifier, SilentNotifier, TerminalBell};
use jobchat_client::widget::{WidgetSnapshot, WidgetView};
use jobchat_client::{init_tracing, ChatController, ChatEvent, ClientConfig, HttpChatApi};
use jobchat_net::WsConnector;
use jobchat_shared::UserId;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    init_tracing();
    info!("Starting jobchat v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(
        api = %config.api_url,
        ws = %config.ws_url,
        authenticated = config.auth_token.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 2. Collaborators
    // -----------------------------------------------------------------------
    let api = Arc::new(HttpChatApi::new(&config).context("building HTTP client")?);
    let connector = Arc::new(WsConnector::new(config.ws_url.clone(), config.http_timeout));
    let notifier: Arc<dyn Notifier> = if config.notify_sound {
        Arc::new(TerminalBell)
    } else {
        Arc::new(SilentNotifier)
    };

    let mut controller = ChatController::new(config, api, connector, notifier);
    let me = match controller.start().await {
        Ok(me) => me,
        Err(e) => {
            error!(error = %e, "Chat unavailable");
            return Err(e.into());
        }
    };
    println!("signed in as {me}");

    // -----------------------------------------------------------------------
    // 3. Event printer
    // -----------------------------------------------------------------------
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ChatEvent::MessageAppended { participant, from_self: false } => {
                    println!("* new message from {participant}");
                }
                ChatEvent::ConnectionModeChanged { mode } => println!("* connection: {mode:?}"),
                ChatEvent::SearchResults { query, hits } => {
                    println!("* {hits} result(s) for {query:?}, `pick <n>` to open");
                }
                _ => {}
            }
        }
    });

    // -----------------------------------------------------------------------
    // 4. Command loop
    // -----------------------------------------------------------------------
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let (command, rest) = match line.trim().split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line.trim(), ""),
        };

        match command {
            "" => continue,
            "open" => controller.open().await,
            "close" => controller.close(),
            "back" => controller.back(),
            "minimize" => controller.minimize(),
            "select" => {
                let (id, name) = rest.split_once(' ').unwrap_or((rest, ""));
                controller.select(&UserId::new(id), name.trim()).await;
            }
            "bar" => {
                if !controller.click_minimized(&UserId::new(rest)).await {
                    println!("no minimized conversation with {rest}");
                }
            }
            "search" => controller.search_input(rest),
            "pick" => match rest.parse::<usize>() {
                Ok(n) if n > 0 => {
                    if !controller.select_search_hit(n - 1).await {
                        println!("no result #{n}");
                    }
                }
                _ => println!("usage: pick <n>"),
            },
            "send" => {
                if controller.send(rest).is_none() {
                    println!("nothing sent (empty text or no open conversation)");
                }
            }
            "away" => controller.visibility().set_foreground(false),
            "here" => controller.visibility().set_foreground(true),
            "list" => {}
            "quit" | "exit" => break,
            other => {
                println!("unknown command {other:?}");
                continue;
            }
        }

        print_snapshot(&controller.snapshot());
    }

    controller.shutdown().await;
    Ok(())
}

fn print_snapshot(snapshot: &WidgetSnapshot) {
    println!(
        "[{:?}] unread {} | {}",
        snapshot.connection,
        snapshot.total_unread,
        match &snapshot.view {
            WidgetView::Collapsed => "collapsed".to_string(),
            WidgetView::ConversationList => "conversation list".to_string(),
            WidgetView::ConversationView { participant } => format!("chatting with {participant}"),
        }
    );

    match &snapshot.open {
        Some(open) => {
            println!("--- {} ---", open.participant_name);
            for message in &open.messages {
                let who = if message.from_self { "me" } else { open.participant_name.as_str() };
                println!("  {} {}: {}", message.time, who, message.content);
            }
        }
        None if snapshot.view == WidgetView::ConversationList => {
            for row in &snapshot.recent {
                println!(
                    "  {:<12} {:<24} {:>3}  {}",
                    row.participant_id.as_str(),
                    row.participant_name,
                    row.unread_count,
                    row.last_message.as_deref().unwrap_or("")
                );
            }
        }
        None => {}
    }

    for (i, hit) in snapshot.search_hits.iter().enumerate() {
        let kind = if hit.is_company() { "company" } else { "user" };
        println!("  #{} {} ({kind})", i + 1, hit.display_name());
    }

    if !snapshot.minimized.is_empty() {
        let bars: Vec<String> = snapshot
            .minimized
            .iter()
            .map(|bar| format!("{} ({})", bar.participant_name, bar.unread_count))
            .collect();
        println!("  bars: {}", bars.join(" | "));
    }
}
