//! Drains connection notifications into the shared state.
//!
//! One task per connection, processing notifications in arrival order so
//! appends to a conversation never race each other.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use jobchat_net::ConnectionNotification;
use jobchat_shared::ConnectionMode;

use crate::events::ChatEvent;
use crate::router::{MarkRead, MessageRouter, Routed};
use crate::state::{lock_state, ChatContext};

pub fn spawn_bridge(
    ctx: ChatContext,
    router: MessageRouter,
    mode_rx: watch::Receiver<ConnectionMode>,
    notif_rx: mpsc::Receiver<ConnectionNotification>,
) -> JoinHandle<()> {
    tokio::spawn(notification_loop(ctx, router, mode_rx, notif_rx))
}

async fn notification_loop(
    ctx: ChatContext,
    router: MessageRouter,
    mode_rx: watch::Receiver<ConnectionMode>,
    mut notif_rx: mpsc::Receiver<ConnectionNotification>,
) {
    info!(user = %router.self_id(), "Chat notification bridge started");
    let mut sessions = 0u32;

    while let Some(notification) = notif_rx.recv().await {
        match notification {
            ConnectionNotification::Connected => {
                sessions += 1;
                set_mode(&ctx, ConnectionMode::Connected);
                if sessions > 1 {
                    // Messages may have arrived while we were away.
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        ctx.refresh_recent().await;
                        ctx.refresh_unread_counts().await;
                    });
                }
            }

            ConnectionNotification::Disconnected { reason } => {
                info!(reason = %reason, "Chat channel down");
                let mode = *mode_rx.borrow();
                set_mode(&ctx, mode);
            }

            ConnectionNotification::MessageReceived { destination, body } => {
                handle_message(&ctx, &router, &destination, &body);
            }
        }
    }

    set_mode(&ctx, ConnectionMode::Disconnected);
    info!("Chat notification bridge stopped");
}

fn handle_message(ctx: &ChatContext, router: &MessageRouter, destination: &str, body: &str) {
    let outcome = {
        let mut state = lock_state(&ctx.state);
        router.route(&mut state.store, body, ctx.visibility.is_foreground())
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(destination, error = %e, "Dropping unreadable chat message");
            return;
        }
    };

    match outcome.routed {
        Routed::Active { participant } => {
            ctx.events.emit(ChatEvent::MessageAppended {
                participant,
                from_self: false,
            });
        }
        Routed::Background {
            participant,
            unread,
            created,
            minimized,
        } => {
            ctx.events.emit(ChatEvent::MessageAppended {
                participant: participant.clone(),
                from_self: false,
            });
            ctx.events.emit(ChatEvent::UnreadChanged {
                participant: participant.clone(),
                count: unread,
            });
            if minimized || created {
                ctx.events.emit(ChatEvent::ConversationsChanged);
            }
            let unnamed = lock_state(&ctx.state)
                .store
                .get(&participant)
                .is_some_and(|c| c.has_placeholder_name());
            if unnamed {
                // Only the id is known so far; the recent list carries the name.
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    ctx.refresh_recent().await;
                });
            }
        }
        Routed::SelfEcho | Routed::Misaddressed => {}
    }

    if let Some(MarkRead { sender, receiver }) = outcome.effects.mark_read {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            ctx.mark_read(&sender, &receiver).await;
        });
    }

    if outcome.effects.play_sound {
        if let Err(e) = ctx.notifier.play_sound() {
            debug!(error = %e, "Notification sound unavailable");
        }
        ctx.events.emit(ChatEvent::NotificationSound);
    }
}

fn set_mode(ctx: &ChatContext, mode: ConnectionMode) {
    let changed = {
        let mut state = lock_state(&ctx.state);
        let changed = state.connection_mode != mode;
        state.connection_mode = mode;
        changed
    };
    if changed {
        debug!(?mode, "Connection mode changed");
        ctx.events.emit(ChatEvent::ConnectionModeChanged { mode });
    }
}
