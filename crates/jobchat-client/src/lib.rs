pub mod api;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod events;
pub mod notify;
pub mod router;
pub mod search;
pub mod state;
mod sync;
pub mod widget;

use tracing_subscriber::{fmt, EnvFilter};

pub use api::{ChatApi, HttpChatApi};
pub use config::ClientConfig;
pub use controller::ChatController;
pub use events::ChatEvent;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Calling this twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("jobchat_client=debug,jobchat_net=debug,jobchat_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
