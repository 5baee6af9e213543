//! Debounced user search.
//!
//! Every keystroke bumps a generation counter. A query only goes out once
//! the input has been quiet for the debounce delay, and a response is only
//! applied if no newer input arrived in the meantime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use jobchat_shared::constants::{SEARCH_DEBOUNCE_MAX_MS, SEARCH_DEBOUNCE_MIN_MS};

use crate::events::ChatEvent;
use crate::state::{lock_state, ChatContext};

#[derive(Debug, Clone)]
pub struct SearchDebouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl SearchDebouncer {
    pub fn new(delay: Duration) -> Self {
        let delay = delay.clamp(
            Duration::from_millis(SEARCH_DEBOUNCE_MIN_MS),
            Duration::from_millis(SEARCH_DEBOUNCE_MAX_MS),
        );
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record new search box contents. Empty input clears the results at once.
    pub fn input(&self, ctx: &ChatContext, text: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query = text.trim().to_string();

        {
            let mut state = lock_state(&ctx.state);
            state.search.query = query.clone();
            if query.is_empty() {
                state.search.hits.clear();
            }
        }
        if query.is_empty() {
            ctx.events.emit(ChatEvent::SearchResults { query, hits: 0 });
            return;
        }

        let ctx = ctx.clone();
        let current = self.generation.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }

            let hits = match ctx.api.search(&query).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(query = %query, error = %e, "User search failed");
                    return;
                }
            };

            let count = hits.len();
            {
                let mut state = lock_state(&ctx.state);
                if current.load(Ordering::SeqCst) != generation {
                    debug!(query = %query, "Discarding stale search results");
                    return;
                }
                state.search.hits = hits;
            }
            ctx.events.emit(ChatEvent::SearchResults { query, hits: count });
        });
    }

    /// Drop any pending query and in-flight response.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
