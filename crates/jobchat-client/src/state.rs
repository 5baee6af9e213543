//! State shared by the controller and the message bridge.
//!
//! [`ChatState`] lives behind one `Arc<Mutex<>>`. The lock is only ever held
//! for synchronous transitions, never across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jobchat_shared::{ConnectionMode, UserId};
use jobchat_store::ConversationStore;

use crate::api::{ChatApi, SearchHit};
use crate::events::EventEmitter;
use crate::notify::{Notifier, Visibility};
use crate::widget::{WidgetSnapshot, WidgetState};

/// Transient search box contents. Cleared hits mean "no results shown".
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Default)]
pub struct ChatState {
    /// The authenticated user. `None` until the identity call succeeds.
    pub self_id: Option<UserId>,
    pub store: ConversationStore,
    pub widget: WidgetState,
    pub search: SearchState,
    pub connection_mode: ConnectionMode,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WidgetSnapshot {
        WidgetSnapshot::capture(
            &self.widget,
            &self.store,
            self.connection_mode,
            &self.search.query,
            &self.search.hits,
        )
    }
}

pub type SharedState = Arc<Mutex<ChatState>>;

/// Lock the shared state. A panic while holding the lock leaves plain data
/// behind, so a poisoned lock is recovered rather than propagated.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handles every async piece of the client needs.
#[derive(Clone)]
pub struct ChatContext {
    pub state: SharedState,
    pub api: Arc<dyn ChatApi>,
    pub events: EventEmitter,
    pub notifier: Arc<dyn Notifier>,
    pub visibility: Visibility,
}

impl ChatContext {
    pub fn new(api: Arc<dyn ChatApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChatState::new())),
            api,
            events: EventEmitter::default(),
            notifier,
            visibility: Visibility::default(),
        }
    }

    pub fn self_id(&self) -> Option<UserId> {
        lock_state(&self.state).self_id.clone()
    }
}
