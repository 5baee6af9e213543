//! Best-effort notification sound and the host's foreground flag.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Audio output unavailable: {0}")]
    Unavailable(String),
}

pub trait Notifier: Send + Sync + 'static {
    fn play_sound(&self) -> Result<(), NotifyError>;
}

/// Rings the terminal bell on stderr.
pub struct TerminalBell;

impl Notifier for TerminalBell {
    fn play_sound(&self) -> Result<(), NotifyError> {
        let mut err = std::io::stderr().lock();
        err.write_all(b"\x07")
            .and_then(|_| err.flush())
            .map_err(|e| NotifyError::Unavailable(e.to_string()))
    }
}

pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn play_sound(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Whether the host application is in the foreground. Shared between the
/// host, which flips it, and the message bridge, which reads it.
#[derive(Debug, Clone)]
pub struct Visibility(Arc<AtomicBool>);

impl Visibility {
    pub fn new(foreground: bool) -> Self {
        Self(Arc::new(AtomicBool::new(foreground)))
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.0.store(foreground, Ordering::Relaxed);
    }

    pub fn is_foreground(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_is_shared_between_clones() {
        let host = Visibility::default();
        let bridge = host.clone();
        assert!(bridge.is_foreground());
        host.set_foreground(false);
        assert!(!bridge.is_foreground());
    }
}
