// src/dispatch.rs - fire-and-forget hand-off to the command executor
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::error::Result;
use crate::events::{GestureKind, PlayPauseLabel};

/// Receives gestures and turns them into OS media commands.
///
/// `execute` may block (window activation, key injection); it is always
/// called off the frame loop.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, gesture: GestureKind) -> Result<bool>;

    /// Label for the next play/pause press, from the executor's tracked
    /// playback state.
    fn current_display_label(&self) -> PlayPauseLabel;
}

/// Spawns executor calls as detached tasks.
///
/// No handle is kept, so a dispatched call cannot be awaited or cancelled.
/// A call that outlives the timeout is logged and abandoned; its blocking
/// thread runs to completion on its own.
#[derive(Clone)]
pub struct Dispatcher {
    executor: Arc<dyn CommandExecutor>,
    runtime: Handle,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn CommandExecutor>, runtime: Handle, config: &DispatchConfig) -> Self {
        Self {
            executor,
            runtime,
            timeout: Duration::try_from_secs_f64(config.timeout_secs)
                .unwrap_or_else(|_| Duration::from_secs_f64(DispatchConfig::default().timeout_secs)),
        }
    }

    pub fn display_label(&self) -> PlayPauseLabel {
        self.executor.current_display_label()
    }

    pub fn dispatch(&self, gesture: GestureKind) {
        let executor = Arc::clone(&self.executor);
        let timeout = self.timeout;

        self.runtime.spawn(async move {
            let call = tokio::task::spawn_blocking(move || executor.execute(gesture));
            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(Ok(true))) => debug!(%gesture, "Gesture command executed"),
                Ok(Ok(Ok(false))) => info!(%gesture, "Gesture command not applied"),
                Ok(Ok(Err(e))) => warn!(%gesture, error = %e, "Gesture command failed"),
                Ok(Err(join_err)) => error!(%gesture, error = %join_err, "Gesture command panicked"),
                Err(_) => warn!(
                    %gesture,
                    timeout_ms = timeout.as_millis() as u64,
                    "Gesture command timed out, abandoning"
                ),
            }
        });
    }
}
