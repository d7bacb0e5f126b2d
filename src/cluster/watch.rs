//! Change-feed subscription with bounded reconnect.
//!
//! A [`WatchManager`] owns at most one subscription at a time and drives it
//! through `Idle -> Starting -> Active <-> Reconnecting -> Stopped`. The
//! subscription runs on a tokio task; every callback is dispatched while
//! holding the shared state lock after checking the subscription is still
//! live, so once [`WatchManager::stop`] returns no callback can fire.
//!
//! Callbacks must not call back into the same manager.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;

use super::error::WatchError;
use super::transport::{WatchEvent, WatchEventType, WatchRequest, WatchTransport};

/// Reconnect delays grow linearly up to this multiple of the base delay.
pub const BACKOFF_CAP: u32 = 5;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Starting,
    Active,
    Reconnecting,
    Stopped,
}

impl WatchState {
    /// States in which the subscription may still deliver callbacks.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            WatchState::Starting | WatchState::Active | WatchState::Reconnecting
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    /// Reconnects allowed per `start()` before giving up.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

/// What happens after a failure, passed to the error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Reconnecting { attempt: u32, delay: Duration },
    /// Auth failure or attempts exhausted; the subscription is stopped.
    Terminal,
}

/// Delay before reconnect attempt `attempt`: `base * min(attempt, BACKOFF_CAP)`.
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt.min(BACKOFF_CAP))
}

struct Shared {
    state: WatchState,
    attempts: u32,
    resume_from: Option<String>,
    /// Bumped by every start/stop; tasks from an older generation are dead.
    generation: u64,
}

impl Shared {
    fn is_live(&self, generation: u64) -> bool {
        self.generation == generation && self.state.is_live()
    }
}

type EventHandler = Box<dyn FnMut(WatchEvent) + Send>;
type ErrorHandler = Box<dyn FnMut(&WatchError, Recovery) + Send>;

pub struct WatchManager {
    transport: Arc<dyn WatchTransport>,
    config: WatchConfig,
    shared: Arc<Mutex<Shared>>,
    request: Option<WatchRequest>,
    task: Option<JoinHandle<()>>,
}

impl WatchManager {
    pub fn new(transport: Arc<dyn WatchTransport>, config: WatchConfig) -> Self {
        Self {
            transport,
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: WatchState::Idle,
                attempts: 0,
                resume_from: None,
                generation: 0,
            })),
            request: None,
            task: None,
        }
    }

    pub fn state(&self) -> WatchState {
        lock(&self.shared).state
    }

    /// Reconnect attempts made since the last explicit `start()`.
    pub fn attempts(&self) -> u32 {
        lock(&self.shared).attempts
    }

    pub fn is_active(&self) -> bool {
        self.state().is_live()
    }

    pub fn path(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.path.as_str())
    }

    pub fn config(&self) -> WatchConfig {
        self.config
    }

    /// Open a subscription, replacing any previous one.
    ///
    /// Resets the attempt counter and resume marker. Must be called from
    /// within a tokio runtime.
    pub fn start<E, F>(&mut self, request: WatchRequest, on_event: E, on_error: F)
    where
        E: FnMut(WatchEvent) + Send + 'static,
        F: FnMut(&WatchError, Recovery) + Send + 'static,
    {
        let generation = {
            let mut shared = lock(&self.shared);
            shared.generation = shared.generation.wrapping_add(1);
            shared.state = WatchState::Starting;
            shared.attempts = 0;
            shared.resume_from = request.resource_version.clone();
            shared.generation
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }

        tracing::debug!(path = %request.path, "Starting watch");
        self.request = Some(request.clone());
        self.task = Some(tokio::spawn(run_subscription(
            Arc::clone(&self.transport),
            self.config,
            Arc::clone(&self.shared),
            generation,
            request,
            Box::new(on_event),
            Box::new(on_error),
        )));
    }

    /// Stop the subscription. Idempotent and valid from any state.
    ///
    /// Cancels a pending reconnect timer and aborts the in-flight connection.
    pub fn stop(&mut self) {
        let was = {
            let mut shared = lock(&self.shared);
            let was = shared.state;
            shared.generation = shared.generation.wrapping_add(1);
            shared.state = WatchState::Stopped;
            was
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if was != WatchState::Stopped {
            tracing::debug!(path = ?self.path(), from = ?was, "Watch stopped");
        }
    }
}

impl Drop for WatchManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WatchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchManager")
            .field("path", &self.path())
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish()
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// How one connection ended.
enum Outcome {
    /// Server closed the stream normally.
    Closed,
    Failed(WatchError),
}

async fn run_subscription(
    transport: Arc<dyn WatchTransport>,
    config: WatchConfig,
    shared: Arc<Mutex<Shared>>,
    generation: u64,
    base_request: WatchRequest,
    mut on_event: EventHandler,
    mut on_error: ErrorHandler,
) {
    loop {
        let request = {
            let mut state = lock(&shared);
            if !state.is_live(generation) {
                return;
            }
            state.state = WatchState::Starting;
            WatchRequest {
                resource_version: state.resume_from.clone(),
                ..base_request.clone()
            }
        };

        let outcome = match transport.open(&request).await {
            Ok(mut stream) => {
                {
                    let mut state = lock(&shared);
                    if !state.is_live(generation) {
                        return;
                    }
                    state.state = WatchState::Active;
                }
                tracing::debug!(path = %request.path, "Watch active");

                loop {
                    match stream.next().await {
                        Some(Ok(event)) => {
                            let mut state = lock(&shared);
                            if !state.is_live(generation) {
                                return;
                            }
                            if event.error_code() == Some(410) {
                                // Resume marker expired; next connect lists from now.
                                state.resume_from = None;
                            } else if let Some(version) = event.resource_version() {
                                state.resume_from = Some(version.to_string());
                            }
                            if event.kind != WatchEventType::Bookmark {
                                on_event(event);
                            }
                        }
                        Some(Err(WatchError::Decode(msg))) => {
                            tracing::warn!(path = %request.path, error = %msg, "Skipping malformed watch event");
                        }
                        Some(Err(e)) => break Outcome::Failed(e),
                        None => break Outcome::Closed,
                    }
                }
            }
            Err(e) => Outcome::Failed(e),
        };

        let delay = {
            let mut state = lock(&shared);
            if !state.is_live(generation) {
                return;
            }
            match outcome {
                Outcome::Closed => {
                    tracing::debug!(path = %request.path, "Watch closed by server, resuming");
                    state.state = WatchState::Reconnecting;
                    config.base_delay
                }
                Outcome::Failed(error) => {
                    let recovery = if error.is_auth_failure()
                        || state.attempts >= config.max_attempts
                    {
                        Recovery::Terminal
                    } else {
                        state.attempts += 1;
                        Recovery::Reconnecting {
                            attempt: state.attempts,
                            delay: reconnect_delay(config.base_delay, state.attempts),
                        }
                    };

                    match recovery {
                        Recovery::Terminal => {
                            state.state = WatchState::Stopped;
                            tracing::warn!(
                                path = %request.path,
                                attempts = state.attempts,
                                error = %error,
                                "Watch failed permanently"
                            );
                            on_error(&error, recovery);
                            return;
                        }
                        Recovery::Reconnecting { attempt, delay } => {
                            state.state = WatchState::Reconnecting;
                            tracing::warn!(
                                path = %request.path,
                                attempt = attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "Watch failed, reconnecting"
                            );
                            on_error(&error, recovery);
                            delay
                        }
                    }
                }
            }
        };

        tokio::time::sleep(delay).await;
    }
}
