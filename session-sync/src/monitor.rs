//! Live-update connection monitor.
//!
//! Holds one streaming connection per session, surfaces inbound change
//! notifications together with its own health, and reconnects with
//! exponential backoff when the connection drops. Notifications are not
//! buffered while disconnected — subscribers treat a reconnection as a cue
//! to refetch state rather than relying on notification completeness.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use shared::SessionId;

use crate::backoff::ReconnectDelay;
use crate::transport::{ChangeStream, ChangeStreamConnector};

/// Connection lifecycle states. Exactly one is active per monitor
/// instance; `Idle` is both the initial and the explicitly-stopped terminal
/// state and is never re-entered automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    WaitingToReconnect,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::WaitingToReconnect => "Waiting to reconnect",
        };
        f.write_str(label)
    }
}

/// Everything a monitor tells its subscriber, delivered through a single
/// channel so ordering between data and state transitions is exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Opaque change-notification payload, in arrival order.
    Change(String),
    /// The monitor transitioned to a new state.
    StateChanged(ConnectionState),
}

/// Monitors one session's change stream.
///
/// An instance exclusively owns its transport handle. Create a fresh
/// monitor per session id and call [`SessionMonitor::stop`] before
/// discarding it; an unstopped instance keeps its reconnect timer alive
/// against a session nobody is looking at anymore.
pub struct SessionMonitor<C: ChangeStreamConnector> {
    session_id: SessionId,
    shared: Arc<Shared>,
    connector: Mutex<Option<C>>,
    delay: ReconnectDelay,
}

struct Shared {
    state: Mutex<ConnectionState>,
    events: mpsc::UnboundedSender<MonitorEvent>,
    cancel: CancellationToken,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        // A stopped monitor stays Idle no matter what its task was doing.
        if self.cancel.is_cancelled() {
            return;
        }
        *self.state.lock().expect("monitor state lock") = next;
        let _ = self.events.send(MonitorEvent::StateChanged(next));
    }
}

impl<C: ChangeStreamConnector> SessionMonitor<C> {
    /// Create a monitor for one session. Returns the monitor together with
    /// the receiver its events arrive on; nothing happens until
    /// [`SessionMonitor::start`].
    pub fn new(
        session_id: SessionId,
        connector: C,
    ) -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        Self::with_delay(session_id, connector, ReconnectDelay::default())
    }

    /// Like [`SessionMonitor::new`] with a custom backoff policy.
    pub fn with_delay(
        session_id: SessionId,
        connector: C,
        delay: ReconnectDelay,
    ) -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let monitor = Self {
            session_id,
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Idle),
                events,
                cancel: CancellationToken::new(),
            }),
            connector: Mutex::new(Some(connector)),
            delay,
        };
        (monitor, receiver)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Begin connecting. Only the first call does anything; the monitor
    /// then drives itself until stopped.
    pub fn start(&self) {
        let Some(connector) = self
            .connector
            .lock()
            .expect("monitor connector lock")
            .take()
        else {
            return;
        };
        if self.shared.cancel.is_cancelled() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let session_id = self.session_id.clone();
        let delay = self.delay.clone();
        tokio::spawn(run(shared, connector, session_id, delay));
    }

    /// Current state. Side-effect free.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock().expect("monitor state lock")
    }

    /// Force `Idle` and close any live connection. Safe to call repeatedly.
    ///
    /// A reconnect wait in flight becomes a no-op; the caller initiated the
    /// stop, so no `StateChanged` event is emitted for it.
    pub fn stop(&self) {
        *self.shared.state.lock().expect("monitor state lock") = ConnectionState::Idle;
        self.shared.cancel.cancel();
    }
}

/// Connect/read/reconnect loop. Owns the stream handle for its whole life;
/// cancellation drops it, which closes the underlying connection.
async fn run<C: ChangeStreamConnector>(
    shared: Arc<Shared>,
    connector: C,
    session_id: SessionId,
    mut delay: ReconnectDelay,
) {
    loop {
        shared.set_state(ConnectionState::Connecting);
        debug!(%session_id, "connecting change stream");

        let connected = tokio::select! {
            _ = shared.cancel.cancelled() => return,
            result = connector.connect(&session_id) => result,
        };

        match connected {
            Ok(mut stream) => {
                shared.set_state(ConnectionState::Connected);
                delay.reset();
                loop {
                    let item = tokio::select! {
                        _ = shared.cancel.cancelled() => return,
                        item = stream.next() => item,
                    };
                    match item {
                        Some(Ok(payload)) => {
                            let _ = shared.events.send(MonitorEvent::Change(payload));
                        }
                        Some(Err(e)) => {
                            // Errors are not classified; close and reconnect.
                            debug!(%session_id, "change stream error: {e}");
                            break;
                        }
                        None => {
                            debug!(%session_id, "change stream closed");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                debug!(%session_id, "connect failed: {e}");
            }
        }

        // A close caused by stop() must not trigger reconnection.
        if shared.cancel.is_cancelled() {
            return;
        }
        shared.set_state(ConnectionState::WaitingToReconnect);
        let wait = delay.next_wait();
        debug!(%session_id, "reconnecting in {wait:?}");
        tokio::select! {
            _ = shared.cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
